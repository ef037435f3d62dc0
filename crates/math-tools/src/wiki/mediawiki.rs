//! MediaWiki API client

use async_trait::async_trait;
use serde_json::Value;

use super::WikiSource;
use crate::error::{Result, ToolkitError};

/// English Wikipedia API endpoint
pub const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";

const USER_AGENT: &str = concat!("math-solver/", env!("CARGO_PKG_VERSION"));

/// Client for the public MediaWiki action API
pub struct MediaWikiClient {
    client: reqwest::Client,
    api_url: String,
}

impl MediaWikiClient {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    /// Endpoint from `WIKIPEDIA_API_URL`, defaulting to English Wikipedia
    pub fn from_env(client: reqwest::Client) -> Self {
        let api_url =
            std::env::var("WIKIPEDIA_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        Self::new(client, api_url)
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .client
            .get(&self.api_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[("action", "query"), ("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolkitError::Wikipedia(format!("HTTP {status}")));
        }

        let body: Value = response.json().await?;
        if let Some(error) = body.get("error") {
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(ToolkitError::Wikipedia(info.to_string()));
        }

        Ok(body)
    }
}

#[async_trait]
impl WikiSource for MediaWikiClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let limit = limit.to_string();
        let body = self
            .query(&[("list", "search"), ("srsearch", query), ("srlimit", limit.as_str())])
            .await?;

        let titles = parse_search_titles(&body);
        tracing::debug!(query, hits = titles.len(), "Wikipedia search");
        Ok(titles)
    }

    async fn summary(&self, title: &str) -> Result<Option<String>> {
        let body = self
            .query(&[
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
            ])
            .await?;

        Ok(parse_extract(&body))
    }
}

/// Titles from a `list=search` response
fn parse_search_titles(body: &Value) -> Vec<String> {
    body.pointer("/query/search")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.get("title").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// First non-empty extract from a `prop=extracts` response
fn parse_extract(body: &Value) -> Option<String> {
    body.pointer("/query/pages")?
        .as_array()?
        .iter()
        .filter(|page| page.get("missing").is_none())
        .filter_map(|page| page.get("extract").and_then(Value::as_str))
        .map(str::trim)
        .find(|extract| !extract.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_search_titles() {
        let body = json!({
            "batchcomplete": true,
            "query": {
                "searchinfo": {"totalhits": 2},
                "search": [
                    {"ns": 0, "title": "Pythagorean theorem", "pageid": 26513034},
                    {"ns": 0, "title": "Pythagoras", "pageid": 23612}
                ]
            }
        });
        assert_eq!(
            parse_search_titles(&body),
            vec!["Pythagorean theorem".to_string(), "Pythagoras".to_string()]
        );
        assert!(parse_search_titles(&json!({})).is_empty());
    }

    #[test]
    fn test_parse_extract() {
        let body = json!({
            "query": {
                "pages": [
                    {"pageid": 1, "title": "Pi", "extract": "  The number π is a mathematical constant.  "}
                ]
            }
        });
        assert_eq!(
            parse_extract(&body).as_deref(),
            Some("The number π is a mathematical constant.")
        );
    }

    #[test]
    fn test_parse_extract_missing_page() {
        let body = json!({
            "query": {"pages": [{"title": "Nonexistent page", "missing": true}]}
        });
        assert!(parse_extract(&body).is_none());
    }
}
