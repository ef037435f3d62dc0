//! In-memory Wikipedia for tests

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::WikiSource;
use crate::error::Result;

/// Fixed set of articles matched by case-insensitive substring
#[derive(Default)]
pub struct StaticWiki {
    pages: BTreeMap<String, String>,
}

impl StaticWiki {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page(mut self, title: impl Into<String>, summary: impl Into<String>) -> Self {
        self.pages.insert(title.into(), summary.into());
        self
    }
}

#[async_trait]
impl WikiSource for StaticWiki {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let needle = query.to_lowercase();
        Ok(self
            .pages
            .iter()
            .filter(|(title, summary)| {
                title.to_lowercase().contains(&needle) || summary.to_lowercase().contains(&needle)
            })
            .map(|(title, _)| title.clone())
            .take(limit)
            .collect())
    }

    async fn summary(&self, title: &str) -> Result<Option<String>> {
        Ok(self.pages.get(title).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_and_summary() {
        let wiki = StaticWiki::new()
            .page("Pi", "Pi is the ratio of a circle's circumference to its diameter.")
            .page("Euler's number", "e is approximately 2.71828.");

        assert_eq!(wiki.search("circle", 3).await.unwrap(), vec!["Pi".to_string()]);
        assert_eq!(wiki.search("", 1).await.unwrap().len(), 1);
        assert!(wiki.summary("Pi").await.unwrap().is_some());
        assert!(wiki.summary("Tau").await.unwrap().is_none());
    }
}
