//! Wikipedia Integration
//!
//! Abstraction over the encyclopedia lookups the `wikipedia` tool needs.

mod mediawiki;
mod mock;

pub use mediawiki::{DEFAULT_API_URL, MediaWikiClient};
pub use mock::StaticWiki;

use async_trait::async_trait;

use crate::error::Result;

/// Source of encyclopedia articles (Strategy pattern)
#[async_trait]
pub trait WikiSource: Send + Sync {
    /// Titles of the best matching pages, best first
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>>;

    /// Plain-text introduction of a page, `None` if the page does not exist
    async fn summary(&self, title: &str) -> Result<Option<String>>;
}
