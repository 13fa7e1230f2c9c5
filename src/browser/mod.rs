mod chrome;
pub mod js;

pub use chrome::{BrowserHandle, ChromePage};

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// The page primitives the scraping loops are written against.
///
/// Scroll and click are expressed as scripts run through [`Page::evaluate`],
/// so this seam stays small enough to fake in tests.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for the load to finish.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Run a JS expression and return its JSON result.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Current full HTML of the page.
    async fn content(&self) -> Result<String>;

    /// Poll until the selector matches something or the timeout elapses.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;
}
