use super::Page;
use crate::config::Config;
use crate::error::{BrowserError, Result};
pub use crate::log_warn;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page as CdpPage;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

/// A launched Chromium with its CDP event loop running in the background.
pub struct BrowserHandle {
    browser: Browser,
    handler_task: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl BrowserHandle {
    /// Launch Chromium with a persistent profile so the Amazon session
    /// survives between runs.
    pub async fn launch(config: &Config, headful: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(config.browser.window_width, config.browser.window_height)
            .user_data_dir(&config.user_data_dir);

        if headful || !config.browser.headless {
            builder = builder.with_head();
        }

        let browser_config = builder
            .build()
            .map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // Drive CDP messages until the browser goes away.
        let handler_task = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            navigation_timeout: Duration::from_secs(config.browser.navigation_timeout_secs),
        })
    }

    /// Open a new tab and navigate it to `url`.
    pub async fn open(&self, url: &str) -> Result<ChromePage> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let chrome_page = ChromePage {
            page,
            navigation_timeout: self.navigation_timeout,
        };
        chrome_page.goto(url).await?;
        Ok(chrome_page)
    }

    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            log_warn!("[browser] Close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            log_warn!("[browser] Wait for shutdown failed: {}", e);
        }
        self.handler_task.abort();
        Ok(())
    }
}

pub struct ChromePage {
    page: CdpPage,
    navigation_timeout: Duration,
}

#[async_trait]
impl Page for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        match timeout(self.navigation_timeout, navigation).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }
            .into()),
            Err(_) => Err(BrowserError::Navigation {
                url: url.to_string(),
                message: format!(
                    "timed out after {} seconds",
                    self.navigation_timeout.as_secs()
                ),
            }
            .into()),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::Script(format!("content: {}", e)).into())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::SelectorTimeout {
                    selector: selector.to_string(),
                    waited_ms: timeout.as_millis() as u64,
                }
                .into());
            }
            sleep(Duration::from_millis(200)).await;
        }
    }
}
