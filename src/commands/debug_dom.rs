use crate::browser::{js, BrowserHandle, Page};
use crate::config::Config;
use crate::error::Result;
pub use crate::log_info;
use crate::utils;

/// Developer aid: open the notebook page and print the DOM details needed
/// to check selectors after an Amazon layout change.
pub async fn run(config: &Config) -> Result<()> {
    // Always headful: this exists for a human looking at the page.
    let browser = BrowserHandle::launch(config, true).await?;
    let result = dump(&browser, config).await;
    browser.close().await?;
    result
}

async fn dump(browser: &BrowserHandle, config: &Config) -> Result<()> {
    log_info!("[debug-dom] Opening {}", config.notebook_url);
    let page = browser.open(&config.notebook_url).await?;

    utils::wait_for_enter("Log in to Amazon if needed, then press Enter... ")?;

    let title = page.evaluate(js::page_title()).await?;
    println!("=== Page title ===");
    println!("{}", title.as_str().unwrap_or(""));

    println!("=== Div classes (up to 50) ===");
    let classes = page.evaluate(&js::div_classes(50)).await?;
    for class in classes.as_array().into_iter().flatten() {
        println!("{}", class.as_str().unwrap_or(""));
    }

    println!("=== Anchor texts (up to 30) ===");
    let anchors = page.evaluate(&js::anchor_texts(30)).await?;
    for anchor in anchors.as_array().into_iter().flatten() {
        println!("- {}", anchor.as_str().unwrap_or(""));
    }

    Ok(())
}
