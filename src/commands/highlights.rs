use crate::browser::{BrowserHandle, Page};
use crate::config::Config;
use crate::error::Result;
use crate::extract::{ExtractOptions, Extractor, ListItem};
pub use crate::{log_error, log_info};
use crate::records::{self, HighlightRow};
use crate::scraper::Scraper;
use crate::utils;
use std::path::PathBuf;
use std::time::Duration;

/// Scrape every book's highlights from the notebook view into a CSV file,
/// skipping books already present in the output so interrupted runs resume.
pub async fn run(config: &Config, headful: bool, output: Option<PathBuf>) -> Result<()> {
    let out_path =
        output.unwrap_or_else(|| PathBuf::from(&config.out_dir).join("highlights.csv"));

    let browser = BrowserHandle::launch(config, headful).await?;
    let result = scrape(&browser, config, headful, &out_path).await;
    browser.close().await?;
    result
}

async fn scrape(
    browser: &BrowserHandle,
    config: &Config,
    headful: bool,
    out_path: &std::path::Path,
) -> Result<()> {
    log_info!("[highlights] Opening {}", config.notebook_url);
    let page = browser.open(&config.notebook_url).await?;

    if headful {
        utils::wait_for_enter("Log in to Amazon in the browser window, then press Enter... ")?;
    }

    // The left-pane list is the first thing the notebook renders.
    page.wait_for_selector(
        "a",
        Duration::from_secs(config.browser.navigation_timeout_secs),
    )
    .await?;

    let html = page.content().await?;
    let titles = Scraper::new(&html)
        .notebook()
        .candidate_titles(&config.author_marker);

    if titles.is_empty() {
        log_error!("[highlights] No book candidates detected; the page layout may have changed");
        return Ok(());
    }

    let total = titles.len().min(config.max_books);
    log_info!(
        "[highlights] Detected {} books (processing up to {})",
        titles.len(),
        total
    );

    let seen = records::seen_books(out_path)?;
    if !seen.is_empty() {
        log_info!(
            "[highlights] Resuming: {} books already in {:?}",
            seen.len(),
            out_path
        );
    }

    let mut items = Vec::new();
    for (index, title) in titles.into_iter().take(total).enumerate() {
        if seen.contains(&utils::normalize_whitespace(&title)) {
            log_info!("[highlights] [{}/{}] Already exported: {}", index + 1, total, title);
            continue;
        }
        items.push(ListItem { index, title });
    }

    let mut writer = records::highlights_writer(out_path)?;
    let options = ExtractOptions::from_config(config);
    let mut extractor = Extractor::new(&page, config.notebook_url.clone(), items, options);

    let mut exported = 0usize;
    let mut failed = 0usize;
    while let Some((item, result)) = extractor.next_item().await {
        log_info!(
            "[highlights] [{}/{}] Processing: {}",
            item.index + 1,
            total,
            item.title
        );
        match result {
            Ok(detail_records) => {
                log_info!(
                    "[highlights]   -> {} highlights extracted",
                    detail_records.len()
                );
                for record in detail_records {
                    writer.serialize(HighlightRow::from(record))?;
                }
                // Flush per book: an aborted run loses at most the item in
                // flight.
                writer.flush()?;
                exported += 1;
            }
            Err(e) => {
                // Skip-and-continue policy: a single stuck book should not
                // abandon the rest of the library.
                log_error!(e => "[highlights]   -> extraction failed, skipping");
                failed += 1;
            }
        }
    }

    log_info!(
        "[highlights] Done: {} books exported, {} failed, output {:?}",
        exported,
        failed,
        out_path
    );
    Ok(())
}
