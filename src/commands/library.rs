use crate::browser::{js, BrowserHandle, Page};
use crate::config::Config;
use crate::error::Result;
pub use crate::{log_info, log_warn};
use crate::records::BookRow;
use crate::scraper::Scraper;
use crate::utils;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;

/// Scrolling stops once the rendered item count holds still this many
/// rounds in a row.
const STABLE_ROUNDS: u32 = 3;
const MAX_SCROLL_ROUNDS: u32 = 200;
const SCROLL_PAUSE: Duration = Duration::from_millis(1000);
const EXTRA_PAUSE: Duration = Duration::from_millis(400);

/// Scrape the library book list into `books.csv`, scrolling until the
/// lazily-loaded grid stops growing.
pub async fn run(config: &Config, headful: bool) -> Result<()> {
    let csv_path = PathBuf::from(&config.out_dir).join("books.csv");
    let debug_html_path = PathBuf::from(&config.out_dir).join("library-debug.html");

    let browser = BrowserHandle::launch(config, headful).await?;
    let result = scrape(&browser, config, headful, &csv_path, &debug_html_path).await;
    browser.close().await?;
    result
}

async fn scrape(
    browser: &BrowserHandle,
    config: &Config,
    headful: bool,
    csv_path: &std::path::Path,
    debug_html_path: &std::path::Path,
) -> Result<()> {
    log_info!("[library] Opening {}", config.library_url);
    let page = browser.open(&config.library_url).await?;

    if headful {
        utils::wait_for_enter("Log in to Amazon in the browser window, then press Enter... ")?;
    }

    // Load the whole grid: scroll to the bottom until the item count is
    // stable, the same fixed-interval sampler the highlight loop uses.
    let mut previous: i64 = -1;
    let mut stable: u32 = 0;
    for round in 0..MAX_SCROLL_ROUNDS {
        page.evaluate(js::library_scroll_to_bottom()).await?;
        sleep(SCROLL_PAUSE).await;

        let count = page
            .evaluate(js::library_item_count())
            .await?
            .as_i64()
            .unwrap_or(0);
        if count == previous {
            stable += 1;
        } else {
            previous = count;
            stable = 0;
        }
        log_info!(
            "[library] Scroll round {}: {} items ({} stable)",
            round + 1,
            count,
            stable
        );
        if stable >= STABLE_ROUNDS {
            break;
        }
        sleep(EXTRA_PAUSE).await;
    }

    if let Err(e) = page
        .wait_for_selector(
            r#"ul#cover li[role="listitem"]"#,
            Duration::from_secs(config.browser.navigation_timeout_secs),
        )
        .await
    {
        log_warn!("[library] Book list never matched its selector: {}", e);
    }

    let html = page.content().await?;
    utils::save_html(&html, debug_html_path)?;

    let books = Scraper::new(&html).library().books();

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(csv_path)?;
    let count = books.len();
    for book in books {
        writer.serialize(BookRow {
            title: book.title,
            author: book.author,
        })?;
    }
    writer.flush()?;

    log_info!("[library] Saved {} books to {:?}", count, csv_path);
    Ok(())
}
