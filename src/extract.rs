//! The per-book extraction loop.
//!
//! The notebook view renders lazily: clicking a list entry swaps the detail
//! pane in piecemeal. Instead of listening for mutation events, the loop
//! samples the pane at a fixed interval and treats `stability_window`
//! consecutive identical snapshots as "fully rendered". Items are processed
//! strictly in sequence over a single page handle.

use crate::browser::{js, Page};
use crate::config::Config;
use crate::error::{ExtractError, Result};
pub use crate::{log_debug, log_warn};
use crate::scraper::Scraper;
use regex::Regex;
use std::time::Duration;
use tokio::time::sleep;

/// How many times the list view is reloaded when an entry refuses to click.
const MAX_LIST_RELOADS: u32 = 2;

/// One entry of the left-pane book list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub index: usize,
    pub title: String,
}

/// One extracted highlight, ready to become a CSV row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRecord {
    pub book: String,
    pub section: String,
    pub location: String,
    pub highlight: String,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub stability_window: u32,
    pub click_attempts: u32,
    pub context_attempts: u32,
    pub settle: Duration,
    pub selector_timeout: Duration,
}

impl ExtractOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.extract.poll_interval_ms),
            max_polls: config.extract.max_polls,
            stability_window: config.extract.stability_window,
            click_attempts: config.extract.click_attempts,
            context_attempts: config.extract.context_attempts,
            settle: Duration::from_millis(config.extract.settle_ms),
            selector_timeout: Duration::from_secs(config.browser.navigation_timeout_secs),
        }
    }
}

/// Walks the book list once, front to back. Each `next_item` call scrolls,
/// clicks, waits for the detail pane to stabilize, and returns the parsed
/// records for that one book; the caller decides whether a failed item
/// aborts the run or is skipped.
pub struct Extractor<'a> {
    page: &'a dyn Page,
    notebook_url: String,
    items: Vec<ListItem>,
    cursor: usize,
    options: ExtractOptions,
}

impl<'a> Extractor<'a> {
    pub fn new(
        page: &'a dyn Page,
        notebook_url: impl Into<String>,
        items: Vec<ListItem>,
        options: ExtractOptions,
    ) -> Self {
        Self {
            page,
            notebook_url: notebook_url.into(),
            items,
            cursor: 0,
            options,
        }
    }

    /// Process the next list entry. Returns `None` once every item has been
    /// visited; the sequence is not restartable.
    pub async fn next_item(&mut self) -> Option<(ListItem, Result<Vec<DetailRecord>>)> {
        let item = self.items.get(self.cursor)?.clone();
        self.cursor += 1;

        let result = self.extract_one(&item).await;

        // Leave the page back on the list view so the next entry starts from
        // a known state.
        if self.cursor < self.items.len() {
            if let Err(e) = self.return_to_list().await {
                log_warn!("[extract] Could not return to the list view: {}", e);
            }
        }

        Some((item, result))
    }

    async fn extract_one(&self, item: &ListItem) -> Result<Vec<DetailRecord>> {
        let mut clicked = false;
        for round in 0..=MAX_LIST_RELOADS {
            if self.click_item(&item.title).await? {
                clicked = true;
                break;
            }
            if round < MAX_LIST_RELOADS {
                log_warn!(
                    "[extract] Could not click '{}', reloading the list",
                    item.title
                );
                self.return_to_list().await?;
            }
        }
        if !clicked {
            return Err(ExtractError::ClickFailed {
                title: item.title.clone(),
            }
            .into());
        }

        if !self.wait_for_context(&item.title).await? {
            return Err(ExtractError::ContextNotFound {
                title: item.title.clone(),
            }
            .into());
        }

        self.poll_until_stable(&item.title).await
    }

    /// Scroll the entry into view and click it, retrying while the list's
    /// virtualized rendering catches up.
    async fn click_item(&self, title: &str) -> Result<bool> {
        for _ in 0..self.options.click_attempts {
            let found = self
                .page
                .evaluate(&js::scroll_into_view(title))
                .await?
                .as_bool()
                .unwrap_or(false);
            sleep(self.options.settle).await;

            let clicked = self
                .page
                .evaluate(&js::click_anchor(title))
                .await?
                .as_bool()
                .unwrap_or(false);
            if clicked {
                return Ok(true);
            }
            if !found {
                log_debug!("[extract] '{}' not present in the anchor list yet", title);
            }
            sleep(self.options.poll_interval).await;
        }
        Ok(false)
    }

    /// After a click, confirm the detail pane belongs to the clicked book
    /// before trusting its content.
    async fn wait_for_context(&self, title: &str) -> Result<bool> {
        for attempt in 0..self.options.context_attempts {
            sleep((self.options.settle / 2) * (attempt + 1)).await;
            if self.detect_context(title).await? {
                return Ok(true);
            }
            sleep(self.options.poll_interval).await;
        }
        Ok(false)
    }

    async fn detect_context(&self, title: &str) -> Result<bool> {
        // Give the annotation container a short head start.
        let head_start = self.options.selector_timeout.min(Duration::from_secs(8));
        let _ = self
            .page
            .wait_for_selector(
                "div.kp-notebook-annotation-container, div.kp-notebook-highlight, #kp-notebook-annotations-asin",
                head_start,
            )
            .await;

        let wanted = normalize_title(title);
        let wanted_tokens = title_tokens(&wanted);

        // 1) the document title
        let page_title = self
            .page
            .evaluate(js::page_title())
            .await?
            .as_str()
            .map(normalize_title)
            .unwrap_or_default();
        if contains_either(&wanted, &page_title) {
            return Ok(true);
        }

        // 2) heading-like elements
        let html = self.page.content().await?;
        for header in Scraper::new(&html).notebook().header_texts() {
            let header = normalize_title(&header);
            if contains_either(&wanted, &header) || token_overlap(&wanted_tokens, &header) {
                return Ok(true);
            }
        }

        // 3) anywhere in the rendered body text
        let body = self
            .page
            .evaluate(js::body_text())
            .await?
            .as_str()
            .map(normalize_title)
            .unwrap_or_default();
        if !wanted.is_empty()
            && (body.contains(&wanted) || wanted_tokens.iter().any(|t| body.contains(t.as_str())))
        {
            return Ok(true);
        }

        // 4) the hidden ASIN plus at least one rendered highlight
        let asin = self
            .page
            .evaluate(js::hidden_asin())
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();
        if !asin.is_empty() {
            let count = self
                .page
                .evaluate(js::highlight_count())
                .await?
                .as_u64()
                .unwrap_or(0);
            if count > 0 {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Sample the detail pane until `stability_window` consecutive polls
    /// parse to identical fragments, then emit the records exactly once.
    async fn poll_until_stable(&self, title: &str) -> Result<Vec<DetailRecord>> {
        let mut last: Option<Vec<crate::scraper::RawAnnotation>> = None;
        let mut streak: u32 = 0;

        for _ in 0..self.options.max_polls {
            sleep(self.options.poll_interval).await;

            let html = self.page.content().await?;
            let current = Scraper::new(&html).notebook().annotations();

            if last.as_ref() == Some(&current) {
                streak += 1;
            } else {
                streak = 1;
                last = Some(current);
            }

            if streak >= self.options.stability_window {
                let records = last
                    .take()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|raw| DetailRecord {
                        book: title.to_string(),
                        section: raw.section,
                        location: raw.location,
                        highlight: raw.highlight,
                        note: raw.note,
                    })
                    .collect();
                return Ok(records);
            }
        }

        Err(ExtractError::Timeout {
            title: title.to_string(),
            polls: self.options.max_polls,
        }
        .into())
    }

    async fn return_to_list(&self) -> Result<()> {
        self.page.goto(&self.notebook_url).await?;
        if let Err(e) = self
            .page
            .wait_for_selector("a", self.options.selector_timeout)
            .await
        {
            log_warn!("[extract] List anchors not confirmed after reload: {}", e);
        }
        Ok(())
    }
}

fn contains_either(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

/// Strip quotes, brackets, and whitespace runs so titles from different
/// parts of the page compare equal.
fn normalize_title(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| {
            if c.is_whitespace()
                || matches!(
                    c,
                    '“' | '”' | '"' | '\'' | '「' | '」' | '『' | '』' | '(' | ')' | '（' | '）'
                        | '[' | ']'
                )
            {
                ' '
            } else {
                c
            }
        })
        .collect();
    crate::utils::normalize_whitespace(&cleaned)
}

/// Word-ish tokens: latin words, digits, and Japanese script runs, two or
/// more characters long.
fn title_tokens(s: &str) -> Vec<String> {
    let re = Regex::new(r"[\w\x{3000}-\x{30FF}\x{4E00}-\x{9FFF}\-]+").unwrap();
    re.find_iter(s)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= 2)
        .collect()
}

/// At least half the title tokens must appear somewhere in the candidate.
fn token_overlap(wanted: &[String], candidate: &str) -> bool {
    if wanted.is_empty() {
        return false;
    }
    let candidate_tokens = title_tokens(candidate);
    let common = wanted
        .iter()
        .filter(|tok| candidate_tokens.iter().any(|g| g.contains(tok.as_str())))
        .count();
    common >= std::cmp::max(1, (wanted.len() + 1) / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Page;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const STABLE_DETAIL: &str = r#"
        <div class="kp-notebook-annotation-container">
            <li>位置: 10 first highlight body</li>
        </div>
    "#;
    const ALT_DETAIL: &str = r#"
        <div class="kp-notebook-annotation-container">
            <li>位置: 11 something else entirely</li>
        </div>
    "#;
    const EMPTY_DETAIL: &str = r#"<div class="kp-notebook-annotation-container"></div>"#;

    /// Scripted page: successive `content()` calls drain `frames` (the last
    /// frame repeats, or the whole sequence cycles).
    struct FakePage {
        title: String,
        frames: Mutex<VecDeque<String>>,
        cycle: bool,
        clicks_succeed: bool,
        clicks: AtomicU32,
        content_calls: AtomicU32,
    }

    impl FakePage {
        fn new(title: &str, frames: &[&str]) -> Self {
            Self {
                title: title.to_string(),
                frames: Mutex::new(frames.iter().map(|f| f.to_string()).collect()),
                cycle: false,
                clicks_succeed: true,
                clicks: AtomicU32::new(0),
                content_calls: AtomicU32::new(0),
            }
        }

        fn cycling(mut self) -> Self {
            self.cycle = true;
            self
        }

        fn unclickable(mut self) -> Self {
            self.clicks_succeed = false;
            self
        }
    }

    #[async_trait]
    impl Page for FakePage {
        async fn goto(&self, _url: &str) -> crate::error::Result<()> {
            Ok(())
        }

        async fn evaluate(&self, script: &str) -> crate::error::Result<Value> {
            if script.contains(".click()") {
                if self.clicks_succeed {
                    self.clicks.fetch_add(1, Ordering::SeqCst);
                    return Ok(json!(true));
                }
                return Ok(json!(false));
            }
            if script == js::page_title() {
                return Ok(json!(self.title.clone()));
            }
            if script.contains("scrollIntoView") {
                return Ok(json!(true));
            }
            Ok(Value::Null)
        }

        async fn content(&self) -> crate::error::Result<String> {
            self.content_calls.fetch_add(1, Ordering::SeqCst);
            let mut frames = self.frames.lock().unwrap();
            if frames.len() > 1 {
                let frame = frames.pop_front().unwrap();
                if self.cycle {
                    frames.push_back(frame.clone());
                }
                Ok(frame)
            } else {
                Ok(frames.front().cloned().unwrap_or_default())
            }
        }

        async fn wait_for_selector(
            &self,
            _selector: &str,
            _timeout: Duration,
        ) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn fast_options() -> ExtractOptions {
        ExtractOptions {
            poll_interval: Duration::from_millis(1),
            max_polls: 5,
            stability_window: 2,
            click_attempts: 2,
            context_attempts: 2,
            settle: Duration::from_millis(2),
            selector_timeout: Duration::from_millis(10),
        }
    }

    fn items(titles: &[&str]) -> Vec<ListItem> {
        titles
            .iter()
            .enumerate()
            .map(|(index, title)| ListItem {
                index,
                title: title.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn stable_content_yields_records_with_exact_fields() {
        let page = FakePage::new("Stable Book", &[STABLE_DETAIL]);
        let mut extractor =
            Extractor::new(&page, "https://example.test/nb", items(&["Stable Book"]), fast_options());

        let (item, result) = extractor.next_item().await.unwrap();
        let records = result.unwrap();
        assert_eq!(item.title, "Stable Book");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].book, "Stable Book");
        assert_eq!(records[0].location, "10");
        assert_eq!(records[0].highlight, "first highlight body");
        assert_eq!(records[0].note, "");
        assert!(extractor.next_item().await.is_none());
    }

    #[tokio::test]
    async fn never_stabilizing_item_times_out_naming_it() {
        let page = FakePage::new("Flaky Book", &[STABLE_DETAIL, ALT_DETAIL]).cycling();
        let mut extractor =
            Extractor::new(&page, "https://example.test/nb", items(&["Flaky Book"]), fast_options());

        let (_, result) = extractor.next_item().await.unwrap();
        match result {
            Err(crate::error::AppError::Extract(ExtractError::Timeout { title, polls })) => {
                assert_eq!(title, "Flaky Book");
                assert_eq!(polls, 5);
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn emits_once_without_a_third_confirmation_poll() {
        let page = FakePage::new("One Shot", &[STABLE_DETAIL, STABLE_DETAIL, STABLE_DETAIL]);
        let mut extractor =
            Extractor::new(&page, "https://example.test/nb", items(&["One Shot"]), fast_options());

        let (_, result) = extractor.next_item().await.unwrap();
        assert_eq!(result.unwrap().len(), 1);
        // Two polls reached the stability window; the loop must stop there.
        assert_eq!(page.content_calls.load(Ordering::SeqCst), 2);
        assert!(extractor.next_item().await.is_none());
    }

    #[tokio::test]
    async fn empty_item_list_performs_no_clicks() {
        let page = FakePage::new("unused", &[STABLE_DETAIL]);
        let mut extractor =
            Extractor::new(&page, "https://example.test/nb", items(&[]), fast_options());

        assert!(extractor.next_item().await.is_none());
        assert_eq!(page.clicks.load(Ordering::SeqCst), 0);
        assert_eq!(page.content_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn item_without_highlights_yields_zero_records() {
        let page = FakePage::new("Empty Book", &[EMPTY_DETAIL]);
        let mut extractor =
            Extractor::new(&page, "https://example.test/nb", items(&["Empty Book"]), fast_options());

        let (_, result) = extractor.next_item().await.unwrap();
        assert_eq!(result.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn unclickable_item_reports_click_failure() {
        let page = FakePage::new("Hidden Book", &[STABLE_DETAIL]).unclickable();
        let mut extractor =
            Extractor::new(&page, "https://example.test/nb", items(&["Hidden Book"]), fast_options());

        let (_, result) = extractor.next_item().await.unwrap();
        match result {
            Err(crate::error::AppError::Extract(ExtractError::ClickFailed { title })) => {
                assert_eq!(title, "Hidden Book");
            }
            other => panic!("expected a click failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn identical_content_across_items_is_not_still_loading() {
        // Both books stabilize on the same detail content; the second must
        // emit normally because stability state resets per item.
        let page = FakePage::new("Twin", &[STABLE_DETAIL]);
        let mut extractor = Extractor::new(
            &page,
            "https://example.test/nb",
            items(&["Twin", "Twin"]),
            fast_options(),
        );

        let (_, first) = extractor.next_item().await.unwrap();
        let (_, second) = extractor.next_item().await.unwrap();
        assert_eq!(first.unwrap().len(), 1);
        assert_eq!(second.unwrap().len(), 1);
    }

    #[test]
    fn title_normalization_strips_quotes_and_brackets() {
        assert_eq!(normalize_title("「深層学習」 (第2版)"), "深層学習 第2版");
        assert_eq!(normalize_title("  a  b  "), "a b");
    }

    #[test]
    fn token_overlap_accepts_half_the_tokens() {
        let tokens = title_tokens("practical systems design");
        assert!(token_overlap(&tokens, "practical systems annotated edition"));
        assert!(!token_overlap(&tokens, "completely unrelated"));
    }
}
