use crate::utils::normalize_whitespace;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// Selectors that may carry the "位置: 1,234" style metadata for a highlight.
const METADATA_SELECTOR: &str = "#annotationHighlightHeader, .kp-notebook-metadata";

/// Selectors that may carry the open book's title after a list click.
const HEADER_SELECTORS: &[&str] = &[
    "div.kp-notebook-header",
    "h1",
    "h2",
    "h3",
    ".kp-notebook-metadata",
    ".kp-notebook-metadata h3",
    ".kp-notebook-print-override",
    ".kp-notebook-header h2",
    ".kp-notebook-viewer h1",
    ".kp-notebook-title",
    "h3.kp-notebook-selectable",
    ".a-spacing-top-small h3",
];

/// One annotation fragment as it appears in the detail pane. Compared across
/// polls to decide whether the pane has finished rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAnnotation {
    pub section: String,
    pub location: String,
    pub highlight: String,
    pub note: String,
}

pub struct NotebookScraper<'a> {
    document: &'a Html,
}

impl<'a> NotebookScraper<'a> {
    pub(crate) fn new(document: &'a Html) -> Self {
        Self { document }
    }

    /// Book titles from the left-pane list: anchor texts containing the
    /// author marker, keeping the part left of it, de-duplicated in order.
    pub fn candidate_titles(&self, author_marker: &str) -> Vec<String> {
        let selector = Selector::parse("a").unwrap();

        let mut seen = HashSet::new();
        let mut titles = Vec::new();
        for anchor in self.document.select(&selector) {
            let text = normalize_whitespace(&anchor.text().collect::<String>());
            if !text.contains(author_marker) {
                continue;
            }
            let title = text
                .split(author_marker)
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            if !title.is_empty() && seen.insert(title.clone()) {
                titles.push(title);
            }
        }
        titles
    }

    /// Texts of the heading-like elements used to verify which book the
    /// detail pane currently shows.
    pub fn header_texts(&self) -> Vec<String> {
        let mut texts = Vec::new();
        for selector_str in HEADER_SELECTORS {
            let selector = Selector::parse(selector_str).unwrap();
            for element in self.document.select(&selector).take(8) {
                let text = normalize_whitespace(&element.text().collect::<String>());
                if !text.is_empty() {
                    texts.push(text);
                }
            }
        }
        texts
    }

    /// Parse the annotation fragments of the currently open book.
    pub fn annotations(&self) -> Vec<RawAnnotation> {
        let container_selector = Selector::parse("div.kp-notebook-annotation-container").unwrap();
        let node_selector =
            Selector::parse(".kp-notebook-annotation, .kp-notebook-highlight, li").unwrap();

        let nodes: Vec<ElementRef> = match self.document.select(&container_selector).next() {
            Some(container) => container.select(&node_selector).collect(),
            None => self.document.select(&node_selector).collect(),
        };

        let location_label =
            Regex::new(r"(?i)(?:位置|Location|Loc|ページ|Page)[:：\s]*([0-9\-–,]+)").unwrap();
        let location_loose =
            Regex::new(r"(?i)(?:位置|Location|Loc|ページ|Page)[:：\s]*([^\n|]+)").unwrap();
        let digits = Regex::new(r"([0-9]+(?:[\-–,][0-9]+)*)").unwrap();
        let note_label = Regex::new(r"(?i)(?:Note|メモ|注釈)[:：\s]*([^\n]+)").unwrap();
        let location_cleanup = Regex::new(r"(?i)(?:位置|Location|Loc|ページ|Page)[:：]*").unwrap();
        let note_cleanup = Regex::new(r"(?i)(?:Note|メモ|注釈)[:：]*").unwrap();

        let metadata_selector = Selector::parse(METADATA_SELECTOR).unwrap();

        let mut results = Vec::new();
        for node in &nodes {
            let full = normalize_whitespace(&node.text().collect::<String>());
            if full.is_empty() {
                continue;
            }

            // Location: descendant metadata, then earlier siblings, then the
            // node's own text.
            let mut location = node
                .select(&metadata_selector)
                .find_map(|meta| capture(&location_label, &text_of(meta)))
                .or_else(|| sibling_location(node, &metadata_selector, &location_label));
            if location.is_none() {
                location = capture(&location_loose, &full);
            }
            let location = location
                .map(|raw| normalize_location(&raw, &digits))
                .unwrap_or_default();

            let note = capture(&note_label, &full).unwrap_or_default();

            // Section heading, if the fragment sits under one.
            let section = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| matches!(el.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6"))
                .map(|el| text_of(el))
                .unwrap_or_default();

            // Highlight body: the full text minus location/note fragments and
            // their labels.
            let mut highlight = full.clone();
            if !location.is_empty() {
                highlight = highlight.replacen(&location, "", 1);
            }
            if !note.is_empty() {
                highlight = highlight.replacen(&note, "", 1);
            }
            highlight = location_cleanup.replace_all(&highlight, "").into_owned();
            highlight = note_cleanup.replace_all(&highlight, "").into_owned();
            highlight = normalize_whitespace(&highlight.replace('|', " "));

            results.push(RawAnnotation {
                section,
                location,
                highlight,
                note,
            });
        }

        dedup_by_highlight(results)
    }
}

fn text_of(element: ElementRef) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Walk earlier siblings looking for a metadata element (or one containing
/// it) whose text yields a location.
fn sibling_location(
    node: &ElementRef,
    metadata_selector: &Selector,
    location_label: &Regex,
) -> Option<String> {
    for sibling in node.prev_siblings() {
        let Some(element) = ElementRef::wrap(sibling) else {
            continue;
        };
        let is_metadata = element.value().id() == Some("annotationHighlightHeader")
            || element.value().classes().any(|c| c == "kp-notebook-metadata");
        if is_metadata {
            if let Some(loc) = capture(location_label, &text_of(element)) {
                return Some(loc);
            }
        }
        if let Some(inner) = element.select(metadata_selector).next() {
            if let Some(loc) = capture(location_label, &text_of(inner)) {
                return Some(loc);
            }
        }
    }
    None
}

/// Reduce a raw location like "位置: 1,234" or "114-116" to its numeric part.
fn normalize_location(raw: &str, digits: &Regex) -> String {
    if let Some(m) = digits.captures(raw).and_then(|c| c.get(1)) {
        return m.as_str().to_string();
    }
    raw.chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | '–' | ','))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Keep the first fragment per highlight prefix; nested matches of the node
/// selector produce repeats.
fn dedup_by_highlight(results: Vec<RawAnnotation>) -> Vec<RawAnnotation> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for result in results {
        let key: String = result.highlight.chars().take(300).collect();
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        unique.push(result);
    }
    unique
}

#[cfg(test)]
mod tests {
    use crate::scraper::Scraper;

    const NOTEBOOK_FIXTURE: &str = r##"
        <html><body>
        <a href="#">深層学習の基礎 著者: 山田太郎</a>
        <a href="#">経営の本質 著者: 佐藤花子</a>
        <a href="#">深層学習の基礎 著者: 山田太郎</a>
        <a href="#">設定</a>
        <div class="kp-notebook-annotation-container">
            <li>
                <div class="kp-notebook-metadata">黄色のハイライト | 位置: 1,234</div>
                学びとは経験の再構成である。
            </li>
            <li>
                <div id="annotationHighlightHeader">Location: 56-58</div>
                Learning never exhausts the mind. Note: check the source
            </li>
            <li>   </li>
        </div>
        </body></html>
    "##;

    #[test]
    fn extracts_candidate_titles_in_order_without_duplicates() {
        let scraper = Scraper::new(NOTEBOOK_FIXTURE);
        let titles = scraper.notebook().candidate_titles("著者:");
        assert_eq!(titles, vec!["深層学習の基礎", "経営の本質"]);
    }

    #[test]
    fn ignores_anchors_without_the_marker() {
        let scraper = Scraper::new(r#"<a>設定</a><a>ヘルプ</a>"#);
        assert!(scraper.notebook().candidate_titles("著者:").is_empty());
    }

    #[test]
    fn parses_annotations_with_exact_fields() {
        let scraper = Scraper::new(NOTEBOOK_FIXTURE);
        let annotations = scraper.notebook().annotations();
        assert_eq!(annotations.len(), 2);

        assert_eq!(annotations[0].location, "1,234");
        assert_eq!(annotations[0].highlight, "黄色のハイライト 学びとは経験の再構成である。");
        assert_eq!(annotations[0].note, "");
        assert_eq!(annotations[0].section, "");

        assert_eq!(annotations[1].location, "56-58");
        assert_eq!(annotations[1].highlight, "Learning never exhausts the mind.");
        assert_eq!(annotations[1].note, "check the source");
    }

    #[test]
    fn empty_container_yields_no_annotations() {
        let scraper =
            Scraper::new(r#"<div class="kp-notebook-annotation-container"></div>"#);
        assert!(scraper.notebook().annotations().is_empty());
    }

    #[test]
    fn header_texts_pick_up_book_headings() {
        let scraper = Scraper::new(
            r#"<div class="kp-notebook-header"><h2>深層学習の基礎</h2></div>"#,
        );
        let headers = scraper.notebook().header_texts();
        assert!(headers.iter().any(|t| t.contains("深層学習の基礎")));
    }
}
