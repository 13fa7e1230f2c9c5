pub use crate::log_info;
use crate::utils::normalize_whitespace;
use scraper::{Html, Selector};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryBook {
    pub title: String,
    pub author: String,
}

pub struct LibraryScraper<'a> {
    document: &'a Html,
}

impl<'a> LibraryScraper<'a> {
    pub(crate) fn new(document: &'a Html) -> Self {
        Self { document }
    }

    /// Books rendered in the library grid. Entries without a title are
    /// placeholders still waiting for data and are skipped.
    pub fn books(&self) -> Vec<LibraryBook> {
        let item_selector = Selector::parse(r#"ul#cover li[role="listitem"]"#).unwrap();
        let title_selector = Selector::parse(r#"div[id^="title-"] p"#).unwrap();
        let author_selector = Selector::parse(r#"div[id^="author-"] p"#).unwrap();

        let books: Vec<LibraryBook> = self
            .document
            .select(&item_selector)
            .filter_map(|item| {
                let title = item
                    .select(&title_selector)
                    .next()
                    .map(|el| normalize_whitespace(&el.text().collect::<String>()))
                    .filter(|t| !t.is_empty())?;
                let author = item
                    .select(&author_selector)
                    .next()
                    .map(|el| normalize_whitespace(&el.text().collect::<String>()))
                    .unwrap_or_default();
                Some(LibraryBook { title, author })
            })
            .collect();

        log_info!("[scraper] Parsed {} library entries", books.len());
        books
    }
}

#[cfg(test)]
mod tests {
    use crate::scraper::Scraper;

    const LIBRARY_FIXTURE: &str = r#"
        <ul id="cover">
            <li role="listitem">
                <div id="title-B001"><p>深層学習の基礎</p></div>
                <div id="author-B001"><p>山田太郎</p></div>
            </li>
            <li role="listitem">
                <div id="title-B002"><p>Practical Systems</p></div>
            </li>
            <li role="listitem">
                <div id="title-B003"><p>   </p></div>
            </li>
        </ul>
    "#;

    #[test]
    fn parses_titles_and_authors() {
        let scraper = Scraper::new(LIBRARY_FIXTURE);
        let books = scraper.library().books();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].title, "深層学習の基礎");
        assert_eq!(books[0].author, "山田太郎");
        assert_eq!(books[1].title, "Practical Systems");
        assert_eq!(books[1].author, "");
    }

    #[test]
    fn no_list_means_no_books() {
        let scraper = Scraper::new("<html><body></body></html>");
        assert!(scraper.library().books().is_empty());
    }
}
