mod library;
mod notebook;

pub use library::{LibraryBook, LibraryScraper};
pub use notebook::{NotebookScraper, RawAnnotation};

use scraper::Html;

pub struct Scraper {
    document: Html,
}

impl Scraper {
    pub fn new(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    pub fn notebook(&self) -> NotebookScraper {
        NotebookScraper::new(&self.document)
    }

    pub fn library(&self) -> LibraryScraper {
        LibraryScraper::new(&self.document)
    }
}
