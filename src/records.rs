//! CSV row types and the readers/writers shared by the subcommands.

use crate::error::{ExportError, Result};
use crate::extract::DetailRecord;
use crate::utils::normalize_whitespace;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// A highlights CSV row. Column names match the files the original exports
/// produced, so existing data keeps working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightRow {
    #[serde(rename = "Book")]
    pub book: String,
    #[serde(rename = "Section")]
    pub section: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Highlight")]
    pub highlight: String,
    #[serde(rename = "Note")]
    pub note: String,
}

impl From<DetailRecord> for HighlightRow {
    fn from(record: DetailRecord) -> Self {
        Self {
            book: record.book,
            section: record.section,
            location: record.location,
            highlight: record.highlight,
            note: record.note,
        }
    }
}

/// A library book-list CSV row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRow {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Author")]
    pub author: String,
}

/// A whole CSV loaded into memory with header-name access. Handles files
/// written with a UTF-8 BOM (the original tool wrote `utf-8-sig` for Excel).
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ExportError::MissingInput(path.display().to_string()).into());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)?;

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|f| f.to_string()).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of the column whose header starts with `prefix`,
    /// case-insensitively.
    pub fn index_by_prefix(&self, prefix: &str) -> Option<usize> {
        let prefix = prefix.to_lowercase();
        self.headers
            .iter()
            .position(|h| h.to_lowercase().starts_with(&prefix))
    }

    pub fn field<'a>(&self, row: &'a [String], index: Option<usize>) -> &'a str {
        index
            .and_then(|i| row.get(i))
            .map(|s| s.trim())
            .unwrap_or("")
    }
}

/// Book titles already present in an existing highlights CSV, so an
/// interrupted run can pick up where it left off.
pub fn seen_books(path: impl AsRef<Path>) -> Result<HashSet<String>> {
    let path = path.as_ref();
    if !path.exists() || path.metadata()?.len() == 0 {
        return Ok(HashSet::new());
    }

    // A corrupt resume file should not kill the run; start fresh instead.
    let table = match CsvTable::load(path) {
        Ok(table) => table,
        Err(_) => return Ok(HashSet::new()),
    };

    let book_index = table.index_by_prefix("book").or(Some(0));
    let mut seen = HashSet::new();
    for row in &table.rows {
        let book = normalize_whitespace(table.field(row, book_index));
        if !book.is_empty() {
            seen.insert(book);
        }
    }
    Ok(seen)
}

/// Open the highlights CSV for appending, emitting the header row only when
/// the file is new or empty.
pub fn highlights_writer(path: impl AsRef<Path>) -> Result<csv::Writer<File>> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let fresh = !path.exists() || path.metadata()?.len() == 0;
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Ok(csv::WriterBuilder::new()
        .has_headers(fresh)
        .from_writer(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_bom_prefixed_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "highlights.csv",
            "\u{feff}Book,Section,Location,Highlight,Note\nA,,1,text,\n",
        );

        let table = CsvTable::load(&path).unwrap();
        assert_eq!(table.index_of("Book"), Some(0));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.field(&table.rows[0], table.index_of("Highlight")), "text");
    }

    #[test]
    fn missing_input_is_a_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CsvTable::load(dir.path().join("nope.csv"));
        assert!(matches!(
            result,
            Err(crate::error::AppError::Export(ExportError::MissingInput(_)))
        ));
    }

    #[test]
    fn seen_books_reads_the_book_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "highlights.csv",
            "Book,Section,Location,Highlight,Note\n本A,,1,x,\n本A,,2,y,\n本B,,3,z,\n",
        );

        let seen = seen_books(&path).unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains("本A"));
        assert!(seen.contains("本B"));
    }

    #[test]
    fn seen_books_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(seen_books(dir.path().join("none.csv")).unwrap().is_empty());
    }

    #[test]
    fn append_writer_emits_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("highlights.csv");

        let mut writer = highlights_writer(&path).unwrap();
        writer
            .serialize(HighlightRow {
                book: "A".into(),
                section: String::new(),
                location: "1".into(),
                highlight: "first".into(),
                note: String::new(),
            })
            .unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut writer = highlights_writer(&path).unwrap();
        writer
            .serialize(HighlightRow {
                book: "B".into(),
                section: String::new(),
                location: "2".into(),
                highlight: "second".into(),
                note: String::new(),
            })
            .unwrap();
        writer.flush().unwrap();
        drop(writer);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Book,Section,Location,Highlight,Note").count(), 1);
        assert!(content.contains("first"));
        assert!(content.contains("second"));
    }
}
