use crate::config::Config;
use crate::error::{ExportError, Result};
pub use crate::log_info;
use crate::records::CsvTable;
use crate::utils;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One entry in the grouped JSON: the highlight text only, under a short
/// key to keep the output compact.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct JsonHighlight {
    pub h: String,
}

/// Convert the highlights CSV into `{ "<book>": [ {"h": …}, … ] }`, books
/// sorted by title, written without pretty-printing.
pub fn run(config: &Config, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let input =
        input.unwrap_or_else(|| PathBuf::from(&config.out_dir).join("highlights.csv"));
    let output =
        output.unwrap_or_else(|| PathBuf::from(&config.out_dir).join("highlights.json"));

    let table = CsvTable::load(&input)?;
    let grouped = group_rows(&table)?;

    utils::save_json(&grouped, &output)?;
    log_info!("[format] Wrote {} books to {:?}", grouped.len(), output);
    Ok(())
}

fn group_rows(table: &CsvTable) -> Result<BTreeMap<String, Vec<JsonHighlight>>> {
    let book = table
        .index_of("Book")
        .ok_or_else(|| ExportError::BadRow("missing Book column".to_string()))?;
    let highlight = table
        .index_of("Highlight")
        .ok_or_else(|| ExportError::BadRow("missing Highlight column".to_string()))?;
    let note = table.index_of("Note");

    let mut grouped: BTreeMap<String, Vec<JsonHighlight>> = BTreeMap::new();
    for row in &table.rows {
        let title = table.field(row, Some(book));
        if title.is_empty() {
            continue;
        }

        // Prefer the highlight text, fall back to the note.
        let mut content = table.field(row, Some(highlight));
        if content.is_empty() {
            content = table.field(row, note);
        }
        if content.is_empty() {
            continue;
        }

        grouped.entry(title.to_string()).or_default().push(JsonHighlight {
            h: content.to_string(),
        });
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table_from(content: &str) -> CsvTable {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        CsvTable::load(&path).unwrap()
    }

    #[test]
    fn groups_rows_by_book_sorted() {
        let table = table_from(
            "Book,Section,Location,Highlight,Note\n\
             ぼくの本,,2,二つ目,\n\
             Alpha,,1,first,\n\
             Alpha,,3,,note only\n\
             Alpha,,4,,\n\
             ,,5,orphan,\n",
        );

        let grouped = group_rows(&table).unwrap();
        let books: Vec<&String> = grouped.keys().collect();
        assert_eq!(books, vec!["Alpha", "ぼくの本"]);
        assert_eq!(grouped["Alpha"].len(), 2);
        assert_eq!(grouped["Alpha"][0].h, "first");
        assert_eq!(grouped["Alpha"][1].h, "note only");
        assert_eq!(grouped["ぼくの本"][0].h, "二つ目");
    }

    #[test]
    fn missing_book_column_is_rejected() {
        let table = table_from("Title,Highlight\nA,x\n");
        assert!(group_rows(&table).is_err());
    }
}
