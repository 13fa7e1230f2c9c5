use crate::config::Config;
use crate::error::Result;
pub use crate::log_info;
use crate::records::CsvTable;
use crate::utils::sanitize_filename;
use fnv::FnvHasher;
use std::collections::BTreeMap;
use std::fs::File;
use std::hash::Hasher;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Export the highlights CSV as one Markdown note per book, with kindle://
/// deep links and stable `^ref-` block ids for backlinking.
pub fn run(config: &Config, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let input =
        input.unwrap_or_else(|| PathBuf::from(&config.out_dir).join("highlights.csv"));
    let output = output.unwrap_or_else(|| PathBuf::from(&config.out_dir).join("obsidian"));

    let table = CsvTable::load(&input)?;
    crate::utils::ensure_directory(&output)?;

    let book_i = table.index_of("Book");
    let highlight_i = table.index_of("Highlight");
    let location_i = table.index_of("Location");
    // Optional columns: present when the CSV was joined with library data.
    let author_i = table.index_of("Author");
    let asin_i = table.index_of("ASIN");

    let mut grouped: BTreeMap<String, Vec<&Vec<String>>> = BTreeMap::new();
    for row in &table.rows {
        let title = table.field(row, book_i);
        if title.is_empty() {
            continue;
        }
        grouped.entry(title.to_string()).or_default().push(row);
    }

    let mut written = 0usize;
    for (title, rows) in &grouped {
        let file_name = format!("{}.md", sanitize_filename(title));
        let path = output.join(file_name);
        let mut out = BufWriter::new(File::create(&path)?);

        let author = rows
            .iter()
            .map(|row| table.field(row, author_i))
            .find(|a| !a.is_empty());
        let asin = rows
            .iter()
            .map(|row| table.field(row, asin_i))
            .find(|a| !a.is_empty());

        writeln!(out, "# {}", title)?;
        writeln!(out, "## Metadata")?;
        writeln!(out, "* Author: {}", author.unwrap_or(""))?;
        writeln!(out, "* ASIN: {}", asin.unwrap_or(""))?;
        if let Some(asin) = asin {
            writeln!(out, "* Reference: https://www.amazon.co.jp/dp/{}", asin)?;
        }
        if let Some(link) = kindle_link(asin, None) {
            writeln!(out, "* [Kindle link]({})", link)?;
        }
        writeln!(out)?;
        writeln!(out, "## Highlights")?;

        for row in rows {
            let highlight = table.field(row, highlight_i);
            if highlight.is_empty() {
                continue;
            }
            let location = table.field(row, location_i);
            let digits = location_digits(location);
            let link = kindle_link(asin, digits.as_deref());
            let ref_id = ref_id(highlight, digits.as_deref(), asin);

            write!(out, "{} ", highlight)?;
            let display = digits.as_deref().unwrap_or(location);
            if !display.is_empty() {
                match &link {
                    Some(link) => write!(out, "— location: [{}]({}) ", display, link)?,
                    None => write!(out, "— location: [{}] ", display)?,
                }
            } else if let Some(link) = &link {
                write!(out, "— {} ", link)?;
            }
            writeln!(out, "^ref-{}", ref_id)?;
            writeln!(out)?;
            writeln!(out, "---")?;
            writeln!(out)?;
        }

        out.flush()?;
        written += 1;
    }

    log_info!("[obsidian] Exported {} books to {:?}", written, output);
    Ok(())
}

/// Digits-only form of a location cell ("1,234" -> "1234"), or None when
/// nothing numeric remains.
fn location_digits(location: &str) -> Option<String> {
    let digits: String = location.chars().filter(|c| c.is_ascii_digit()).collect();
    (!digits.is_empty()).then_some(digits)
}

fn kindle_link(asin: Option<&str>, location_digits: Option<&str>) -> Option<String> {
    if asin.is_none() && location_digits.is_none() {
        return None;
    }
    let base = match asin {
        Some(asin) => format!("kindle://book?action=open&asin={}", asin),
        None => "kindle://book?action=open".to_string(),
    };
    Some(match location_digits {
        Some(digits) => format!("{}&location={}", base, digits),
        None => base,
    })
}

/// Short stable id for `^ref-` anchors: FNV over text + location + asin.
fn ref_id(text: &str, location: Option<&str>, asin: Option<&str>) -> String {
    let mut hasher = FnvHasher::default();
    hasher.write(text.as_bytes());
    hasher.write(location.unwrap_or("").as_bytes());
    hasher.write(asin.unwrap_or("").as_bytes());
    format!("{:016x}", hasher.finish())[..8].to_string()
}
