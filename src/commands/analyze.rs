use crate::config::Config;
use crate::error::Result;
pub use crate::log_info;
use crate::records::CsvTable;
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Profile the highlights CSV: row counts, per-book tallies, duplicate
/// highlights, length statistics, and frequent tokens. Writes a plain-text
/// report plus a per-book counts CSV.
pub fn run(config: &Config, input: Option<PathBuf>) -> Result<()> {
    let input =
        input.unwrap_or_else(|| PathBuf::from(&config.out_dir).join("highlights.csv"));
    let reports_dir = PathBuf::from(&config.out_dir).join("reports");
    crate::utils::ensure_directory(&reports_dir)?;

    let table = CsvTable::load(&input)?;
    let profile = Profile::build(&table);

    let report_path = reports_dir.join("highlights_profile.txt");
    write_report(&profile, &table, &report_path)?;

    let counts_path = reports_dir.join("book_counts.csv");
    write_book_counts(&profile, &counts_path)?;

    log_info!("[analyze] Report written to {:?}", report_path);
    log_info!("[analyze] Book counts written to {:?}", counts_path);
    Ok(())
}

#[derive(Debug, Default)]
struct Profile {
    total_rows: usize,
    missing: Vec<usize>,
    book_counts: Vec<(String, usize)>,
    unique_books: usize,
    duplicates: Vec<((String, String), usize)>,
    length_stats: Option<LengthStats>,
    samples: Vec<(usize, String)>,
    top_tokens: Vec<(String, usize)>,
}

#[derive(Debug, PartialEq)]
struct LengthStats {
    count: usize,
    sum: usize,
    mean: f64,
    min: usize,
    p50: usize,
    p90: usize,
    max: usize,
}

impl Profile {
    fn build(table: &CsvTable) -> Self {
        let book_i = table.index_of("Book");
        let highlight_i = table.index_of("Highlight");
        let note_i = table.index_of("Note");

        let mut missing = vec![0usize; table.headers.len()];
        let mut book_counts: HashMap<String, usize> = HashMap::new();
        let mut pair_counts: HashMap<(String, String), usize> = HashMap::new();
        let mut lengths = Vec::new();
        let mut samples = Vec::new();
        let mut token_counts: HashMap<String, usize> = HashMap::new();

        for row in &table.rows {
            for (i, count) in missing.iter_mut().enumerate() {
                if row.get(i).map(|f| f.trim().is_empty()).unwrap_or(true) {
                    *count += 1;
                }
            }

            let book = table.field(row, book_i).to_string();
            let highlight = table.field(row, highlight_i).to_string();
            let note = table.field(row, note_i).to_string();

            // A row counts as a highlight when either text field is present.
            if !highlight.is_empty() || !note.is_empty() {
                *book_counts.entry(book.clone()).or_default() += 1;
            }

            *pair_counts
                .entry((book.clone(), highlight.clone()))
                .or_default() += 1;

            let text = if highlight.is_empty() { &note } else { &highlight };
            if !text.is_empty() {
                let len = text.chars().count();
                lengths.push(len);
                if samples.len() < 10 {
                    let prefix: String =
                        text.chars().take(200).collect::<String>().replace('\n', " ");
                    samples.push((len, prefix));
                }
                for token in tokenize(text) {
                    *token_counts.entry(token).or_default() += 1;
                }
            }
        }

        let unique_books = book_counts.keys().filter(|b| !b.is_empty()).count();

        let mut book_counts: Vec<(String, usize)> = book_counts.into_iter().collect();
        book_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut duplicates: Vec<((String, String), usize)> = pair_counts
            .into_iter()
            .filter(|((book, highlight), count)| {
                *count > 1 && !book.is_empty() && !highlight.is_empty()
            })
            .collect();
        duplicates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut top_tokens: Vec<(String, usize)> = token_counts.into_iter().collect();
        top_tokens.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_tokens.truncate(40);

        Self {
            total_rows: table.rows.len(),
            missing,
            book_counts,
            unique_books,
            duplicates,
            length_stats: length_stats(&lengths),
            samples,
            top_tokens,
        }
    }
}

/// Japanese script runs and latin words/numbers, at least two characters.
fn tokenize(text: &str) -> Vec<String> {
    let re =
        Regex::new(r"[\x{4E00}-\x{9FFF}\x{3040}-\x{309F}\x{30A0}-\x{30FF}0-9A-Za-z]+").unwrap();
    re.find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= 2)
        .collect()
}

fn length_stats(lengths: &[usize]) -> Option<LengthStats> {
    if lengths.is_empty() {
        return None;
    }
    let n = lengths.len();
    let sum: usize = lengths.iter().sum();
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable();

    let p50 = sorted[n / 2];
    let p90_index = if (n as f64) * 0.9 >= 1.0 {
        ((n as f64) * 0.9) as usize - 1
    } else {
        n - 1
    };

    Some(LengthStats {
        count: n,
        sum,
        mean: sum as f64 / n as f64,
        min: sorted[0],
        p50,
        p90: sorted[p90_index],
        max: sorted[n - 1],
    })
}

fn write_report(profile: &Profile, table: &CsvTable, path: &std::path::Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "highlights.csv profile")?;
    writeln!(out, "total_rows: {}", profile.total_rows)?;
    writeln!(out, "columns: {}", table.headers.join(", "))?;

    writeln!(out, "missing per column:")?;
    for (header, count) in table.headers.iter().zip(&profile.missing) {
        writeln!(out, "  {}: {}", header, count)?;
    }

    writeln!(out, "unique books with highlights: {}", profile.unique_books)?;

    writeln!(out, "top 15 books by highlight count:")?;
    for (book, count) in profile.book_counts.iter().take(15) {
        let display: String = book.chars().take(80).collect();
        writeln!(out, "  {:5}  {}", count, display)?;
    }

    writeln!(
        out,
        "duplicate highlights (book, highlight) count >1 : {}",
        profile.duplicates.len()
    )?;
    for ((book, highlight), count) in profile.duplicates.iter().take(20) {
        let book_display: String = book.chars().take(60).collect();
        let highlight_display: String = highlight.chars().take(120).collect();
        writeln!(out, "  {:3}x  {}  /  {}", count, book_display, highlight_display)?;
    }

    writeln!(out, "highlight length stats (chars):")?;
    if let Some(stats) = &profile.length_stats {
        writeln!(out, "  count: {}", stats.count)?;
        writeln!(out, "  sum: {}", stats.sum)?;
        writeln!(out, "  mean: {:.2}", stats.mean)?;
        writeln!(out, "  min: {}", stats.min)?;
        writeln!(out, "  p50: {}", stats.p50)?;
        writeln!(out, "  p90: {}", stats.p90)?;
        writeln!(out, "  max: {}", stats.max)?;
    }

    writeln!(out, "sample highlights (len, prefix):")?;
    for (len, prefix) in &profile.samples {
        writeln!(out, "  {:4}  {}", len, prefix)?;
    }

    writeln!(out, "top tokens (token, count):")?;
    for (token, count) in &profile.top_tokens {
        writeln!(out, "  {:5}  {}", count, token)?;
    }

    out.flush()?;
    Ok(())
}

fn write_book_counts(profile: &Profile, path: &std::path::Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["book", "highlight_count"])?;
    for (book, count) in &profile.book_counts {
        writer.write_record([book.as_str(), count.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn table_from(content: &str) -> CsvTable {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.csv");
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        CsvTable::load(&path).unwrap()
    }

    #[test]
    fn profiles_counts_duplicates_and_lengths() {
        let table = table_from(
            "Book,Section,Location,Highlight,Note\n\
             A,,1,repeat me,\n\
             A,,2,repeat me,\n\
             A,,3,,note text\n\
             B,,4,unique,\n\
             B,,5,,\n",
        );

        let profile = Profile::build(&table);
        assert_eq!(profile.total_rows, 5);
        assert_eq!(profile.unique_books, 2);
        assert_eq!(profile.book_counts[0], ("A".to_string(), 3));
        assert_eq!(profile.duplicates.len(), 1);
        assert_eq!(profile.duplicates[0].0, ("A".to_string(), "repeat me".to_string()));
        assert_eq!(profile.duplicates[0].1, 2);

        let stats = profile.length_stats.unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, 6);
        assert_eq!(stats.max, 9);
    }

    #[test]
    fn length_stats_of_one_element() {
        let stats = length_stats(&[7]).unwrap();
        assert_eq!(stats.p50, 7);
        assert_eq!(stats.p90, 7);
        assert_eq!(stats.mean, 7.0);
    }

    #[test]
    fn length_stats_of_empty_is_none() {
        assert!(length_stats(&[]).is_none());
    }

    #[test]
    fn tokenizes_mixed_japanese_and_latin() {
        let tokens = tokenize("深層学習 is a subfield of 機械学習 (ML).");
        assert!(tokens.contains(&"深層学習".to_string()));
        assert!(tokens.contains(&"機械学習".to_string()));
        assert!(tokens.contains(&"subfield".to_string()));
        assert!(tokens.contains(&"ML".to_string()));
        // single characters are dropped
        assert!(!tokens.contains(&"a".to_string()));
    }
}
