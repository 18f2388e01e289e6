//! CSV import/export for the tweets table.
//!
//! Column order `CreatedAt,UserName,Text,LinkToTweet` with a header row,
//! matching the sheet layout the database was originally seeded from.
//! Quoting follows RFC 4180: fields containing commas, quotes, or newlines
//! are double-quoted, with `""` escaping an embedded quote.

use crate::error::{IftttwhError, Result};
use crate::model::InsertOutcome;
use crate::storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::info;

/// Header row written on export and skipped on import.
pub const CSV_HEADER: &str = "CreatedAt,UserName,Text,LinkToTweet";

/// Result of a CSV import.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportStats {
    pub inserted: usize,
    pub skipped_duplicates: usize,
}

/// Export all tweets to `path`, newest first.
///
/// Returns the number of rows written (excluding the header).
///
/// # Errors
///
/// Returns an error if the database read or the file write fails.
pub fn export_tweets(storage: &Storage, path: &Path) -> Result<usize> {
    let tweets = storage.all_tweets()?;

    let mut out = String::with_capacity(tweets.len() * 80 + CSV_HEADER.len());
    out.push_str(CSV_HEADER);
    out.push('\n');
    for tweet in &tweets {
        out.push_str(&write_record(&[
            &tweet.created_at,
            &tweet.user_name,
            &tweet.text,
            &tweet.link_to_tweet,
        ]));
        out.push('\n');
    }

    std::fs::write(path, out).map_err(|e| IftttwhError::path_error("write", path, e))?;
    info!("Exported {} tweet(s) to {}", tweets.len(), path.display());
    Ok(tweets.len())
}

/// Import tweets from `path`, skipping the header row and rows the unique
/// constraint rejects as duplicates.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a row is malformed, or a
/// non-duplicate insert fails.
pub fn import_tweets(storage: &Storage, path: &Path, show_progress: bool) -> Result<ImportStats> {
    let content =
        std::fs::read_to_string(path).map_err(|e| IftttwhError::path_error("read", path, e))?;
    let records = parse_csv(&content)?;

    let data_rows: Vec<_> = records.into_iter().skip(1).collect();
    let pb = if show_progress {
        let pb = ProgressBar::new(data_rows.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut stats = ImportStats::default();
    for (idx, record) in data_rows.iter().enumerate() {
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if record.len() != 4 {
            return Err(IftttwhError::CsvParse {
                row: idx + 2,
                reason: format!("expected 4 fields, got {}", record.len()),
            });
        }

        let created_at = &record[0];
        let user_name = &record[1];
        let text = &record[2];
        let link_to_tweet = &record[3];

        let parsed = crate::date_parser::parse_ifttt_date(created_at);
        match storage.insert_row(user_name, link_to_tweet, created_at, parsed, text)? {
            InsertOutcome::Inserted(_) => stats.inserted += 1,
            InsertOutcome::Duplicate => stats.skipped_duplicates += 1,
        }
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    info!(
        "Imported {} tweet(s) from {} ({} duplicate(s) skipped)",
        stats.inserted,
        path.display(),
        stats.skipped_duplicates
    );
    Ok(stats)
}

/// Serialize one record, quoting fields as needed.
fn write_record(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| {
            if field.contains(['"', ',', '\n', '\r']) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                (*field).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse CSV text into records of fields.
///
/// Handles quoted fields with `""` escapes and embedded newlines; accepts
/// both LF and CRLF line endings.
fn parse_csv(content: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        field.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {
                // Consumed as part of CRLF; a bare CR is treated the same.
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(IftttwhError::CsvParse {
            row: records.len() + 1,
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    // Drop fully empty trailing records from blank lines.
    records.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    Ok(records)
}
