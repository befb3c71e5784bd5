//! Passport exports: text summary, CSV, JSON document and QR image.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::atlas::Country;
use crate::config::ExportSettings;
use crate::passport::Passport;

pub const APP_NAME: &str = "soundpass";
pub const SUMMARY_FILE: &str = "passport.txt";
pub const CSV_FILE: &str = "passport.csv";
pub const JSON_FILE: &str = "passport.json";
pub const QR_FILE: &str = "passport-qr.png";

const UTF8_BOM: char = '\u{feff}';
const QR_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode passport document")]
    Encode(#[from] serde_json::Error),

    #[error("failed to fetch QR image: {0}")]
    Qr(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassportDocument {
    pub app: String,
    pub version: String,
    pub timestamp: String,
    pub visited_count: usize,
    pub remaining_count: usize,
    pub total: usize,
    pub visited: Vec<String>,
    pub remaining: Vec<String>,
}

/// Visited and remaining names, both in dataset order. Visits of countries
/// no longer in the dataset are not counted.
fn split_visited<'a>(countries: &'a [Country], passport: &Passport) -> (Vec<&'a str>, Vec<&'a str>) {
    countries
        .iter()
        .map(|c| c.country.as_str())
        .partition(|name| passport.is_visited(name))
}

pub fn passport_document(
    countries: &[Country],
    passport: &Passport,
    now: DateTime<Utc>,
) -> PassportDocument {
    let (visited, remaining) = split_visited(countries, passport);
    PassportDocument {
        app: APP_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        visited_count: visited.len(),
        remaining_count: remaining.len(),
        total: countries.len(),
        visited: visited.into_iter().map(str::to_string).collect(),
        remaining: remaining.into_iter().map(str::to_string).collect(),
    }
}

pub fn summary_text(countries: &[Country], passport: &Passport, now: DateTime<Utc>) -> String {
    let doc = passport_document(countries, passport, now);
    let percent = if doc.total > 0 {
        doc.visited_count as f64 / doc.total as f64 * 100.0
    } else {
        0.0
    };

    let mut out = String::new();
    out.push_str(&format!("{APP_NAME} passport\n"));
    out.push_str(&format!("Exported: {}\n", doc.timestamp));
    out.push_str(&format!(
        "Visited {} of {} countries ({percent:.1}%)\n",
        doc.visited_count, doc.total
    ));

    push_list(&mut out, "Visited", &doc.visited);
    push_list(&mut out, "Favorites", passport.favorites());

    if !passport.collections().is_empty() {
        out.push_str("\nCollections:\n");
        for (name, members) in passport.collections() {
            if members.is_empty() {
                out.push_str(&format!("  {name}: (empty)\n"));
            } else {
                out.push_str(&format!("  {name}: {}\n", members.join(", ")));
            }
        }
    }
    out
}

fn push_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n{title}:\n"));
    for item in items {
        out.push_str(&format!("  - {item}\n"));
    }
}

/// One row per country, prefixed with a UTF-8 byte order mark.
pub fn csv_table(countries: &[Country], passport: &Passport) -> String {
    let mut out = String::new();
    out.push(UTF8_BOM);
    out.push_str("country,visited,category,timezone\r\n");
    for c in countries {
        let visited = if passport.is_visited(&c.country) { "yes" } else { "no" };
        let row = [
            csv_field(&c.country),
            visited.to_string(),
            csv_field(c.category.as_deref().unwrap_or("")),
            csv_field(c.timezone.as_deref().unwrap_or("")),
        ];
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out
}

/// Quote a field when it holds a separator, quote or line break.
pub(crate) fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Image URL encoding `payload` as a QR code.
pub fn qr_code_url(endpoint: &str, size: u32, payload: &str) -> String {
    format!(
        "{endpoint}?size={size}x{size}&data={}",
        urlencoding::encode(payload)
    )
}

/// The passport document without its country lists, which would not fit
/// in a QR code.
#[derive(Debug, Serialize)]
struct QrDocument<'a> {
    app: &'a str,
    version: &'a str,
    timestamp: &'a str,
    visited_count: usize,
    remaining_count: usize,
    total: usize,
}

/// Compact JSON encoded into the QR code.
pub fn qr_payload(doc: &PassportDocument) -> Result<String, ExportError> {
    let compact = QrDocument {
        app: &doc.app,
        version: &doc.version,
        timestamp: &doc.timestamp,
        visited_count: doc.visited_count,
        remaining_count: doc.remaining_count,
        total: doc.total,
    };
    Ok(serde_json::to_string(&compact)?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
    /// Where to fetch the QR image from, when enabled.
    pub qr_url: Option<String>,
}

/// Write the summary, CSV and JSON files into `dir`.
pub fn write_exports(
    dir: &Path,
    countries: &[Country],
    passport: &Passport,
    settings: &ExportSettings,
    now: DateTime<Utc>,
) -> Result<ExportReport, ExportError> {
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let doc = passport_document(countries, passport, now);
    let json = serde_json::to_string_pretty(&doc)?;

    let outputs = [
        (SUMMARY_FILE, summary_text(countries, passport, now)),
        (CSV_FILE, csv_table(countries, passport)),
        (JSON_FILE, json),
    ];
    let mut files = Vec::with_capacity(outputs.len());
    for (name, contents) in outputs {
        let path = dir.join(name);
        fs::write(&path, contents).map_err(|e| io_error(&path, e))?;
        files.push(path);
    }

    let qr_url = if settings.qr {
        Some(qr_code_url(&settings.qr_endpoint, settings.qr_size, &qr_payload(&doc)?))
    } else {
        None
    };

    tracing::info!(dir = %dir.display(), visited = doc.visited_count, "passport exported");
    Ok(ExportReport {
        dir: dir.to_path_buf(),
        files,
        qr_url,
    })
}

/// Download the QR image to `dest`. Blocking; run it off the UI thread.
pub fn fetch_qr(url: &str, dest: &Path) -> Result<PathBuf, ExportError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(QR_TIMEOUT)
        .build()
        .map_err(|e| ExportError::Qr(e.to_string()))?;
    let resp = client
        .get(url)
        .send()
        .map_err(|e| ExportError::Qr(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(ExportError::Qr(format!("HTTP {}", resp.status())));
    }
    let bytes = resp.bytes().map_err(|e| ExportError::Qr(e.to_string()))?;
    fs::write(dest, &bytes).map_err(|e| io_error(dest, e))?;
    Ok(dest.to_path_buf())
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests;
