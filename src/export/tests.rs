use chrono::TimeZone;

use super::*;
use crate::passport::{MemoryStore, Theme};

fn country(name: &str, category: Option<&str>, timezone: Option<&str>) -> Country {
    Country {
        country: name.to_string(),
        lat: 0.0,
        lng: 0.0,
        image: String::new(),
        description: String::new(),
        sound: String::new(),
        category: category.map(str::to_string),
        trivia: None,
        timezone: timezone.map(str::to_string),
        continent: None,
    }
}

fn fixture() -> (Vec<Country>, Passport) {
    let countries = vec![
        country("Japan", Some("Asia"), Some("Asia/Tokyo")),
        country("Peru", Some("Mountains, rivers"), None),
        country("Say \"Hi\" Land", None, Some("UTC")),
    ];
    let mut passport = Passport::load(Box::new(MemoryStore::new()), Theme::Dark);
    passport.visit("Peru");
    passport.visit("Japan");
    passport.visit("Atlantis");
    (countries, passport)
}

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 9, 17, 30, 5).unwrap()
}

#[test]
fn document_lists_visited_and_remaining_in_dataset_order() {
    let (countries, passport) = fixture();
    let doc = passport_document(&countries, &passport, at());

    assert_eq!(doc.app, "soundpass");
    assert_eq!(doc.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(doc.timestamp, "2024-03-09T17:30:05Z");
    assert_eq!(doc.visited, ["Japan", "Peru"]);
    assert_eq!(doc.remaining, ["Say \"Hi\" Land"]);
    assert_eq!((doc.visited_count, doc.remaining_count, doc.total), (2, 1, 3));
}

#[test]
fn document_serializes_with_expected_keys() {
    let (countries, passport) = fixture();
    let doc = passport_document(&countries, &passport, at());
    let value = serde_json::to_value(&doc).unwrap();
    for key in [
        "app",
        "version",
        "timestamp",
        "visited_count",
        "remaining_count",
        "total",
        "visited",
        "remaining",
    ] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn csv_has_bom_header_and_quoting() {
    let (countries, passport) = fixture();
    let csv = csv_table(&countries, &passport);

    assert!(csv.starts_with('\u{feff}'));
    let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').split("\r\n").collect();
    assert_eq!(lines[0], "country,visited,category,timezone");
    assert_eq!(lines[1], "Japan,yes,Asia,Asia/Tokyo");
    assert_eq!(lines[2], "Peru,yes,\"Mountains, rivers\",");
    assert_eq!(lines[3], "\"Say \"\"Hi\"\" Land\",no,,UTC");
    assert_eq!(lines[4], "");
}

#[test]
fn csv_field_quotes_only_when_needed() {
    assert_eq!(csv_field("plain"), "plain");
    assert_eq!(csv_field("a,b"), "\"a,b\"");
    assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
}

#[test]
fn summary_reports_progress_and_lists() {
    let (countries, mut passport) = fixture();
    passport.toggle_favorite("Peru");
    passport.add_to_collection("Andes", "Peru").unwrap();

    let text = summary_text(&countries, &passport, at());
    assert!(text.starts_with("soundpass passport\n"));
    assert!(text.contains("Visited 2 of 3 countries (66.7%)"));
    assert!(text.contains("  - Japan\n"));
    assert!(text.contains("Favorites:\n  - Peru\n"));
    assert!(text.contains("  Andes: Peru\n"));
}

#[test]
fn qr_url_encodes_payload() {
    let url = qr_code_url("https://qr.example/create", 200, "a b&c");
    assert_eq!(url, "https://qr.example/create?size=200x200&data=a%20b%26c");
}

#[test]
fn qr_url_carries_the_compact_json_document() {
    let (countries, passport) = fixture();
    let doc = passport_document(&countries, &passport, at());
    let url = qr_code_url("https://qr.example/create", 300, &qr_payload(&doc).unwrap());

    let (_, data) = url.split_once("&data=").unwrap();
    let decoded = urlencoding::decode(data).unwrap();
    let value: serde_json::Value = serde_json::from_str(&decoded).unwrap();
    assert_eq!(value["app"], APP_NAME);
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(value["timestamp"], "2024-03-09T17:30:05Z");
    assert_eq!(value["visited_count"], 2);
    assert_eq!(value["remaining_count"], 1);
    assert!(value.get("visited").is_none());
}

#[test]
fn write_exports_creates_all_files() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("exports");
    let (countries, passport) = fixture();
    let settings = ExportSettings {
        qr: false,
        ..ExportSettings::default()
    };

    let report = write_exports(&out, &countries, &passport, &settings, at()).unwrap();
    assert_eq!(report.files.len(), 3);
    assert_eq!(report.qr_url, None);
    for name in [SUMMARY_FILE, CSV_FILE, JSON_FILE] {
        assert!(out.join(name).is_file(), "{name} missing");
    }

    let json = fs::read_to_string(out.join(JSON_FILE)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["visited_count"], 2);
}

#[test]
fn qr_url_is_reported_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let (countries, passport) = fixture();
    let report = write_exports(
        dir.path(),
        &countries,
        &passport,
        &ExportSettings::default(),
        at(),
    )
    .unwrap();
    let url = report.qr_url.unwrap();
    assert!(url.starts_with("https://api.qrserver.com/v1/create-qr-code/?size=300x300&data="));
}

#[test]
fn unwritable_directory_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    fs::write(&blocker, "x").unwrap();
    let (countries, passport) = fixture();
    let err = write_exports(
        &blocker,
        &countries,
        &passport,
        &ExportSettings::default(),
        at(),
    )
    .unwrap_err();
    assert!(matches!(err, ExportError::Io { .. }));
}
