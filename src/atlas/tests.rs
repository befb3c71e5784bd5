use std::fs;
use std::path::Path;

use super::load::{DatasetError, dataset_dir, resolve_sound};
use super::*;

const SAMPLE: &str = r#"[
  {
    "country": "Japan",
    "lat": 36.2,
    "lng": 138.25,
    "image": "https://example.org/japan.jpg",
    "description": "Temple bells and city rain.",
    "sound": "sounds/japan.ogg",
    "category": "Asia",
    "trivia": "Over 6,800 islands.",
    "timezone": "Asia/Tokyo",
    "continent": "Asia"
  },
  {
    "country": "Jamaica",
    "lat": 18.1,
    "lng": -77.3,
    "image": "",
    "description": "Waves and steel drums.",
    "sound": "https://cdn.example.org/jamaica.mp3",
    "category": "  "
  },
  {
    "country": "Norway",
    "lat": 60.5,
    "lng": 8.5,
    "image": "norway.jpg",
    "description": "",
    "sound": "/srv/sounds/norway.ogg"
  }
]"#;

fn write_dataset(dir: &Path) -> String {
    let path = dir.join("countries.json");
    fs::write(&path, SAMPLE).unwrap();
    path.display().to_string()
}

fn names(countries: &[Country], idx: &[usize]) -> Vec<String> {
    idx.iter().map(|&i| countries[i].country.clone()).collect()
}

#[test]
fn load_keeps_order_and_tolerates_missing_optionals() {
    let dir = tempfile::tempdir().unwrap();
    let countries = load_dataset(&write_dataset(dir.path())).unwrap();

    let order: Vec<&str> = countries.iter().map(|c| c.country.as_str()).collect();
    assert_eq!(order, ["Japan", "Jamaica", "Norway"]);

    assert_eq!(countries[0].timezone.as_deref(), Some("Asia/Tokyo"));
    assert_eq!(countries[1].category, None, "blank optional counts as missing");
    assert_eq!(countries[2].trivia, None);
    assert_eq!(countries[2].continent, None);
}

#[test]
fn load_resolves_relative_sounds_against_dataset_dir() {
    let dir = tempfile::tempdir().unwrap();
    let countries = load_dataset(&write_dataset(dir.path())).unwrap();

    assert_eq!(
        countries[0].sound,
        dir.path().join("sounds/japan.ogg").display().to_string()
    );
    assert_eq!(countries[1].sound, "https://cdn.example.org/jamaica.mp3");
    assert_eq!(countries[2].sound, "/srv/sounds/norway.ogg");
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.json");
    let err = load_dataset(&path.display().to_string()).unwrap_err();
    assert!(matches!(err, DatasetError::Read { .. }));
}

#[test]
fn malformed_document_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("countries.json");
    fs::write(&path, r#"{"country": "not a list"}"#).unwrap();
    let err = load_dataset(&path.display().to_string()).unwrap_err();
    assert!(matches!(err, DatasetError::Parse { .. }));
}

#[test]
fn resolve_sound_keeps_urls_and_absolute_paths() {
    let base = Path::new("/data");
    assert_eq!(resolve_sound(Some(base), "a/b.ogg"), "/data/a/b.ogg");
    assert_eq!(resolve_sound(Some(base), "  "), "");
    assert_eq!(resolve_sound(Some(base), "http://x/y.ogg"), "http://x/y.ogg");
    assert_eq!(resolve_sound(None, "a.ogg"), "a.ogg");
}

#[test]
fn dataset_dir_is_none_for_urls() {
    assert_eq!(dataset_dir("https://example.org/data/countries.json"), None);
    assert_eq!(
        dataset_dir("data/countries.json"),
        Some(std::path::PathBuf::from("data"))
    );
    assert_eq!(
        dataset_dir("countries.json"),
        Some(std::path::PathBuf::new())
    );
}

#[test]
fn search_is_trimmed_case_insensitive_substring() {
    let countries: Vec<Country> = serde_json::from_str(SAMPLE).unwrap();

    assert_eq!(names(&countries, &search(&countries, "ja")), ["Japan", "Jamaica"]);
    assert_eq!(names(&countries, &search(&countries, "  NOR ")), ["Norway"]);
    assert_eq!(names(&countries, &search(&countries, "a")), ["Japan", "Jamaica", "Norway"]);
    assert!(search(&countries, "atlantis").is_empty());
    assert!(search(&countries, "   ").is_empty());
}

#[test]
fn random_index_stays_in_bounds() {
    assert_eq!(random_index(0), None);
    assert_eq!(random_index(1), Some(0));
    for _ in 0..100 {
        assert!(random_index(3).unwrap() < 3);
    }
}

#[test]
fn narration_text_joins_name_and_description() {
    let countries: Vec<Country> = serde_json::from_str(SAMPLE).unwrap();
    assert_eq!(countries[0].narration(), "Japan. Temple bells and city rain.");
    assert_eq!(countries[2].narration(), "Norway");
}
