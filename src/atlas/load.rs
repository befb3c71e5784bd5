use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::model::Country;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch dataset {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("dataset {location} is not a valid country list")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Load the country list from a file path or an `http(s)` URL.
///
/// Records keep the order they have in the document. Sound paths are
/// resolved against the dataset's directory.
pub fn load_dataset(location: &str) -> Result<Vec<Country>, DatasetError> {
    let body = if is_url(location) {
        fetch(location)?
    } else {
        fs::read_to_string(location).map_err(|e| DatasetError::Read {
            path: PathBuf::from(location),
            source: e,
        })?
    };

    let mut countries: Vec<Country> =
        serde_json::from_str(&body).map_err(|e| DatasetError::Parse {
            location: location.to_string(),
            source: e,
        })?;

    let base = dataset_dir(location);
    for c in &mut countries {
        c.sound = match &base {
            Some(dir) => resolve_sound(Some(dir), &c.sound),
            None => resolve_remote_sound(location, &c.sound),
        };
    }

    tracing::info!(location, countries = countries.len(), "dataset loaded");
    Ok(countries)
}

fn fetch(url: &str) -> Result<String, DatasetError> {
    let fail = |reason: String| DatasetError::Fetch {
        url: url.to_string(),
        reason,
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| fail(e.to_string()))?;
    let resp = client.get(url).send().map_err(|e| fail(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(fail(format!("HTTP {}", resp.status())));
    }
    resp.text().map_err(|e| fail(e.to_string()))
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Directory relative sounds resolve against. `None` for URL datasets
/// (their relative sounds are joined to the URL instead).
pub fn dataset_dir(location: &str) -> Option<PathBuf> {
    if is_url(location) {
        return None;
    }
    Some(
        Path::new(location)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    )
}

fn resolve_remote_sound(dataset_url: &str, sound: &str) -> String {
    let sound = sound.trim();
    if sound.is_empty() || is_url(sound) {
        return sound.to_string();
    }
    match dataset_url.rsplit_once('/') {
        Some((base, _)) => format!("{base}/{}", sound.trim_start_matches("./")),
        None => sound.to_string(),
    }
}

/// Resolve a record's `sound` field. URLs and absolute paths are kept;
/// relative paths are joined to `base`.
pub fn resolve_sound(base: Option<&Path>, sound: &str) -> String {
    let sound = sound.trim();
    if sound.is_empty() || is_url(sound) || Path::new(sound).is_absolute() {
        return sound.to_string();
    }
    match base {
        Some(dir) => dir.join(sound).display().to_string(),
        None => sound.to_string(),
    }
}
