use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::config::ThemeSetting;

use super::store::KeyValueStore;

const KEY_VISITED: &str = "visited";
const KEY_FAVORITES: &str = "favorites";
const KEY_COLLECTIONS: &str = "collections";
const KEY_VOLUMES: &str = "volumes";
const KEY_THEME: &str = "theme";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl From<ThemeSetting> for Theme {
    fn from(t: ThemeSetting) -> Self {
        match t {
            ThemeSetting::Light => Theme::Light,
            ThemeSetting::Dark => Theme::Dark,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Progress {
    pub visited: usize,
    pub total: usize,
    /// 0..=100
    pub percent: f64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PassportError {
    #[error("collection name must not be empty")]
    BlankCollectionName,

    #[error("{0} is not a favorite")]
    NotFavorite(String),

    #[error("no collection named {0}")]
    UnknownCollection(String),
}

/// The user's persisted travel record.
///
/// Each field lives under its own store key and is rewritten in full on
/// every change. Storage failures are logged; the in-memory state stays
/// authoritative for the rest of the run.
pub struct Passport {
    store: Box<dyn KeyValueStore>,
    visited: Vec<String>,
    favorites: Vec<String>,
    collections: BTreeMap<String, Vec<String>>,
    volumes: BTreeMap<String, f32>,
    theme: Theme,
}

impl Passport {
    /// Load every key independently. Missing or unreadable entries fall
    /// back to their empty default; `default_theme` applies when no theme
    /// was saved yet.
    pub fn load(store: Box<dyn KeyValueStore>, default_theme: Theme) -> Self {
        let visited = dedup(read_key(store.as_ref(), KEY_VISITED));
        let favorites = dedup(read_key(store.as_ref(), KEY_FAVORITES));
        let collections = read_key::<BTreeMap<String, Vec<String>>>(store.as_ref(), KEY_COLLECTIONS)
            .into_iter()
            .map(|(name, members)| (name, dedup(members)))
            .collect();
        let volumes = read_key::<BTreeMap<String, f32>>(store.as_ref(), KEY_VOLUMES)
            .into_iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| (k, v.clamp(0.0, 1.0)))
            .collect();
        let theme = read_optional(store.as_ref(), KEY_THEME).unwrap_or(default_theme);

        tracing::debug!(visited = visited.len(), favorites = favorites.len(), "passport loaded");
        Self {
            store,
            visited,
            favorites,
            collections,
            volumes,
            theme,
        }
    }

    /// Mark `country` visited. Returns false when it already was.
    pub fn visit(&mut self, country: &str) -> bool {
        if self.is_visited(country) {
            return false;
        }
        self.visited.push(country.to_string());
        persist(self.store.as_mut(), KEY_VISITED, &self.visited);
        true
    }

    pub fn is_visited(&self, country: &str) -> bool {
        self.visited.iter().any(|c| c == country)
    }

    #[cfg(test)]
    pub(crate) fn visited(&self) -> &[String] {
        &self.visited
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Progress through `dataset`. Visits of countries outside it do not count.
    pub fn progress<'a, I>(&self, dataset: I) -> Progress
    where
        I: IntoIterator<Item = &'a str>,
    {
        let (visited, total) = dataset.into_iter().fold((0, 0), |(v, t), name| {
            (v + usize::from(self.is_visited(name)), t + 1)
        });
        let percent = if total > 0 {
            visited as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Progress {
            visited,
            total,
            percent,
        }
    }

    /// Forget every visit. The stored key is dropped; loading treats a
    /// missing key as no visits.
    pub fn reset(&mut self) {
        self.visited.clear();
        if let Err(e) = self.store.remove(KEY_VISITED) {
            tracing::warn!(key = KEY_VISITED, error = %e, "failed to clear passport entry");
        }
        tracing::info!("passport reset");
    }

    /// Flip `country`'s favorite flag and return the new value. Removing a
    /// favorite also removes it from every collection.
    pub fn toggle_favorite(&mut self, country: &str) -> bool {
        if let Some(pos) = self.favorites.iter().position(|c| c == country) {
            self.favorites.remove(pos);
            persist(self.store.as_mut(), KEY_FAVORITES, &self.favorites);

            let mut touched = false;
            for members in self.collections.values_mut() {
                let before = members.len();
                members.retain(|c| c != country);
                touched |= members.len() != before;
            }
            if touched {
                persist(self.store.as_mut(), KEY_COLLECTIONS, &self.collections);
            }
            false
        } else {
            self.favorites.push(country.to_string());
            persist(self.store.as_mut(), KEY_FAVORITES, &self.favorites);
            true
        }
    }

    pub fn is_favorite(&self, country: &str) -> bool {
        self.favorites.iter().any(|c| c == country)
    }

    pub fn favorites(&self) -> &[String] {
        &self.favorites
    }

    /// Add a favorite to the named collection, creating it if needed.
    pub fn add_to_collection(&mut self, name: &str, country: &str) -> Result<(), PassportError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PassportError::BlankCollectionName);
        }
        if !self.is_favorite(country) {
            return Err(PassportError::NotFavorite(country.to_string()));
        }
        let members = self.collections.entry(name.to_string()).or_default();
        if !members.iter().any(|c| c == country) {
            members.push(country.to_string());
        }
        persist(self.store.as_mut(), KEY_COLLECTIONS, &self.collections);
        Ok(())
    }

    pub fn remove_from_collection(&mut self, name: &str, country: &str) -> Result<(), PassportError> {
        let members = self
            .collections
            .get_mut(name)
            .ok_or_else(|| PassportError::UnknownCollection(name.to_string()))?;
        members.retain(|c| c != country);
        persist(self.store.as_mut(), KEY_COLLECTIONS, &self.collections);
        Ok(())
    }

    pub fn delete_collection(&mut self, name: &str) -> Result<(), PassportError> {
        if self.collections.remove(name).is_none() {
            return Err(PassportError::UnknownCollection(name.to_string()));
        }
        persist(self.store.as_mut(), KEY_COLLECTIONS, &self.collections);
        Ok(())
    }

    pub fn collections(&self) -> &BTreeMap<String, Vec<String>> {
        &self.collections
    }

    /// Names of the collections containing `country`.
    pub fn collections_of(&self, country: &str) -> Vec<&str> {
        self.collections
            .iter()
            .filter(|(_, members)| members.iter().any(|c| c == country))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn volume_override(&self, country: &str) -> Option<f32> {
        self.volumes.get(country).copied()
    }

    pub fn set_volume_override(&mut self, country: &str, volume: f32) {
        let v = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        if self.volumes.get(country) == Some(&v) {
            return;
        }
        self.volumes.insert(country.to_string(), v);
        persist(self.store.as_mut(), KEY_VOLUMES, &self.volumes);
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        persist(self.store.as_mut(), KEY_THEME, &self.theme);
        self.theme
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }
}

fn persist<T: Serialize + ?Sized>(store: &mut dyn KeyValueStore, key: &str, value: &T) {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to encode passport entry");
            return;
        }
    };
    if let Err(e) = store.set(key, &json) {
        tracing::warn!(key, error = %e, "failed to persist passport entry");
    }
}

/// Decode `key`, treating absence and corruption alike as "no value".
fn read_optional<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read passport entry, using default");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, error = %e, "corrupt passport entry, using default");
            None
        }
    }
}

fn read_key<T: DeserializeOwned + Default>(store: &dyn KeyValueStore, key: &str) -> T {
    read_optional(store, key).unwrap_or_default()
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
