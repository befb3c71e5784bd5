use rand::Rng;

use super::model::Country;

/// Indices of countries whose name contains `query`, ignoring case and
/// surrounding whitespace. An empty query matches nothing.
pub fn search(countries: &[Country], query: &str) -> Vec<usize> {
    let term = query.trim().to_lowercase();
    if term.is_empty() {
        return Vec::new();
    }
    countries
        .iter()
        .enumerate()
        .filter(|(_, c)| c.country.to_lowercase().contains(&term))
        .map(|(i, _)| i)
        .collect()
}

pub fn random_index(len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(rand::rng().random_range(0..len))
}
