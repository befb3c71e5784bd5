//! Application model: `App` and its input modes.

use crate::atlas::{self, Country};
use crate::audio::ToneBand;
use crate::weather::Weather;

/// What key presses currently edit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Normal,
    /// Typing a search query.
    Search,
    /// Typing a collection name for `App::collection_action`.
    CollectionName,
}

/// What the collection prompt does with the typed name.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CollectionAction {
    #[default]
    Add,
    Remove,
    Delete,
}

impl CollectionAction {
    pub fn prompt(self) -> &'static str {
        match self {
            CollectionAction::Add => " add to collection (enter/esc) ",
            CollectionAction::Remove => " remove from collection (enter/esc) ",
            CollectionAction::Delete => " delete collection (enter/esc) ",
        }
    }
}

/// Weather shown in the info panel, tagged with the country it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct WeatherView {
    pub country_index: usize,
    pub weather: Weather,
}

/// The main application model.
pub struct App {
    pub countries: Vec<Country>,
    pub selected: usize,
    /// Country shown in the info panel (last visited).
    pub active: Option<usize>,
    pub input: InputMode,
    pub query: String,
    pub collection_name: String,
    pub collection_action: CollectionAction,
    pub weather: Option<WeatherView>,
    pub status: Option<String>,
    /// Why the country list is empty, when loading failed.
    pub dataset_error: Option<String>,
    pub eq_band: ToneBand,
    pub confirm_reset: bool,
}

impl App {
    pub fn new(countries: Vec<Country>) -> Self {
        Self {
            countries,
            selected: 0,
            active: None,
            input: InputMode::Normal,
            query: String::new(),
            collection_name: String::new(),
            collection_action: CollectionAction::Add,
            weather: None,
            status: None,
            dataset_error: None,
            eq_band: ToneBand::Bass,
            confirm_reset: false,
        }
    }

    /// An empty app explaining why no countries are available.
    pub fn with_dataset_error(message: String) -> Self {
        let mut app = Self::new(Vec::new());
        app.status = Some(message.clone());
        app.dataset_error = Some(message);
        app
    }

    #[cfg(test)]
    pub(crate) fn has_countries(&self) -> bool {
        !self.countries.is_empty()
    }

    /// Country indices in display order: search matches while a query is
    /// typed, otherwise the whole dataset.
    pub fn display_indices(&self) -> Vec<usize> {
        if self.query.trim().is_empty() {
            (0..self.countries.len()).collect()
        } else {
            atlas::search(&self.countries, &self.query)
        }
    }

    pub fn selected_country(&self) -> Option<&Country> {
        self.countries.get(self.selected)
    }

    pub fn active_country(&self) -> Option<&Country> {
        self.active.and_then(|i| self.countries.get(i))
    }

    /// Make `idx` the info-panel country. Weather of another country is dropped.
    pub fn set_active(&mut self, idx: usize) {
        if idx >= self.countries.len() {
            return;
        }
        if self.weather.as_ref().map(|w| w.country_index) != Some(idx) {
            self.weather = None;
        }
        self.active = Some(idx);
        self.set_selected(idx);
    }

    /// Show `weather` if it still belongs to the active country.
    pub fn accept_weather(&mut self, country_index: usize, weather: Weather) -> bool {
        if self.active != Some(country_index) {
            return false;
        }
        self.weather = Some(WeatherView {
            country_index,
            weather,
        });
        true
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    /// Return the next visible index in the current display order after `current`.
    /// Wraps around to the first element.
    pub fn next_in_view_from(&self, current: usize) -> Option<usize> {
        let display = self.display_indices();
        if display.is_empty() {
            return None;
        }
        match display.iter().position(|&i| i == current) {
            Some(p) => Some(display[(p + 1) % display.len()]),
            None => Some(display[0]),
        }
    }

    /// Return the previous visible index in the current display order before `current`.
    /// Wraps around to the last element.
    pub fn prev_in_view_from(&self, current: usize) -> Option<usize> {
        let display = self.display_indices();
        if display.is_empty() {
            return None;
        }
        match display.iter().position(|&i| i == current) {
            Some(0) | None => Some(display[display.len() - 1]),
            Some(p) => Some(display[p - 1]),
        }
    }

    /// Set the selected index and ensure it is visible in the display.
    pub fn set_selected(&mut self, idx: usize) {
        self.selected = idx;
        self.ensure_selected_visible();
    }

    pub fn select_first(&mut self) {
        if let Some(&first) = self.display_indices().first() {
            self.selected = first;
        }
    }

    pub fn select_last(&mut self) {
        if let Some(&last) = self.display_indices().last() {
            self.selected = last;
        }
    }

    /// Move selection to the next visible country.
    pub fn next(&mut self) {
        if let Some(next) = self.next_in_view_from(self.selected) {
            self.selected = next;
        }
    }

    /// Move selection to the previous visible country.
    pub fn prev(&mut self) {
        if let Some(prev) = self.prev_in_view_from(self.selected) {
            self.selected = prev;
        }
    }

    pub fn enter_search(&mut self) {
        self.input = InputMode::Search;
        self.ensure_selected_visible();
    }

    /// Leave search mode, keeping the filter.
    pub fn exit_search(&mut self) {
        self.input = InputMode::Normal;
    }

    /// Drop the query and leave search mode.
    pub fn clear_search(&mut self) {
        self.query.clear();
        self.input = InputMode::Normal;
        self.ensure_selected_visible();
    }

    pub fn push_query_char(&mut self, c: char) {
        self.query.push(c);
        self.ensure_selected_visible();
    }

    pub fn pop_query_char(&mut self) {
        self.query.pop();
        self.ensure_selected_visible();
    }

    pub fn begin_collection_prompt(&mut self, action: CollectionAction) {
        self.collection_name.clear();
        self.collection_action = action;
        self.input = InputMode::CollectionName;
    }

    /// Leave the collection prompt, returning the typed name.
    pub fn finish_collection_prompt(&mut self) -> String {
        self.input = InputMode::Normal;
        std::mem::take(&mut self.collection_name)
    }

    pub fn cycle_eq_band(&mut self) {
        self.eq_band = self.eq_band.next();
    }

    /// Ensure that `selected` is part of the current view, otherwise move
    /// selection to the first visible country.
    fn ensure_selected_visible(&mut self) {
        let display = self.display_indices();
        if display.is_empty() {
            self.selected = 0;
            return;
        }
        if !display.contains(&self.selected) {
            self.selected = display[0];
        }
    }
}
