//! The persisted passport: visited countries, favorites, collections,
//! per-country volumes and the UI theme.

mod state;
mod store;

pub use state::{Passport, Theme};
pub use store::{FileStore, KeyValueStore, MemoryStore};
