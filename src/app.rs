//! Application module: exposes the app model used by the TUI and runtime.
//!
//! The `App` model lives in `app::model` and holds the country list,
//! selection, search and the info-panel state.

mod model;

pub use model::*;
