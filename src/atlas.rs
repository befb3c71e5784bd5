//! The country dataset: records, loading and lookup.

mod load;
mod model;
mod search;

pub use load::load_dataset;
pub use model::Country;
pub use search::{random_index, search};

#[cfg(test)]
mod tests;
