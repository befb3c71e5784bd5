//! Current-weather lookups for the selected country.
//!
//! Requests run on worker threads and report back over a channel; only the
//! answer to the most recent request is accepted.

mod client;
mod icon;
mod service;

pub use client::{OpenMeteo, Weather};
pub use icon::weather_icon;
pub use service::WeatherService;

#[cfg(test)]
pub(crate) use client::{Fetcher, WeatherError};
