//! Audio playback: the fade/crossfade controller and its backends.
//!
//! `AudioController` owns the single "now playing" slot. It talks to sound
//! output only through the `AudioBackend`/`Voice` traits; `RodioBackend`
//! is the real implementation.

mod analysis;
mod backend;
mod controller;
mod fade;
mod sink;
mod types;
mod visualizer;

pub use backend::{AudioBackend, SilentBackend};
pub use controller::AudioController;
pub use sink::RodioBackend;
pub use types::*;
pub use visualizer::VisualFrame;

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;
