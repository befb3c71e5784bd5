use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use super::client::{Fetcher, Weather, WeatherError};

/// The answer to one `WeatherService::request`.
#[derive(Debug)]
pub struct WeatherUpdate {
    pub generation: u64,
    pub country_index: usize,
    pub result: Result<Weather, WeatherError>,
}

pub struct WeatherService {
    fetcher: Arc<dyn Fetcher>,
    tx: Sender<WeatherUpdate>,
    rx: Receiver<WeatherUpdate>,
    generation: u64,
}

impl WeatherService {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            fetcher,
            tx,
            rx,
            generation: 0,
        }
    }

    /// Start a lookup for `country_index`, superseding every earlier request.
    pub fn request(&mut self, country_index: usize, lat: f64, lng: f64) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = fetcher.fetch(lat, lng);
            // The receiver is gone once the app shut down.
            let _ = tx.send(WeatherUpdate {
                generation,
                country_index,
                result,
            });
        });
        generation
    }

    /// The newest answer to the latest request, if it has arrived.
    /// Stale answers are drained and dropped.
    pub fn poll(&self) -> Option<WeatherUpdate> {
        let mut fresh = None;
        while let Ok(update) = self.rx.try_recv() {
            if update.generation == self.generation {
                fresh = Some(update);
            } else {
                tracing::debug!(
                    generation = update.generation,
                    current = self.generation,
                    "dropping stale weather response"
                );
            }
        }
        fresh
    }
}
