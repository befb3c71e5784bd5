use std::sync::Arc;

use crate::app::App;
use crate::atlas;
use crate::audio::{AudioBackend, AudioController, FadeConfig, RodioBackend, SilentBackend, mode_from_setting};
use crate::config;
use crate::passport::{FileStore, KeyValueStore, MemoryStore, Passport};
use crate::weather::{OpenMeteo, WeatherService};

/// Build the app model from the configured dataset. A dataset that cannot
/// be loaded leaves the list empty with the reason in the status line.
pub fn load_app(dataset: &str) -> App {
    match atlas::load_dataset(dataset) {
        Ok(countries) => App::new(countries),
        Err(e) => {
            tracing::error!(dataset, error = %e, "failed to load countries");
            App::with_dataset_error(e.to_string())
        }
    }
}

pub fn open_passport(settings: &config::Settings, ephemeral: bool) -> Passport {
    let store: Box<dyn KeyValueStore> = if ephemeral {
        Box::new(MemoryStore::new())
    } else {
        Box::new(FileStore::new(settings.data_dir()))
    };
    Passport::load(store, settings.ui.theme.into())
}

/// The rodio output, or a silent backend when no device can be opened.
pub fn open_audio(settings: &config::Settings) -> AudioController {
    let backend: Box<dyn AudioBackend> =
        match RodioBackend::open_default(settings.data_dir().join("cache")) {
            Ok(backend) => Box::new(backend),
            Err(e) => {
                tracing::error!(error = %e, "audio output unavailable");
                Box::new(SilentBackend::new(e.to_string()))
            }
        };
    let mut audio = AudioController::new(backend, FadeConfig::from(&settings.audio));
    apply_playback_defaults(&mut audio, settings);
    audio
}

pub fn apply_playback_defaults(audio: &mut AudioController, settings: &config::Settings) {
    audio.set_analysis_enabled(settings.audio.analysis);
    audio.set_loop(settings.audio.loop_playback);
    audio.set_volume(settings.audio.default_volume);
    match mode_from_setting(settings.audio.visualization) {
        Some(mode) => {
            audio.set_visualization_mode(mode);
            audio.attach_visualizer(true);
        }
        None => audio.attach_visualizer(false),
    }
}

pub fn open_weather(settings: &config::Settings) -> Option<WeatherService> {
    if !settings.weather.enabled {
        return None;
    }
    match OpenMeteo::new(&settings.weather) {
        Ok(client) => Some(WeatherService::new(Arc::new(client))),
        Err(e) => {
            tracing::warn!(error = %e, "weather disabled");
            None
        }
    }
}
