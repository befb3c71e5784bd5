use std::path::PathBuf;

use serde::Deserialize;

/// Top-level application settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/soundpass/config.toml` or `~/.config/soundpass/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `SOUNDPASS__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub ui: UiSettings,
    pub atlas: AtlasSettings,
    pub weather: WeatherSettings,
    pub narration: NarrationSettings,
    pub tour: TourSettings,
    pub storage: StorageSettings,
    pub export: ExportSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Total fade-in duration when a sound starts (milliseconds).
    pub fade_in_ms: u64,
    /// Number of steps the fade-in is divided into.
    pub fade_in_steps: u32,
    /// Volume removed per fade-out tick (fraction of full scale).
    pub fade_out_step: f32,
    /// Interval between fade-out ticks (milliseconds).
    pub fade_tick_ms: u64,
    /// Volume used for countries without a per-country override.
    pub default_volume: f32,
    /// Whether sounds restart when they end.
    pub loop_playback: bool,
    /// Upper bound for the fade-out when quitting (milliseconds).
    /// Set to 0 to stop immediately.
    pub quit_fade_out_ms: u64,
    /// Insert the tone-shaping/analysis chain into each session.
    pub analysis: bool,
    /// Initial visualizer mode.
    pub visualization: VisualizationSetting,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            fade_in_ms: 500,
            fade_in_steps: 20,
            fade_out_step: 0.1,
            fade_tick_ms: 50,
            default_volume: 0.5,
            loop_playback: true,
            quit_fade_out_ms: 500,
            analysis: true,
            visualization: VisualizationSetting::Bars,
        }
    }
}

#[derive(Debug, Copy, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VisualizationSetting {
    #[serde(alias = "bar")]
    Bars,
    #[serde(alias = "waveform")]
    Wave,
    #[serde(alias = "circle", alias = "radial")]
    Circular,
    /// Do not start a render loop at all.
    #[serde(alias = "none")]
    Off,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    /// The text rendered inside the top header box.
    pub header_text: String,
    /// Show the world map canvas next to the country list.
    pub show_map: bool,
    /// Theme used until the user picks one (the choice is then persisted).
    pub theme: ThemeSetting,
    /// Volume change per `+`/`-` key press.
    pub volume_step: f32,
    /// EQ gain change per `<`/`>` key press (dB).
    pub tone_step_db: f32,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            header_text: " ~ Close your eyes and travel ~ ".to_string(),
            show_map: true,
            theme: ThemeSetting::Dark,
            volume_step: 0.05,
            tone_step_db: 1.0,
        }
    }
}

#[derive(Debug, Copy, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeSetting {
    Light,
    Dark,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AtlasSettings {
    /// Path or http(s) URL of the country dataset.
    pub dataset: String,
}

impl Default for AtlasSettings {
    fn default() -> Self {
        Self {
            dataset: "data/countries.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherSettings {
    pub enabled: bool,
    /// Forecast endpoint; latitude/longitude are appended as query parameters.
    pub endpoint: String,
    pub timeout_ms: u64,
    /// Extra attempts after a failed request.
    pub retries: u32,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.open-meteo.com/v1/forecast".to_string(),
            timeout_ms: 5000,
            retries: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NarrationSettings {
    pub enabled: bool,
    /// Speech command; invoked as `<command> -v <language> -s <wpm> -p <pitch> <text>`.
    pub command: String,
    pub language: String,
    /// Speaking rate multiplier (1.0 = normal).
    pub rate: f32,
    /// Pitch multiplier (1.0 = normal).
    pub pitch: f32,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "espeak-ng".to_string(),
            language: "en".to_string(),
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TourSettings {
    /// Seconds spent at each stop before moving on.
    pub dwell_seconds: u64,
    /// Narrate each stop.
    pub narrate: bool,
}

impl Default for TourSettings {
    fn default() -> Self {
        Self {
            dwell_seconds: 20,
            narrate: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding the passport files and logs.
    /// Defaults to `$XDG_DATA_HOME/soundpass` or `~/.local/share/soundpass`.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Output directory; defaults to `<data_dir>/exports`.
    pub dir: Option<PathBuf>,
    /// Also fetch a QR image of the passport document.
    pub qr: bool,
    pub qr_endpoint: String,
    pub qr_size: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            dir: None,
            qr: true,
            qr_endpoint: "https://api.qrserver.com/v1/create-qr-code/".to_string(),
            qr_size: 300,
        }
    }
}
