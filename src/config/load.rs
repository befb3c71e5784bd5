use std::{env, path::PathBuf};

use super::schema::Settings;

/// Configuration loading helpers.
///
/// `Settings::load` reads an optional config file, then applies environment
/// variables (prefix `SOUNDPASS__`) and falls back to struct defaults.
impl Settings {
    /// Load settings from environment and optional config file.
    pub fn load() -> Result<Self, ::config::ConfigError> {
        let config_path = resolve_config_path();

        let mut builder = ::config::Config::builder();

        if let Some(path) = &config_path {
            builder = builder.add_source(::config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("SOUNDPASS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }

    /// Perform basic validation checks on loaded settings.
    pub fn validate(&self) -> Result<(), String> {
        let audio = &self.audio;
        if audio.fade_in_steps == 0 {
            return Err("audio.fade_in_steps must be >= 1".to_string());
        }
        if audio.fade_tick_ms == 0 {
            return Err("audio.fade_tick_ms must be >= 1".to_string());
        }
        if !(audio.fade_out_step > 0.0 && audio.fade_out_step <= 1.0) {
            return Err("audio.fade_out_step must be in (0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&audio.default_volume) {
            return Err("audio.default_volume must be in [0, 1]".to_string());
        }
        if !(self.ui.volume_step > 0.0 && self.ui.volume_step <= 1.0) {
            return Err("ui.volume_step must be in (0, 1]".to_string());
        }
        if self.tour.dwell_seconds == 0 {
            return Err("tour.dwell_seconds must be >= 1".to_string());
        }
        if self.narration.rate <= 0.0 || self.narration.pitch <= 0.0 {
            return Err("narration.rate and narration.pitch must be > 0".to_string());
        }
        Ok(())
    }

    /// Directory for passport files, logs and exports.
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(default_data_dir)
            .unwrap_or_else(|| PathBuf::from(".soundpass"))
    }

    /// Directory export files are written to.
    pub fn export_dir(&self) -> PathBuf {
        self.export
            .dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("exports"))
    }
}

/// Resolve the config path from `SOUNDPASS_CONFIG_PATH` or XDG defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("SOUNDPASS_CONFIG_PATH") {
        return Some(PathBuf::from(p));
    }
    default_config_path()
}

/// Compute the default config path under `$XDG_CONFIG_HOME/soundpass/config.toml`
/// or `~/.config/soundpass/config.toml` when `XDG_CONFIG_HOME` is not set.
pub fn default_config_path() -> Option<PathBuf> {
    xdg_home("XDG_CONFIG_HOME", ".config").map(|d| d.join("soundpass").join("config.toml"))
}

/// `$XDG_DATA_HOME/soundpass` or `~/.local/share/soundpass`.
pub fn default_data_dir() -> Option<PathBuf> {
    xdg_home("XDG_DATA_HOME", ".local/share").map(|d| d.join("soundpass"))
}

fn xdg_home(var: &str, home_relative: &str) -> Option<PathBuf> {
    if let Some(xdg) = env::var_os(var) {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(home_relative))
    }
}
