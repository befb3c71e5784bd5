//! Spoken descriptions through an external speech synthesizer.

use std::io;
use std::process::{Child, Command, Stdio};

use crate::config::NarrationSettings;

const BASE_WPM: f32 = 175.0;
const BASE_PITCH: f32 = 50.0;

#[derive(Debug, thiserror::Error)]
pub enum NarrationError {
    #[error("failed to start speech command {command}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Speaks one text at a time. Starting a new narration cancels the
/// previous one.
pub trait Narrator {
    fn speak(&mut self, text: &str) -> Result<(), NarrationError>;
    fn cancel(&mut self);
    fn is_speaking(&mut self) -> bool;
}

/// Narrator for when speech is disabled.
#[derive(Debug, Default)]
pub struct SilentNarrator;

impl Narrator for SilentNarrator {
    fn speak(&mut self, _text: &str) -> Result<(), NarrationError> {
        Ok(())
    }

    fn cancel(&mut self) {}

    fn is_speaking(&mut self) -> bool {
        false
    }
}

/// Runs an espeak-compatible command per narration.
pub struct CommandNarrator {
    command: String,
    language: String,
    wpm: u32,
    pitch: u32,
    child: Option<Child>,
}

impl CommandNarrator {
    pub fn new(settings: &NarrationSettings) -> Self {
        Self {
            command: settings.command.clone(),
            language: settings.language.clone(),
            wpm: (BASE_WPM * settings.rate).round().clamp(80.0, 450.0) as u32,
            pitch: (BASE_PITCH * settings.pitch).round().clamp(0.0, 99.0) as u32,
            child: None,
        }
    }

    pub(crate) fn args(&self, text: &str) -> Vec<String> {
        vec![
            "-v".to_string(),
            self.language.clone(),
            "-s".to_string(),
            self.wpm.to_string(),
            "-p".to_string(),
            self.pitch.to_string(),
            text.to_string(),
        ]
    }
}

impl Narrator for CommandNarrator {
    fn speak(&mut self, text: &str) -> Result<(), NarrationError> {
        self.cancel();
        if text.trim().is_empty() {
            return Ok(());
        }
        let child = Command::new(&self.command)
            .args(self.args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| NarrationError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;
        tracing::debug!(pid = child.id(), chars = text.len(), "narration started");
        self.child = Some(child);
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(mut child) = self.child.take() {
            // Already exited is fine.
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn is_speaking(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) | Err(_) => {
                self.child = None;
                false
            }
        }
    }
}

impl Drop for CommandNarrator {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The narrator configured by `settings`.
pub fn from_settings(settings: &NarrationSettings) -> Box<dyn Narrator> {
    if settings.enabled {
        Box::new(CommandNarrator::new(settings))
    } else {
        Box::new(SilentNarrator)
    }
}
