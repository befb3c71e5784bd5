//! `rodio` implementation of the audio backend.
//!
//! Each voice is one paused `Sink` on the shared output stream. Local files
//! are decoded immediately; remote sounds are downloaded into a cache
//! directory on a worker thread, which makes their start `Pending`.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use sha2::{Digest, Sha256};

use super::analysis::{AnalysisChain, ToneShaper};
use super::backend::{AudioBackend, StartOutcome, Voice, VoiceOptions};
use super::types::AudioError;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RodioBackend {
    stream: OutputStream,
    cache_dir: PathBuf,
}

impl RodioBackend {
    /// Open the default output device. Remote sounds are cached in `cache_dir`.
    pub fn open_default(cache_dir: PathBuf) -> Result<Self, AudioError> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| AudioError::NoDevice(e.to_string()))?;
        // rodio logs to stderr when OutputStream is dropped. That's useful in debugging,
        // but noisy for a TUI app.
        stream.log_on_drop(false);
        Ok(Self { stream, cache_dir })
    }
}

impl AudioBackend for RodioBackend {
    fn open(&mut self, source: &str, options: VoiceOptions) -> Result<Box<dyn Voice>, AudioError> {
        let sink = Sink::connect_new(self.stream.mixer());
        sink.pause();
        sink.set_volume(0.0);

        let mut voice = RodioVoice {
            sink,
            source_id: source.to_string(),
            path: None,
            download: None,
            analysis: options.analysis,
        };

        if is_remote(source) {
            let cached = cache_path(&self.cache_dir, source);
            if cached.is_file() {
                voice.load(cached)?;
            } else {
                voice.download = Some(spawn_download(source.to_string(), cached));
            }
        } else {
            voice.load(PathBuf::from(source))?;
        }

        Ok(Box::new(voice))
    }
}

struct RodioVoice {
    sink: Sink,
    source_id: String,
    path: Option<PathBuf>,
    download: Option<Receiver<Result<PathBuf, AudioError>>>,
    analysis: Option<AnalysisChain>,
}

impl RodioVoice {
    /// Decode `path` and queue it on the sink.
    fn load(&mut self, path: PathBuf) -> Result<(), AudioError> {
        append_decoded(&self.sink, &path, &self.source_id, self.analysis.as_ref())?;
        self.path = Some(path);
        Ok(())
    }
}

impl Voice for RodioVoice {
    fn start(&mut self) -> StartOutcome {
        if self.download.is_some() {
            return StartOutcome::Pending;
        }
        self.sink.play();
        StartOutcome::Started
    }

    fn poll_start(&mut self) -> Option<Result<(), AudioError>> {
        let rx = self.download.as_ref()?;
        let outcome = match rx.try_recv() {
            Err(TryRecvError::Empty) => return None,
            Ok(result) => result,
            Err(TryRecvError::Disconnected) => Err(AudioError::Download {
                url: self.source_id.clone(),
                reason: "download worker vanished".to_string(),
            }),
        };
        self.download = None;
        Some(outcome.and_then(|path| {
            self.load(path)?;
            self.sink.play();
            Ok(())
        }))
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn resume(&mut self) {
        self.sink.play();
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume);
    }

    fn is_finished(&self) -> bool {
        self.download.is_none() && self.sink.empty()
    }

    fn restart(&mut self) -> Result<(), AudioError> {
        let Some(path) = self.path.clone() else {
            return Err(AudioError::Rejected(format!(
                "{} has nothing to restart",
                self.source_id
            )));
        };
        append_decoded(&self.sink, &path, &self.source_id, self.analysis.as_ref())?;
        self.sink.play();
        Ok(())
    }

    fn stop(&mut self) {
        self.download = None;
        self.sink.stop();
    }
}

fn append_decoded(
    sink: &Sink,
    path: &Path,
    source_id: &str,
    analysis: Option<&AnalysisChain>,
) -> Result<(), AudioError> {
    let file = File::open(path).map_err(|e| AudioError::Open {
        source_id: source_id.to_string(),
        source: e,
    })?;
    let decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| AudioError::Decode(format!("{source_id}: {e}")))?;

    match analysis {
        Some(chain) => sink.append(ToneShaper::new(decoder, chain.clone())),
        None => sink.append(decoder),
    }
    Ok(())
}

pub(crate) fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Stable cache file for `url`, keeping its extension as a decoder hint.
pub(crate) fn cache_path(cache_dir: &Path, url: &str) -> PathBuf {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    let ext = url
        .rsplit('/')
        .next()
        .and_then(|name| name.split(['?', '#']).next())
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext))
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(char::is_alphanumeric))
        .unwrap_or("bin");
    cache_dir.join(format!("{}.{ext}", &digest[..32]))
}

fn spawn_download(url: String, dest: PathBuf) -> Receiver<Result<PathBuf, AudioError>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = download(&url, &dest);
        if let Err(ref e) = result {
            tracing::warn!(url = %url, error = %e, "sound download failed");
        }
        let _ = tx.send(result);
    });
    rx
}

fn download(url: &str, dest: &Path) -> Result<PathBuf, AudioError> {
    let fail = |reason: String| AudioError::Download {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| fail(e.to_string()))?;
    let resp = client.get(url).send().map_err(|e| fail(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(fail(format!("HTTP {}", resp.status())));
    }
    let bytes = resp.bytes().map_err(|e| fail(e.to_string()))?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
    }
    let tmp = dest.with_extension("part");
    fs::write(&tmp, &bytes).map_err(|e| fail(e.to_string()))?;
    fs::rename(&tmp, dest).map_err(|e| fail(e.to_string()))?;
    tracing::debug!(url, path = %dest.display(), bytes = bytes.len(), "sound cached");
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_detection_only_matches_http_schemes() {
        assert!(is_remote("https://example.org/a.mp3"));
        assert!(is_remote("http://example.org/a.mp3"));
        assert!(!is_remote("sounds/japan.mp3"));
        assert!(!is_remote("/abs/path.ogg"));
    }

    #[test]
    fn cache_path_is_stable_and_keeps_extension() {
        let dir = Path::new("/tmp/cache");
        let a = cache_path(dir, "https://example.org/sounds/rain.ogg?v=2");
        let b = cache_path(dir, "https://example.org/sounds/rain.ogg?v=2");
        assert_eq!(a, b);
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("ogg"));

        let other = cache_path(dir, "https://example.org/sounds/wind.ogg");
        assert_ne!(a, other);

        let no_ext = cache_path(dir, "https://example.org/stream");
        assert_eq!(no_ext.extension().and_then(|e| e.to_str()), Some("bin"));
    }

    #[test]
    fn cache_name_is_a_sha256_prefix_of_the_url() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad
        let path = cache_path(Path::new("/tmp/cache"), "abc");
        assert_eq!(
            path,
            Path::new("/tmp/cache/ba7816bf8f01cfea414140de5dae2223.bin")
        );
    }
}
