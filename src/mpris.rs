//! MPRIS2 service so desktop media keys and `playerctl` can drive soundpass.
//!
//! "Tracks" are countries: Next/Previous move through the country list.

use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_io::{Timer, block_on};
use zbus::{Connection, interface};
use zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

use crate::atlas::Country;
use crate::audio::PlaybackState;

const OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";
const BUS_NAME: &str = "org.mpris.MediaPlayer2.soundpass";
const NOTIFY_POLL: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlCmd {
    Quit,
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Prev,
}

#[derive(Debug, Default)]
struct SharedState {
    playback: PlaybackState,
    title: Option<String>,
    artist: Vec<String>,
    album: Option<String>,
    url: Option<String>,
    art_url: Option<String>,
    track_id: Option<OwnedObjectPath>,
}

pub struct MprisHandle {
    state: Arc<Mutex<SharedState>>,
    notify: Sender<()>,
}

impl MprisHandle {
    pub fn set_playback(&self, playback: PlaybackState) {
        if let Ok(mut s) = self.state.lock() {
            s.playback = playback;
        }
        let _ = self.notify.send(());
    }

    /// Publish `country` (at dataset `index`) as the current track, or clear it.
    pub fn set_country_metadata(&self, index: Option<usize>, country: Option<&Country>) {
        if let Ok(mut s) = self.state.lock() {
            match (index, country) {
                (Some(i), Some(c)) => {
                    s.title = Some(c.country.clone());
                    s.artist = c
                        .continent
                        .clone()
                        .or_else(|| c.category.clone())
                        .into_iter()
                        .collect();
                    s.album = c.category.clone();
                    s.url = sound_url(&c.sound);
                    s.art_url = Some(c.image.clone()).filter(|u| !u.is_empty());
                    s.track_id = ObjectPath::try_from(format!("{OBJECT_PATH}/track/{i}"))
                        .ok()
                        .map(OwnedObjectPath::from);
                }
                _ => {
                    s.title = None;
                    s.artist.clear();
                    s.album = None;
                    s.url = None;
                    s.art_url = None;
                    s.track_id = None;
                }
            }
        }
        let _ = self.notify.send(());
    }
}

impl MprisHandle {
    /// A handle not connected to any bus; updates are recorded and dropped.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let (notify, _) = mpsc::channel();
        Self {
            state: Arc::new(Mutex::new(SharedState::default())),
            notify,
        }
    }

    #[cfg(test)]
    pub(crate) fn title(&self) -> Option<String> {
        self.state.lock().ok().and_then(|s| s.title.clone())
    }

    #[cfg(test)]
    pub(crate) fn playback(&self) -> PlaybackState {
        self.state.lock().map(|s| s.playback).unwrap_or_default()
    }
}

fn sound_url(sound: &str) -> Option<String> {
    if sound.is_empty() {
        return None;
    }
    if sound.contains("://") {
        return Some(sound.to_string());
    }
    let path = Path::new(sound);
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    Some(format!("file://{}", abs.display()))
}

struct RootIface {
    tx: Sender<ControlCmd>,
}

#[interface(name = "org.mpris.MediaPlayer2")]
impl RootIface {
    fn raise(&self) {
        // No-op for TUI.
    }

    fn quit(&self) {
        let _ = self.tx.send(ControlCmd::Quit);
    }

    #[zbus(property)]
    fn can_quit(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_raise(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn has_track_list(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn identity(&self) -> &str {
        "soundpass"
    }

    #[zbus(property)]
    fn supported_uri_schemes(&self) -> Vec<String> {
        vec![]
    }

    #[zbus(property)]
    fn supported_mime_types(&self) -> Vec<String> {
        vec![]
    }
}

struct PlayerIface {
    tx: Sender<ControlCmd>,
    state: Arc<Mutex<SharedState>>,
}

fn owned(value: Value<'_>) -> Option<OwnedValue> {
    OwnedValue::try_from(value).ok()
}

#[interface(name = "org.mpris.MediaPlayer2.Player")]
impl PlayerIface {
    fn next(&self) {
        let _ = self.tx.send(ControlCmd::Next);
    }

    fn previous(&self) {
        let _ = self.tx.send(ControlCmd::Prev);
    }

    fn play(&self) {
        let _ = self.tx.send(ControlCmd::Play);
    }

    fn pause(&self) {
        let _ = self.tx.send(ControlCmd::Pause);
    }

    fn play_pause(&self) {
        let _ = self.tx.send(ControlCmd::PlayPause);
    }

    fn stop(&self) {
        let _ = self.tx.send(ControlCmd::Stop);
    }

    #[zbus(property)]
    fn playback_status(&self) -> &str {
        let Ok(s) = self.state.lock() else {
            return "Stopped";
        };
        match s.playback {
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
        }
    }

    #[zbus(property)]
    fn can_control(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_play(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_pause(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_go_next(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn can_go_previous(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn metadata(&self) -> HashMap<String, OwnedValue> {
        let mut map = HashMap::new();
        let Ok(s) = self.state.lock() else {
            return map;
        };

        let track_id = s.track_id.clone().or_else(|| {
            ObjectPath::try_from("/org/mpris/MediaPlayer2/TrackList/NoTrack")
                .ok()
                .map(OwnedObjectPath::from)
        });
        if let Some(v) = track_id.and_then(|p| owned(Value::from(p.into_inner()))) {
            map.insert("mpris:trackid".to_string(), v);
        }
        if let Some(v) = owned(Value::from(s.title.clone().unwrap_or_default())) {
            map.insert("xesam:title".to_string(), v);
        }
        if !s.artist.is_empty() {
            if let Some(v) = owned(Value::from(s.artist.clone())) {
                map.insert("xesam:artist".to_string(), v);
            }
        }
        let optional = [
            ("xesam:album", &s.album),
            ("xesam:url", &s.url),
            ("mpris:artUrl", &s.art_url),
        ];
        for (key, value) in optional {
            if let Some(v) = value.clone().and_then(|v| owned(Value::from(v))) {
                map.insert(key.to_string(), v);
            }
        }
        map
    }
}

/// Start the MPRIS service on its own thread. Commands arrive on `tx`.
/// Failure to reach the session bus is logged and leaves a handle that
/// only records state.
pub fn spawn_mpris(tx: Sender<ControlCmd>) -> MprisHandle {
    let state = Arc::new(Mutex::new(SharedState::default()));
    let (notify_tx, notify_rx) = mpsc::channel::<()>();

    let state_for_thread = state.clone();
    std::thread::spawn(move || {
        block_on(async move {
            if let Err(e) = serve(tx, state_for_thread, notify_rx).await {
                tracing::warn!(error = %e, "MPRIS service unavailable");
            }
        });
    });

    MprisHandle {
        state,
        notify: notify_tx,
    }
}

async fn serve(
    tx: Sender<ControlCmd>,
    state: Arc<Mutex<SharedState>>,
    notify: Receiver<()>,
) -> zbus::Result<()> {
    let connection = Connection::session().await?;
    connection.request_name(BUS_NAME).await?;

    let object_server = connection.object_server();
    object_server
        .at(OBJECT_PATH, RootIface { tx: tx.clone() })
        .await?;
    object_server
        .at(OBJECT_PATH, PlayerIface { tx, state })
        .await?;
    tracing::info!(name = BUS_NAME, "MPRIS service registered");

    let player = object_server
        .interface::<_, PlayerIface>(OBJECT_PATH)
        .await?;

    loop {
        Timer::after(NOTIFY_POLL).await;
        let mut changed = false;
        loop {
            match notify.try_recv() {
                Ok(()) => changed = true,
                Err(mpsc::TryRecvError::Empty) => break,
                // The app is gone; keep serving until the process exits.
                Err(mpsc::TryRecvError::Disconnected) => break,
            }
        }
        if changed {
            let iface = player.get().await;
            let emitter = player.signal_emitter();
            if let Err(e) = iface.playback_status_changed(emitter).await {
                tracing::debug!(error = %e, "failed to emit PlaybackStatus change");
            }
            if let Err(e) = iface.metadata_changed(emitter).await {
                tracing::debug!(error = %e, "failed to emit Metadata change");
            }
        }
    }
}
