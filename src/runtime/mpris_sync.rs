use crate::app::App;
use crate::audio::ControllerSnapshot;
use crate::mpris::MprisHandle;

/// Publish the active country and playback state. The country is only
/// advertised while a session exists.
pub fn update_mpris(mpris: &MprisHandle, app: &App, snapshot: &ControllerSnapshot) {
    let now_playing_idx = app.active.filter(|_| snapshot.session.is_some());
    let country = now_playing_idx.and_then(|i| app.countries.get(i));
    mpris.set_country_metadata(now_playing_idx, country);
    mpris.set_playback(snapshot.playback());
}
