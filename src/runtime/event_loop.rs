use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::app::{App, CollectionAction, InputMode};
use crate::atlas;
use crate::audio::{
    AudioController, PlayOptions, PlaybackState, SessionState, VisualFrame, VisualizationMode,
};
use crate::config;
use crate::export::{self, ExportError};
use crate::mpris::{ControlCmd, MprisHandle};
use crate::narration::Narrator;
use crate::passport::Passport;
use crate::runtime::mpris_sync::update_mpris;
use crate::tour::Tour;
use crate::ui;
use crate::weather::WeatherService;

const FRAME: Duration = Duration::from_millis(33);

/// Everything the loop drives besides the UI model.
pub struct Services {
    pub audio: AudioController,
    pub passport: Passport,
    /// `None` when weather lookups are disabled.
    pub weather: Option<WeatherService>,
    pub narrator: Box<dyn Narrator>,
    pub mpris: MprisHandle,
}

/// State tracked by the runtime event loop across iterations.
#[derive(Default)]
pub struct EventLoopState {
    /// Internal two-key prefix state used for `gg` handling.
    pub pending_gg: bool,
    pub tour: Option<Tour>,
    /// Last (country, playback) pair published over MPRIS.
    last_mpris: Option<(Option<usize>, PlaybackState)>,
    qr: Option<Receiver<Result<PathBuf, ExportError>>>,
    visual: Option<VisualFrame>,
}

impl EventLoopState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Main terminal event loop: handles input, timers, worker results and
/// MPRIS. Returns `Ok(())` when shutdown is requested.
pub fn run(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    settings: &config::Settings,
    app: &mut App,
    services: &mut Services,
    control_tx: &mpsc::Sender<ControlCmd>,
    control_rx: &mpsc::Receiver<ControlCmd>,
    state: &mut EventLoopState,
) -> anyhow::Result<()> {
    loop {
        step(settings, app, services, state, Instant::now());

        let display = app.display_indices();
        let snapshot = services.audio.snapshot();
        let tour = state.tour.as_ref().and_then(|t| t.progress());
        terminal.draw(|f| {
            ui::draw(
                f,
                &ui::View {
                    app: &*app,
                    display: &display,
                    passport: &services.passport,
                    audio: &snapshot,
                    visual: state.visual.as_ref(),
                    tour,
                    ui: &settings.ui,
                },
            )
        })?;

        while let Ok(cmd) = control_rx.try_recv() {
            if handle_control_cmd(cmd, settings, app, services, Instant::now()) {
                return Ok(());
            }
        }

        if event::poll(FRAME)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if handle_key_event(key, settings, app, services, control_tx, state, Instant::now()) {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// One pass over everything time- or worker-driven: fades, weather
/// answers, the tour clock, the QR download, the visualizer and MPRIS.
pub(crate) fn step(
    settings: &config::Settings,
    app: &mut App,
    services: &mut Services,
    state: &mut EventLoopState,
    now: Instant,
) {
    services.audio.tick(now);
    surface_audio_error(app, &mut services.audio);

    if let Some(update) = services.weather.as_ref().and_then(|w| w.poll()) {
        match update.result {
            Ok(weather) => {
                app.accept_weather(update.country_index, weather);
            }
            Err(e) => tracing::warn!(country = update.country_index, error = %e, "weather lookup failed"),
        }
    }

    let next_stop = state.tour.as_mut().and_then(|t| t.tick(now));
    if let Some(idx) = next_stop {
        travel_to(idx, app, services, now, settings.tour.narrate);
    }
    if state.tour.as_ref().is_some_and(|t| !t.is_active()) {
        state.tour = None;
        app.set_status("Tour finished");
    }

    if let Some(rx) = &state.qr {
        match rx.try_recv() {
            Ok(Ok(path)) => {
                app.set_status(format!("QR code saved to {}", path.display()));
                state.qr = None;
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "QR download failed");
                app.set_status(format!("QR code unavailable: {e}"));
                state.qr = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => state.qr = None,
        }
    }

    state.visual = services.audio.render_frame();

    // Keep MPRIS in sync even when playback changes come from fades or media keys.
    let snapshot = services.audio.snapshot();
    let key = (app.active.filter(|_| snapshot.session.is_some()), snapshot.playback());
    if state.last_mpris != Some(key) {
        update_mpris(&services.mpris, app, &snapshot);
        state.last_mpris = Some(key);
    }
}

fn surface_audio_error(app: &mut App, audio: &mut AudioController) {
    if let Some(err) = audio.last_error() {
        app.set_status(format!("Playback failed: {err}"));
        audio.clear_error();
    }
}

/// Visit `idx`: stamp the passport, play its sound at the remembered
/// volume, fetch its weather and optionally narrate it.
fn travel_to(
    idx: usize,
    app: &mut App,
    services: &mut Services,
    now: Instant,
    narrate: bool,
) {
    let Some(country) = app.countries.get(idx).cloned() else {
        return;
    };
    app.set_active(idx);
    if services.passport.visit(&country.country) {
        tracing::info!(
            country = %country.country,
            visited = services.passport.visited_count(),
            "passport stamped"
        );
    }

    if country.sound.is_empty() {
        services.audio.stop(now);
        app.set_status(format!("No sound recorded for {}", country.country));
    } else {
        // Without a remembered volume the controller's current gain carries over.
        let options = PlayOptions {
            looping: None,
            initial_target_volume: services.passport.volume_override(&country.country),
        };
        if services.audio.play(&country.sound, options, now).is_some() {
            app.clear_status();
        }
        surface_audio_error(app, &mut services.audio);
    }

    if let Some(weather) = services.weather.as_mut() {
        weather.request(idx, country.lat, country.lng);
    }
    if narrate {
        speak(app, services.narrator.as_mut(), &country.narration());
    }
}

fn speak(app: &mut App, narrator: &mut dyn Narrator, text: &str) {
    if let Err(e) = narrator.speak(text) {
        tracing::warn!(error = %e, "narration failed");
        app.set_status(format!("Narration unavailable: {e}"));
    }
}

/// The country actions like favorite and narrate apply to: the active one,
/// else the highlighted one.
fn target_country(app: &App) -> Option<(usize, String)> {
    let idx = app.active.or_else(|| app.selected_country().map(|_| app.selected))?;
    app.countries.get(idx).map(|c| (idx, c.country.clone()))
}

/// Stop playback with a fade-out, waiting at most `quit_fade_out_ms`.
fn quit_softly(settings: &config::Settings, services: &mut Services) {
    services.narrator.cancel();
    let limit = Duration::from_millis(settings.audio.quit_fade_out_ms);
    let started = Instant::now();
    services.audio.stop(started);
    while services.audio.is_fading_out() && started.elapsed() < limit {
        thread::sleep(Duration::from_millis(10));
        services.audio.tick(Instant::now());
    }
    services.audio.shutdown();
}

pub(crate) fn handle_control_cmd(
    cmd: ControlCmd,
    settings: &config::Settings,
    app: &mut App,
    services: &mut Services,
    now: Instant,
) -> bool {
    let live = services.audio.live().map(|s| s.state());
    match cmd {
        ControlCmd::Quit => {
            quit_softly(settings, services);
            return true;
        }
        ControlCmd::Play => match live {
            Some(SessionState::Paused) => services.audio.resume(now),
            None => {
                if let Some((idx, _)) = target_country(app) {
                    travel_to(idx, app, services, now, false);
                }
            }
            Some(_) => {}
        },
        ControlCmd::Pause => {
            if matches!(live, Some(SessionState::FadingIn | SessionState::Playing)) {
                services.audio.pause(now);
            }
        }
        ControlCmd::PlayPause => {
            if live.is_some() {
                services.audio.toggle_pause(now);
            } else if let Some((idx, _)) = target_country(app) {
                travel_to(idx, app, services, now, false);
            }
        }
        ControlCmd::Stop => services.audio.stop(now),
        ControlCmd::Next | ControlCmd::Prev => {
            let from = app.active.unwrap_or(app.selected);
            let to = if cmd == ControlCmd::Next {
                app.next_in_view_from(from)
            } else {
                app.prev_in_view_from(from)
            };
            if let Some(idx) = to {
                travel_to(idx, app, services, now, false);
            }
        }
    }

    false
}

pub(crate) fn handle_key_event(
    key: KeyEvent,
    settings: &config::Settings,
    app: &mut App,
    services: &mut Services,
    control_tx: &mpsc::Sender<ControlCmd>,
    state: &mut EventLoopState,
    now: Instant,
) -> bool {
    match app.input {
        InputMode::Search => {
            handle_search_key(key, app, services, state, now);
            return false;
        }
        InputMode::CollectionName => {
            handle_collection_key(key, app, services);
            return false;
        }
        InputMode::Normal => {}
    }

    if key.code != KeyCode::Char('X') && app.confirm_reset {
        app.confirm_reset = false;
        app.clear_status();
    }
    if key.code != KeyCode::Char('g') {
        state.pending_gg = false;
    }

    match key.code {
        KeyCode::Char('q') => {
            quit_softly(settings, services);
            return true;
        }
        KeyCode::Char('/') => app.enter_search(),
        KeyCode::Char('g') => {
            if state.pending_gg {
                state.pending_gg = false;
                app.select_first();
            } else {
                state.pending_gg = true;
            }
        }
        KeyCode::Char('G') => app.select_last(),
        KeyCode::Char('j') | KeyCode::Down => app.next(),
        KeyCode::Char('k') | KeyCode::Up => app.prev(),
        KeyCode::Enter => {
            if app.selected_country().is_some() {
                let already_playing = app.active == Some(app.selected)
                    && services.audio.snapshot().playback() == PlaybackState::Playing;
                if !already_playing {
                    travel_to(app.selected, app, services, now, false);
                }
            }
        }
        KeyCode::Char('p') | KeyCode::Char(' ') => {
            let _ = control_tx.send(ControlCmd::PlayPause);
        }
        KeyCode::Char('x') => {
            let _ = control_tx.send(ControlCmd::Stop);
        }
        KeyCode::Char('+') | KeyCode::Char('=') => adjust_volume(settings.ui.volume_step, app, services),
        KeyCode::Char('-') => adjust_volume(-settings.ui.volume_step, app, services),
        KeyCode::Char('r') => {
            let looping = !services.audio.looping();
            services.audio.set_loop(looping);
            app.set_status(if looping { "Loop on" } else { "Loop off" });
        }
        KeyCode::Char('R') => {
            app.clear_search();
            if let Some(idx) = atlas::random_index(app.countries.len()) {
                travel_to(idx, app, services, now, false);
            }
        }
        KeyCode::Char('f') => {
            if let Some((_, name)) = target_country(app) {
                let favorite = services.passport.toggle_favorite(&name);
                app.set_status(if favorite {
                    format!("{name} added to favorites")
                } else {
                    format!("{name} removed from favorites")
                });
            }
        }
        KeyCode::Char('c') => {
            if let Some((_, name)) = target_country(app) {
                if services.passport.is_favorite(&name) {
                    app.begin_collection_prompt(CollectionAction::Add);
                } else {
                    app.set_status(format!("Add {name} to favorites first (f)"));
                }
            }
        }
        KeyCode::Char('u') => {
            if let Some((_, name)) = target_country(app) {
                if services.passport.collections_of(&name).is_empty() {
                    app.set_status(format!("{name} is in no collection"));
                } else {
                    app.begin_collection_prompt(CollectionAction::Remove);
                }
            }
        }
        KeyCode::Char('D') => {
            if services.passport.collections().is_empty() {
                app.set_status("No collections yet");
            } else {
                app.begin_collection_prompt(CollectionAction::Delete);
            }
        }
        KeyCode::Char('e') => app.cycle_eq_band(),
        KeyCode::Char('>') | KeyCode::Char('<') => {
            let delta = if key.code == KeyCode::Char('>') {
                settings.ui.tone_step_db
            } else {
                -settings.ui.tone_step_db
            };
            let band = app.eq_band;
            let gain = services.audio.tone().gain(band) + delta;
            services.audio.set_tone_gain(band, gain);
        }
        KeyCode::Char('v') => cycle_visualizer(&mut services.audio),
        KeyCode::Char('t') => {
            let theme = services.passport.toggle_theme();
            app.set_status(format!("{} theme", theme.label()));
        }
        KeyCode::Char('T') => toggle_tour(settings, app, services, state, now),
        KeyCode::Char('n') => {
            if services.narrator.is_speaking() {
                services.narrator.cancel();
            } else if let Some((idx, _)) = target_country(app) {
                let text = app.countries[idx].narration();
                speak(app, services.narrator.as_mut(), &text);
            }
        }
        KeyCode::Char('E') => export_passport(settings, app, services, state),
        KeyCode::Char('X') => {
            if app.confirm_reset {
                app.confirm_reset = false;
                services.passport.reset();
                app.set_status("Passport reset");
            } else {
                app.confirm_reset = true;
                app.set_status("Press X again to reset your passport");
            }
        }
        _ => {}
    }

    false
}

fn handle_search_key(
    key: KeyEvent,
    app: &mut App,
    services: &mut Services,
    state: &mut EventLoopState,
    now: Instant,
) {
    state.pending_gg = false;
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => app.clear_search(),
        KeyCode::Backspace => app.pop_query_char(),
        KeyCode::Char('j') | KeyCode::Char('n') if ctrl => app.next(),
        KeyCode::Char('k') | KeyCode::Char('p') if ctrl => app.prev(),
        KeyCode::Down => app.next(),
        KeyCode::Up => app.prev(),
        KeyCode::Char(c) => {
            if !c.is_control() {
                app.push_query_char(c);
            }
        }
        KeyCode::Enter => {
            if app.display_indices().is_empty() {
                return;
            }
            app.exit_search();
            travel_to(app.selected, app, services, now, false);
        }
        _ => {}
    }
}

fn handle_collection_key(key: KeyEvent, app: &mut App, services: &mut Services) {
    match key.code {
        KeyCode::Esc => {
            app.finish_collection_prompt();
        }
        KeyCode::Backspace => {
            app.collection_name.pop();
        }
        KeyCode::Char(c) => {
            if !c.is_control() {
                app.collection_name.push(c);
            }
        }
        KeyCode::Enter => {
            let action = app.collection_action;
            let collection = app.finish_collection_prompt();
            let collection = collection.trim();
            if action == CollectionAction::Delete {
                match services.passport.delete_collection(collection) {
                    Ok(()) => app.set_status(format!("Collection {collection} deleted")),
                    Err(e) => app.set_status(e.to_string()),
                }
                return;
            }
            let Some((_, name)) = target_country(app) else {
                return;
            };
            let result = match action {
                CollectionAction::Remove => services
                    .passport
                    .remove_from_collection(collection, &name)
                    .map(|()| format!("{name} removed from {collection}")),
                _ => services
                    .passport
                    .add_to_collection(collection, &name)
                    .map(|()| format!("{name} added to {collection}")),
            };
            match result {
                Ok(msg) => app.set_status(msg),
                Err(e) => app.set_status(e.to_string()),
            }
        }
        _ => {}
    }
}

/// Change the volume and remember it for the active country.
fn adjust_volume(delta: f32, app: &mut App, services: &mut Services) {
    let current = services
        .audio
        .live()
        .map(|s| s.target_volume())
        .unwrap_or_else(|| services.audio.volume());
    services.audio.set_volume(current + delta);
    let volume = services.audio.volume();
    if let Some(country) = app.active_country() {
        services.passport.set_volume_override(&country.country, volume);
    }
}

/// bars -> wave -> circular -> off -> bars
fn cycle_visualizer(audio: &mut AudioController) {
    if !audio.visualizer_attached() {
        audio.set_visualization_mode(VisualizationMode::Bars);
        audio.attach_visualizer(true);
    } else if audio.mode() == VisualizationMode::Circular {
        audio.attach_visualizer(false);
    } else {
        audio.set_visualization_mode(audio.mode().next());
    }
}

fn toggle_tour(
    settings: &config::Settings,
    app: &mut App,
    services: &mut Services,
    state: &mut EventLoopState,
    now: Instant,
) {
    if state.tour.take().is_some() {
        services.narrator.cancel();
        app.set_status("Tour stopped");
        return;
    }

    let stops = Tour::plan(app.countries.len(), |i| {
        services.passport.is_visited(&app.countries[i].country)
    });
    let mut tour = Tour::new(stops, Duration::from_secs(settings.tour.dwell_seconds));
    if let Some(first) = tour.start(now) {
        state.tour = Some(tour);
        travel_to(first, app, services, now, settings.tour.narrate);
    }
}

fn export_passport(
    settings: &config::Settings,
    app: &mut App,
    services: &mut Services,
    state: &mut EventLoopState,
) {
    let dir = settings.export_dir();
    let report = match export::write_exports(
        &dir,
        &app.countries,
        &services.passport,
        &settings.export,
        Utc::now(),
    ) {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(error = %e, "export failed");
            app.set_status(format!("Export failed: {e}"));
            return;
        }
    };

    app.set_status(format!(
        "Exported {} files to {}",
        report.files.len(),
        report.dir.display()
    ));
    if let Some(url) = report.qr_url {
        let dest = report.dir.join(export::QR_FILE);
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(export::fetch_qr(&url, &dest));
        });
        state.qr = Some(rx);
    }
}
