use std::env;
use std::sync::mpsc;

use anyhow::Context;
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::logging::init_logging;
use crate::mpris::ControlCmd;
use crate::narration;

mod event_loop;
mod mpris_sync;
mod settings;
mod startup;


/// Command line: `soundpass [--ephemeral] [DATASET]`.
struct Args {
    /// Keep the passport in memory only.
    ephemeral: bool,
    dataset: Option<String>,
}

impl Args {
    fn parse(args: impl Iterator<Item = String>) -> Self {
        let mut parsed = Args {
            ephemeral: false,
            dataset: None,
        };
        for arg in args {
            match arg.as_str() {
                "--ephemeral" => parsed.ephemeral = true,
                _ => parsed.dataset = Some(arg),
            }
        }
        parsed
    }
}

pub fn run() -> anyhow::Result<()> {
    let args = Args::parse(env::args().skip(1));
    let (mut settings, fallback) = settings::load_settings();
    if let Some(dataset) = args.dataset {
        settings.atlas.dataset = dataset;
    }

    let _log_guard = init_logging(&settings.data_dir().join("logs"))?;
    if let Some(msg) = fallback {
        tracing::warn!("{msg}");
    }
    tracing::info!(dataset = %settings.atlas.dataset, ephemeral = args.ephemeral, "starting soundpass");

    let mut app = startup::load_app(&settings.atlas.dataset);
    let (control_tx, control_rx) = mpsc::channel::<ControlCmd>();
    let mut services = event_loop::Services {
        audio: startup::open_audio(&settings),
        passport: startup::open_passport(&settings, args.ephemeral),
        weather: startup::open_weather(&settings),
        narrator: narration::from_settings(&settings.narration),
        mpris: crate::mpris::spawn_mpris(control_tx.clone()),
    };

    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut state = event_loop::EventLoopState::new();
    let run_result = event_loop::run(
        &mut terminal,
        &settings,
        &mut app,
        &mut services,
        &control_tx,
        &control_rx,
        &mut state,
    );

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    services.audio.shutdown();
    tracing::info!("soundpass stopped");
    run_result
}
