mod app;
mod atlas;
mod audio;
mod config;
mod export;
mod logging;
mod mpris;
mod narration;
mod passport;
mod runtime;
mod tour;
mod ui;
mod weather;

fn main() -> anyhow::Result<()> {
    runtime::run()
}
