mod config;
mod control;
mod dmx;
mod library;
mod player;
mod status;
mod web;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use config::Config;
use control::{Controller, run_loop};
use dmx::DmxSystem;
use library::MediaLibrary;
use player::Player;
use player::headless::HeadlessPlayer;
use status::StatusHandle;
use web::WebSystem;

const USAGE: &str = "\
limelight - DMX-driven media playback server

usage: limelight [options]
  --config <path>   Load configuration from <path> instead of the default
  --media <path>    Override the media root directory
  --headless        Run without a playback engine (commands are logged only)
  -h, --help        Show this help
";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print!("{USAGE}");
        return Ok(());
    }
    let headless = args.iter().any(|a| a == "--headless");
    let config_path = flag_value(&args, "--config").map(PathBuf::from);
    let media_override = flag_value(&args, "--media").map(PathBuf::from);

    let mut config = match config_path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    };
    if let Some(root) = media_override {
        config.media_root = root;
    }
    log::info!(
        "limelight v{} | DMX {} | media root {}",
        env!("CARGO_PKG_VERSION"),
        config.dmx_label(),
        config.media_root.display()
    );

    let player: Box<dyn Player> = if headless {
        log::info!("Headless mode: player commands are logged, not executed");
        Box::new(HeadlessPlayer::new())
    } else {
        spawn_engine(&config)?
    };

    let mut dmx = DmxSystem::start(&config)?;
    let status = StatusHandle::new();
    let mut web = if config.web_enabled {
        WebSystem::start(config.web_port, status.clone())
    } else {
        WebSystem::disabled()
    };

    let controller = Controller::new(player, MediaLibrary::new(config.media_root.clone()));
    let shared_config = Arc::new(Mutex::new(config));
    let shutdown = Arc::new(AtomicBool::new(false));

    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("Shutdown requested");
        flag.store(true, Ordering::Relaxed);
    })?;

    // The control loop owns the main thread until shutdown; it quits the
    // player on the way out.
    let events = dmx.events();
    run_loop(controller, &events, &shutdown, &status, &shared_config);

    dmx.stop();
    web.stop();
    log::info!("Server stopped");
    Ok(())
}

#[cfg(unix)]
fn spawn_engine(config: &Config) -> Result<Box<dyn Player>> {
    Ok(Box::new(player::mpv::MpvPlayer::spawn(&config.hwdec)?))
}

#[cfg(not(unix))]
fn spawn_engine(_config: &Config) -> Result<Box<dyn Player>> {
    anyhow::bail!("no playback engine is available on this platform; use --headless")
}

/// Value following a `--flag` argument, if present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
