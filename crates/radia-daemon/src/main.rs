mod hardware;
mod mpv;
mod power;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use radia_core::app::App;
use radia_core::catalog::{CatalogSource, StationCatalog};
use radia_core::config::Config;
use radia_core::display::ClearOnDrop;
use radia_core::input::{InputDispatcher, SystemClock};
use radia_core::playback::Player;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_logging() -> anyhow::Result<std::path::PathBuf> {
    let data_dir = radia_core::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("radia.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,radia_core=debug,radia=debug")
            }),
        )
        .init();

    Ok(log_path)
}

/// Set `flag` on SIGINT or SIGTERM so the input loop winds down.
async fn watch_signals(flag: Arc<AtomicBool>) {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            flag.store(true, Ordering::Relaxed);
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = term.recv() => info!("SIGTERM received"),
    }
    flag.store(true, Ordering::Relaxed);
}

fn main() -> anyhow::Result<()> {
    let log_path = init_logging()?;
    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    // mpv IPC and signal handling live here; the controller loop stays on
    // the main thread.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("radia-io")
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    runtime.spawn(watch_signals(shutdown.clone()));

    let (catalog, source) =
        StationCatalog::load(&config.stations.primary, &config.stations.backup);
    match source {
        CatalogSource::Primary | CatalogSource::Backup => {
            info!("{} stations loaded ({:?})", catalog.len(), source)
        }
        CatalogSource::Unavailable => warn!("No station list available"),
    }

    let buttons = hardware::open_buttons(&config.buttons).context("requesting buttons")?;
    let display = ClearOnDrop::new(
        hardware::open_display(&config.display).context("initialising display")?,
    );
    let input = InputDispatcher::new(buttons, SystemClock).with_shutdown(shutdown);

    let backend = mpv::MpvBackend::new(runtime.handle().clone(), config.mpv.volume);
    let player = Player::new(backend)
        .with_network_caching(Duration::from_millis(config.mpv.network_caching_ms));
    let power = power::ShutdownCommand::new(config.power.shutdown_command.clone());

    let mut app = App::new(catalog, player, display, input, power)
        .with_autoplay(config.stations.autoplay.clone());
    let result = app.run();

    // Playback teardown talks to mpv through the runtime, so the app goes first.
    drop(app);
    runtime.shutdown_timeout(Duration::from_secs(1));

    result?;
    info!("Exiting");
    Ok(())
}
