pub mod config;
pub mod db;
pub mod extraction;
pub mod history;
pub mod models;
pub mod monitor;
pub mod settings;
pub mod sources;
pub mod utils;

use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use config::RuntimeConfig;
use db::Database;
use extraction::ExtractionConfig;
use monitor::{spawn_monitor, MonitorDeps, MonitorEvent, MonitorTiming};
use settings::SettingsStore;
use sources::clipboard::SystemClipboard;
use sources::notifications::NotificationFeed;
use sources::ocr::TesseractRecognizer;

/// Run the headless monitor until Ctrl-C. Events are printed to stdout as JSON lines.
pub fn run() -> Result<()> {
    utils::logging::init();
    info!("codecatcher starting up...");

    let config = RuntimeConfig::from_env()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("codecatcher")
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: RuntimeConfig) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("failed to create data directory {}", config.data_dir.display())
    })?;

    let database = Database::new(config.database_path())?;
    let settings = SettingsStore::new(config.settings_path())?;

    let recognizer = TesseractRecognizer::new(config.ocr_languages.clone());
    let availability = recognizer.clone();
    if !tokio::task::spawn_blocking(move || availability.is_available()).await? {
        warn!("tesseract not found; clipboard images will not be recognized");
    }

    let feed = NotificationFeed::new();
    let handle = spawn_monitor(MonitorDeps {
        db: database,
        settings,
        clipboard: Arc::new(SystemClipboard),
        recognizer: Arc::new(recognizer),
        notifications: feed.clone(),
        message_db_path: config.message_db.clone(),
        extraction: ExtractionConfig::default(),
        timing: MonitorTiming::default(),
    })
    .await?;

    let shutdown = CancellationToken::new();
    let bridge = spawn_bridge(&config, feed, shutdown.clone());

    let mut events = handle.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("event printer skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let snapshot = handle.start().await?;
    info!(
        "monitoring {} sources, {} codes in history",
        snapshot.sources.iter().filter(|s| s.enabled).count(),
        snapshot.history_len
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down...");

    shutdown.cancel();
    handle.shutdown().await?;
    if let Some(bridge) = bridge {
        let _ = bridge.await;
    }
    printer.abort();
    Ok(())
}

fn print_event(event: &MonitorEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(err) => warn!("failed to serialize {} event: {err}", event.name()),
    }
}

#[cfg(unix)]
fn spawn_bridge(
    config: &RuntimeConfig,
    feed: NotificationFeed,
    shutdown: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    let path = config.bridge_socket.clone()?;
    Some(tokio::spawn(async move {
        if let Err(err) = sources::notification_bridge::serve(path, feed, shutdown).await {
            warn!("notification bridge unavailable: {err:?}");
        }
    }))
}

#[cfg(not(unix))]
fn spawn_bridge(
    _config: &RuntimeConfig,
    _feed: NotificationFeed,
    _shutdown: CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    None
}

/// Hand a notification to the bridge of a running instance.
#[cfg(unix)]
pub fn send_notification(title: Option<&str>, body: &str) -> Result<()> {
    let event = sources::notifications::NotificationEvent::new(title, Some(body));
    let path = sources::notification_bridge::bridge_socket_path();
    sources::notification_bridge::send_to_running_instance(&path, &event)
}

#[cfg(not(unix))]
pub fn send_notification(_title: Option<&str>, _body: &str) -> Result<()> {
    anyhow::bail!("the notification bridge is not supported on this platform")
}
