//! Unix domain socket that feeds delivered notifications into a [`NotificationFeed`].
//!
//! A helper process with access to the platform notification center writes one
//! notification per line, either as a JSON [`NotificationEvent`] or as plain text (taken
//! as the body). The feed reports access as granted while the socket is bound.
//!
//! The path is chosen in order: `CODECATCHER_BRIDGE_SOCKET`, `XDG_RUNTIME_DIR`, then
//! `/tmp/codecatcher-{uid}.sock`.

use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

use super::notifications::{FeedPermission, NotificationEvent, NotificationFeed};

const SOCKET_NAME: &str = "codecatcher.sock";

pub fn bridge_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var("CODECATCHER_BRIDGE_SOCKET") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(runtime_dir) = dirs::runtime_dir() {
        if runtime_dir.exists() {
            return runtime_dir.join(SOCKET_NAME);
        }
    }

    let uid = std::fs::metadata("/proc/self")
        .map(|meta| std::os::unix::fs::MetadataExt::uid(&meta))
        .unwrap_or(0);
    std::env::temp_dir().join(format!("codecatcher-{uid}.sock"))
}

/// Interpret one bridge line. Blank lines are ignored.
pub fn parse_event_line(line: &str) -> Option<NotificationEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        match serde_json::from_str::<NotificationEvent>(trimmed) {
            Ok(event) => return Some(event),
            Err(err) => log_debug!("bridge line is not a notification object: {err}"),
        }
    }
    Some(NotificationEvent::new(None, Some(trimmed)))
}

fn bind(path: &Path) -> Result<UnixListener> {
    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(bind_err) => {
            if !path.exists() {
                return Err(anyhow!(bind_err)
                    .context(format!("failed to bind bridge socket {}", path.display())));
            }
            if std::os::unix::net::UnixStream::connect(path).is_ok() {
                bail!("bridge socket {} already in use by another instance", path.display());
            }
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove stale socket {}", path.display()))?;
            UnixListener::bind(path)
                .with_context(|| format!("failed to bind bridge socket {} after cleanup", path.display()))
        }
    }
}

/// Accept bridge connections until `token` is cancelled.
pub async fn serve(path: PathBuf, feed: NotificationFeed, token: CancellationToken) -> Result<()> {
    let listener = bind(&path)?;
    log_info!("notification bridge listening on {}", path.display());
    feed.set_permission(FeedPermission::Granted);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    tokio::spawn(read_events(stream, feed.clone(), token.clone()));
                }
                Err(err) => log_warn!("bridge accept failed: {err}"),
            },
        }
    }

    feed.set_permission(FeedPermission::Unavailable(
        "notification bridge stopped".to_string(),
    ));
    let _ = std::fs::remove_file(&path);
    log_info!("notification bridge shut down");
    Ok(())
}

async fn read_events(stream: UnixStream, feed: NotificationFeed, token: CancellationToken) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                if let Some(event) = parse_event_line(&line) {
                    feed.publish(event);
                }
            }
            Ok(None) => break,
            Err(err) => {
                log_warn!("bridge read failed: {err}");
                break;
            }
        }
    }
}

/// Deliver one notification to a running instance's bridge.
pub fn send_to_running_instance(path: &Path, event: &NotificationEvent) -> Result<()> {
    let mut stream = std::os::unix::net::UnixStream::connect(path)
        .with_context(|| format!("no running instance listening on {}", path.display()))?;
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    stream
        .write_all(line.as_bytes())
        .context("failed to send notification to running instance")?;
    Ok(())
}
