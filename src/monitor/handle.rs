use anyhow::{anyhow, Result};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::coordinator::Command;
use super::events::{MonitorEvent, MonitorSnapshot};
use crate::models::{CodeRecord, CodeSource};
use crate::settings::MonitorSettings;
use crate::sources::ocr::ImageAdapter;
use crate::sources::{Inbound, SourceKind};

/// Cloneable front door to the monitor coordinator.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<MonitorEvent>,
    images: ImageAdapter,
}

impl MonitorHandle {
    pub(super) fn new(
        commands: mpsc::Sender<Command>,
        events: broadcast::Sender<MonitorEvent>,
        images: ImageAdapter,
    ) -> Self {
        Self {
            commands,
            events,
            images,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| anyhow!("monitor coordinator is not running"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("monitor coordinator dropped the request"))
    }

    /// Start every enabled adapter. Calling it while running changes nothing.
    pub async fn start(&self) -> Result<MonitorSnapshot> {
        self.request(Command::Start).await
    }

    /// Stop all adapters; results still in flight are discarded.
    pub async fn stop(&self) -> Result<MonitorSnapshot> {
        self.request(Command::Stop).await
    }

    pub async fn set_source_enabled(
        &self,
        kind: SourceKind,
        enabled: bool,
    ) -> Result<MonitorSettings> {
        self.request(|reply| Command::SetSourceEnabled {
            kind,
            enabled,
            reply,
        })
        .await?
    }

    pub async fn set_auto_clipboard(&self, enabled: bool) -> Result<MonitorSettings> {
        self.request(|reply| Command::SetAutoClipboard { enabled, reply })
            .await?
    }

    pub async fn set_clipboard_interval(&self, secs: f64) -> Result<MonitorSettings> {
        self.request(|reply| Command::SetClipboardInterval { secs, reply })
            .await?
    }

    /// Change the retention window; records outside it are evicted immediately.
    pub async fn set_retention_hours(&self, hours: f64) -> Result<MonitorSettings> {
        self.request(|reply| Command::SetRetentionHours { hours, reply })
            .await?
    }

    pub async fn set_ai_detection(&self, enabled: bool) -> Result<MonitorSettings> {
        self.request(|reply| Command::SetAiDetection { enabled, reply })
            .await?
    }

    pub async fn settings(&self) -> Result<MonitorSettings> {
        self.request(Command::Settings).await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.request(Command::ClearHistory).await?
    }

    /// Newest first.
    pub async fn history(&self) -> Result<Vec<CodeRecord>> {
        self.request(Command::History).await
    }

    pub async fn snapshot(&self) -> Result<MonitorSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Run `text` through extraction as if `source` had produced it.
    pub async fn submit_text(
        &self,
        source: CodeSource,
        text: impl Into<String>,
    ) -> Result<Option<CodeRecord>> {
        let inbound = Inbound::now(source, text);
        self.request(|reply| Command::Submit { inbound, reply })
            .await
    }

    /// Recognize text in an encoded image, then submit it with source `image`.
    pub async fn submit_image(&self, png: Vec<u8>) -> Result<Option<CodeRecord>> {
        match self.images.recognize(png).await {
            Some(text) => self.submit_text(CodeSource::Image, text).await,
            None => Ok(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Stop all adapters and end the coordinator task.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }
}
