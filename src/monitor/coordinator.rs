use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

use super::events::{MonitorEvent, MonitorSnapshot, SourceSnapshot};
use super::handle::MonitorHandle;
use crate::db::Database;
use crate::extraction::{CodeExtractor, ExtractionConfig};
use crate::history::{retention_from_hours, HistoryStore, DEFAULT_MAX_RECORDS};
use crate::models::CodeRecord;
use crate::settings::{MonitorSettings, SettingsStore};
use crate::sources::clipboard::{ClipboardAccess, ClipboardPoller};
use crate::sources::message_store::{MessageStoreReader, DEFAULT_MESSAGE_POLL_SECS};
use crate::sources::notifications::{NotificationFeed, NotificationListener};
use crate::sources::ocr::{ImageAdapter, TextRecognizer};
use crate::sources::scheduler::spawn_periodic;
use crate::sources::{AdapterStatus, Inbound, SourceKind, SourceLink, SourceMessage};

const COMMAND_CAPACITY: usize = 32;
const SOURCE_CAPACITY: usize = 128;
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct MonitorTiming {
    pub message_poll: Duration,
    pub eviction_interval: Duration,
    /// The same code accepted again within this window is ignored.
    pub duplicate_window: chrono::Duration,
    pub max_records: usize,
}

impl Default for MonitorTiming {
    fn default() -> Self {
        Self {
            message_poll: Duration::from_secs(DEFAULT_MESSAGE_POLL_SECS),
            eviction_interval: Duration::from_secs(60 * 60),
            duplicate_window: chrono::Duration::seconds(30),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }
}

/// Everything the coordinator needs from the outside world.
pub struct MonitorDeps {
    pub db: Database,
    pub settings: SettingsStore,
    pub clipboard: Arc<dyn ClipboardAccess>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub notifications: NotificationFeed,
    pub message_db_path: Option<PathBuf>,
    pub extraction: ExtractionConfig,
    pub timing: MonitorTiming,
}

pub(super) enum Command {
    Start(oneshot::Sender<MonitorSnapshot>),
    Stop(oneshot::Sender<MonitorSnapshot>),
    SetSourceEnabled {
        kind: SourceKind,
        enabled: bool,
        reply: oneshot::Sender<Result<MonitorSettings>>,
    },
    SetAutoClipboard {
        enabled: bool,
        reply: oneshot::Sender<Result<MonitorSettings>>,
    },
    SetClipboardInterval {
        secs: f64,
        reply: oneshot::Sender<Result<MonitorSettings>>,
    },
    SetRetentionHours {
        hours: f64,
        reply: oneshot::Sender<Result<MonitorSettings>>,
    },
    SetAiDetection {
        enabled: bool,
        reply: oneshot::Sender<Result<MonitorSettings>>,
    },
    Settings(oneshot::Sender<MonitorSettings>),
    ClearHistory(oneshot::Sender<Result<()>>),
    History(oneshot::Sender<Vec<CodeRecord>>),
    Snapshot(oneshot::Sender<MonitorSnapshot>),
    Submit {
        inbound: Inbound,
        reply: oneshot::Sender<Option<CodeRecord>>,
    },
    Shutdown(oneshot::Sender<()>),
}

struct RunningAdapter {
    generation: u64,
    token: CancellationToken,
    _task: JoinHandle<()>,
}

/// Load persisted history and spawn the coordinator task. Nothing is monitored until
/// [`MonitorHandle::start`] is called.
pub async fn spawn_monitor(deps: MonitorDeps) -> Result<MonitorHandle> {
    let (coordinator, mailboxes, handle) = build_monitor(deps).await?;
    tokio::spawn(coordinator.run(mailboxes.commands, mailboxes.sources));
    Ok(handle)
}

struct Mailboxes {
    commands: mpsc::Receiver<Command>,
    sources: mpsc::Receiver<SourceMessage>,
}

async fn build_monitor(
    deps: MonitorDeps,
) -> Result<(MonitorCoordinator, Mailboxes, MonitorHandle)> {
    let MonitorDeps {
        db,
        settings,
        clipboard,
        recognizer,
        notifications,
        message_db_path,
        extraction,
        timing,
    } = deps;

    let current = settings.get().clone();
    let extractor = CodeExtractor::new(extraction, current.ai_detection_enabled)?;

    let mut history = HistoryStore::new(
        db.clone(),
        timing.max_records,
        retention_from_hours(current.retention_hours),
    );
    if let Err(err) = history.load_from_storage(Utc::now()).await {
        log_error!("failed to load history, starting empty: {err:?}");
    }

    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (source_tx, source_rx) = mpsc::channel(SOURCE_CAPACITY);
    let (self_written, _) = watch::channel::<Option<String>>(None);
    let images = ImageAdapter::new(recognizer);

    let coordinator = MonitorCoordinator {
        settings,
        history,
        extractor,
        db,
        clipboard,
        images: images.clone(),
        notifications,
        message_db_path,
        timing,
        events: events.clone(),
        source_tx,
        self_written,
        running: false,
        adapters: HashMap::new(),
        statuses: SourceKind::ALL
            .iter()
            .map(|kind| (*kind, AdapterStatus::Idle))
            .collect(),
        next_generation: 0,
        last_code: None,
    };
    let mailboxes = Mailboxes {
        commands: command_rx,
        sources: source_rx,
    };
    Ok((
        coordinator,
        mailboxes,
        MonitorHandle::new(command_tx, events, images),
    ))
}

struct MonitorCoordinator {
    settings: SettingsStore,
    history: HistoryStore,
    extractor: CodeExtractor,
    db: Database,
    clipboard: Arc<dyn ClipboardAccess>,
    images: ImageAdapter,
    notifications: NotificationFeed,
    message_db_path: Option<PathBuf>,
    timing: MonitorTiming,
    events: broadcast::Sender<MonitorEvent>,
    source_tx: mpsc::Sender<SourceMessage>,
    self_written: watch::Sender<Option<String>>,
    running: bool,
    adapters: HashMap<SourceKind, RunningAdapter>,
    statuses: HashMap<SourceKind, AdapterStatus>,
    next_generation: u64,
    last_code: Option<String>,
}

impl MonitorCoordinator {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut sources: mpsc::Receiver<SourceMessage>,
    ) {
        let period = self.timing.eviction_interval;
        let mut eviction = tokio::time::interval_at(Instant::now() + period, period);
        eviction.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let keep_running = match command {
                        Some(command) => self.handle_command(command).await,
                        None => false,
                    };
                    if !keep_running {
                        self.stop();
                        break;
                    }
                }
                Some(message) = sources.recv() => self.handle_source_message(message).await,
                _ = eviction.tick() => self.evict_expired().await,
            }
        }

        log_info!("monitor coordinator stopped");
    }

    /// False once the coordinator should exit.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start(reply) => {
                self.start();
                let _ = reply.send(self.snapshot());
            }
            Command::Stop(reply) => {
                self.stop();
                let _ = reply.send(self.snapshot());
            }
            Command::SetSourceEnabled {
                kind,
                enabled,
                reply,
            } => {
                let _ = reply.send(self.set_source_enabled(kind, enabled).await);
            }
            Command::SetAutoClipboard { enabled, reply } => {
                let result = self.settings.update(|s| s.auto_clipboard = enabled).await;
                let _ = reply.send(result);
            }
            Command::SetClipboardInterval { secs, reply } => {
                let _ = reply.send(self.set_clipboard_interval(secs).await);
            }
            Command::SetRetentionHours { hours, reply } => {
                let _ = reply.send(self.set_retention_hours(hours).await);
            }
            Command::SetAiDetection { enabled, reply } => {
                let result = self
                    .settings
                    .update(|s| s.ai_detection_enabled = enabled)
                    .await;
                if let Ok(settings) = &result {
                    self.extractor.set_ai_enabled(settings.ai_detection_enabled);
                }
                let _ = reply.send(result);
            }
            Command::Settings(reply) => {
                let _ = reply.send(self.settings.get().clone());
            }
            Command::ClearHistory(reply) => {
                let _ = reply.send(self.clear_history().await);
            }
            Command::History(reply) => {
                let _ = reply.send(self.history.records().to_vec());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Submit { inbound, reply } => {
                let record = self.ingest(inbound).await;
                let _ = reply.send(record);
            }
            Command::Shutdown(reply) => {
                self.stop();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn source_enabled(&self, kind: SourceKind) -> bool {
        let settings = self.settings.get();
        match kind {
            SourceKind::Clipboard => settings.monitoring_enabled,
            SourceKind::Notifications => settings.notifications_enabled,
            SourceKind::MessageStore => settings.message_store_enabled,
        }
    }

    fn start(&mut self) {
        if self.running {
            log_debug!("monitor already running");
            return;
        }
        self.running = true;
        for kind in SourceKind::ALL {
            if self.source_enabled(kind) {
                self.start_adapter(kind);
            }
        }
        log_info!("monitoring started ({} adapters)", self.adapters.len());
        self.emit(MonitorEvent::MonitorStateChanged { running: true });
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        for kind in SourceKind::ALL {
            self.stop_adapter(kind);
        }
        self.running = false;
        log_info!("monitoring stopped");
        self.emit(MonitorEvent::MonitorStateChanged { running: false });
    }

    /// Start (or restart) one adapter under a fresh generation.
    fn start_adapter(&mut self, kind: SourceKind) {
        self.cancel_adapter(kind);

        self.next_generation += 1;
        let generation = self.next_generation;
        let token = CancellationToken::new();
        let link = SourceLink::new(kind, generation, token.clone(), self.source_tx.clone());

        let task = match kind {
            SourceKind::Clipboard => {
                let poller = ClipboardPoller::new(
                    Arc::clone(&self.clipboard),
                    self.images.clone(),
                    self.self_written.subscribe(),
                    link,
                );
                let period = self.settings.get().clipboard_poll_interval();
                spawn_periodic("clipboard poller", period, token.clone(), poller)
            }
            SourceKind::Notifications => {
                NotificationListener::new(self.notifications.clone(), link).spawn()
            }
            SourceKind::MessageStore => {
                let Some(path) = self.message_db_path.clone() else {
                    self.set_status(
                        kind,
                        AdapterStatus::Unavailable("no message store configured".to_string()),
                    );
                    return;
                };
                let reader = MessageStoreReader::new(path, self.db.clone(), link);
                spawn_periodic(
                    "message store reader",
                    self.timing.message_poll,
                    token.clone(),
                    reader,
                )
            }
        };

        log_debug!("{} adapter started (generation {generation})", kind.as_str());
        self.adapters.insert(
            kind,
            RunningAdapter {
                generation,
                token,
                _task: task,
            },
        );
        self.set_status(kind, AdapterStatus::Running);
    }

    /// Cancel without waiting; anything the task still produces is discarded.
    fn cancel_adapter(&mut self, kind: SourceKind) -> bool {
        match self.adapters.remove(&kind) {
            Some(adapter) => {
                adapter.token.cancel();
                true
            }
            None => false,
        }
    }

    fn stop_adapter(&mut self, kind: SourceKind) {
        if self.cancel_adapter(kind) {
            log_debug!("{} adapter stopped", kind.as_str());
        }
        self.set_status(kind, AdapterStatus::Idle);
    }

    fn set_status(&mut self, kind: SourceKind, status: AdapterStatus) {
        if self.statuses.get(&kind) == Some(&status) {
            return;
        }
        match &status {
            AdapterStatus::PermissionDenied(reason) | AdapterStatus::Unavailable(reason) => {
                log_warn!("{} adapter: {reason}", kind.as_str())
            }
            _ => {}
        }
        self.statuses.insert(kind, status.clone());
        self.emit(MonitorEvent::SourceStatusChanged {
            source: kind,
            status,
        });
    }

    async fn set_source_enabled(
        &mut self,
        kind: SourceKind,
        enabled: bool,
    ) -> Result<MonitorSettings> {
        let settings = self
            .settings
            .update(|s| match kind {
                SourceKind::Clipboard => s.monitoring_enabled = enabled,
                SourceKind::Notifications => s.notifications_enabled = enabled,
                SourceKind::MessageStore => s.message_store_enabled = enabled,
            })
            .await?;

        if self.running {
            if enabled {
                if !self.adapters.contains_key(&kind) {
                    self.start_adapter(kind);
                }
            } else {
                self.stop_adapter(kind);
            }
        }
        Ok(settings)
    }

    async fn set_clipboard_interval(&mut self, secs: f64) -> Result<MonitorSettings> {
        let settings = self
            .settings
            .update(|s| s.clipboard_poll_interval_secs = secs)
            .await?;
        if self.adapters.contains_key(&SourceKind::Clipboard) {
            self.start_adapter(SourceKind::Clipboard);
        }
        Ok(settings)
    }

    async fn set_retention_hours(&mut self, hours: f64) -> Result<MonitorSettings> {
        let settings = self
            .settings
            .update(|s| s.retention_hours = hours)
            .await?;
        self.history
            .set_retention(retention_from_hours(settings.retention_hours));
        self.evict_expired().await;
        Ok(settings)
    }

    async fn clear_history(&mut self) -> Result<()> {
        self.history.clear().await?;
        log_info!("history cleared");
        self.emit(MonitorEvent::HistoryCleared);
        Ok(())
    }

    async fn evict_expired(&mut self) {
        match self.history.evict_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(removed) => {
                log_info!("evicted {removed} expired codes");
                self.emit(MonitorEvent::HistoryEvicted { removed });
            }
            Err(err) => log_error!("history eviction failed: {err:?}"),
        }
    }

    async fn handle_source_message(&mut self, message: SourceMessage) {
        let (kind, generation) = match &message {
            SourceMessage::Input {
                kind, generation, ..
            }
            | SourceMessage::Status {
                kind, generation, ..
            } => (*kind, *generation),
        };

        let current = self.adapters.get(&kind).map(|adapter| adapter.generation);
        if current != Some(generation) {
            log_debug!(
                "discarding stale {} message (generation {generation})",
                kind.as_str()
            );
            return;
        }

        match message {
            SourceMessage::Input { inbound, .. } => {
                self.ingest(inbound).await;
            }
            SourceMessage::Status { status, .. } => self.set_status(kind, status),
        }
    }

    /// Extract, dedupe and record. Returns the record when one was accepted.
    async fn ingest(&mut self, inbound: Inbound) -> Option<CodeRecord> {
        let source = inbound.source;
        let Some(code) = self.extractor.extract(&inbound.text) else {
            log_debug!(
                "no code in {} input ({} chars)",
                source.as_str(),
                inbound.text.chars().count()
            );
            return None;
        };

        let record = CodeRecord::new(code, source, inbound.observed_at);
        if self.history.is_expired(&record, Utc::now()) {
            log_debug!("ignoring {} code older than the retention window", source.as_str());
            return None;
        }
        if self.is_recent_duplicate(&record) {
            log_debug!("ignoring repeated {} code", source.as_str());
            return None;
        }

        if let Err(err) = self.history.insert(record.clone()).await {
            log_error!("failed to persist history: {err:?}");
        }
        log_info!(
            "accepted {}-digit code from {}",
            record.code.len(),
            source.as_str()
        );
        self.last_code = Some(record.code.clone());
        self.emit(MonitorEvent::RecordInserted {
            record: record.clone(),
        });

        if self.settings.get().auto_clipboard {
            self.copy_to_clipboard(record.code.clone());
        }
        Some(record)
    }

    fn is_recent_duplicate(&self, record: &CodeRecord) -> bool {
        let window = self.timing.duplicate_window.num_milliseconds();
        self.history.records().iter().any(|existing| {
            existing.code == record.code
                && (record.timestamp - existing.timestamp)
                    .num_milliseconds()
                    .abs()
                    <= window
        })
    }

    fn copy_to_clipboard(&self, code: String) {
        self.self_written.send_replace(Some(code.clone()));
        let clipboard = Arc::clone(&self.clipboard);
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || clipboard.write_text(&code)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log_warn!("auto-copy to clipboard failed: {err:?}"),
                Err(err) => log_warn!("auto-copy task failed: {err}"),
            }
        });
    }

    fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            running: self.running,
            sources: SourceKind::ALL
                .iter()
                .map(|kind| SourceSnapshot {
                    kind: *kind,
                    enabled: self.source_enabled(*kind),
                    status: self
                        .statuses
                        .get(kind)
                        .cloned()
                        .unwrap_or(AdapterStatus::Idle),
                })
                .collect(),
            history_len: self.history.len(),
            last_code: self.last_code.clone(),
            settings: self.settings.get().clone(),
        }
    }

    fn emit(&self, event: MonitorEvent) {
        log_debug!("emit {}", event.name());
        let _ = self.events.send(event);
    }
}
