//! In-process feed of delivered notifications.
//!
//! Producers (the unix bridge, or an embedding application) publish
//! [`NotificationEvent`]s and the current access state; the listener forwards title and
//! body text to the coordinator while access is granted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

use super::{AdapterStatus, Inbound, SourceLink};
use crate::models::CodeSource;

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "Utc::now")]
    pub delivered_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(title: Option<&str>, body: Option<&str>) -> Self {
        Self {
            app: None,
            title: title.map(str::to_string),
            body: body.map(str::to_string),
            delivered_at: Utc::now(),
        }
    }

    /// Title and body joined by a newline, skipping empty parts.
    pub fn text_payload(&self) -> Option<String> {
        let parts: Vec<&str> = [self.title.as_deref(), self.body.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedPermission {
    Granted,
    Denied(String),
    Unavailable(String),
}

impl FeedPermission {
    fn status(&self) -> AdapterStatus {
        match self {
            FeedPermission::Granted => AdapterStatus::Running,
            FeedPermission::Denied(reason) => AdapterStatus::PermissionDenied(reason.clone()),
            FeedPermission::Unavailable(reason) => AdapterStatus::Unavailable(reason.clone()),
        }
    }
}

#[derive(Clone)]
pub struct NotificationFeed {
    events: broadcast::Sender<NotificationEvent>,
    permission: Arc<watch::Sender<FeedPermission>>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(FEED_CAPACITY);
        let (permission, _) = watch::channel(FeedPermission::Unavailable(
            "no notification provider attached".to_string(),
        ));
        Self {
            events,
            permission: Arc::new(permission),
        }
    }

    /// Number of listeners that received the event.
    pub fn publish(&self, event: NotificationEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    pub fn set_permission(&self, permission: FeedPermission) {
        log_info!("notification access now {:?}", permission);
        self.permission.send_replace(permission);
    }

    pub fn permission(&self) -> FeedPermission {
        self.permission.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events.subscribe()
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new()
    }
}

pub struct NotificationListener {
    feed: NotificationFeed,
    link: SourceLink,
}

impl NotificationListener {
    pub fn new(feed: NotificationFeed, link: SourceLink) -> Self {
        Self { feed, link }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut events = self.feed.subscribe();
        let mut permission = self.feed.permission.subscribe();
        let current = permission.borrow_and_update().clone();
        let mut granted = self.apply_permission(&current).await;

        loop {
            tokio::select! {
                biased;
                _ = self.link.token().cancelled() => {
                    log_info!("notification listener shutting down");
                    break;
                }
                changed = permission.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = permission.borrow_and_update().clone();
                    granted = self.apply_permission(&current).await;
                }
                received = events.recv() => match received {
                    Ok(event) => {
                        if !granted {
                            log_debug!("dropping notification while access is not granted");
                            continue;
                        }
                        let Some(text) = event.text_payload() else {
                            continue;
                        };
                        let inbound = Inbound::new(CodeSource::Notification, text, event.delivered_at);
                        if !self.link.forward(inbound).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log_warn!("notification listener lagged, skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    async fn apply_permission(&self, permission: &FeedPermission) -> bool {
        self.link.report(permission.status()).await;
        *permission == FeedPermission::Granted
    }
}
