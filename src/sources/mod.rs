//! Source adapters: independent producers of text for the extraction pipeline.
//!
//! Every adapter talks to the monitor coordinator through a [`SourceLink`], which stamps
//! each message with the adapter kind and the generation it was started under. The
//! coordinator ignores anything from a generation it no longer runs.

pub mod clipboard;
pub mod message_store;
#[cfg(unix)]
pub mod notification_bridge;
pub mod notifications;
pub mod ocr;
pub mod phash;
pub mod scheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::CodeSource;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Clipboard,
    Notifications,
    MessageStore,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [
        SourceKind::Clipboard,
        SourceKind::Notifications,
        SourceKind::MessageStore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Clipboard => "clipboard",
            SourceKind::Notifications => "notifications",
            SourceKind::MessageStore => "message-store",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum AdapterStatus {
    Idle,
    Running,
    PermissionDenied(String),
    Unavailable(String),
}

/// Raw text handed to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub source: CodeSource,
    pub text: String,
    pub observed_at: DateTime<Utc>,
}

impl Inbound {
    pub fn new(source: CodeSource, text: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            source,
            text: text.into(),
            observed_at,
        }
    }

    pub fn now(source: CodeSource, text: impl Into<String>) -> Self {
        Self::new(source, text, Utc::now())
    }
}

#[derive(Debug)]
pub enum SourceMessage {
    Input {
        kind: SourceKind,
        generation: u64,
        inbound: Inbound,
    },
    Status {
        kind: SourceKind,
        generation: u64,
        status: AdapterStatus,
    },
}

/// An adapter's return path to the coordinator.
#[derive(Clone)]
pub struct SourceLink {
    kind: SourceKind,
    generation: u64,
    token: CancellationToken,
    tx: mpsc::Sender<SourceMessage>,
}

impl SourceLink {
    pub fn new(
        kind: SourceKind,
        generation: u64,
        token: CancellationToken,
        tx: mpsc::Sender<SourceMessage>,
    ) -> Self {
        Self {
            kind,
            generation,
            token,
            tx,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Hand text to the coordinator. Returns `false` once the adapter has been stopped
    /// (the input is dropped) or the coordinator is gone.
    pub async fn forward(&self, inbound: Inbound) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.tx
            .send(SourceMessage::Input {
                kind: self.kind,
                generation: self.generation,
                inbound,
            })
            .await
            .is_ok()
    }

    pub async fn report(&self, status: AdapterStatus) {
        if self.is_cancelled() {
            return;
        }
        let _ = self
            .tx
            .send(SourceMessage::Status {
                kind: self.kind,
                generation: self.generation,
                status,
            })
            .await;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forward_stamps_kind_and_generation() {
        let (link, mut rx) = test_support::link(SourceKind::Notifications);
        assert!(link.forward(Inbound::now(CodeSource::Notification, "hi")).await);

        match rx.recv().await.unwrap() {
            SourceMessage::Input {
                kind,
                generation,
                inbound,
            } => {
                assert_eq!(kind, SourceKind::Notifications);
                assert_eq!(generation, 1);
                assert_eq!(inbound.text, "hi");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_link_drops_results() {
        let (link, mut rx) = test_support::link(SourceKind::Clipboard);
        link.token().cancel();

        assert!(!link.forward(Inbound::now(CodeSource::Clipboard, "482913")).await);
        link.report(AdapterStatus::Running).await;
        drop(link);
        assert!(rx.recv().await.is_none());
    }
}
