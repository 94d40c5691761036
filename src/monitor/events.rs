use serde::Serialize;

use crate::models::CodeRecord;
use crate::settings::MonitorSettings;
use crate::sources::{AdapterStatus, SourceKind};

/// Broadcast to every subscriber of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum MonitorEvent {
    RecordInserted {
        record: CodeRecord,
    },
    MonitorStateChanged {
        running: bool,
    },
    SourceStatusChanged {
        source: SourceKind,
        status: AdapterStatus,
    },
    HistoryEvicted {
        removed: usize,
    },
    HistoryCleared,
}

impl MonitorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::RecordInserted { .. } => "record-inserted",
            MonitorEvent::MonitorStateChanged { .. } => "monitor-state-changed",
            MonitorEvent::SourceStatusChanged { .. } => "source-status-changed",
            MonitorEvent::HistoryEvicted { .. } => "history-evicted",
            MonitorEvent::HistoryCleared => "history-cleared",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSnapshot {
    pub kind: SourceKind,
    pub enabled: bool,
    pub status: AdapterStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub running: bool,
    pub sources: Vec<SourceSnapshot>,
    pub history_len: usize,
    pub last_code: Option<String>,
    pub settings: MonitorSettings,
}

impl MonitorSnapshot {
    pub fn source(&self, kind: SourceKind) -> Option<&SourceSnapshot> {
        self.sources.iter().find(|source| source.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CodeSource;
    use chrono::Utc;

    #[test]
    fn events_serialize_with_kebab_case_tag() {
        let record = CodeRecord::new("482913", CodeSource::Sms, Utc::now());
        let event = MonitorEvent::RecordInserted { record };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["record"]["code"], "482913");
        assert_eq!(json["record"]["source"], "sms");

        let status = MonitorEvent::SourceStatusChanged {
            source: SourceKind::MessageStore,
            status: AdapterStatus::PermissionDenied("no access".to_string()),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["event"], "source-status-changed");
        assert_eq!(json["source"], "messageStore");
        assert_eq!(json["status"]["state"], "permissionDenied");
        assert_eq!(json["status"]["reason"], "no access");

        let cleared = serde_json::to_value(MonitorEvent::HistoryCleared).unwrap();
        assert_eq!(cleared["event"], "history-cleared");
    }
}
