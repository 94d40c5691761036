use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Channel a code was extracted from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CodeSource {
    Clipboard,
    Notification,
    Sms,
    Image,
}

impl CodeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeSource::Clipboard => "clipboard",
            CodeSource::Notification => "notification",
            CodeSource::Sms => "sms",
            CodeSource::Image => "image",
        }
    }
}

/// One accepted extraction. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeRecord {
    pub id: Uuid,
    pub code: String,
    pub source: CodeSource,
    pub timestamp: DateTime<Utc>,
}

impl CodeRecord {
    pub fn new(code: impl Into<String>, source: CodeSource, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            source,
            timestamp,
        }
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.timestamp
    }
}
