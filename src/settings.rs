use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::history::DEFAULT_RETENTION_HOURS;

pub const DEFAULT_CLIPBOARD_POLL_SECS: f64 = 3.0;
pub const MIN_CLIPBOARD_POLL_SECS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Copy every accepted code to the clipboard
    pub auto_clipboard: bool,
    pub clipboard_poll_interval_secs: f64,
    /// Clipboard monitoring
    pub monitoring_enabled: bool,
    pub retention_hours: f64,
    /// Run the tokenized strategy before the keyword pattern
    pub ai_detection_enabled: bool,
    pub message_store_enabled: bool,
    pub notifications_enabled: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            auto_clipboard: true,
            clipboard_poll_interval_secs: DEFAULT_CLIPBOARD_POLL_SECS,
            monitoring_enabled: true,
            retention_hours: DEFAULT_RETENTION_HOURS,
            ai_detection_enabled: false,
            message_store_enabled: true,
            notifications_enabled: true,
        }
    }
}

impl MonitorSettings {
    /// Substitute defaults for zero or nonsensical values and clamp the poll interval.
    pub fn sanitized(mut self) -> Self {
        if !self.clipboard_poll_interval_secs.is_finite() || self.clipboard_poll_interval_secs <= 0.0
        {
            self.clipboard_poll_interval_secs = DEFAULT_CLIPBOARD_POLL_SECS;
        }
        self.clipboard_poll_interval_secs =
            self.clipboard_poll_interval_secs.max(MIN_CLIPBOARD_POLL_SECS);

        if !self.retention_hours.is_finite() || self.retention_hours <= 0.0 {
            self.retention_hours = DEFAULT_RETENTION_HOURS;
        }
        self
    }

    pub fn clipboard_poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.clipboard_poll_interval_secs.max(MIN_CLIPBOARD_POLL_SECS))
    }
}

/// JSON-file settings, owned by the monitor coordinator.
pub struct SettingsStore {
    path: PathBuf,
    data: MonitorSettings,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<MonitorSettings>(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings file {}: {err}", path.display());
                MonitorSettings::default()
            })
        } else {
            MonitorSettings::default()
        };

        Ok(Self {
            path,
            data: data.sanitized(),
        })
    }

    pub fn get(&self) -> &MonitorSettings {
        &self.data
    }

    /// Apply a change, sanitize and write it out. The in-memory copy only changes once
    /// the write succeeded. Returns the stored result.
    pub async fn update<F>(&mut self, change: F) -> Result<MonitorSettings>
    where
        F: FnOnce(&mut MonitorSettings),
    {
        let mut next = self.data.clone();
        change(&mut next);
        let next = next.sanitized();
        persist(self.path.clone(), &next).await?;
        self.data = next.clone();
        Ok(next)
    }
}

async fn persist(path: PathBuf, settings: &MonitorSettings) -> Result<()> {
    let serialized = serde_json::to_string_pretty(settings)?;
    tokio::task::spawn_blocking(move || {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    })
    .await
    .context("Settings write task failed")?
}
