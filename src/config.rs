//! Process-level configuration resolved from the environment.
//!
//! Runtime-tunable behavior lives in `settings.json` ([`crate::settings`]); this only
//! decides where things are.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::sources::message_store::default_message_db_path;
use crate::sources::ocr::DEFAULT_OCR_LANGUAGES;

pub const DATA_DIR_ENV: &str = "CODECATCHER_DATA_DIR";
pub const MESSAGES_DB_ENV: &str = "CODECATCHER_MESSAGES_DB";
pub const OCR_LANGS_ENV: &str = "CODECATCHER_OCR_LANGS";

const DB_FILE: &str = "codecatcher.sqlite3";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub message_db: Option<PathBuf>,
    pub bridge_socket: Option<PathBuf>,
    pub ocr_languages: String,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` in place of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let data_dir = match non_empty(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => match dirs::data_dir() {
                Some(dir) => dir.join("codecatcher"),
                None => bail!("could not determine a data directory; set {DATA_DIR_ENV}"),
            },
        };

        let message_db = non_empty(MESSAGES_DB_ENV)
            .map(PathBuf::from)
            .or_else(default_message_db_path);

        #[cfg(unix)]
        let bridge_socket = Some(crate::sources::notification_bridge::bridge_socket_path());
        #[cfg(not(unix))]
        let bridge_socket = None;

        let ocr_languages =
            non_empty(OCR_LANGS_ENV).unwrap_or_else(|| DEFAULT_OCR_LANGUAGES.to_string());

        Ok(Self {
            data_dir,
            message_db,
            bridge_socket,
            ocr_languages,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }
}
