use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::Database;

/// Key of the serialized history log.
pub const HISTORY_KEY: &str = "history";
/// Key of the last processed message-store row id.
pub const MESSAGE_CURSOR_KEY: &str = "message_cursor";

impl Database {
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv_store WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .with_context(|| format!("failed to read kv entry {key}"))?;
            Ok(value)
        })
        .await
    }

    pub async fn put_value(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write kv entry {key}"))?;
            Ok(())
        })
        .await
    }

    pub async fn load_history_blob(&self) -> Result<Option<String>> {
        self.get_value(HISTORY_KEY).await
    }

    pub async fn save_history_blob(&self, blob: String) -> Result<()> {
        self.put_value(HISTORY_KEY, blob).await
    }

    /// `None` when no cursor was ever stored; an unparsable value counts as missing.
    pub async fn load_message_cursor(&self) -> Result<Option<i64>> {
        let raw = self.get_value(MESSAGE_CURSOR_KEY).await?;
        Ok(raw.and_then(|value| value.trim().parse::<i64>().ok()))
    }

    pub async fn save_message_cursor(&self, cursor: i64) -> Result<()> {
        self.put_value(MESSAGE_CURSOR_KEY, cursor.to_string()).await
    }
}
