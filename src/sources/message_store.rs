//! Incremental reader for the local message database (`~/Library/Messages/chat.db`).
//!
//! Rows newer than the persisted cursor are forwarded oldest-first. The file is opened
//! read-only on every poll; failing to open it is reported as a permission problem.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use std::future::Future;
use std::path::{Path, PathBuf};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

use super::scheduler::Periodic;
use super::{AdapterStatus, Inbound, SourceLink};
use crate::db::Database;
use crate::models::CodeSource;

pub const DEFAULT_MESSAGE_POLL_SECS: u64 = 5;
pub const MESSAGE_BATCH_LIMIT: i64 = 50;

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;
/// Dates above this are nanoseconds since the Apple epoch, below it seconds.
const NANOSECOND_DATE_THRESHOLD: i64 = 1_000_000_000_000;

pub fn default_message_db_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("Library").join("Messages").join("chat.db"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: i64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAccess {
    Readable,
    Missing,
    Denied,
}

pub fn check_access(path: &Path) -> StoreAccess {
    match std::fs::File::open(path) {
        Ok(_) => StoreAccess::Readable,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreAccess::Missing,
        Err(_) => StoreAccess::Denied,
    }
}

pub fn apple_date_to_utc(raw: i64) -> DateTime<Utc> {
    let (secs, nanos) = if raw.abs() > NANOSECOND_DATE_THRESHOLD {
        (raw.div_euclid(1_000_000_000), raw.rem_euclid(1_000_000_000) as u32)
    } else {
        (raw, 0)
    };
    Utc.timestamp_opt(secs + APPLE_EPOCH_OFFSET_SECS, nanos)
        .single()
        .unwrap_or_else(Utc::now)
}

fn open_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open message store {}", path.display()))
}

/// Rows read by one poll. `newest_id` covers every row the query saw, including rows
/// whose text could not be decoded, so the cursor never stalls behind them.
#[derive(Debug, Default)]
pub struct MessageBatch {
    pub messages: Vec<MessageRow>,
    pub newest_id: Option<i64>,
}

fn decode_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Integer(number) => Some(number.to_string()),
        ValueRef::Real(number) => Some(number.to_string()),
        ValueRef::Null => None,
    }
}

fn decode_date(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Integer(raw) => Some(raw),
        ValueRef::Real(raw) if raw.is_finite() => Some(raw as i64),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok(),
        _ => None,
    }
}

fn decode_row(id: i64, row: &rusqlite::Row<'_>) -> Option<MessageRow> {
    let text = row.get_ref(1).ok().and_then(decode_text)?;
    if text.trim().is_empty() {
        return None;
    }
    let date = row.get_ref(2).ok().and_then(decode_date);
    Some(MessageRow {
        id,
        text,
        timestamp: date.map(apple_date_to_utc).unwrap_or_else(Utc::now),
    })
}

/// Up to `limit` of the newest rows after `cursor`, returned oldest-first. Text with
/// invalid UTF-8 is repaired lossily; rows that still cannot be decoded are skipped.
pub fn fetch_messages_after(path: &Path, cursor: i64, limit: i64) -> Result<MessageBatch> {
    let conn = open_read_only(path)?;
    let mut stmt = conn
        .prepare(
            "SELECT ROWID, text, date FROM message
             WHERE ROWID > ?1 AND text IS NOT NULL AND text != ''
             ORDER BY ROWID DESC
             LIMIT ?2",
        )
        .context("failed to prepare message query")?;

    let mut rows = stmt
        .query(params![cursor, limit])
        .context("failed to query messages")?;

    let mut batch = MessageBatch::default();
    while let Some(row) = rows.next().context("failed to read message rows")? {
        let id: i64 = row.get(0).context("failed to read message id")?;
        batch.newest_id = Some(batch.newest_id.map_or(id, |newest| newest.max(id)));
        match decode_row(id, row) {
            Some(message) => batch.messages.push(message),
            None => log_debug!("skipping undecodable message row {id}"),
        }
    }
    batch.messages.reverse();
    Ok(batch)
}

pub fn fetch_max_row_id(path: &Path) -> Result<Option<i64>> {
    let conn = open_read_only(path)?;
    let max = conn
        .query_row("SELECT MAX(ROWID) FROM message", [], |row| row.get(0))
        .context("failed to read latest message id")?;
    Ok(max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Unloaded,
    Unset,
    At(i64),
}

pub struct MessageStoreReader {
    db_path: PathBuf,
    state: Database,
    cursor: Cursor,
    last_access: Option<StoreAccess>,
    link: SourceLink,
}

impl MessageStoreReader {
    pub fn new(db_path: PathBuf, state: Database, link: SourceLink) -> Self {
        Self {
            db_path,
            state,
            cursor: Cursor::Unloaded,
            last_access: None,
            link,
        }
    }

    pub fn cursor(&self) -> Option<i64> {
        match self.cursor {
            Cursor::At(id) => Some(id),
            _ => None,
        }
    }

    /// One poll: new rows as pipeline input. Nothing is returned while the store is
    /// unreadable or the cursor is being established.
    pub async fn poll_once(&mut self) -> Vec<Inbound> {
        if !self.refresh_access().await {
            return Vec::new();
        }

        if self.cursor == Cursor::Unloaded {
            self.cursor = match self.state.load_message_cursor().await {
                Ok(Some(id)) => Cursor::At(id),
                Ok(None) => Cursor::Unset,
                Err(err) => {
                    log_warn!("failed to load message cursor: {err:?}");
                    return Vec::new();
                }
            };
        }

        let path = self.db_path.clone();
        match self.cursor {
            Cursor::Unloaded => Vec::new(),
            Cursor::Unset => {
                let max = tokio::task::spawn_blocking(move || fetch_max_row_id(&path)).await;
                match max {
                    Ok(Ok(max)) => {
                        let baseline = max.unwrap_or(0);
                        log_info!("message store cursor baselined at {baseline}");
                        self.advance(baseline).await;
                    }
                    Ok(Err(err)) => log_warn!("message store baseline failed: {err:?}"),
                    Err(err) => log_warn!("message store task failed: {err}"),
                }
                Vec::new()
            }
            Cursor::At(cursor) => {
                let fetched = tokio::task::spawn_blocking(move || {
                    fetch_messages_after(&path, cursor, MESSAGE_BATCH_LIMIT)
                })
                .await;
                let batch = match fetched {
                    Ok(Ok(batch)) => batch,
                    Ok(Err(err)) => {
                        log_warn!("message store poll failed: {err:?}");
                        return Vec::new();
                    }
                    Err(err) => {
                        log_warn!("message store task failed: {err}");
                        return Vec::new();
                    }
                };

                if let Some(newest) = batch.newest_id {
                    log_debug!(
                        "message store: {} new rows up to {newest}",
                        batch.messages.len()
                    );
                    self.advance(newest).await;
                }

                batch
                    .messages
                    .into_iter()
                    .map(|row| Inbound::new(CodeSource::Sms, row.text, row.timestamp))
                    .collect()
            }
        }
    }

    async fn advance(&mut self, cursor: i64) {
        self.cursor = Cursor::At(cursor);
        if let Err(err) = self.state.save_message_cursor(cursor).await {
            log_warn!("failed to persist message cursor {cursor}: {err:?}");
        }
    }

    /// Re-check readability and report a status change. True when readable.
    async fn refresh_access(&mut self) -> bool {
        let path = self.db_path.clone();
        let access = tokio::task::spawn_blocking(move || check_access(&path))
            .await
            .unwrap_or(StoreAccess::Denied);

        if self.last_access != Some(access) {
            self.last_access = Some(access);
            let status = match access {
                StoreAccess::Readable => AdapterStatus::Running,
                StoreAccess::Missing => AdapterStatus::Unavailable(format!(
                    "message store {} not found",
                    self.db_path.display()
                )),
                StoreAccess::Denied => AdapterStatus::PermissionDenied(format!(
                    "full disk access required to read {}",
                    self.db_path.display()
                )),
            };
            log_info!("message store access: {:?}", access);
            self.link.report(status).await;
        }

        access == StoreAccess::Readable
    }
}

impl Periodic for MessageStoreReader {
    fn tick(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            for inbound in self.poll_once().await {
                if !self.link.forward(inbound).await {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Minimal `chat.db` with the columns the reader queries.
    pub fn create_store(path: &Path) -> Connection {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE message (
                ROWID INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT,
                date INTEGER
            );",
        )
        .unwrap();
        conn
    }

    pub fn insert_message(conn: &Connection, text: Option<&str>, date: i64) -> i64 {
        conn.execute(
            "INSERT INTO message (text, date) VALUES (?1, ?2)",
            params![text, date],
        )
        .unwrap();
        conn.last_insert_rowid()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{create_store, insert_message};
    use super::*;
    use crate::sources::test_support::link;
    use crate::sources::{SourceKind, SourceMessage};

    #[test]
    fn converts_apple_dates() {
        let seconds = apple_date_to_utc(0);
        assert_eq!(seconds.to_rfc3339(), "2001-01-01T00:00:00+00:00");

        let nanos = apple_date_to_utc(700_000_000_000_000_000);
        assert_eq!(nanos, apple_date_to_utc(700_000_000));
    }

    #[test]
    fn fetches_new_rows_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let conn = create_store(&path);
        let first = insert_message(&conn, Some("old 111111"), 10);
        insert_message(&conn, Some("code 222222"), 20);
        insert_message(&conn, None, 30);
        insert_message(&conn, Some(""), 40);
        insert_message(&conn, Some("code 333333"), 50);

        let rows = fetch_messages_after(&path, first, MESSAGE_BATCH_LIMIT)
            .unwrap()
            .messages;
        let texts: Vec<_> = rows.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["code 222222", "code 333333"]);
        assert_eq!(rows[0].timestamp, apple_date_to_utc(20));

        assert_eq!(fetch_max_row_id(&path).unwrap(), Some(5));
    }

    #[test]
    fn batch_keeps_the_newest_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let conn = create_store(&path);
        for i in 0..5 {
            insert_message(&conn, Some(&format!("message {i}")), i);
        }

        let rows = fetch_messages_after(&path, 0, 2).unwrap().messages;
        let ids: Vec<_> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn baselines_then_forwards_new_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let conn = create_store(&path);
        insert_message(&conn, Some("ancient code 999999"), 1);
        let state = Database::new(dir.path().join("state.sqlite3")).unwrap();

        let (link, mut rx) = link(SourceKind::MessageStore);
        let mut reader = MessageStoreReader::new(path.clone(), state.clone(), link);

        assert!(reader.poll_once().await.is_empty());
        assert_eq!(reader.cursor(), Some(1));
        assert!(matches!(
            rx.try_recv(),
            Ok(SourceMessage::Status { status: AdapterStatus::Running, .. })
        ));

        insert_message(&conn, Some("Your code is 482913"), 100);
        insert_message(&conn, Some("验证码 735194"), 200);
        let found = reader.poll_once().await;
        let texts: Vec<_> = found.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["Your code is 482913", "验证码 735194"]);
        assert!(found.iter().all(|i| i.source == CodeSource::Sms));
        assert_eq!(found[1].observed_at, apple_date_to_utc(200));

        assert!(reader.poll_once().await.is_empty());
        assert_eq!(state.load_message_cursor().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn resumes_from_persisted_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let conn = create_store(&path);
        insert_message(&conn, Some("seen 111111"), 1);
        insert_message(&conn, Some("unseen 222222"), 2);
        let state = Database::new(dir.path().join("state.sqlite3")).unwrap();
        state.save_message_cursor(1).await.unwrap();

        let (link, _rx) = link(SourceKind::MessageStore);
        let mut reader = MessageStoreReader::new(path, state, link);
        let found = reader.poll_once().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "unseen 222222");
    }

    #[test]
    fn repairs_invalid_utf8_and_lenient_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let conn = create_store(&path);
        conn.execute(
            "INSERT INTO message (text, date) VALUES (CAST(X'636f6465ff20313131313131' AS TEXT), 2)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO message (text, date) VALUES (X'636f646520323232323232', 3.5)",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO message (text, date) VALUES ('   ', 4)", [])
            .unwrap();

        let batch = fetch_messages_after(&path, 0, MESSAGE_BATCH_LIMIT).unwrap();
        assert_eq!(batch.newest_id, Some(3));
        let texts: Vec<_> = batch.messages.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["code\u{FFFD} 111111", "code 222222"]);
        assert_eq!(batch.messages[1].timestamp, apple_date_to_utc(3));
    }

    #[tokio::test]
    async fn undecodable_rows_do_not_stall_the_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let conn = create_store(&path);
        insert_message(&conn, Some("seen 000000"), 1);
        conn.execute(
            "INSERT INTO message (text, date) VALUES (CAST(X'636f6465ff20313131313131' AS TEXT), 2)",
            [],
        )
        .unwrap();
        insert_message(&conn, Some("Your code is 482913"), 3);
        let state = Database::new(dir.path().join("state.sqlite3")).unwrap();
        state.save_message_cursor(1).await.unwrap();

        let (link, _rx) = link(SourceKind::MessageStore);
        let mut reader = MessageStoreReader::new(path, state.clone(), link);
        let found = reader.poll_once().await;
        let texts: Vec<_> = found.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["code\u{FFFD} 111111", "Your code is 482913"]);
        assert_eq!(reader.cursor(), Some(3));
        assert_eq!(state.load_message_cursor().await.unwrap(), Some(3));

        assert!(reader.poll_once().await.is_empty());
    }

    #[tokio::test]
    async fn missing_store_reports_status_without_crashing() {
        let dir = tempfile::tempdir().unwrap();
        let state = Database::new(dir.path().join("state.sqlite3")).unwrap();
        let (link, mut rx) = link(SourceKind::MessageStore);
        let mut reader = MessageStoreReader::new(dir.path().join("absent.db"), state, link);

        assert!(reader.poll_once().await.is_empty());
        assert!(reader.poll_once().await.is_empty());
        assert!(matches!(
            rx.try_recv(),
            Ok(SourceMessage::Status { status: AdapterStatus::Unavailable(_), .. })
        ));
        assert!(rx.try_recv().is_err());
    }
}
