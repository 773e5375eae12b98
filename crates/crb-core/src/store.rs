//! Append-only CSV store of user ↔ channel message mappings.
//!
//! Every public operation takes the store-wide lock for its whole duration and
//! performs its file I/O on the blocking pool. Lookups are linear scans in
//! insertion order; there is no index.

use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    domain::{MessageId, UserId},
    errors::Error,
    Result,
};

/// Column order of the backing file.
pub const HEADER: [&str; 5] = [
    "user_id",
    "user_message_id",
    "channel_message_id",
    "created_at",
    "user_name",
];

/// One forwarded user message and the channel post it became.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMapping {
    pub user_id: UserId,
    pub user_message_id: MessageId,
    pub channel_message_id: MessageId,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    pub user_name: String,
}

impl MessageMapping {
    /// Stamp a new record with the current time. A missing or blank name
    /// becomes `user_<user_id>`.
    pub fn new(
        user_id: UserId,
        user_message_id: MessageId,
        channel_message_id: MessageId,
        user_name: Option<String>,
    ) -> Self {
        let user_name = user_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_user_name(user_id));
        Self {
            user_id,
            user_message_id,
            channel_message_id,
            created_at: Utc::now(),
            user_name,
        }
    }
}

pub fn default_user_name(user_id: UserId) -> String {
    format!("user_{}", user_id.0)
}

/// Accepts RFC 3339 and offset-less ISO-8601 (read as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp: {raw:?}")))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Process-wide owner of the mapping file.
#[derive(Debug)]
pub struct MappingStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure the file exists, carries the expected header and is writable.
    ///
    /// Safe to call on every startup. Errors here must abort startup.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        match blocking(move || prepare_file(&path)).await {
            Ok(true) => {
                info!(path = %self.path.display(), "created mapping store");
                Ok(())
            }
            Ok(false) => {
                info!(path = %self.path.display(), "mapping store already exists");
                Ok(())
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to initialize mapping store");
                Err(e)
            }
        }
    }

    /// Append one record. Failures are logged and reported as `false`.
    pub async fn append(&self, record: MessageMapping) -> bool {
        let user_id = record.user_id.0;
        let channel_message_id = record.channel_message_id.0;

        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        match blocking(move || append_row(&path, &record)).await {
            Ok(()) => {
                info!(user_id, channel_message_id, "saved message mapping");
                true
            }
            Err(e) => {
                error!(user_id, channel_message_id, error = %e, "failed to save message mapping");
                false
            }
        }
    }

    /// User whose forwarded message became `channel_message_id`. First match wins.
    pub async fn find_user_by_channel_message(
        &self,
        channel_message_id: MessageId,
    ) -> Option<UserId> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let found = blocking(move || {
            scan(&path, |m| {
                (m.channel_message_id == channel_message_id).then_some(m.user_id)
            })
        })
        .await;

        match found {
            Ok(Some(user_id)) => {
                debug!(user_id = user_id.0, channel_message_id = channel_message_id.0, "found user for channel message");
                Some(user_id)
            }
            Ok(None) => {
                warn!(channel_message_id = channel_message_id.0, "no user for channel message");
                None
            }
            Err(e) => {
                error!(channel_message_id = channel_message_id.0, error = %e, "user lookup failed");
                None
            }
        }
    }

    /// The user's original message id for a given channel post.
    pub async fn find_user_message_id(
        &self,
        user_id: UserId,
        channel_message_id: MessageId,
    ) -> Option<MessageId> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let found = blocking(move || {
            scan(&path, |m| {
                (m.user_id == user_id && m.channel_message_id == channel_message_id)
                    .then_some(m.user_message_id)
            })
        })
        .await;

        found.unwrap_or_else(|e| {
            error!(user_id = user_id.0, channel_message_id = channel_message_id.0, error = %e, "user message lookup failed");
            None
        })
    }

    /// Number of data rows, header excluded. `0` if the file cannot be read.
    pub async fn count(&self) -> usize {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        blocking(move || count_rows(&path))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "failed to count message mappings");
                0
            })
    }

    /// Every record in insertion order. Empty if the file cannot be read.
    pub async fn list_all(&self) -> Vec<MessageMapping> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        blocking(move || read_all(&path))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "failed to read message mappings");
                Vec::new()
            })
    }

    /// Size of the backing file in bytes, `0` if it does not exist.
    pub async fn file_size(&self) -> u64 {
        let path = self.path.clone();
        blocking(move || Ok(fs::metadata(&path).map(|m| m.len()).unwrap_or(0)))
            .await
            .unwrap_or(0)
    }

    pub async fn close(&self) {
        // Wait out any in-flight operation; nothing is held open between calls.
        let _guard = self.lock.lock().await;
        info!(path = %self.path.display(), "mapping store closed");
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::External(format!("store task failed: {e}")))?
}

/// Returns `true` when a fresh header was written.
fn prepare_file(path: &Path) -> Result<bool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let is_empty = match fs::metadata(path) {
        Ok(md) if md.is_dir() => {
            return Err(Error::Store(format!("{} is a directory", path.display())));
        }
        Ok(md) => md.len() == 0,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => return Err(e.into()),
    };

    if is_empty {
        write_header(path)?;
        return Ok(true);
    }

    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let found: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if found != HEADER {
        return Err(Error::Store(format!(
            "unexpected header in {}: {:?} (want {:?})",
            path.display(),
            found,
            HEADER
        )));
    }

    // Writable check; the handle is dropped right away.
    OpenOptions::new().append(true).open(path)?;
    Ok(false)
}

fn write_header(path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(File::create(path)?);
    wtr.write_record(HEADER)?;
    wtr.flush()?;
    Ok(())
}

fn append_row(path: &Path, record: &MessageMapping) -> Result<()> {
    // Render the whole row first so the file only sees a single write.
    let mut row = Vec::new();
    {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut row);
        wtr.serialize(record)?;
        wtr.flush()?;
    }

    // The file may have been rotated away since startup.
    if fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true) {
        write_header(path)?;
    }

    let mut file = OpenOptions::new().read(true).append(true).open(path)?;
    let start = file.metadata()?.len();
    // Terminate a hand-edited or truncated last line so the row stays separate.
    if start > 0 && last_byte(&mut file, start)? != b'\n' {
        row.insert(0, b'\n');
    }
    if let Err(e) = file.write_all(&row).and_then(|_| file.sync_data()) {
        // Drop whatever part of the row made it to disk.
        let _ = file.set_len(start);
        return Err(e.into());
    }
    Ok(())
}

fn last_byte(file: &mut File, len: u64) -> Result<u8> {
    let mut buf = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn scan<T>(path: &Path, mut pick: impl FnMut(&MessageMapping) -> Option<T>) -> Result<Option<T>> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    for row in rdr.deserialize::<MessageMapping>() {
        if let Some(hit) = pick(&row?) {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}

fn count_rows(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut n = 0usize;
    for row in rdr.records() {
        row?;
        n += 1;
    }
    Ok(n)
}

fn read_all(path: &Path) -> Result<Vec<MessageMapping>> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    rdr.deserialize::<MessageMapping>()
        .map(|row| row.map_err(Error::from))
        .collect()
}
