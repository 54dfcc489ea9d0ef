//! File-backed session store
//!
//! One pretty-printed JSON file per session, named
//! `{sessionId}_{type}_{epochMillis}.json`, under an injected directory.
//! Files are created with `create_new`, so an existing record is never
//! overwritten.

use std::collections::HashSet;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use common::error::{StorageError, StorageResult};
use common::sanitize::sanitize_key;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const SESSION_EXTENSION: &str = ".json";

/// A session file and its parsed content
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub filename: String,
    pub record: Value,
}

/// Row of the admin session list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub participant_username: String,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub session_type: String,
    pub duration: f64,
    pub session_duration: f64,
    pub file: String,
}

/// Dashboard counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_sessions: usize,
    pub today_sessions: usize,
    pub total_participants: usize,
    /// Mean of the non-zero durations, in milliseconds
    pub average_duration: u64,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a new session file and return its name
    pub async fn append(&self, session_type: &str, record: &Map<String, Value>) -> StorageResult<String> {
        let session_id = record
            .get("sessionId")
            .and_then(Value::as_str)
            .map(sanitize_key)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let session_type = Some(sanitize_key(session_type))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let body = serde_json::to_vec_pretty(record)?;
        let mut millis = Utc::now().timestamp_millis();

        loop {
            let filename = format!("{}_{}_{}{}", session_id, session_type, millis, SESSION_EXTENSION);
            let path = self.root.join(&filename);

            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match file {
                Ok(mut file) => {
                    file.write_all(&body)
                        .await
                        .map_err(|e| StorageError::io(&path, e))?;
                    file.flush().await.map_err(|e| StorageError::io(&path, e))?;
                    info!("Data saved to {}", path.display());
                    return Ok(filename);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} already exists, bumping timestamp", filename);
                    millis += 1;
                }
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }
    }

    async fn filenames(&self) -> StorageResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(SESSION_EXTENSION) && !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    async fn read(&self, filename: &str) -> StorageResult<StoredSession> {
        let path = self.root.join(filename);
        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        Ok(StoredSession {
            filename: filename.to_string(),
            record: serde_json::from_slice(&body)?,
        })
    }

    /// Every readable session; corrupted files are logged and skipped
    pub async fn list(&self) -> StorageResult<Vec<StoredSession>> {
        let mut sessions = Vec::new();
        for filename in self.filenames().await? {
            match self.read(&filename).await {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Skipping session file {}: {}", filename, e),
            }
        }
        Ok(sessions)
    }

    /// Admin list rows, newest first
    pub async fn summaries(&self) -> StorageResult<Vec<SessionSummary>> {
        let mut summaries: Vec<SessionSummary> = self
            .list()
            .await?
            .into_iter()
            .map(|session| summarize(&session))
            .collect();

        summaries.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(summaries)
    }

    /// The session whose file name starts with the sanitized id
    pub async fn find(&self, session_id: &str) -> StorageResult<Option<StoredSession>> {
        let prefix = sanitize_key(session_id);
        if prefix.is_empty() {
            return Ok(None);
        }
        let prefix = format!("{}_", prefix);

        let Some(filename) = self
            .filenames()
            .await?
            .into_iter()
            .find(|name| name.starts_with(&prefix))
        else {
            return Ok(None);
        };

        self.read(&filename).await.map(Some)
    }

    /// Raw bytes of a session file, for downloads
    pub async fn read_raw(&self, filename: &str) -> StorageResult<Vec<u8>> {
        let path = self.root.join(sanitize_filename(filename));
        tokio::fs::read(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))
    }

    pub async fn stats(&self) -> StorageResult<SessionStats> {
        let sessions = self.list().await?;
        let today = Utc::now().format("%Y-%m-%d").to_string();

        let mut participants = HashSet::new();
        let mut today_sessions = 0;
        let mut total_duration = 0.0;
        let mut counted = 0u32;

        for session in &sessions {
            if let Some(user) = session.record.get("userId").and_then(Value::as_str) {
                participants.insert(user.to_string());
            }
            if session
                .record
                .get("timestamp")
                .and_then(Value::as_str)
                .is_some_and(|ts| ts.starts_with(&today))
            {
                today_sessions += 1;
            }
            let duration = duration_ms(&session.record);
            if duration > 0.0 {
                total_duration += duration;
                counted += 1;
            }
        }

        Ok(SessionStats {
            total_sessions: sessions.len(),
            today_sessions,
            total_participants: participants.len(),
            average_duration: if counted == 0 {
                0
            } else {
                (total_duration / f64::from(counted)).round() as u64
            },
        })
    }

    /// Zip archive of every session file under `sessions/`
    pub async fn export_zip(&self) -> StorageResult<Vec<u8>> {
        let mut files = Vec::new();
        for filename in self.filenames().await? {
            let body = self.read_raw(&filename).await?;
            files.push((filename, body));
        }

        let root = self.root.clone();
        let archive = tokio::task::spawn_blocking(move || build_zip(&files))
            .await
            .map_err(|e| StorageError::io(&root, io::Error::other(e)))?
            .map_err(|e| StorageError::io(&root, e))?;

        info!("Exported {} bytes of session data", archive.len());
        Ok(archive)
    }
}

fn build_zip(files: &[(String, Vec<u8>)]) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buffer));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (filename, body) in files {
            zip.start_file(format!("sessions/{}", filename), options)
                .map_err(io::Error::other)?;
            zip.write_all(body)?;
        }

        zip.finish().map_err(io::Error::other)?;
    }
    Ok(buffer)
}

fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// `sessionDuration`, else `duration`, else last minus first timing, else 0
fn duration_ms(record: &Value) -> f64 {
    let number = |field: &str| record.get(field).and_then(as_number);

    if let Some(duration) = number("sessionDuration").or_else(|| number("duration")) {
        return duration;
    }

    match record.get("timings").and_then(Value::as_array) {
        Some(timings) if timings.len() > 1 => {
            let first = timings.first().and_then(as_number);
            let last = timings.last().and_then(as_number);
            match (first, last) {
                (Some(first), Some(last)) => last - first,
                _ => 0.0,
            }
        }
        _ => 0.0,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn summarize(session: &StoredSession) -> SessionSummary {
    let text = |field: &str| {
        session
            .record
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let duration = duration_ms(&session.record);

    SessionSummary {
        id: text("sessionId").unwrap_or_else(|| {
            session
                .filename
                .split('_')
                .next()
                .unwrap_or_default()
                .to_string()
        }),
        participant_username: text("userId").unwrap_or_else(|| "Anonymous".to_string()),
        date: text("timestamp"),
        session_type: text("context")
            .or_else(|| text("type"))
            .unwrap_or_else(|| "N/A".to_string()),
        duration,
        session_duration: duration,
        file: session.filename.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_append_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        let session = record(json!({ "sessionId": "abc", "text": "x" }));

        let first = store.append("manual", &session).await.unwrap();
        let second = store.append("manual", &session).await.unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("abc_manual_"));
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_append_sanitizes_key_parts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());

        let filename = store
            .append("../manual", &record(json!({ "sessionId": "a/b c" })))
            .await
            .unwrap();
        assert!(filename.starts_with("abc_manual_"));
        assert!(tmp.path().join(&filename).exists());
    }

    #[test]
    fn test_duration_fallbacks() {
        assert_eq!(duration_ms(&json!({ "sessionDuration": 1500, "duration": 9 })), 1500.0);
        assert_eq!(duration_ms(&json!({ "duration": "900" })), 900.0);
        assert_eq!(duration_ms(&json!({ "timings": [100, 250, 400] })), 300.0);
        assert_eq!(duration_ms(&json!({ "timings": [100] })), 0.0);
        assert_eq!(duration_ms(&json!({})), 0.0);
    }

    #[tokio::test]
    async fn test_read_side_skips_corrupted_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        let today = Utc::now().to_rfc3339();

        store
            .append(
                "manual",
                &record(json!({ "sessionId": "s1", "userId": "u1", "timestamp": today, "sessionDuration": 1000 })),
            )
            .await
            .unwrap();
        store
            .append(
                "webcam",
                &record(json!({ "sessionId": "s2", "userId": "u1", "timestamp": "2020-01-01T00:00:00Z", "sessionDuration": 3000 })),
            )
            .await
            .unwrap();
        std::fs::write(tmp.path().join("broken_manual_1.json"), b"{nope").unwrap();

        let summaries = store.summaries().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "s1");
        assert_eq!(summaries[1].session_type, "webcam");

        let stats = store.stats().await.unwrap();
        assert_eq!(
            stats,
            SessionStats {
                total_sessions: 2,
                today_sessions: 1,
                total_participants: 1,
                average_duration: 2000,
            }
        );

        let found = store.find("s2").await.unwrap().unwrap();
        assert_eq!(found.record["sessionId"], "s2");
        assert!(store.find("s3").await.unwrap().is_none());
        assert!(store.find("../").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_export_contains_every_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        store
            .append("manual", &record(json!({ "sessionId": "s1" })))
            .await
            .unwrap();

        let archive = store.export_zip().await.unwrap();
        let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
        assert_eq!(zip.len(), 1);
        assert!(zip.by_index(0).unwrap().name().starts_with("sessions/s1_manual_"));
    }
}
