// ABOUTME: Durable append-only transcript store — one JSONL file per session.
// ABOUTME: First line is a meta record, every line after is a message; a truncated trailing line is skipped, never an error.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::Message;

/// The first line written to a transcript file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMeta {
    pub session_id: String,
    pub channel: String,
    pub created_at: DateTime<Utc>,
}

/// One line in a transcript file after the meta record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    pub message: Message,
}

/// Append-only, crash-tolerant transcript storage keyed by session id (§6).
///
/// Mirrors the teacher's `SessionLogger` (JSONL append, one line per write,
/// flushed immediately) combined with `session::persistence`'s atomic-write
/// discipline for anything that isn't a pure append — here, only file
/// creation needs atomicity, since every later write is a single `O_APPEND`
/// line.
pub struct TranscriptStore {
    sessions_dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.jsonl"))
    }

    /// Create a new transcript file with its meta record as the first line.
    /// No-op (returns existing meta) if the file already exists.
    pub fn create(&self, session_id: &str, channel: &str) -> Result<TranscriptMeta, StoreError> {
        let path = self.path_for(session_id);
        if path.exists() {
            if let Some(meta) = self.read_meta(&path)? {
                return Ok(meta);
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let meta = TranscriptMeta {
            session_id: session_id.to_string(),
            channel: channel.to_string(),
            created_at: Utc::now(),
        };

        let tmp_path = path.with_extension("jsonl.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            writeln!(tmp, "{}", serde_json::to_string(&meta)?)?;
        }
        fs::rename(&tmp_path, &path)?;

        Ok(meta)
    }

    /// Append one message as a new line. Creates the file (with a meta
    /// record derived from `channel`) first if it doesn't exist.
    pub fn append(&self, session_id: &str, channel: &str, message: &Message) -> Result<(), StoreError> {
        self.create(session_id, channel)?;

        let entry = TranscriptEntry {
            timestamp: Utc::now(),
            message: message.clone(),
        };

        let path = self.path_for(session_id);
        let mut file = OpenOptions::new().append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        file.flush()?;
        Ok(())
    }

    fn read_meta(&self, path: &Path) -> Result<Option<TranscriptMeta>, StoreError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut lines = BufReader::new(file).lines();
        match lines.next() {
            Some(Ok(line)) => match serde_json::from_str(&line) {
                Ok(meta) => Ok(Some(meta)),
                Err(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Load the last `limit` messages for a session, tolerating a
    /// truncated final line left by a crash mid-write.
    pub fn load_tail(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let path = self.path_for(session_id);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut lines = BufReader::new(file).lines();
        lines.next(); // skip the meta record

        let mut messages: Vec<Message> = Vec::new();
        for line in lines {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptEntry>(&line) {
                Ok(entry) => messages.push(entry.message),
                // A partial trailing line from an interrupted write is
                // skipped rather than surfaced as an error (§6).
                Err(_) => break,
            }
        }

        let start = messages.len().saturating_sub(limit);
        Ok(messages.split_off(start))
    }
}
