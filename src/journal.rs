//! Append-only JSONL record of completed exchanges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

use crate::context::ExchangeContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub timestamp: DateTime<Utc>,
    pub id: Uuid,
    pub method: String,
    pub original_path: String,
    pub rewritten_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub provider_injected: bool,
    pub streaming_requested: bool,
    /// `None` when the upstream could not be reached.
    pub status: Option<u16>,
    pub streamed: bool,
    /// Streaming was requested but the upstream answered without a stream.
    #[serde(default)]
    pub stream_mismatch: bool,
    /// Message extracted from an inspected upstream error body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_error: Option<String>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExchangeRecord {
    #[must_use]
    pub fn from_context(ctx: &ExchangeContext, status: Option<u16>) -> Self {
        Self {
            timestamp: Utc::now(),
            id: ctx.id,
            method: ctx.method.to_string(),
            original_path: ctx.original_path.clone(),
            rewritten_path: ctx.rewritten_path.clone(),
            model: ctx.model.clone(),
            provider: ctx.provider.clone(),
            provider_injected: ctx.provider.is_some() && !ctx.provider_already_set,
            streaming_requested: ctx.streaming_requested,
            status,
            streamed: false,
            stream_mismatch: false,
            upstream_error: None,
            elapsed_ms: ctx.elapsed_ms(),
            error: None,
        }
    }

    #[must_use]
    pub fn streamed(mut self, streamed: bool) -> Self {
        self.streamed = streamed;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

struct Journal {
    writer: BufWriter<File>,
}

impl Journal {
    fn open(file_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn append(&mut self, record: &ExchangeRecord) -> std::io::Result<()> {
        let json = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()
    }
}

/// Cloneable handle shared by all handlers. Write failures are logged and
/// never reach the caller.
#[derive(Clone)]
pub struct SharedJournal(Arc<Mutex<Journal>>);

impl SharedJournal {
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Journal::open(file_path.as_ref())?))))
    }

    /// Append `record`. Inside a tokio runtime the write runs on the blocking
    /// pool; elsewhere it runs inline.
    pub fn record(&self, record: ExchangeRecord) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let journal = self.clone();
                handle.spawn_blocking(move || journal.write(&record));
            }
            Err(_) => self.write(&record),
        }
    }

    fn write(&self, record: &ExchangeRecord) {
        let mut journal = self.0.lock().unwrap_or_else(|poisoned| {
            warn!("Journal lock poisoned; continuing with the last written state");
            poisoned.into_inner()
        });
        if let Err(e) = journal.append(record) {
            warn!(exchange = %record.id, "Failed to write journal record: {e}");
        }
    }
}
