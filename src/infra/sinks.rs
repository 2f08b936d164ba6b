use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::app::ports::EventSink;
use crate::constants::SOURCETYPE;
use crate::error::SinkError;
use crate::types::Event;

/// Shape of one delivered event as written by the bundled sinks.
#[derive(Debug, Serialize)]
pub struct SinkRecord<'a> {
    pub source: &'a str,
    pub sourcetype: &'a str,
    pub time: DateTime<Utc>,
    pub event_id: &'a str,
    pub event: &'a serde_json::Value,
}

impl<'a> SinkRecord<'a> {
    pub fn new(source: &'a str, event: &'a Event) -> Self {
        Self {
            source,
            sourcetype: SOURCETYPE,
            time: event.observed_at,
            event_id: &event.event_id,
            event: &event.payload,
        }
    }

    pub fn to_json_line(&self) -> Result<String, SinkError> {
        Ok(format!("{}\n", serde_json::to_string(self)?))
    }
}

/// Appends one JSON line per event to a file, flushing after each event.
pub struct NdjsonSink {
    path: PathBuf,
    source: String,
    file: Mutex<Option<File>>,
}

impl NdjsonSink {
    pub fn new<P: Into<PathBuf>>(path: P, source: &str) -> Self {
        Self { path: path.into(), source: source.to_string(), file: Mutex::new(None) }
    }

    async fn open(&self) -> Result<File, SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        debug!(path = %self.path.display(), "opened sink file");
        Ok(file)
    }
}

#[async_trait]
impl EventSink for NdjsonSink {
    async fn deliver(&self, event: &Event) -> Result<(), SinkError> {
        let line = SinkRecord::new(&self.source, event).to_json_line()?;
        let mut guard = self.file.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let Some(file) = guard.as_mut() else {
            return Err(SinkError("sink file unavailable".to_string()));
        };
        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;
        if let Err(e) = written {
            // Reopen on the next delivery rather than reuse a handle in an unknown state.
            *guard = None;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Writes one JSON line per event to standard output.
pub struct StdoutSink {
    source: String,
}

impl StdoutSink {
    pub fn new(source: &str) -> Self {
        Self { source: source.to_string() }
    }
}

#[async_trait]
impl EventSink for StdoutSink {
    async fn deliver(&self, event: &Event) -> Result<(), SinkError> {
        let line = SinkRecord::new(&self.source, event).to_json_line()?;
        let mut out = tokio::io::stdout();
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}
