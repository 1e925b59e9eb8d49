//! Channel-backed sinks and JSON-lines session persistence

use crate::config::{EmitFn, SinkEvent};
use crate::event::Event;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// A finished or in-flight recording session.
#[derive(Debug, Clone)]
pub struct RecordedSession {
    pub name: String,
    pub events: Vec<Event>,
}

impl RecordedSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
        }
    }
}

/// Streaming consumer for recorded events.
pub struct EventStream {
    rx: Receiver<(SinkEvent, bool)>,
}

impl EventStream {
    /// Build a channel-backed sink. Pass the returned function as the
    /// recording's `emit` and drain events from the stream. When the
    /// channel is full the event is dropped with a warning; recording
    /// never blocks on a slow consumer.
    pub fn channel(capacity: usize) -> (EmitFn, EventStream) {
        let (tx, rx) = bounded(capacity);
        let emit: EmitFn = Rc::new(move |event: &SinkEvent, is_checkout| {
            if tx.try_send((event.clone(), is_checkout)).is_err() {
                tracing::warn!("event stream full, dropping event");
            }
            Ok(())
        });
        (emit, EventStream { rx })
    }

    pub fn try_recv(&self) -> Option<(SinkEvent, bool)> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<(SinkEvent, bool)> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<(SinkEvent, bool)> {
        let mut out = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            out.push(item);
        }
        out
    }

    /// Drain just the structured events, dropping checkout flags.
    pub fn drain_events(&self) -> Vec<Event> {
        self.drain()
            .into_iter()
            .filter_map(|(event, _)| match event {
                SinkEvent::Event(e) => Some(e),
                SinkEvent::Packed(_) => None,
            })
            .collect()
    }
}

/// Session persistence as JSON lines: one metadata line, one event per
/// line after it.
pub struct SessionStorage {
    dir: PathBuf,
}

impl SessionStorage {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn save(&self, session: &RecordedSession) -> Result<PathBuf> {
        let ts = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{}.jsonl", sanitize(&session.name), ts);
        let path = self.dir.join(&filename);

        let file = File::create(&path)?;
        let mut w = BufWriter::new(file);

        writeln!(
            w,
            "{}",
            serde_json::json!({ "name": session.name, "events": session.events.len() })
        )?;
        for event in &session.events {
            serde_json::to_writer(&mut w, event)?;
            writeln!(w)?;
        }
        w.flush()?;
        Ok(path)
    }

    pub fn load(&self, filename: &str) -> Result<RecordedSession> {
        let path = self.dir.join(filename);
        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let meta_line = lines.next().context("empty session file")??;
        let meta: serde_json::Value = serde_json::from_str(&meta_line)?;
        let name = meta["name"].as_str().unwrap_or("unknown").to_string();

        let mut events = Vec::new();
        for line in lines {
            let line = line?;
            if !line.is_empty() {
                events.push(serde_json::from_str(&line)?);
            }
        }
        Ok(RecordedSession { name, events })
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            if let Some(s) = name.to_str() {
                if s.ends_with(".jsonl") {
                    files.push(s.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn delete(&self, filename: &str) -> Result<()> {
        fs::remove_file(self.dir.join(filename))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
