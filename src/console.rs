//! User-facing output for the chat loop.
//!
//! The controller reports everything the user should see (turns,
//! warnings, per-file errors, processing results) as [`ConsoleEvent`]s.
//! Turns go to **stdout**; warnings, errors, and status lines go to
//! **stderr**, so piping stdout captures only the conversation.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::models::Speaker;

/// Something the user should see.
#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleEvent {
    /// One rendered turn; `index` is its zero-based position in history.
    Turn {
        index: usize,
        speaker: Speaker,
        text: String,
        at: DateTime<Utc>,
    },
    Warning(String),
    Error(String),
    /// Documents were processed into a new session.
    Processed {
        files: usize,
        failed: usize,
        chunks: usize,
        cached: bool,
    },
}

pub trait Console: Send + Sync {
    fn emit(&self, event: ConsoleEvent);
}

/// Human-readable output: `user> …` / `assistant> …` blocks.
pub struct HumanConsole;

impl Console for HumanConsole {
    fn emit(&self, event: ConsoleEvent) {
        match event {
            ConsoleEvent::Turn { speaker, text, .. } => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{}> {}\n", speaker.as_str(), text);
                let _ = out.flush();
            }
            ConsoleEvent::Warning(msg) => {
                let _ = writeln!(std::io::stderr().lock(), "warning: {}", msg);
            }
            ConsoleEvent::Error(msg) => {
                let _ = writeln!(std::io::stderr().lock(), "error: {}", msg);
            }
            ConsoleEvent::Processed {
                files,
                failed,
                chunks,
                cached,
            } => {
                let mut line = format!(
                    "Processed {} file(s) into {} chunk(s)",
                    files, chunks
                );
                if failed > 0 {
                    line.push_str(&format!(", {} failed", failed));
                }
                if cached {
                    line.push_str(" (index reused)");
                }
                let _ = writeln!(
                    std::io::stderr().lock(),
                    "{}. You can now ask questions.",
                    line
                );
            }
        }
    }
}

/// Machine-readable output: one JSON object per line on stdout.
pub struct JsonConsole;

impl Console for JsonConsole {
    fn emit(&self, event: ConsoleEvent) {
        let obj = to_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }
}

fn to_json(event: &ConsoleEvent) -> serde_json::Value {
    match event {
        ConsoleEvent::Turn {
            index,
            speaker,
            text,
            at,
        } => serde_json::json!({
            "event": "turn",
            "index": index,
            "speaker": speaker,
            "text": text,
            "at": at.to_rfc3339()
        }),
        ConsoleEvent::Warning(msg) => serde_json::json!({
            "event": "warning",
            "message": msg
        }),
        ConsoleEvent::Error(msg) => serde_json::json!({
            "event": "error",
            "message": msg
        }),
        ConsoleEvent::Processed {
            files,
            failed,
            chunks,
            cached,
        } => serde_json::json!({
            "event": "processed",
            "files": files,
            "failed": failed,
            "chunks": chunks,
            "cached": cached
        }),
    }
}

/// Records events in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemoryConsole {
    events: Arc<Mutex<Vec<ConsoleEvent>>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ConsoleEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Console for MemoryConsole {
    fn emit(&self, event: ConsoleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Output format for the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn console(&self) -> Box<dyn Console> {
        match self {
            OutputMode::Human => Box::new(HumanConsole),
            OutputMode::Json => Box::new(JsonConsole),
        }
    }
}
