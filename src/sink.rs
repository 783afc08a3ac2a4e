//! Destinations for streamed output.

use std::io::{self, Write};
use std::sync::Mutex;

use colored::*;
use tokio::sync::mpsc;

/// Receives finalized text fragments and advisory progress notes.
///
/// Implementations must not block: the aggregator calls these between
/// stream events.
pub trait OutputSink: Send + Sync {
    fn write_content(&self, fragment: &str);
    fn write_progress_note(&self, title: &str, description: &str);
}

/// Writes content to stdout and progress notes to stderr.
pub struct TerminalSink {
    last_flush: Mutex<std::time::Instant>,
}

const FLUSH_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

impl TerminalSink {
    pub fn new() -> Self {
        Self {
            last_flush: Mutex::new(std::time::Instant::now()),
        }
    }

    /// Flush whatever is still buffered; call once the response is done.
    pub fn finish(&self) {
        println!();
        let _ = io::stdout().flush();
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for TerminalSink {
    fn write_content(&self, fragment: &str) {
        print!("{}", fragment);
        let mut last_flush = match self.last_flush.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last_flush.elapsed() > FLUSH_INTERVAL {
            let _ = io::stdout().flush();
            *last_flush = std::time::Instant::now();
        }
    }

    fn write_progress_note(&self, title: &str, description: &str) {
        let _ = io::stdout().flush();
        eprintln!("{} {}", title.cyan(), description.dimmed());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Content(String),
    Progress { title: String, description: String },
}

/// Forwards everything to an unbounded channel, e.g. for an embedding
/// server task or for tests.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutputSink for ChannelSink {
    fn write_content(&self, fragment: &str) {
        // A dropped receiver means the caller went away; nothing to report.
        let _ = self.tx.send(SinkEvent::Content(fragment.to_string()));
    }

    fn write_progress_note(&self, title: &str, description: &str) {
        let _ = self.tx.send(SinkEvent::Progress {
            title: title.to_string(),
            description: description.to_string(),
        });
    }
}

/// Drain whatever a `ChannelSink` has buffered so far.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SinkEvent>) -> Vec<SinkEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
