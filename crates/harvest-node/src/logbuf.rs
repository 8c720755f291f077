//! Bounded in-memory log ring for the dashboard. A tracing layer feeds
//! it; the HTTP surface reads it. Oldest entries fall off the back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, entry: LogEntry) {
        let mut buffer = self.inner.lock().unwrap();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(entry);
    }

    /// Newest-last slice of up to `limit` entries.
    pub fn tail(&self, limit: usize) -> Vec<LogEntry> {
        let buffer = self.inner.lock().unwrap();
        buffer.iter().rev().take(limit).rev().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn layer(&self) -> LogBufferLayer {
        LogBufferLayer { buffer: self.clone() }
    }
}

/// Tracing layer that mirrors every event into the ring.
pub struct LogBufferLayer {
    buffer: LogBuffer,
}

impl<S: Subscriber> Layer<S> for LogBufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogEntry {
            timestamp: Utc::now(),
            level: level_str(event.metadata().level()).to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.rendered,
        });
    }
}

fn level_str(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}

#[derive(Default)]
struct MessageVisitor {
    rendered: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let mut msg = format!("{value:?}");
            if !self.rendered.is_empty() {
                msg.push(' ');
                msg.push_str(&self.rendered);
            }
            self.rendered = msg;
        } else {
            if !self.rendered.is_empty() {
                self.rendered.push(' ');
            }
            let _ = write!(self.rendered, "{}={:?}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: "info".into(),
            target: "test".into(),
            message: message.into(),
        }
    }

    #[test]
    fn ring_overwrites_oldest() {
        let buffer = LogBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.push(entry(&format!("m{i}")));
        }
        let tail = buffer.tail(10);
        let messages: Vec<&str> = tail.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn tail_limits_from_the_newest_end() {
        let buffer = LogBuffer::with_capacity(10);
        for i in 0..6 {
            buffer.push(entry(&format!("m{i}")));
        }
        let tail = buffer.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].message, "m5");
    }

    #[test]
    fn clear_empties_the_ring() {
        let buffer = LogBuffer::with_capacity(4);
        buffer.push(entry("x"));
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn concurrent_producers_do_not_lose_the_ring() {
        let buffer = LogBuffer::with_capacity(100);
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        buffer.push(LogEntry {
                            timestamp: Utc::now(),
                            level: "info".into(),
                            target: "t".into(),
                            message: format!("w{worker}-{i}"),
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(buffer.len(), 100);
    }
}
