//! In-memory sinks for hub tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::subscriber::{EventSink, SinkError};

#[derive(Default)]
struct Shared {
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    closes: AtomicUsize,
    fail: AtomicBool,
    written: Notify,
}

/// Records every frame written to it. Clones share the same record.
#[derive(Clone, Default)]
pub struct RecordingSink {
    shared: Arc<Shared>,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose writes always fail.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.shared.fail.store(true, Ordering::SeqCst);
        sink
    }

    /// Sleep before each write, to widen interleaving windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.shared.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` write attempts were made.
    pub async fn wait_for_attempts(&self, n: usize) {
        loop {
            let notified = self.shared.written.notified();
            if self.attempts() >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send_text(&mut self, text: &str) -> Result<(), SinkError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = if self.shared.fail.load(Ordering::SeqCst) {
            Err(SinkError::Transport("simulated broken pipe".into()))
        } else {
            self.shared.sent.lock().unwrap().push(text.to_string());
            Ok(())
        };
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        self.shared.written.notify_waiters();
        result
    }

    async fn close(&mut self) {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
    }
}
