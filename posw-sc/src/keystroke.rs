//! Keystroke-timing classifier
//!
//! HID-mode scanners type a code as a rapid burst of key events followed by
//! Enter. This module separates such bursts from human typing using the gap
//! between characters, and turns each burst into one [`RawScan`].
//!
//! The classifier is a plain state machine driven by timestamped events.
//! [`run_capture`] owns one classifier on a single task and arms its idle
//! timer, so the timeout and the event handler never touch the buffer
//! concurrently.

use posw_common::config::ScanningConfig;
use posw_common::scan::RawScan;
use std::future::pending;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};

/// Idle timeout is this multiple of the inter-character threshold
const IDLE_TIMEOUT_FACTOR: u32 = 3;

/// A single key as delivered by the keyboard wedge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    /// Terminator sent by the scanner after the code
    Enter,
}

/// Key with the instant it was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub at: Instant,
}

impl KeyEvent {
    pub fn char(c: char, at: Instant) -> Self {
        Self { key: Key::Char(c), at }
    }

    pub fn enter(at: Instant) -> Self {
        Self { key: Key::Enter, at }
    }
}

/// Timing and length bounds for burst detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeystrokeConfig {
    pub inter_char_threshold: Duration,
    pub min_length: usize,
    pub max_length: usize,
}

impl KeystrokeConfig {
    /// Buffer is force-cleared after this much silence
    pub fn idle_timeout(&self) -> Duration {
        self.inter_char_threshold * IDLE_TIMEOUT_FACTOR
    }
}

impl Default for KeystrokeConfig {
    fn default() -> Self {
        Self {
            inter_char_threshold: Duration::from_millis(100),
            min_length: 4,
            max_length: 50,
        }
    }
}

impl From<&ScanningConfig> for KeystrokeConfig {
    fn from(config: &ScanningConfig) -> Self {
        Self {
            inter_char_threshold: config.inter_char_threshold(),
            min_length: config.min_length,
            max_length: config.max_length,
        }
    }
}

/// Accumulates scanner bursts and emits them on Enter
#[derive(Debug)]
pub struct KeystrokeClassifier {
    config: KeystrokeConfig,
    buffer: String,
    buffer_chars: usize,
    last_char_at: Option<Instant>,
}

impl KeystrokeClassifier {
    pub fn new(config: KeystrokeConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
            buffer_chars: 0,
            last_char_at: None,
        }
    }

    pub fn config(&self) -> &KeystrokeConfig {
        &self.config
    }

    /// Number of characters currently buffered
    pub fn pending_len(&self) -> usize {
        self.buffer_chars
    }

    /// Instant at which the idle timeout clears a non-empty buffer
    pub fn idle_deadline(&self) -> Option<Instant> {
        if self.buffer.is_empty() {
            return None;
        }
        self.last_char_at.map(|at| at + self.config.idle_timeout())
    }

    /// Feed one key event
    ///
    /// Returns a scan only for an Enter that closes a buffer whose length is
    /// within bounds. Out-of-bounds buffers are dropped silently.
    pub fn handle(&mut self, event: KeyEvent) -> Option<RawScan> {
        match event.key {
            Key::Char(c) => {
                if let Some(last) = self.last_char_at {
                    let gap = event.at.saturating_duration_since(last);
                    if gap > self.config.inter_char_threshold && !self.buffer.is_empty() {
                        trace!(
                            "Discarding {} buffered chars after {}ms gap",
                            self.buffer_chars,
                            gap.as_millis()
                        );
                        self.clear();
                    }
                }
                self.buffer.push(c);
                self.buffer_chars += 1;
                self.last_char_at = Some(event.at);
                None
            }
            Key::Enter => {
                self.expire_idle(event.at);

                let len = self.buffer_chars;
                let data = std::mem::take(&mut self.buffer);
                self.clear();

                if len >= self.config.min_length && len <= self.config.max_length {
                    debug!("Keystroke burst accepted ({} chars)", len);
                    Some(RawScan::new(data))
                } else {
                    if len > 0 {
                        trace!(
                            "Dropping {} char buffer outside [{}, {}]",
                            len,
                            self.config.min_length,
                            self.config.max_length
                        );
                    }
                    None
                }
            }
        }
    }

    /// Clear the buffer if the idle timeout has elapsed at `now`
    ///
    /// Returns true when a non-empty buffer was discarded.
    pub fn expire_idle(&mut self, now: Instant) -> bool {
        match self.idle_deadline() {
            Some(deadline) if now >= deadline => {
                trace!("Idle timeout, discarding {} buffered chars", self.buffer_chars);
                self.clear();
                true
            }
            _ => false,
        }
    }

    /// Drop all state
    pub fn reset(&mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.buffer_chars = 0;
        self.last_char_at = None;
    }
}

/// Drive a classifier from a key event channel
///
/// Emitted scans are sent to `scans`. Returns when the key channel closes or
/// the scan receiver is dropped.
pub async fn run_capture(
    mut classifier: KeystrokeClassifier,
    mut keys: mpsc::Receiver<KeyEvent>,
    scans: mpsc::Sender<RawScan>,
) {
    info!(
        "Keystroke capture started (threshold {}ms, length {}-{})",
        classifier.config().inter_char_threshold.as_millis(),
        classifier.config().min_length,
        classifier.config().max_length
    );

    loop {
        let deadline = classifier.idle_deadline();

        tokio::select! {
            event = keys.recv() => {
                let Some(event) = event else {
                    break;
                };
                if let Some(scan) = classifier.handle(event) {
                    if scans.send(scan).await.is_err() {
                        debug!("Scan receiver dropped");
                        break;
                    }
                }
            }
            _ = idle(deadline) => {
                classifier.expire_idle(Instant::now());
            }
        }
    }

    info!("Keystroke capture stopped");
}

async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
