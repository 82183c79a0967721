//! Shared session core
//!
//! State, transport handle and pipeline shared between the session manager
//! and its polling task.

use chrono::Utc;
use posw_common::config::{FeedbackConfig, ScanMode, ScannerConfig, TransportKind};
use posw_common::events::{EventBus, ScanEvent};
use posw_common::scan::{RawScan, ScanResult, ScannerState};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::feedback::{self, AudibleFeedback};
use crate::pipeline::{self, ScanPipeline};
use crate::transport::Transport;

/// Extra time granted past the read timeout before a transport is
/// considered hung
const READ_GRACE: Duration = Duration::from_millis(250);

/// Point-in-time view of a scanner session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: ScannerState,
    pub transport_kind: Option<TransportKind>,
    pub device_id: Option<String>,
    pub scan_mode: Option<ScanMode>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub(crate) struct SessionInner {
    pub state: ScannerState,
    /// Configuration of the current or last connection
    pub config: Option<ScannerConfig>,
    pub last_error: Option<String>,
}

/// State shared with the polling task
pub(crate) struct SessionCore {
    pub inner: RwLock<SessionInner>,
    /// Reads from the scanner are serialized through this lock
    pub transport: Mutex<Option<Box<dyn Transport>>>,
    pub pipeline: Mutex<ScanPipeline>,
    pub feedback: Arc<dyn AudibleFeedback>,
    pub events: EventBus,
}

impl SessionCore {
    pub fn new(pipeline: ScanPipeline, feedback: Arc<dyn AudibleFeedback>, events: EventBus) -> Self {
        Self {
            inner: RwLock::new(SessionInner {
                state: ScannerState::Disconnected,
                config: None,
                last_error: None,
            }),
            transport: Mutex::new(None),
            pipeline: Mutex::new(pipeline),
            feedback,
            events,
        }
    }

    pub async fn state(&self) -> ScannerState {
        self.inner.read().await.state
    }

    pub async fn status(&self) -> SessionStatus {
        let inner = self.inner.read().await;
        SessionStatus {
            state: inner.state,
            transport_kind: inner.config.as_ref().map(|c| c.connection.kind),
            device_id: inner.config.as_ref().map(|c| c.connection.device_id.clone()),
            scan_mode: inner.config.as_ref().map(|c| c.scanning.mode),
            last_error: inner.last_error.clone(),
        }
    }

    /// Move to `new_state` and publish the change
    pub async fn transition(&self, new_state: ScannerState) {
        let old_state = {
            let mut inner = self.inner.write().await;
            let old_state = inner.state;
            inner.state = new_state;
            if new_state != ScannerState::Error {
                inner.last_error = None;
            }
            old_state
        };

        if old_state != new_state {
            info!("Scanner state: {} -> {}", old_state, new_state);
            self.events.emit_lossy(ScanEvent::ScannerStateChanged {
                old_state,
                new_state,
                timestamp: Utc::now(),
            });
        }
    }

    /// Enter the error state with `reason`
    ///
    /// History and last result are left untouched.
    pub async fn fault(&self, reason: String) {
        let old_state = {
            let mut inner = self.inner.write().await;
            let old_state = inner.state;
            inner.state = ScannerState::Error;
            inner.last_error = Some(reason.clone());
            old_state
        };

        warn!("Scanner fault while {}: {}", old_state, reason);
        if old_state != ScannerState::Error {
            self.events.emit_lossy(ScanEvent::ScannerStateChanged {
                old_state,
                new_state: ScannerState::Error,
                timestamp: Utc::now(),
            });
        }
        self.events.emit_lossy(ScanEvent::ScannerFault {
            reason,
            timestamp: Utc::now(),
        });
    }

    /// Read the next payload from the transport
    ///
    /// Holds the transport lock for the duration of the read so a single
    /// scan and a polling tick never read concurrently.
    pub async fn read_payload(&self, timeout: Duration) -> Result<Option<RawScan>> {
        let mut guard = self.transport.lock().await;
        let transport = guard.as_mut().ok_or(Error::InvalidState {
            operation: "read from scanner",
            state: ScannerState::Disconnected,
        })?;

        let bytes = match time::timeout(timeout + READ_GRACE, transport.read_next(timeout)).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::Timeout(timeout.as_millis() as u64)),
        };

        Ok(bytes.and_then(|bytes| payload_from_bytes(&bytes)).map(RawScan::new))
    }

    /// Classify, resolve and record one raw scan
    ///
    /// The pipeline lock is not held while the resolver runs.
    pub async fn process(&self, raw: RawScan) -> Option<ScanResult> {
        let (classification, resolver) = {
            let mut pipeline = self.pipeline.lock().await;
            (pipeline.admit(&raw)?, pipeline.resolver())
        };

        let result = pipeline::resolve(resolver.as_ref(), &raw, classification).await;
        self.pipeline.lock().await.record(result.clone());

        if result.success {
            let feedback_config = self.feedback_config().await;
            feedback::trigger(&self.feedback, &feedback_config);
        }

        Some(result)
    }

    async fn feedback_config(&self) -> FeedbackConfig {
        self.inner
            .read()
            .await
            .config
            .as_ref()
            .map(|c| c.feedback.clone())
            .unwrap_or_default()
    }
}

/// Decode a device frame, dropping line terminators
fn payload_from_bytes(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let payload = text.trim_end_matches(&['\r', '\n'][..]);
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_string())
    }
}

/// True for errors that mean the scanner link is broken
pub(crate) fn is_transport_fault(error: &Error) -> bool {
    matches!(error, Error::Transport(_) | Error::Timeout(_))
}
