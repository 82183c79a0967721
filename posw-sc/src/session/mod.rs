//! Scanner session manager
//!
//! Owns one scanner connection and drives it through
//! `disconnected → connecting → connected ⇄ scanning`, with `error`
//! reachable from any state. Leaving `error` takes an explicit `disconnect`
//! or a new `connect`; the manager never retries on its own.
//!
//! Lifecycle operations (`connect`, `start_scanning`, `stop_scanning`,
//! `disconnect`) are serialized by one lock that also holds the polling task
//! handle. `scan_single` and polling ticks serialize on the transport lock.

mod poller;
mod state;

pub use state::SessionStatus;

use posw_common::config::{ScanMode, ScannerConfig, ScanningConfig};
use posw_common::events::{EventBus, ScanEvent};
use posw_common::scan::{ScanResult, ScannerState};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::feedback::AudibleFeedback;
use crate::pipeline::ScanPipeline;
use crate::resolver::ProductResolver;
use crate::transport::TransportConnector;

use poller::Poller;
use state::{is_transport_fault, SessionCore};

/// One scanner connection and its scan pipeline
pub struct ScannerSession {
    core: Arc<SessionCore>,
    connector: Arc<dyn TransportConnector>,
    /// Lifecycle lock; holds the polling task while scanning continuously
    lifecycle: Mutex<Option<Poller>>,
}

impl ScannerSession {
    /// Create a disconnected session
    ///
    /// `scanning` seeds the pipeline's length bounds until the first connect
    /// supplies a full configuration.
    pub fn new(
        connector: Arc<dyn TransportConnector>,
        resolver: Arc<dyn ProductResolver>,
        feedback: Arc<dyn AudibleFeedback>,
        events: EventBus,
        scanning: ScanningConfig,
    ) -> Self {
        let pipeline = ScanPipeline::new(resolver, scanning, events.clone());
        Self {
            core: Arc::new(SessionCore::new(pipeline, feedback, events)),
            connector,
            lifecycle: Mutex::new(None),
        }
    }

    /// Open the transport described by `config`
    ///
    /// Valid from `disconnected` or `error`. A failed open leaves the session
    /// in `error` with the transport's reason; call `connect` again to retry.
    pub async fn connect(&self, config: ScannerConfig) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        let state = self.core.state().await;
        if !matches!(state, ScannerState::Disconnected | ScannerState::Error) {
            return Err(Error::InvalidState {
                operation: "connect",
                state,
            });
        }
        config.validate()?;

        // Leftovers from a faulted connection
        if let Some(poller) = lifecycle.take() {
            poller.stop().await;
        }
        self.release_transport().await;

        self.core.transition(ScannerState::Connecting).await;
        info!(
            "Connecting to {} scanner {}",
            config.connection.kind, config.connection.device_id
        );

        let opened = self.connector.open(&config.connection).await;
        self.core.pipeline.lock().await.set_config(config.scanning.clone());
        self.core.inner.write().await.config = Some(config);

        match opened {
            Ok(transport) => {
                *self.core.transport.lock().await = Some(transport);
                self.core.transition(ScannerState::Connected).await;
                Ok(())
            }
            Err(e) => {
                self.core.fault(e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Begin scanning; valid only from `connected`
    ///
    /// In continuous mode a polling task reads the transport every
    /// `scan_delay_ms`. Single and auto modes wait for explicit
    /// [`scan_single`](Self::scan_single) calls.
    pub async fn start_scanning(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        let state = self.core.state().await;
        if state != ScannerState::Connected {
            return Err(Error::InvalidState {
                operation: "start scanning",
                state,
            });
        }

        let scanning = self
            .core
            .inner
            .read()
            .await
            .config
            .as_ref()
            .map(|c| c.scanning.clone())
            .ok_or_else(|| Error::Config("connected session has no configuration".to_string()))?;

        self.core.transition(ScannerState::Scanning).await;

        if scanning.mode == ScanMode::Continuous {
            *lifecycle = Some(Poller::spawn(
                Arc::clone(&self.core),
                scanning.scan_delay(),
                scanning.read_timeout(),
            ));
        } else {
            debug!("Scan mode {:?}: waiting for explicit triggers", scanning.mode);
        }

        Ok(())
    }

    /// Perform one read-and-classify cycle
    ///
    /// Valid from `connected` or `scanning`; the state is left unchanged.
    /// Returns `None` when no data arrived within the read timeout or the
    /// payload was filtered or repeated. A transport fault moves the session
    /// to `error` and is returned.
    pub async fn scan_single(&self) -> Result<Option<ScanResult>> {
        let (state, read_timeout) = {
            let inner = self.core.inner.read().await;
            (
                inner.state,
                inner
                    .config
                    .as_ref()
                    .map(|c| c.scanning.read_timeout())
                    .unwrap_or_default(),
            )
        };
        if !state.is_connected() {
            return Err(Error::InvalidState {
                operation: "scan",
                state,
            });
        }

        match self.core.read_payload(read_timeout).await {
            Ok(Some(raw)) => Ok(self.core.process(raw).await),
            Ok(None) => Ok(None),
            Err(e) => {
                if is_transport_fault(&e) {
                    self.core.fault(e.to_string()).await;
                }
                Err(e)
            }
        }
    }

    /// Stop scanning; `scanning → connected`
    ///
    /// Cancels the polling task and waits for it, so no tick runs after this
    /// returns.
    pub async fn stop_scanning(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        let state = self.core.state().await;
        if state != ScannerState::Scanning {
            return Err(Error::InvalidState {
                operation: "stop scanning",
                state,
            });
        }

        if let Some(poller) = lifecycle.take() {
            poller.stop().await;
        }

        // The poller may have faulted while we waited for it
        if self.core.state().await == ScannerState::Scanning {
            self.core.transition(ScannerState::Connected).await;
        }
        Ok(())
    }

    /// Tear down the connection from any state
    ///
    /// Cancels polling, closes the transport and clears the last error.
    /// Calling it on a disconnected session is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        if let Some(poller) = lifecycle.take() {
            poller.stop().await;
        }
        self.release_transport().await;

        self.core.transition(ScannerState::Disconnected).await;
        Ok(())
    }

    async fn release_transport(&self) {
        let transport = self.core.transport.lock().await.take();
        if let Some(mut transport) = transport {
            debug!("Releasing {} transport", transport.kind());
            if let Err(e) = transport.close().await {
                warn!("Error closing transport: {}", e);
            }
        }
    }

    pub async fn state(&self) -> ScannerState {
        self.core.state().await
    }

    pub async fn status(&self) -> SessionStatus {
        self.core.status().await
    }

    /// Most recent scan result
    pub async fn last_result(&self) -> Option<ScanResult> {
        self.core.pipeline.lock().await.last_result().cloned()
    }

    /// Scan history, newest first
    pub async fn history(&self) -> Vec<ScanResult> {
        self.core.pipeline.lock().await.history().to_vec()
    }

    pub async fn clear_history(&self) {
        self.core.pipeline.lock().await.clear_history();
    }

    /// Subscribe to session and scan events
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.core.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.core.events
    }
}
