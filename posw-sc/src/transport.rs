//! Scanner transport contract
//!
//! A transport delivers framed payloads from one scanner. Driver-level USB,
//! Bluetooth and Wi-Fi implementations live outside this crate; they plug in
//! through [`TransportConnector`] and [`Transport`].
//!
//! [`ChannelConnector`] is the in-process transport used by the keyboard
//! wedge: captured keystroke bursts are pushed into a channel and read back
//! by the session like any other device payload.

use async_trait::async_trait;
use posw_common::config::{ConnectionConfig, TransportKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Open scanner connection
#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Wait up to `timeout` for the next payload
    ///
    /// `Ok(None)` means no data arrived in time. Errors are faults of the
    /// underlying link (unexpected disconnect, unresponsive device).
    async fn read_next(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Release the device
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports for a connection configuration
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Transport>>;
}

/// Connector backed by an in-process payload channel
///
/// All transports it opens read from the same channel, so payloads queued
/// while disconnected are delivered after the next connect.
#[derive(Clone)]
pub struct ChannelConnector {
    rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
}

impl ChannelConnector {
    /// Create the connector and the sender feeding it
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                rx: Arc::new(Mutex::new(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl TransportConnector for ChannelConnector {
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Transport>> {
        info!(
            "Opening {} channel transport for device {}",
            config.kind, config.device_id
        );
        Ok(Box::new(ChannelTransport {
            kind: config.kind,
            rx: Arc::clone(&self.rx),
            closed: false,
        }))
    }
}

/// Transport reading from a [`ChannelConnector`] channel
pub struct ChannelTransport {
    kind: TransportKind,
    rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    closed: bool,
}

#[async_trait]
impl Transport for ChannelTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn read_next(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        if self.closed {
            return Err(Error::Transport("transport is closed".to_string()));
        }

        let mut rx = self.rx.lock().await;
        match time::timeout(timeout, rx.recv()).await {
            Ok(Some(payload)) => Ok(Some(payload)),
            Ok(None) => Err(Error::Transport("payload channel closed".to_string())),
            Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        debug!("Closing {} channel transport", self.kind);
        self.closed = true;
        Ok(())
    }
}
