//! Event types for the POSW scanner event system
//!
//! Provides the ScanEvent enum and the EventBus used to hand scan results
//! and session changes to the cart and UI layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::scan::{ScanResult, ScannerState};

/// Scanner event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    /// Scanner session moved between states
    ///
    /// Triggers:
    /// - SSE: Update connection indicator
    ScannerStateChanged {
        old_state: ScannerState,
        new_state: ScannerState,
        timestamp: DateTime<Utc>,
    },

    /// A raw scan was classified and resolved (successfully or not)
    ///
    /// Triggers:
    /// - Cart: Add resolved product
    /// - SSE: Show scan outcome
    ScanCompleted { result: ScanResult },

    /// Transport fault moved the session into the error state
    ScannerFault {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Scan history was cleared by an operator
    HistoryCleared { timestamp: DateTime<Utc> },
}

impl ScanEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ScanEvent::ScannerStateChanged { .. } => "ScannerStateChanged",
            ScanEvent::ScanCompleted { .. } => "ScanCompleted",
            ScanEvent::ScannerFault { .. } => "ScannerFault",
            ScanEvent::HistoryCleared { .. } => "HistoryCleared",
        }
    }
}

/// Central event distribution bus for scanner events
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use posw_common::events::{EventBus, ScanEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(ScanEvent::HistoryCleared {
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(ScanEvent::HistoryCleared { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ScanEvent,
    ) -> Result<usize, broadcast::error::SendError<ScanEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
