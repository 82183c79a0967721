//! Continuous-mode polling task

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::state::{is_transport_fault, SessionCore};

/// Handle to a running polling task
pub(crate) struct Poller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Start polling the session transport every `delay`
    pub fn spawn(core: Arc<SessionCore>, delay: Duration, read_timeout: Duration) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_task(core, cancel.clone(), delay, read_timeout));
        Self { cancel, handle }
    }

    /// Cancel and wait for the task to finish
    ///
    /// After this returns no further tick runs.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::error!("Polling task panicked: {}", e);
            }
        }
    }
}

async fn poll_task(
    core: Arc<SessionCore>,
    cancel: CancellationToken,
    delay: Duration,
    read_timeout: Duration,
) {
    let mut interval = time::interval(delay);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Scan polling started ({}ms interval)", delay.as_millis());

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        // Only the read is abandoned on cancellation; a payload already
        // read is always processed and recorded.
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = core.read_payload(read_timeout) => read,
        };

        match read {
            Ok(Some(raw)) => {
                core.process(raw).await;
            }
            Ok(None) => {}
            Err(e) if is_transport_fault(&e) => {
                core.fault(e.to_string()).await;
                break;
            }
            Err(e) => {
                debug!("Polling stopped: {}", e);
                break;
            }
        }
    }

    info!("Scan polling stopped");
}
