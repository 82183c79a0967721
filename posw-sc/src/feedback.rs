//! Audible scan confirmation
//!
//! The cue is fire-and-forget: it is spawned on its own task and never
//! delays or fails a scan.

use async_trait::async_trait;
use posw_common::config::FeedbackConfig;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Plays a confirmation cue
#[async_trait]
pub trait AudibleFeedback: Send + Sync {
    /// `volume` is 0.0-1.0
    async fn beep(&self, volume: f32, duration: Duration);
}

/// Rings the terminal bell on stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

#[async_trait]
impl AudibleFeedback for TerminalBell {
    async fn beep(&self, volume: f32, duration: Duration) {
        // The terminal bell has no volume control; zero means mute
        if volume <= 0.0 {
            return;
        }
        let mut stderr = std::io::stderr();
        if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            debug!("Terminal bell failed: {}", e);
        }
        tokio::time::sleep(duration).await;
    }
}

/// No-op cue
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentFeedback;

#[async_trait]
impl AudibleFeedback for SilentFeedback {
    async fn beep(&self, _volume: f32, _duration: Duration) {}
}

/// Spawn the cue if enabled in `config`
pub fn trigger(feedback: &Arc<dyn AudibleFeedback>, config: &FeedbackConfig) {
    if !config.enabled {
        return;
    }

    let feedback = Arc::clone(feedback);
    let volume = config.volume;
    let duration = Duration::from_millis(config.duration_ms);
    trace!("Scan confirmation cue ({:.2}, {}ms)", volume, config.duration_ms);

    tokio::spawn(async move {
        feedback.beep(volume, duration).await;
    });
}
