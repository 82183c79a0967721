//! Scan classifier and enricher
//!
//! Turns one [`RawScan`] into one [`ScanResult`]:
//! duplicate suppression → classification → length filter → resolver lookup
//! → GS1 enrichment → history + event.
//!
//! [`ScanPipeline::process`] runs all steps in one call. Callers that share
//! the pipeline behind a lock use [`ScanPipeline::admit`], [`resolve`] and
//! [`ScanPipeline::record`] so the lock is not held during the lookup.

pub mod classify;
pub mod history;

pub use classify::{classify, Classification, QR_LENGTH_THRESHOLD};
pub use history::{ScanHistory, HISTORY_CAPACITY};

use chrono::Utc;
use posw_common::config::{ScanningConfig, Symbology};
use posw_common::events::{EventBus, ScanEvent};
use posw_common::scan::{RawScan, ScanFailure, ScanResult, ScanType};
use std::sync::Arc;
use tracing::{debug, info};

use crate::resolver::ProductResolver;

/// Stateful scan pipeline owned by one scanner session
pub struct ScanPipeline {
    resolver: Arc<dyn ProductResolver>,
    config: ScanningConfig,
    history: ScanHistory,
    last_payload: Option<String>,
    events: EventBus,
}

impl ScanPipeline {
    pub fn new(resolver: Arc<dyn ProductResolver>, config: ScanningConfig, events: EventBus) -> Self {
        Self {
            resolver,
            config,
            history: ScanHistory::new(),
            last_payload: None,
            events,
        }
    }

    /// Replace the scanning parameters (length bounds, symbologies)
    pub fn set_config(&mut self, config: ScanningConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &ScanningConfig {
        &self.config
    }

    pub fn resolver(&self) -> Arc<dyn ProductResolver> {
        Arc::clone(&self.resolver)
    }

    /// Process one raw scan
    ///
    /// Returns `None` when the payload is filtered out by the length bounds or
    /// repeats the previous payload byte for byte. Every returned result has
    /// already been recorded in the history and published.
    pub async fn process(&mut self, raw: RawScan) -> Option<ScanResult> {
        let classification = self.admit(&raw)?;
        let result = resolve(self.resolver.as_ref(), &raw, classification).await;
        self.record(result.clone());
        Some(result)
    }

    /// Filter and classify a payload
    ///
    /// QR payloads are bounded by `[min_length, qr_max_length]`, everything
    /// else by `[min_length, max_length]`. An admitted payload becomes the
    /// duplicate-suppression reference; a filtered one leaves it untouched.
    pub fn admit(&mut self, raw: &RawScan) -> Option<Classification> {
        if self.last_payload.as_deref() == Some(raw.data.as_str()) {
            debug!("Ignoring repeated payload {}", raw.data);
            return None;
        }

        let classification = classify(&raw.data);
        let scan_type = classification.scan_type();

        let len = raw.char_len();
        let accepted = match scan_type {
            ScanType::Qr => self.config.accepts_qr_length(len),
            ScanType::Barcode | ScanType::Gs1 => self.config.accepts_length(len),
        };
        if !accepted {
            debug!(
                "Dropping {} char {} payload outside length bounds",
                len, scan_type
            );
            return None;
        }

        self.last_payload = Some(raw.data.clone());

        if !self.symbology_enabled(scan_type) {
            debug!("Scan type {} is not among enabled symbologies", scan_type);
        }

        Some(classification)
    }

    /// Append a result to the history and publish it
    pub fn record(&mut self, result: ScanResult) {
        info!(
            "Scan {} ({}): {}",
            result.raw_data,
            result.scan_type,
            match (&result.product, &result.error) {
                (Some(product), _) => product.name.clone(),
                (None, Some(error)) => error.to_string(),
                (None, None) => String::new(),
            }
        );

        self.history.push(result.clone());
        self.events.emit_lossy(ScanEvent::ScanCompleted { result });
    }

    fn symbology_enabled(&self, scan_type: ScanType) -> bool {
        let enabled = &self.config.enabled_symbologies;
        match scan_type {
            ScanType::Gs1 => enabled.contains(&Symbology::Gs1_128),
            ScanType::Qr => enabled.contains(&Symbology::Qr) || enabled.contains(&Symbology::DataMatrix),
            ScanType::Barcode => enabled.iter().any(|s| {
                matches!(
                    s,
                    Symbology::Ean13
                        | Symbology::Ean8
                        | Symbology::UpcA
                        | Symbology::UpcE
                        | Symbology::Code128
                        | Symbology::Code39
                )
            }),
        }
    }

    pub fn history(&self) -> &ScanHistory {
        &self.history
    }

    pub fn last_result(&self) -> Option<&ScanResult> {
        self.history.latest()
    }

    /// Empty the history and forget the previous payload
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.last_payload = None;
        self.events.emit_lossy(ScanEvent::HistoryCleared { timestamp: Utc::now() });
    }
}

/// Look up an admitted payload and build its result
pub async fn resolve(
    resolver: &dyn ProductResolver,
    raw: &RawScan,
    classification: Classification,
) -> ScanResult {
    let scan_type = classification.scan_type();

    match classification {
        Classification::Gs1 { key, fields } => match resolver.resolve_by_barcode(&key).await {
            Some(mut product) => {
                product.apply_gs1(&fields);
                ScanResult::resolved(raw, scan_type, product, Some(fields))
            }
            None => ScanResult::failed(raw, scan_type, ScanFailure::ProductNotFound, Some(fields)),
        },
        Classification::Qr { key: None } => {
            ScanResult::failed(raw, scan_type, ScanFailure::NotResolvable, None)
        }
        Classification::Qr { key: Some(key) } | Classification::Barcode { key } => {
            match resolver.resolve_by_barcode(&key).await {
                Some(product) => ScanResult::resolved(raw, scan_type, product, None),
                None => ScanResult::failed(raw, scan_type, ScanFailure::ProductNotFound, None),
            }
        }
    }
}
