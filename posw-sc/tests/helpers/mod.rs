//! Test helpers for posw-sc integration tests
//!
//! Provides deterministic stand-ins for the scanner hardware:
//! - MockConnector / MockTransport: scripted reads, counted calls, peak
//!   number of reads in flight
//! - RecordingFeedback: counts confirmation cues
//! - catalog(): small product catalog

#![allow(dead_code)]

use async_trait::async_trait;
use posw_common::config::{ConnectionConfig, TransportKind};
use posw_common::events::EventBus;
use posw_common::scan::ScannedProduct;
use posw_sc::error::{Error, Result};
use posw_sc::feedback::AudibleFeedback;
use posw_sc::resolver::{CatalogResolver, ProductResolver};
use posw_sc::transport::{Transport, TransportConnector};
use posw_sc::ScannerSession;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted transport read
#[derive(Debug, Clone)]
pub enum MockRead {
    /// Frame delivered by the device
    Data(Vec<u8>),
    /// Read timed out with nothing to deliver
    Empty,
    /// Link failure
    Fail(String),
    /// Device stops answering; the read blocks for this long
    Hang(Duration),
}

impl MockRead {
    pub fn data(payload: &str) -> Self {
        MockRead::Data(payload.as_bytes().to_vec())
    }
}

/// Connector handing out transports that share one read script
#[derive(Clone, Default)]
pub struct MockConnector {
    script: Arc<Mutex<VecDeque<MockRead>>>,
    reads: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    fail_open: Arc<AtomicBool>,
    read_delay_ms: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a read outcome; an empty script reads as `MockRead::Empty`
    pub fn push(&self, read: MockRead) {
        self.script.lock().unwrap().push_back(read);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Every read takes at least `delay`
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Highest number of reads observed running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Transport>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!("device {} not found", config.device_id)));
        }
        Ok(Box::new(MockTransport {
            kind: config.kind,
            script: Arc::clone(&self.script),
            reads: Arc::clone(&self.reads),
            closes: Arc::clone(&self.closes),
            read_delay_ms: Arc::clone(&self.read_delay_ms),
            in_flight: Arc::clone(&self.in_flight),
            peak_in_flight: Arc::clone(&self.peak_in_flight),
        }))
    }
}

pub struct MockTransport {
    kind: TransportKind,
    script: Arc<Mutex<VecDeque<MockRead>>>,
    reads: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    read_delay_ms: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter even when a read is cancelled
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn read_next(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        let _in_flight = InFlight(Arc::clone(&self.in_flight));

        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(MockRead::Data(bytes)) => Ok(Some(bytes)),
            Some(MockRead::Fail(reason)) => Err(Error::Transport(reason)),
            Some(MockRead::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(None)
            }
            Some(MockRead::Empty) | None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Counts confirmation cues
#[derive(Default)]
pub struct RecordingFeedback {
    beeps: AtomicUsize,
}

impl RecordingFeedback {
    pub fn beeps(&self) -> usize {
        self.beeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudibleFeedback for RecordingFeedback {
    async fn beep(&self, _volume: f32, _duration: Duration) {
        self.beeps.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn product(barcode: &str, name: &str, price: f64) -> ScannedProduct {
    ScannedProduct {
        barcode: barcode.to_string(),
        name: name.to_string(),
        price,
        stock: 12,
        category: "Abarrotes".to_string(),
        batch: None,
        expiry_date: None,
        manufacturing_date: None,
        weight: None,
    }
}

/// Catalog with a retail barcode and a GS1 GTIN
pub fn catalog() -> CatalogResolver {
    CatalogResolver::new([
        product("7501234567890", "Arroz 1kg", 32.5),
        product("07501234567893", "Queso Oaxaca", 89.9),
    ])
}

/// Session wired to a mock connector, the test catalog and a recording cue
pub struct TestSession {
    pub session: Arc<ScannerSession>,
    pub connector: MockConnector,
    pub feedback: Arc<RecordingFeedback>,
}

pub fn test_session() -> TestSession {
    test_session_with_resolver(Arc::new(catalog()))
}

pub fn test_session_with_resolver(resolver: Arc<dyn ProductResolver>) -> TestSession {
    let connector = MockConnector::new();
    let feedback = Arc::new(RecordingFeedback::default());
    let session = Arc::new(ScannerSession::new(
        Arc::new(connector.clone()),
        resolver,
        feedback.clone(),
        EventBus::new(100),
        Default::default(),
    ));
    TestSession {
        session,
        connector,
        feedback,
    }
}
