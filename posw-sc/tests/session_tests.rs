//! Integration tests for the scanner session lifecycle
//!
//! Drives `ScannerSession` against a scripted mock transport: connect,
//! continuous polling, single scans, faults and recovery.

mod helpers;

use chrono::NaiveDate;
use async_trait::async_trait;
use helpers::{catalog, test_session, test_session_with_resolver, MockRead};
use posw_common::config::{ScanMode, ScannerConfig};
use posw_common::events::ScanEvent;
use posw_common::scan::{ScanFailure, ScanType, ScannedProduct, ScannerState};
use posw_sc::resolver::{CatalogResolver, ProductResolver};
use posw_sc::Error;
use std::sync::Arc;
use std::time::Duration;

fn continuous_config(delay_ms: u64) -> ScannerConfig {
    let mut config = ScannerConfig::default();
    config.scanning.mode = ScanMode::Continuous;
    config.scanning.scan_delay_ms = delay_ms;
    config.scanning.read_timeout_ms = 50;
    config
}

#[tokio::test]
async fn test_connect_and_disconnect() {
    let t = test_session();
    assert_eq!(t.session.state().await, ScannerState::Disconnected);

    t.session.connect(ScannerConfig::default()).await.unwrap();
    assert_eq!(t.session.state().await, ScannerState::Connected);
    assert_eq!(t.connector.opens(), 1);

    let status = t.session.status().await;
    assert_eq!(status.device_id.as_deref(), Some("keyboard-wedge"));
    assert!(status.last_error.is_none());

    t.session.disconnect().await.unwrap();
    assert_eq!(t.session.state().await, ScannerState::Disconnected);
    assert_eq!(t.connector.closes(), 1);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let t = test_session();

    t.session.disconnect().await.unwrap();
    assert_eq!(t.session.state().await, ScannerState::Disconnected);

    t.session.connect(ScannerConfig::default()).await.unwrap();
    t.session.disconnect().await.unwrap();
    t.session.disconnect().await.unwrap();

    assert_eq!(t.session.state().await, ScannerState::Disconnected);
    assert_eq!(t.connector.closes(), 1);
}

#[tokio::test]
async fn test_connect_publishes_state_changes() {
    let t = test_session();
    let mut rx = t.session.subscribe();

    t.session.connect(ScannerConfig::default()).await.unwrap();

    let mut transitions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ScanEvent::ScannerStateChanged {
            old_state,
            new_state,
            ..
        } = event
        {
            transitions.push((old_state, new_state));
        }
    }
    assert_eq!(
        transitions,
        vec![
            (ScannerState::Disconnected, ScannerState::Connecting),
            (ScannerState::Connecting, ScannerState::Connected),
        ]
    );
}

#[tokio::test]
async fn test_continuous_polling_ticks_until_stopped() {
    let t = test_session();
    t.session.connect(continuous_config(100)).await.unwrap();
    t.session.start_scanning().await.unwrap();
    assert_eq!(t.session.state().await, ScannerState::Scanning);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(
        t.connector.reads() >= 2,
        "expected at least 2 polling ticks, got {}",
        t.connector.reads()
    );

    t.session.stop_scanning().await.unwrap();
    assert_eq!(t.session.state().await, ScannerState::Connected);

    let reads_at_stop = t.connector.reads();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(t.connector.reads(), reads_at_stop);
}

#[tokio::test]
async fn test_continuous_polling_processes_payloads() {
    let t = test_session();
    t.connector.push(MockRead::data("7501234567890\r\n"));

    t.session.connect(continuous_config(50)).await.unwrap();
    t.session.start_scanning().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    t.session.stop_scanning().await.unwrap();

    let history = t.session.history().await;
    assert_eq!(history.len(), 1);
    assert!(history[0].success);
    assert_eq!(history[0].raw_data, "7501234567890");
    assert_eq!(history[0].product.as_ref().unwrap().name, "Arroz 1kg");
}

#[tokio::test]
async fn test_disconnect_while_scanning_stops_polling() {
    let t = test_session();
    t.session.connect(continuous_config(50)).await.unwrap();
    t.session.start_scanning().await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    t.session.disconnect().await.unwrap();
    assert_eq!(t.session.state().await, ScannerState::Disconnected);

    let reads = t.connector.reads();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(t.connector.reads(), reads);
}

#[tokio::test]
async fn test_auto_mode_does_not_poll() {
    let t = test_session();
    t.session.connect(ScannerConfig::default()).await.unwrap();
    t.session.start_scanning().await.unwrap();
    assert_eq!(t.session.state().await, ScannerState::Scanning);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(t.connector.reads(), 0);

    t.connector.push(MockRead::data("7501234567890"));
    let result = t.session.scan_single().await.unwrap().unwrap();
    assert!(result.success);
    assert_eq!(t.session.state().await, ScannerState::Scanning);
}

#[tokio::test]
async fn test_scan_single_resolves_barcode() {
    let t = test_session();
    t.session.connect(ScannerConfig::default()).await.unwrap();
    t.connector.push(MockRead::data("7501234567890"));

    let result = t.session.scan_single().await.unwrap().unwrap();
    assert!(result.success);
    assert_eq!(result.scan_type, ScanType::Barcode);
    assert_eq!(result.product.as_ref().unwrap().price, 32.5);
    assert_eq!(t.session.state().await, ScannerState::Connected);

    assert_eq!(t.session.last_result().await.unwrap().id, result.id);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(t.feedback.beeps(), 1);
}

#[tokio::test]
async fn test_scan_single_gs1_enriches_product() {
    let t = test_session();
    t.session.connect(ScannerConfig::default()).await.unwrap();
    t.connector.push(MockRead::data("(01)07501234567893(17)261231(10)L42"));

    let result = t.session.scan_single().await.unwrap().unwrap();
    assert!(result.success);
    assert_eq!(result.scan_type, ScanType::Gs1);

    let product = result.product.unwrap();
    assert_eq!(product.name, "Queso Oaxaca");
    assert_eq!(product.batch.as_deref(), Some("L42"));
    assert_eq!(product.expiry_date, NaiveDate::from_ymd_opt(2026, 12, 31));
}

#[tokio::test]
async fn test_scan_single_unknown_barcode() {
    let t = test_session();
    t.session.connect(ScannerConfig::default()).await.unwrap();
    t.connector.push(MockRead::data("0000111122223"));

    let result = t.session.scan_single().await.unwrap().unwrap();
    assert!(!result.success);
    assert_eq!(result.error, Some(ScanFailure::ProductNotFound));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(t.feedback.beeps(), 0);
}

#[tokio::test]
async fn test_scan_single_without_data() {
    let t = test_session();
    t.session.connect(ScannerConfig::default()).await.unwrap();

    assert!(t.session.scan_single().await.unwrap().is_none());
    assert_eq!(t.session.state().await, ScannerState::Connected);
    assert!(t.session.history().await.is_empty());
}

#[tokio::test]
async fn test_repeated_payload_is_discarded() {
    let t = test_session();
    t.session.connect(ScannerConfig::default()).await.unwrap();
    t.connector.push(MockRead::data("7501234567890"));
    t.connector.push(MockRead::data("7501234567890"));
    t.connector.push(MockRead::data("07501234567893"));
    t.connector.push(MockRead::data("7501234567890"));

    assert!(t.session.scan_single().await.unwrap().is_some());
    assert!(t.session.scan_single().await.unwrap().is_none());
    assert!(t.session.scan_single().await.unwrap().is_some());
    assert!(t.session.scan_single().await.unwrap().is_some());

    assert_eq!(t.session.history().await.len(), 3);
}

#[tokio::test]
async fn test_invalid_transitions_are_rejected() {
    let t = test_session();

    assert!(matches!(
        t.session.start_scanning().await,
        Err(Error::InvalidState { .. })
    ));
    assert!(matches!(
        t.session.scan_single().await,
        Err(Error::InvalidState { .. })
    ));

    t.session.connect(ScannerConfig::default()).await.unwrap();
    assert!(matches!(
        t.session.stop_scanning().await,
        Err(Error::InvalidState { .. })
    ));
    assert!(matches!(
        t.session.connect(ScannerConfig::default()).await,
        Err(Error::InvalidState { .. })
    ));

    t.session.start_scanning().await.unwrap();
    assert!(matches!(
        t.session.start_scanning().await,
        Err(Error::InvalidState { .. })
    ));
    assert_eq!(t.session.state().await, ScannerState::Scanning);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_connecting() {
    let t = test_session();
    let mut config = ScannerConfig::default();
    config.connection.device_id = "  ".to_string();

    assert!(matches!(
        t.session.connect(config).await,
        Err(Error::Common(_))
    ));
    assert_eq!(t.session.state().await, ScannerState::Disconnected);
    assert_eq!(t.connector.opens(), 0);
}

#[tokio::test]
async fn test_open_failure_enters_error_state() {
    let t = test_session();
    t.connector.set_fail_open(true);

    let err = t.session.connect(ScannerConfig::default()).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    let status = t.session.status().await;
    assert_eq!(status.state, ScannerState::Error);
    assert!(status.last_error.unwrap().contains("not found"));

    // Explicit disconnect clears the error
    t.session.disconnect().await.unwrap();
    let status = t.session.status().await;
    assert_eq!(status.state, ScannerState::Disconnected);
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_read_fault_preserves_history_and_allows_reconnect() {
    let t = test_session();
    t.session.connect(ScannerConfig::default()).await.unwrap();
    t.connector.push(MockRead::data("7501234567890"));
    t.connector.push(MockRead::Fail("cable unplugged".to_string()));

    t.session.scan_single().await.unwrap().unwrap();
    let err = t.session.scan_single().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    let status = t.session.status().await;
    assert_eq!(status.state, ScannerState::Error);
    assert_eq!(
        status.last_error.as_deref(),
        Some("Transport error: cable unplugged")
    );
    assert_eq!(t.session.history().await.len(), 1);
    assert!(t.session.last_result().await.is_some());

    // Reconnect straight from error
    t.session.connect(ScannerConfig::default()).await.unwrap();
    assert_eq!(t.session.state().await, ScannerState::Connected);
    assert_eq!(t.connector.opens(), 2);
    assert_eq!(t.session.history().await.len(), 1);
}

#[tokio::test]
async fn test_polling_fault_enters_error_state() {
    let t = test_session();
    let mut rx = t.session.subscribe();
    t.connector.push(MockRead::Fail("link lost".to_string()));

    t.session.connect(continuous_config(50)).await.unwrap();
    t.session.start_scanning().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(t.session.state().await, ScannerState::Error);

    let mut saw_fault = false;
    while let Ok(event) = rx.try_recv() {
        if let ScanEvent::ScannerFault { reason, .. } = event {
            assert!(reason.contains("link lost"));
            saw_fault = true;
        }
    }
    assert!(saw_fault);

    // Polling ended with the fault
    let reads = t.connector.reads();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(t.connector.reads(), reads);

    // Stop is not valid from error; disconnect is
    assert!(t.session.stop_scanning().await.is_err());
    t.session.disconnect().await.unwrap();
    assert_eq!(t.session.state().await, ScannerState::Disconnected);
}

#[tokio::test]
async fn test_clear_history() {
    let t = test_session();
    t.session.connect(ScannerConfig::default()).await.unwrap();
    t.connector.push(MockRead::data("7501234567890"));
    t.session.scan_single().await.unwrap();

    t.session.clear_history().await;
    assert!(t.session.history().await.is_empty());
    assert!(t.session.last_result().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_scans_and_polling_never_read_concurrently() {
    let t = test_session();
    t.connector.set_read_delay(Duration::from_millis(30));

    let mut config = continuous_config(5);
    config.scanning.read_timeout_ms = 100;
    t.session.connect(config).await.unwrap();
    t.session.start_scanning().await.unwrap();

    let scans: Vec<_> = (0..8)
        .map(|_| {
            let session = Arc::clone(&t.session);
            tokio::spawn(async move { session.scan_single().await })
        })
        .collect();
    for scan in scans {
        assert!(scan.await.unwrap().unwrap().is_none());
    }

    t.session.stop_scanning().await.unwrap();

    assert!(t.connector.reads() >= 8);
    assert_eq!(t.connector.peak_in_flight(), 1);
}

#[tokio::test]
async fn test_hung_read_times_out_as_fault() {
    let t = test_session();
    let mut rx = t.session.subscribe();

    let mut config = ScannerConfig::default();
    config.scanning.read_timeout_ms = 50;
    t.session.connect(config).await.unwrap();
    t.connector.push(MockRead::Hang(Duration::from_millis(500)));

    let err = t.session.scan_single().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(50)), "unexpected error: {}", err);

    let status = t.session.status().await;
    assert_eq!(status.state, ScannerState::Error);
    assert!(status.last_error.unwrap().contains("timed out"));

    let mut saw_fault = false;
    while let Ok(event) = rx.try_recv() {
        if let ScanEvent::ScannerFault { reason, .. } = event {
            assert!(reason.contains("timed out after 50ms"));
            saw_fault = true;
        }
    }
    assert!(saw_fault);
}

/// Catalog lookup that takes `delay`
struct SlowResolver {
    catalog: CatalogResolver,
    delay: Duration,
}

#[async_trait]
impl ProductResolver for SlowResolver {
    async fn resolve_by_barcode(&self, key: &str) -> Option<ScannedProduct> {
        tokio::time::sleep(self.delay).await;
        self.catalog.resolve_by_barcode(key).await
    }
}

#[tokio::test]
async fn test_history_readable_during_slow_lookup() {
    let t = test_session_with_resolver(Arc::new(SlowResolver {
        catalog: catalog(),
        delay: Duration::from_millis(400),
    }));
    t.session.connect(ScannerConfig::default()).await.unwrap();
    t.connector.push(MockRead::data("7501234567890"));

    let session = Arc::clone(&t.session);
    let scan = tokio::spawn(async move { session.scan_single().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let history = tokio::time::timeout(Duration::from_millis(100), t.session.history())
        .await
        .expect("history blocked by the resolver");
    assert!(history.is_empty());

    tokio::time::timeout(Duration::from_millis(100), t.session.clear_history())
        .await
        .expect("clear_history blocked by the resolver");

    let result = scan.await.unwrap().unwrap().unwrap();
    assert!(result.success);
    assert_eq!(t.session.last_result().await.unwrap().id, result.id);
}
