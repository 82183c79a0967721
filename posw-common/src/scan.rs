//! Scan data model
//!
//! Types shared between the capture pipeline, the session manager and the
//! HTTP layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gs1::Gs1Fields;

/// Unprocessed payload from a transport read or the keystroke buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScan {
    pub data: String,
    pub captured_at: DateTime<Utc>,
}

impl RawScan {
    /// Create a raw scan captured now
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            captured_at: Utc::now(),
        }
    }

    /// Payload length in characters
    pub fn char_len(&self) -> usize {
        self.data.chars().count()
    }
}

/// Encoding type decided by the scan classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Barcode,
    Qr,
    Gs1,
}

impl std::fmt::Display for ScanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanType::Barcode => write!(f, "barcode"),
            ScanType::Qr => write!(f, "qr"),
            ScanType::Gs1 => write!(f, "gs1"),
        }
    }
}

/// Why a scan did not resolve to a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanFailure {
    /// QR payload without an extractable barcode key
    #[serde(rename = "not resolvable")]
    NotResolvable,
    /// Resolver returned no product for the key
    #[serde(rename = "product not found")]
    ProductNotFound,
}

impl std::fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanFailure::NotResolvable => write!(f, "not resolvable"),
            ScanFailure::ProductNotFound => write!(f, "product not found"),
        }
    }
}

/// Catalog item resolved from a scan, merged with GS1 enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedProduct {
    pub barcode: String,
    pub name: String,
    pub price: f64,
    pub stock: i64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturing_date: Option<NaiveDate>,
    /// Net weight in kilograms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl ScannedProduct {
    /// Overlay GS1 batch, dates and weight onto the catalog values
    ///
    /// Only fields present in `fields` replace catalog values.
    pub fn apply_gs1(&mut self, fields: &Gs1Fields) {
        if let Some(batch) = &fields.batch {
            self.batch = Some(batch.clone());
        }
        if let Some(expiry) = fields.expiry_date {
            self.expiry_date = Some(expiry);
        }
        if let Some(produced) = fields.manufacturing_date {
            self.manufacturing_date = Some(produced);
        }
        if let Some(weight) = fields.net_weight_kg {
            self.weight = Some(weight);
        }
    }
}

/// Outcome of processing one raw scan
///
/// `product` is set exactly when `success` is true, `error` exactly when it
/// is false. Use [`ScanResult::resolved`] and [`ScanResult::failed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: Uuid,
    pub success: bool,
    pub scan_type: ScanType,
    pub raw_data: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ScannedProduct>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ScanFailure>,
    /// Decoded GS1 fields when classified as gs1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gs1: Option<Gs1Fields>,
}

impl ScanResult {
    pub fn resolved(
        raw: &RawScan,
        scan_type: ScanType,
        product: ScannedProduct,
        gs1: Option<Gs1Fields>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            success: true,
            scan_type,
            raw_data: raw.data.clone(),
            timestamp: raw.captured_at,
            product: Some(product),
            error: None,
            gs1,
        }
    }

    pub fn failed(
        raw: &RawScan,
        scan_type: ScanType,
        failure: ScanFailure,
        gs1: Option<Gs1Fields>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            success: false,
            scan_type,
            raw_data: raw.data.clone(),
            timestamp: raw.captured_at,
            product: None,
            error: Some(failure),
            gs1,
        }
    }
}

/// Scanner session connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerState {
    Disconnected,
    Connecting,
    Connected,
    Scanning,
    Error,
}

impl ScannerState {
    /// True while a transport handle is held and usable
    pub fn is_connected(&self) -> bool {
        matches!(self, ScannerState::Connected | ScannerState::Scanning)
    }
}

impl std::fmt::Display for ScannerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScannerState::Disconnected => write!(f, "disconnected"),
            ScannerState::Connecting => write!(f, "connecting"),
            ScannerState::Connected => write!(f, "connected"),
            ScannerState::Scanning => write!(f, "scanning"),
            ScannerState::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> ScannedProduct {
        ScannedProduct {
            barcode: "07501234567890".to_string(),
            name: "Leche entera 1L".to_string(),
            price: 24.5,
            stock: 12,
            category: "Lacteos".to_string(),
            batch: Some("CATALOG".to_string()),
            expiry_date: None,
            manufacturing_date: None,
            weight: Some(1.0),
        }
    }

    #[test]
    fn test_apply_gs1_overrides_present_fields_only() {
        let mut p = product();
        let fields = crate::gs1::decode("(01)07501234567890(17)251231").unwrap();

        p.apply_gs1(&fields);

        assert_eq!(p.expiry_date, NaiveDate::from_ymd_opt(2025, 12, 31));
        // Absent in GS1 payload, catalog value kept
        assert_eq!(p.batch.as_deref(), Some("CATALOG"));
        assert_eq!(p.weight, Some(1.0));
        // Price is never taken from GS1
        assert_eq!(p.price, 24.5);
    }

    #[test]
    fn test_apply_gs1_batch_and_weight_win() {
        let mut p = product();
        let fields = crate::gs1::decode("(01)07501234567890(10)L99(3102)000750").unwrap();

        p.apply_gs1(&fields);

        assert_eq!(p.batch.as_deref(), Some("L99"));
        assert_eq!(p.weight, Some(0.75));
    }

    #[test]
    fn test_result_constructors_keep_invariant() {
        let raw = RawScan::new("7501234567890");

        let ok = ScanResult::resolved(&raw, ScanType::Barcode, product(), None);
        assert!(ok.success);
        assert!(ok.product.is_some());
        assert!(ok.error.is_none());
        assert_eq!(ok.timestamp, raw.captured_at);

        let failed = ScanResult::failed(&raw, ScanType::Barcode, ScanFailure::ProductNotFound, None);
        assert!(!failed.success);
        assert!(failed.product.is_none());
        assert_eq!(failed.error, Some(ScanFailure::ProductNotFound));
    }

    #[test]
    fn test_failure_serialization() {
        let raw = RawScan::new("https://example.com/p");
        let result = ScanResult::failed(&raw, ScanType::Qr, ScanFailure::NotResolvable, None);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["error"], "not resolvable");
        assert_eq!(json["scan_type"], "qr");
        assert_eq!(json["success"], false);
        assert!(json.get("product").is_none());
    }

    #[test]
    fn test_scanner_state_display() {
        assert_eq!(ScannerState::Scanning.to_string(), "scanning");
        assert!(ScannerState::Scanning.is_connected());
        assert!(!ScannerState::Error.is_connected());
    }

    #[test]
    fn test_raw_scan_char_len() {
        assert_eq!(RawScan::new("ñandú").char_len(), 5);
    }
}
