//! Payload classification
//!
//! Order matters, first match wins:
//! 1. Contains `(01)` and decodes as GS1-128 → gs1, keyed by GTIN
//! 2. URL scheme prefix or longer than 50 chars → qr, keyed by an embedded
//!    `barcode=<digits>` token when there is one
//! 3. Anything else → plain barcode, keyed by the trimmed payload
//!
//! A payload containing `(01)` that fails GS1 decoding falls through to the
//! qr/barcode rules.

use posw_common::gs1::{self, Gs1Fields};
use posw_common::scan::ScanType;

/// Payloads longer than this are treated as QR content
pub const QR_LENGTH_THRESHOLD: usize = 50;

const GS1_GTIN_MARKER: &str = "(01)";
const BARCODE_PARAM: &str = "barcode=";

/// Classifier verdict with the resolver key it implies
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Gs1 { key: String, fields: Gs1Fields },
    /// `key` is `None` when the QR content carries no barcode token
    Qr { key: Option<String> },
    Barcode { key: String },
}

impl Classification {
    pub fn scan_type(&self) -> ScanType {
        match self {
            Classification::Gs1 { .. } => ScanType::Gs1,
            Classification::Qr { .. } => ScanType::Qr,
            Classification::Barcode { .. } => ScanType::Barcode,
        }
    }

    /// Resolver key, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Classification::Gs1 { key, .. } => Some(key),
            Classification::Qr { key } => key.as_deref(),
            Classification::Barcode { key } => Some(key),
        }
    }
}

/// Classify one raw payload
pub fn classify(payload: &str) -> Classification {
    if payload.contains(GS1_GTIN_MARKER) {
        if let Some(fields) = gs1::decode(payload) {
            return Classification::Gs1 {
                key: fields.gtin.clone(),
                fields,
            };
        }
    }

    if has_url_scheme(payload) || payload.chars().count() > QR_LENGTH_THRESHOLD {
        return Classification::Qr {
            key: extract_barcode_param(payload),
        };
    }

    Classification::Barcode {
        key: payload.trim().to_string(),
    }
}

/// `scheme://` prefix, scheme per RFC 3986 (letter, then letters, digits, `+-.`)
fn has_url_scheme(payload: &str) -> bool {
    let payload = payload.trim_start();
    let Some(end) = payload.find("://") else {
        return false;
    };
    let scheme = &payload[..end];

    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Digits following a `barcode=` token at a parameter boundary
fn extract_barcode_param(payload: &str) -> Option<String> {
    payload.match_indices(BARCODE_PARAM).find_map(|(idx, _)| {
        let at_boundary = payload[..idx]
            .chars()
            .next_back()
            .map_or(true, |c| matches!(c, '?' | '&' | ';' | '#'));
        if !at_boundary {
            return None;
        }

        let digits: String = payload[idx + BARCODE_PARAM.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        (!digits.is_empty()).then_some(digits)
    })
}
