//! GS1-128 Application Identifier decoding
//!
//! Decodes the human-readable GS1-128 form, a sequence of `(AI)value`
//! segments such as `(01)07501234567890(17)251231(10)ABC123`, into
//! [`Gs1Fields`].
//!
//! # Decoding policy
//!
//! - `(01)` followed by exactly 14 digits is mandatory. Without it the payload
//!   is not a GS1 record and [`decode`] returns `None`, so callers can fall
//!   back to treating the payload as a plain barcode.
//! - Optional AIs are decoded leniently: a malformed value (bad date, wrong
//!   digit count) is omitted while the GTIN and every other well-formed field
//!   are kept.
//! - Unknown AIs are skipped. When an AI repeats, the first occurrence wins.
//!
//! The decoder is a pure function and is shared with the supervisor
//! authorization scan mode.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// GTIN (mandatory)
pub const AI_GTIN: &str = "01";
/// Batch or lot number
pub const AI_BATCH: &str = "10";
/// Production date (YYMMDD)
pub const AI_PRODUCTION_DATE: &str = "11";
/// Expiration date (YYMMDD)
pub const AI_EXPIRY_DATE: &str = "17";
/// Serial number
pub const AI_SERIAL: &str = "21";
/// Net weight, grams scale
pub const AI_NET_WEIGHT: &str = "3102";
/// Amount payable, minor currency units
pub const AI_PRICE: &str = "3922";

const GTIN_LENGTH: usize = 14;
const DATE_LENGTH: usize = 6;
const WEIGHT_LENGTH: usize = 6;
const WEIGHT_SCALE: f64 = 1000.0;
const PRICE_SCALE: f64 = 100.0;
// Keeps the parsed amount inside i64
const PRICE_MAX_DIGITS: usize = 15;

/// Decoded Application Identifier set from a GS1-128 payload
///
/// Only fields present (and well-formed) in the input are populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gs1Fields {
    /// 14-digit GTIN from AI (01)
    pub gtin: String,
    /// Batch/lot from AI (10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    /// Expiry date from AI (17)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    /// Production date from AI (11)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturing_date: Option<NaiveDate>,
    /// Serial number from AI (21)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// Net weight in kilograms from AI (3102)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_weight_kg: Option<f64>,
    /// Price in currency minor units from AI (3922)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_minor: Option<i64>,
}

impl Gs1Fields {
    /// Price in major currency units (minor units / 100)
    pub fn price(&self) -> Option<f64> {
        self.price_minor.map(|minor| minor as f64 / PRICE_SCALE)
    }
}

/// Decode a GS1-128 payload
///
/// Returns `None` when the payload carries no well-formed `(01)` GTIN.
pub fn decode(payload: &str) -> Option<Gs1Fields> {
    let segments = split_segments(payload);

    let gtin = first_value(&segments, AI_GTIN)
        .filter(|v| v.len() == GTIN_LENGTH && all_digits(v))?
        .to_string();

    Some(Gs1Fields {
        gtin,
        batch: first_value(&segments, AI_BATCH)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        expiry_date: first_value(&segments, AI_EXPIRY_DATE).and_then(parse_yymmdd),
        manufacturing_date: first_value(&segments, AI_PRODUCTION_DATE).and_then(parse_yymmdd),
        serial_number: first_value(&segments, AI_SERIAL)
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        net_weight_kg: first_value(&segments, AI_NET_WEIGHT).and_then(parse_weight_kg),
        price_minor: first_value(&segments, AI_PRICE).and_then(parse_price_minor),
    })
}

/// Split a payload into `(ai, value)` pairs
///
/// A value runs from the closing parenthesis of its AI to the next `(` or
/// the end of the payload. Parenthesised groups that are not numeric AIs
/// are dropped together with their value.
fn split_segments(payload: &str) -> Vec<(&str, &str)> {
    let mut segments = Vec::new();
    let mut rest = payload;

    while let Some(open) = rest.find('(') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find(')') else {
            break;
        };

        let ai = &after_open[..close];
        let tail = &after_open[close + 1..];
        let end = tail.find('(').unwrap_or(tail.len());

        if is_ai(ai) {
            segments.push((ai, &tail[..end]));
        }

        rest = &tail[end..];
    }

    segments
}

fn first_value<'a>(segments: &[(&str, &'a str)], ai: &str) -> Option<&'a str> {
    segments
        .iter()
        .find(|(candidate, _)| *candidate == ai)
        .map(|(_, value)| *value)
}

fn is_ai(candidate: &str) -> bool {
    (2..=4).contains(&candidate.len()) && all_digits(candidate)
}

fn all_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// YYMMDD with the 20YY century assumption
fn parse_yymmdd(value: &str) -> Option<NaiveDate> {
    if value.len() != DATE_LENGTH || !all_digits(value) {
        return None;
    }

    let yy: i32 = value[0..2].parse().ok()?;
    let mm: u32 = value[2..4].parse().ok()?;
    let dd: u32 = value[4..6].parse().ok()?;

    NaiveDate::from_ymd_opt(2000 + yy, mm, dd)
}

fn parse_weight_kg(value: &str) -> Option<f64> {
    if value.len() != WEIGHT_LENGTH || !all_digits(value) {
        return None;
    }
    value.parse::<u32>().ok().map(|grams| grams as f64 / WEIGHT_SCALE)
}

fn parse_price_minor(value: &str) -> Option<i64> {
    if value.len() > PRICE_MAX_DIGITS || !all_digits(value) {
        return None;
    }
    value.parse().ok()
}
