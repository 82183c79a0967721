//! # POSW Common Library
//!
//! Shared code for the POSW scanner capture services including:
//! - Scan data model (raw payloads, results, products, scanner state)
//! - GS1-128 Application Identifier decoding
//! - Event types (ScanEvent enum) and the EventBus
//! - Bootstrap configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod gs1;
pub mod scan;

pub use error::{Error, Result};
pub use gs1::Gs1Fields;
