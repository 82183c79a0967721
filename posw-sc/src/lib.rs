//! # POSW Scanner Capture Library (posw-sc)
//!
//! Barcode/QR capture pipeline for the point-of-sale and warehouse screens.
//!
//! **Purpose:** Turn keystroke bursts and scanner payloads into product
//! lookups, decode GS1-128 data, manage the scanner connection lifecycle,
//! and expose it all over HTTP/SSE.
//!
//! **Architecture:** keystroke capture → transport → session manager →
//! scan pipeline (classify, resolve, enrich) → history + EventBus

pub mod api;
pub mod error;
pub mod feedback;
pub mod keystroke;
pub mod pipeline;
pub mod resolver;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use session::{ScannerSession, SessionStatus};
