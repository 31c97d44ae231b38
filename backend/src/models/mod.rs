//! # API Models
//!
//! This module defines the request and response structures for the REST API,
//! plus the ledger records read from the marketplace API.
//!
//! ## Organization
//!
//! - `earnings.rs` - Records returned by the marketplace (earnings, summary, receipts)
//! - `requests.rs` - Incoming request bodies
//! - `responses.rs` - Outgoing response bodies
//!
//! ## Serialization
//!
//! All models use Serde for JSON serialization/deserialization.
//! Field names are converted to camelCase for JavaScript clients.

pub mod earnings;
pub mod requests;
pub mod responses;

pub use earnings::*;
pub use requests::*;
pub use responses::*;
