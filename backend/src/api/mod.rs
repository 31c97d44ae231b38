//! # REST API Module
//!
//! This module defines all HTTP endpoints the vendor dashboard calls.
//!
//! ## Endpoint Overview
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/vendors/earnings` | Earnings view (rows, summary, warnings) |
//! | GET | `/vendors/withdraw/dialog` | Current withdrawal dialog |
//! | POST | `/vendors/withdraw/dialog` | Open the withdrawal dialog |
//! | DELETE | `/vendors/withdraw/dialog` | Dismiss the withdrawal dialog |
//! | POST | `/vendors/withdraw/validate` | Validate a typed amount |
//! | POST | `/vendors/withdraw` | Submit a withdrawal |
//! | DELETE | `/vendors/session` | Leave the dashboard |
//! | GET | `/health` | Health check |
//!
//! Every `/vendors` route needs `Authorization: Bearer <token>`.
//!
//! ## Request/Response Format
//!
//! All requests and responses use JSON:
//!
//! ```json
//! // Success response
//! {
//!     "success": true,
//!     "data": { ... }
//! }
//!
//! // Error response
//! {
//!     "success": false,
//!     "error": {
//!         "code": "ERROR_CODE",
//!         "message": "Human readable message"
//!     }
//! }
//! ```

pub mod handlers;
pub mod routes;

pub use routes::configure_routes;
