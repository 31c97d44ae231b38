//! # API Response Models
//!
//! Structures for outgoing API response bodies.
//! All responses are wrapped in a standard format.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::currency::{format_currency, CurrencyCode};
use crate::services::status::StatusBadge;
use crate::services::withdrawal::DialogState;

use super::Pagination;

/// Standard API response wrapper.
///
/// All API responses follow this format:
///
/// ## Success Response
///
/// ```json
/// {
///     "success": true,
///     "data": { ... },
///     "error": null
/// }
/// ```
///
/// ## Error Response
///
/// ```json
/// {
///     "success": false,
///     "data": null,
///     "error": {
///         "code": "AMOUNT_EXCEEDS_BALANCE",
///         "message": "Amount exceeds available balance of £20.00"
///     }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the request was successful.
    pub success: bool,

    /// Response data (null on error).
    pub data: Option<T>,

    /// Error information (null on success).
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(code: &str, message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
                redirect: None,
            }),
        }
    }

    /// Create an error response that also tells the dashboard where to go.
    pub fn error_with_redirect(code: &str, message: &str, redirect: RedirectHint) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
                redirect: Some(redirect),
            }),
        }
    }
}

/// API error information.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Error code (e.g., "ONBOARDING_REQUIRED").
    pub code: String,

    /// Human-readable error message.
    pub message: String,

    /// Navigation the dashboard should perform after showing the message.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub redirect: Option<RedirectHint>,
}

/// Delayed navigation instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectHint {
    /// Dashboard path, e.g. `/vendor/profile`.
    pub path: String,

    /// How long the message stays on screen first.
    pub delay_ms: u64,
}

/// An amount with its display string.
///
/// ```json
/// { "amount": "1234.50", "formatted": "£1,234.50" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    pub amount: Decimal,
    pub formatted: String,
}

impl Money {
    pub fn new(amount: Decimal, currency: &CurrencyCode) -> Self {
        Self {
            amount,
            formatted: format_currency(amount, currency),
        }
    }
}

/// A data-integrity problem shown next to a row or the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultView {
    pub code: String,
    pub message: String,
}

/// One row of the earnings table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningRowView {
    pub id: String,
    pub order_number: Option<String>,
    pub amount: Money,
    pub commission: Money,
    pub net_amount: Money,

    /// Commission as a percentage of the gross amount, 2 decimal places.
    /// Absent when the gross amount is zero.
    pub commission_rate: Option<Decimal>,

    pub status: StatusBadge,
    pub withdrawal: StatusBadge,
    pub paid_at: Option<DateTime<Utc>>,
    pub moved_to_withdrawal_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,

    /// True when `faults` is non-empty; the dashboard marks the row.
    pub flagged: bool,
    pub faults: Vec<FaultView>,
}

/// Marketplace summary, formatted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub total_earnings: Money,
    pub total_commission: Money,
    pub total_net_amount: Money,
    pub pending_earnings: Money,
    pub withdrawal_balance: Money,
    pub available_for_withdrawal: Money,

    /// Whether the withdraw button should be offered.
    pub can_withdraw: bool,
}

/// Totals recomputed from the listed rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedTotalsView {
    pub total_earnings: Money,
    pub total_commission: Money,
    pub total_net_amount: Money,
    pub row_count: usize,
    pub faulty_rows: usize,

    /// Whether the rows are the vendor's complete earnings set, which is
    /// when totals are compared with the summary.
    pub complete: bool,
}

/// Response of `GET /vendors/earnings`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsView {
    pub earnings: Vec<EarningRowView>,
    pub pagination: Option<Pagination>,
    pub summary: SummaryView,
    pub computed: ComputedTotalsView,

    /// Summary discrepancies; empty when everything agrees.
    pub warnings: Vec<FaultView>,

    pub fetched_at: DateTime<Utc>,
}

/// Current withdrawal dialog, as the dashboard renders it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogView {
    pub dialog: DialogState,

    /// False while a submission is in flight; the dashboard disables the
    /// submit button.
    pub can_submit: bool,

    pub in_flight: bool,
}

/// Result of a successful withdrawal.
///
/// ## Example Response
///
/// ```json
/// {
///     "success": true,
///     "data": {
///         "amount": { "amount": "50", "formatted": "£50.00" },
///         "remainingBalance": { "amount": "35", "formatted": "£35.00" },
///         "status": "pending",
///         "transferId": "tr_1Nv...",
///         "estimatedArrival": "2026-10-21",
///         "idempotencyKey": "550e8400-e29b-41d4-a716-446655440000"
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalOutcome {
    pub amount: Money,

    /// Balance reported by the marketplace after the withdrawal.
    pub remaining_balance: Money,

    pub status: String,
    pub transfer_id: Option<String>,
    pub estimated_arrival: Option<String>,
    pub idempotency_key: Uuid,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service status: "healthy".
    pub status: String,

    /// Number of vendor sessions held in memory.
    pub active_sessions: usize,

    /// Number of open WebSocket connections.
    pub websocket_connections: usize,

    /// Service version.
    pub version: String,

    /// Current timestamp.
    pub timestamp: DateTime<Utc>,
}
