//! # API Request Models
//!
//! Structures for incoming API request bodies and query strings.
//! Each struct represents what the vendor dashboard sends.

use serde::{Deserialize, Serialize};

/// Query parameters for the earnings list.
///
/// ## Example URL
///
/// ```text
/// GET /vendors/earnings?page=2&limit=20&status=PAID
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsQuery {
    /// 1-based page number. Default: 1
    pub page: Option<u32>,

    /// Page size. Default: `DEFAULT_PAGE_SIZE`, Max: 100
    pub limit: Option<u32>,

    /// Filter by payout status (`PENDING`, `PROCESSING`, `PAID`, `FAILED`).
    pub status: Option<String>,
}

/// Amount typed into the withdrawal dialog.
///
/// The dashboard may send it as a JSON number or as the raw text of the
/// input field; both are validated the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    /// The input as text, ready for validation.
    pub fn as_text(&self) -> String {
        match self {
            AmountInput::Text(text) => text.clone(),
            AmountInput::Number(number) => number.to_string(),
        }
    }
}

/// Body of `POST /vendors/withdraw` and `POST /vendors/withdraw/validate`.
///
/// ## Example JSON
///
/// ```json
/// {
///     "amount": "50.00"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    /// Requested amount in major units (pounds, not pence).
    pub amount: AmountInput,
}

/// Query parameters of the WebSocket endpoint.
///
/// Browsers cannot set headers on a WebSocket handshake, so the bearer
/// token travels in the query string.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    pub token: String,
}
