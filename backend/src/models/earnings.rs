//! # Marketplace Ledger Records
//!
//! Structures returned by the external marketplace API. They mirror the
//! wire format (camelCase JSON) and are treated as read-only input: the
//! service never edits a record, it only inspects and renders it.
//!
//! Amounts arrive either as JSON numbers or as numeric strings depending
//! on the marketplace version; `Decimal` accepts both.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One vendor earning row (one per completed order).
///
/// ## Example JSON
///
/// ```json
/// {
///     "id": "earn_01",
///     "amount": 100,
///     "commission": 15,
///     "netAmount": 85,
///     "status": "PAID",
///     "paidAt": "2026-10-01T12:00:00Z",
///     "movedToWithdrawal": true,
///     "movedToWithdrawalAt": "2026-10-03T12:00:00Z",
///     "createdAt": "2026-09-30T09:12:00Z",
///     "order": { "id": "ord_9", "orderNumber": "ORD-1009", "total": 100, "status": "DELIVERED" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Earning {
    /// Unique identifier.
    pub id: String,

    /// Gross amount earned from the order.
    pub amount: Decimal,

    /// Platform commission deducted from `amount`.
    pub commission: Decimal,

    /// `amount - commission`, as reported by the marketplace.
    pub net_amount: Decimal,

    /// Payout status, kept as the raw string so an unknown value can be
    /// flagged instead of failing the whole page.
    pub status: String,

    /// Set when the payout was confirmed.
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,

    /// Whether `net_amount` counts toward the withdrawal balance.
    #[serde(default)]
    pub moved_to_withdrawal: bool,

    #[serde(default)]
    pub moved_to_withdrawal_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    /// Originating order, owned by the order subsystem.
    #[serde(default)]
    pub order: Option<OrderRef>,
}

/// Reference to the order an earning came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub id: String,
    pub order_number: String,
    pub total: Decimal,
    pub status: String,
}

/// Aggregate over all of a vendor's earnings, computed by the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Sum of `amount`.
    pub total_earnings: Decimal,

    /// Sum of `commission`.
    pub total_commission: Decimal,

    /// Sum of `net_amount`.
    pub total_net_amount: Decimal,

    /// Net amount still inside the holding period.
    #[serde(default)]
    pub pending_earnings: Decimal,

    /// Net amount the vendor can withdraw right now.
    pub withdrawal_balance: Decimal,

    /// Cumulative net amount ever moved to withdrawal.
    #[serde(default)]
    pub available_for_withdrawal: Decimal,
}

/// Pagination block of the earnings list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub total_pages: u32,
}

fn default_page() -> u32 {
    1
}

/// `data` payload of `GET /vendors/earnings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsPage {
    pub earnings: Vec<Earning>,

    #[serde(default)]
    pub pagination: Option<Pagination>,

    pub summary: Summary,
}

impl EarningsPage {
    /// Whether this page holds the vendor's complete earnings set.
    ///
    /// Only then can totals recomputed from the rows be compared with the
    /// marketplace summary.
    pub fn is_complete(&self) -> bool {
        match &self.pagination {
            Some(p) => p.page <= 1 && p.total <= self.earnings.len() as u64,
            None => true,
        }
    }
}

/// `data` payload of a successful `POST /vendors/withdraw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalReceipt {
    pub amount: Decimal,
    pub remaining_balance: Decimal,
    pub status: String,
    #[serde(default)]
    pub transfer_id: Option<String>,
    #[serde(default)]
    pub estimated_arrival: Option<String>,
}

/// `data` payload of `GET /vendors/profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorProfile {
    pub id: String,
    #[serde(default)]
    pub store_name: Option<String>,
    #[serde(default)]
    pub stripe_account_id: Option<String>,
    #[serde(default)]
    pub stripe_onboarding_complete: bool,
}
