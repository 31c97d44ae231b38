//! # Status Presentation
//!
//! Maps an earning's payout status and its withdrawal flag to the badge the
//! dashboard shows.
//!
//! | status | label | tone |
//! |--------|-------|------|
//! | `PAID` | Paid | success |
//! | `PENDING` | Pending | warning |
//! | `PROCESSING` | Processing | info |
//! | `FAILED` | Failed | danger |
//!
//! Status strings the marketplace adds later are not defaulted to anything:
//! [`EarningStatus::from_str`] returns [`UnknownStatus`] and the row gets a
//! fault badge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Payout status of an earning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EarningStatus {
    Pending,
    Processing,
    Paid,
    Failed,
}

impl EarningStatus {
    pub const ALL: [EarningStatus; 4] = [
        EarningStatus::Pending,
        EarningStatus::Processing,
        EarningStatus::Paid,
        EarningStatus::Failed,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EarningStatus::Pending => "PENDING",
            EarningStatus::Processing => "PROCESSING",
            EarningStatus::Paid => "PAID",
            EarningStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for EarningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized earning status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for EarningStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(EarningStatus::Pending),
            "PROCESSING" => Ok(EarningStatus::Processing),
            "PAID" => Ok(EarningStatus::Paid),
            "FAILED" => Ok(EarningStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Semantic colour of a badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BadgeTone {
    Success,
    Warning,
    Info,
    Danger,
    /// Data the dashboard cannot trust.
    Fault,
}

impl BadgeTone {
    /// Tailwind classes used by the dashboard.
    pub fn class_name(&self) -> &'static str {
        match self {
            BadgeTone::Success => "bg-green-100 text-green-800",
            BadgeTone::Warning => "bg-yellow-100 text-yellow-800",
            BadgeTone::Info => "bg-blue-100 text-blue-800",
            BadgeTone::Danger => "bg-red-100 text-red-800",
            BadgeTone::Fault => "bg-red-600 text-white",
        }
    }
}

/// A rendered badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBadge {
    pub label: String,
    pub tone: BadgeTone,
    pub class_name: &'static str,
    pub icon: &'static str,
}

impl StatusBadge {
    fn new(label: &str, tone: BadgeTone, icon: &'static str) -> Self {
        Self {
            label: label.to_string(),
            tone,
            class_name: tone.class_name(),
            icon,
        }
    }

    /// Badge for a status the service does not know.
    pub fn unknown(raw: &str) -> Self {
        Self::new(&format!("Unknown status: {}", raw), BadgeTone::Fault, "alert-triangle")
    }
}

/// Badge for a payout status.
pub fn status_badge(status: EarningStatus) -> StatusBadge {
    match status {
        EarningStatus::Paid => StatusBadge::new("Paid", BadgeTone::Success, "check-circle"),
        EarningStatus::Pending => StatusBadge::new("Pending", BadgeTone::Warning, "clock"),
        EarningStatus::Processing => StatusBadge::new("Processing", BadgeTone::Info, "loader"),
        EarningStatus::Failed => StatusBadge::new("Failed", BadgeTone::Danger, "x-circle"),
    }
}

/// Badge for the `movedToWithdrawal` flag.
pub fn withdrawal_badge(moved_to_withdrawal: bool) -> StatusBadge {
    if moved_to_withdrawal {
        StatusBadge::new("Available", BadgeTone::Success, "wallet")
    } else {
        StatusBadge::new("Pending", BadgeTone::Warning, "hourglass")
    }
}

/// Parse a raw status and map it, failing on unknown values.
pub fn badge_for_raw(raw: &str) -> Result<StatusBadge, UnknownStatus> {
    raw.parse::<EarningStatus>().map(status_badge)
}
