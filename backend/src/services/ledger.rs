//! # Earnings Ledger
//!
//! Recomputes the vendor's totals from earning rows and checks both the
//! rows and the marketplace summary for consistency.
//!
//! ## Why both sides?
//!
//! The marketplace sends a ready-made `summary` next to each earnings page.
//! Neither is taken on faith:
//!
//! ```text
//! rows ──► compute_display_summary ──► LedgerTotals ─┐
//!                                                     ├─► reconcile_summary ──► discrepancies
//! marketplace summary ────────────────────────────────┘
//! ```
//!
//! Totals can only be compared when the page holds every earning; the
//! summary's internal invariants are checked on every page.
//!
//! ## Faults
//!
//! A bad row never aborts the computation. It is summed as reported and
//! flagged with an [`IntegrityFault`] so the dashboard can mark it.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{Earning, Summary};

use super::status::EarningStatus;

/// One minor currency unit (a penny).
pub fn minor_unit() -> Decimal {
    Decimal::new(1, 2)
}

/// Whether two amounts agree to within one minor unit.
pub fn within_minor_unit(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= minor_unit()
}

/// Something wrong with a single earning row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityFault {
    NegativeAmount { amount: Decimal },
    NegativeCommission { commission: Decimal },
    CommissionExceedsAmount { amount: Decimal, commission: Decimal },
    NetAmountMismatch { expected: Decimal, reported: Decimal },
    UnknownStatus { raw: String },
    PaidWithoutPaidAt,
    PaidAtWithoutPaidStatus,
    /// `movedToWithdrawal` went back to false after being seen true.
    WithdrawalFlagRegressed,
}

impl IntegrityFault {
    /// Stable code for the dashboard.
    pub fn code(&self) -> &'static str {
        match self {
            IntegrityFault::NegativeAmount { .. } => "NEGATIVE_AMOUNT",
            IntegrityFault::NegativeCommission { .. } => "NEGATIVE_COMMISSION",
            IntegrityFault::CommissionExceedsAmount { .. } => "COMMISSION_EXCEEDS_AMOUNT",
            IntegrityFault::NetAmountMismatch { .. } => "NET_AMOUNT_MISMATCH",
            IntegrityFault::UnknownStatus { .. } => "UNKNOWN_STATUS",
            IntegrityFault::PaidWithoutPaidAt => "PAID_WITHOUT_PAID_AT",
            IntegrityFault::PaidAtWithoutPaidStatus => "PAID_AT_WITHOUT_PAID_STATUS",
            IntegrityFault::WithdrawalFlagRegressed => "WITHDRAWAL_FLAG_REGRESSED",
        }
    }

    /// Human-readable explanation.
    pub fn message(&self) -> String {
        match self {
            IntegrityFault::NegativeAmount { amount } => {
                format!("Gross amount is negative ({})", amount)
            }
            IntegrityFault::NegativeCommission { commission } => {
                format!("Commission is negative ({})", commission)
            }
            IntegrityFault::CommissionExceedsAmount { amount, commission } => {
                format!("Commission {} exceeds gross amount {}", commission, amount)
            }
            IntegrityFault::NetAmountMismatch { expected, reported } => {
                format!("Net amount {} does not match amount minus commission ({})", reported, expected)
            }
            IntegrityFault::UnknownStatus { raw } => format!("Unrecognized status {:?}", raw),
            IntegrityFault::PaidWithoutPaidAt => "Marked paid without a payment date".to_string(),
            IntegrityFault::PaidAtWithoutPaidStatus => {
                "Has a payment date but is not marked paid".to_string()
            }
            IntegrityFault::WithdrawalFlagRegressed => {
                "Was available for withdrawal and is now reported pending".to_string()
            }
        }
    }
}

/// Check one row against the ledger invariants.
pub fn inspect_earning(earning: &Earning) -> Vec<IntegrityFault> {
    let mut faults = Vec::new();

    if earning.amount.is_sign_negative() && !earning.amount.is_zero() {
        faults.push(IntegrityFault::NegativeAmount { amount: earning.amount });
    }
    if earning.commission.is_sign_negative() && !earning.commission.is_zero() {
        faults.push(IntegrityFault::NegativeCommission { commission: earning.commission });
    }
    if earning.commission > earning.amount {
        faults.push(IntegrityFault::CommissionExceedsAmount {
            amount: earning.amount,
            commission: earning.commission,
        });
    }

    let expected = earning.amount - earning.commission;
    if !within_minor_unit(expected, earning.net_amount) {
        faults.push(IntegrityFault::NetAmountMismatch {
            expected,
            reported: earning.net_amount,
        });
    }

    match earning.status.parse::<EarningStatus>() {
        Ok(EarningStatus::Paid) if earning.paid_at.is_none() => {
            faults.push(IntegrityFault::PaidWithoutPaidAt);
        }
        Ok(EarningStatus::Paid) => {}
        Ok(_) if earning.paid_at.is_some() => {
            faults.push(IntegrityFault::PaidAtWithoutPaidStatus);
        }
        Ok(_) => {}
        Err(unknown) => faults.push(IntegrityFault::UnknownStatus { raw: unknown.0 }),
    }

    faults
}

/// Totals recomputed from a list of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTotals {
    pub total_earnings: Decimal,
    pub total_commission: Decimal,
    pub total_net_amount: Decimal,
    /// Net amount of rows already moved to withdrawal.
    pub moved_net_amount: Decimal,
    /// Net amount of rows still in the holding period.
    pub unmoved_net_amount: Decimal,
    pub row_count: usize,
    pub faulty_rows: usize,
}

/// Sum a list of earnings.
///
/// Rows with faults are summed as reported and counted in `faulty_rows`.
pub fn compute_display_summary(earnings: &[Earning]) -> LedgerTotals {
    earnings.iter().fold(LedgerTotals::default(), |mut totals, e| {
        totals.total_earnings += e.amount;
        totals.total_commission += e.commission;
        totals.total_net_amount += e.net_amount;
        if e.moved_to_withdrawal {
            totals.moved_net_amount += e.net_amount;
        } else {
            totals.unmoved_net_amount += e.net_amount;
        }
        totals.row_count += 1;
        if !inspect_earning(e).is_empty() {
            totals.faulty_rows += 1;
        }
        totals
    })
}

/// A disagreement involving the marketplace summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SummaryDiscrepancy {
    /// `totalNetAmount != totalEarnings - totalCommission`.
    NetIdentityBroken { expected: Decimal, reported: Decimal },
    WithdrawalBalanceNegative { withdrawal_balance: Decimal },
    WithdrawalBalanceExceedsNet { withdrawal_balance: Decimal, total_net_amount: Decimal },
    /// Summary total differs from the recomputed one.
    TotalMismatch { field: &'static str, server: Decimal, computed: Decimal },
}

impl SummaryDiscrepancy {
    pub fn code(&self) -> &'static str {
        match self {
            SummaryDiscrepancy::NetIdentityBroken { .. } => "NET_IDENTITY_BROKEN",
            SummaryDiscrepancy::WithdrawalBalanceNegative { .. } => "WITHDRAWAL_BALANCE_NEGATIVE",
            SummaryDiscrepancy::WithdrawalBalanceExceedsNet { .. } => "WITHDRAWAL_BALANCE_EXCEEDS_NET",
            SummaryDiscrepancy::TotalMismatch { .. } => "TOTAL_MISMATCH",
        }
    }

    pub fn message(&self) -> String {
        match self {
            SummaryDiscrepancy::NetIdentityBroken { expected, reported } => format!(
                "Summary net total {} does not equal earnings minus commission ({})",
                reported, expected
            ),
            SummaryDiscrepancy::WithdrawalBalanceNegative { withdrawal_balance } => {
                format!("Withdrawal balance is negative ({})", withdrawal_balance)
            }
            SummaryDiscrepancy::WithdrawalBalanceExceedsNet { withdrawal_balance, total_net_amount } => format!(
                "Withdrawal balance {} exceeds total net earnings {}",
                withdrawal_balance, total_net_amount
            ),
            SummaryDiscrepancy::TotalMismatch { field, server, computed } => format!(
                "Summary {} is {} but the listed earnings add up to {}",
                field, server, computed
            ),
        }
    }
}

/// Check the marketplace summary, and compare it with the recomputation
/// when `complete` says the rows are the whole earnings set.
pub fn reconcile_summary(
    server: &Summary,
    computed: &LedgerTotals,
    complete: bool,
) -> Vec<SummaryDiscrepancy> {
    let mut found = Vec::new();

    let expected_net = server.total_earnings - server.total_commission;
    if !within_minor_unit(expected_net, server.total_net_amount) {
        found.push(SummaryDiscrepancy::NetIdentityBroken {
            expected: expected_net,
            reported: server.total_net_amount,
        });
    }

    if server.withdrawal_balance.is_sign_negative() && !server.withdrawal_balance.is_zero() {
        found.push(SummaryDiscrepancy::WithdrawalBalanceNegative {
            withdrawal_balance: server.withdrawal_balance,
        });
    }
    if server.withdrawal_balance > server.total_net_amount + minor_unit() {
        found.push(SummaryDiscrepancy::WithdrawalBalanceExceedsNet {
            withdrawal_balance: server.withdrawal_balance,
            total_net_amount: server.total_net_amount,
        });
    }

    if complete {
        let pairs = [
            ("totalEarnings", server.total_earnings, computed.total_earnings),
            ("totalCommission", server.total_commission, computed.total_commission),
            ("totalNetAmount", server.total_net_amount, computed.total_net_amount),
        ];
        for (field, server_value, computed_value) in pairs {
            if !within_minor_unit(server_value, computed_value) {
                found.push(SummaryDiscrepancy::TotalMismatch {
                    field,
                    server: server_value,
                    computed: computed_value,
                });
            }
        }
    }

    found
}

/// Remembers which earnings were seen with `movedToWithdrawal == true`.
///
/// The flag only ever goes from false to true, so a later fetch reporting
/// false for a remembered id is a regression.
#[derive(Debug, Clone, Default)]
pub struct WithdrawalFlagTracker {
    moved: HashSet<String>,
}

impl WithdrawalFlagTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation. Returns `true` if the flag regressed.
    pub fn observe(&mut self, earning: &Earning) -> bool {
        if earning.moved_to_withdrawal {
            self.moved.insert(earning.id.clone());
            false
        } else {
            self.moved.contains(&earning.id)
        }
    }

    pub fn len(&self) -> usize {
        self.moved.len()
    }
}
