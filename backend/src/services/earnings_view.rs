//! # Earnings View Service
//!
//! Turns one page of marketplace earnings into what the dashboard renders:
//! formatted money, status and withdrawal badges, per-row integrity faults,
//! recomputed totals, and warnings where the marketplace summary does not
//! add up.
//!
//! ## Load Flow
//!
//! ```text
//! GET /vendors/earnings?page&limit&status
//!              │
//!              ▼
//!     normalize query ── invalid ──► INVALID_QUERY
//!              │
//!              ▼
//!     marketplace list_earnings (timeout) ── error ──► UPSTREAM_*,
//!              │                                       cached state untouched
//!              ▼
//!     session: last query, summary, dialog bound
//!              │
//!              ▼
//!     build_view: rows + totals + warnings
//! ```
//!
//! A broken row never fails the request. It is flagged and the rest of the
//! list renders normally.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::client::ClientError;
use crate::config::AppConfig;
use crate::models::{
    ComputedTotalsView, EarningRowView, EarningsPage, EarningsQuery, EarningsView, FaultView, Money,
    SummaryView,
};
use crate::websocket::{WsEventType, WsRegistry};

use super::currency::{round_minor, CurrencyCode};
use super::ledger::{
    compute_display_summary, inspect_earning, reconcile_summary, IntegrityFault,
    WithdrawalFlagTracker,
};
use super::session::VendorSession;
use super::status::{badge_for_raw, withdrawal_badge, EarningStatus, StatusBadge};
use super::withdrawal::{BoundChangedData, ValidationError};

const MAX_PAGE_SIZE: u32 = 100;

/// Errors from loading earnings.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EarningsError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Could not load earnings, please try again ({0})")]
    Upstream(ClientError),
}

impl EarningsError {
    pub fn code(&self) -> &'static str {
        match self {
            EarningsError::InvalidQuery(_) => "INVALID_QUERY",
            EarningsError::Upstream(ClientError::Unauthorized) => "UNAUTHORIZED",
            EarningsError::Upstream(e) if e.is_ambiguous() => "UPSTREAM_UNAVAILABLE",
            EarningsError::Upstream(_) => "UPSTREAM_ERROR",
        }
    }
}

/// Payload of the `earnings_refreshed` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsRefreshedData {
    pub summary: SummaryView,
    pub warnings: Vec<FaultView>,
    pub balance_changed: bool,
}

/// Loads and renders earnings for vendor sessions.
#[derive(Clone)]
pub struct EarningsService {
    config: AppConfig,
    ws_registry: WsRegistry,
}

impl EarningsService {
    pub fn new(config: AppConfig, ws_registry: WsRegistry) -> Self {
        Self { config, ws_registry }
    }

    /// Fill in defaults and reject out-of-range values.
    ///
    /// Status filters are matched case-insensitively and sent upstream in
    /// their canonical upper-case form.
    pub fn normalize_query(&self, query: &EarningsQuery) -> Result<EarningsQuery, EarningsError> {
        let page = query.page.unwrap_or(1);
        if page == 0 {
            return Err(EarningsError::InvalidQuery("page must be at least 1".to_string()));
        }

        let limit = query.limit.unwrap_or(self.config.default_page_size);
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(EarningsError::InvalidQuery(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let status = match query.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let status: EarningStatus = raw.to_uppercase().parse().map_err(|_| {
                    EarningsError::InvalidQuery(format!("unknown status filter {:?}", raw))
                })?;
                Some(status.as_str().to_string())
            }
        };

        Ok(EarningsQuery {
            page: Some(page),
            limit: Some(limit),
            status,
        })
    }

    /// Load a page of earnings for the dashboard.
    pub async fn load(
        &self,
        session: &VendorSession,
        query: &EarningsQuery,
    ) -> Result<EarningsView, EarningsError> {
        let query = self.normalize_query(query)?;
        session.state.lock().await.touch();
        let (view, _, bound_error) = self.fetch_and_apply(session, query).await?;

        if let Some(error) = bound_error {
            self.notify_bound_changed(session, &view, error).await;
        }

        Ok(view)
    }

    /// Reload the session's last query and push the result over WebSocket.
    ///
    /// Returns whether the withdrawal balance changed.
    pub async fn refresh(&self, session: &VendorSession) -> Result<bool, EarningsError> {
        let query = session.state.lock().await.last_query.clone();
        let (view, balance_changed, bound_error) = self.fetch_and_apply(session, query).await?;

        if let Err(e) = self
            .ws_registry
            .send_to_session(
                &session.id.to_string(),
                WsEventType::EarningsRefreshed,
                EarningsRefreshedData {
                    summary: view.summary.clone(),
                    warnings: view.warnings.clone(),
                    balance_changed,
                },
            )
            .await
        {
            warn!("Failed to send earnings refresh via WebSocket: {}", e);
        }

        if let Some(error) = bound_error {
            self.notify_bound_changed(session, &view, error).await;
        }

        Ok(balance_changed)
    }

    async fn fetch_and_apply(
        &self,
        session: &VendorSession,
        query: EarningsQuery,
    ) -> Result<(EarningsView, bool, Option<ValidationError>), EarningsError> {
        debug!("Loading earnings for session {} ({:?})", session.id, query);

        let page = timeout(self.config.upstream_timeout, session.api.list_earnings(&query))
            .await
            .map_err(|_| EarningsError::Upstream(ClientError::Timeout(self.config.upstream_timeout)))?
            .map_err(|e| {
                warn!("Earnings load failed for session {}: {}", session.id, e);
                EarningsError::Upstream(e)
            })?;

        let mut state = session.state.lock().await;
        let previous_balance = state.withdrawal_balance();
        let filtered = query.status.is_some();
        let view = build_view(&page, filtered, &mut state.tracker, &self.config.currency);
        state.last_query = query;
        let bound_error = state.apply_summary(page.summary.clone());
        let balance_changed = previous_balance
            .map(|b| b != page.summary.withdrawal_balance)
            .unwrap_or(false);

        if view.computed.faulty_rows > 0 || !view.warnings.is_empty() {
            warn!(
                "Session {}: {} flagged rows, {} summary warnings",
                session.id,
                view.computed.faulty_rows,
                view.warnings.len()
            );
        }

        Ok((view, balance_changed, bound_error))
    }

    async fn notify_bound_changed(
        &self,
        session: &VendorSession,
        view: &EarningsView,
        error: ValidationError,
    ) {
        info!(
            "Withdrawal balance of session {} changed under a pending amount: {}",
            session.id, error
        );

        let data = BoundChangedData {
            withdrawal_balance: view.summary.withdrawal_balance.clone(),
            code: error.code().to_string(),
            message: error.to_string(),
        };
        if let Err(e) = self
            .ws_registry
            .send_to_session(&session.id.to_string(), WsEventType::WithdrawalBoundChanged, data)
            .await
        {
            warn!("Failed to send bound change via WebSocket: {}", e);
        }
    }
}

/// Build the dashboard view of one page.
///
/// `tracker` remembers which rows were already seen as moved to withdrawal
/// so that a row falling back to pending is flagged. A `filtered` page holds
/// a subset of the ledger, so its rows are never compared with the summary.
pub fn build_view(
    page: &EarningsPage,
    filtered: bool,
    tracker: &mut WithdrawalFlagTracker,
    currency: &CurrencyCode,
) -> EarningsView {
    let earnings: Vec<EarningRowView> = page
        .earnings
        .iter()
        .map(|e| build_row(e, tracker, currency))
        .collect();

    let totals = compute_display_summary(&page.earnings);
    let complete = !filtered && page.is_complete();
    let warnings = reconcile_summary(&page.summary, &totals, complete)
        .iter()
        .map(|d| FaultView {
            code: d.code().to_string(),
            message: d.message(),
        })
        .collect();

    let summary = &page.summary;
    EarningsView {
        summary: SummaryView {
            total_earnings: Money::new(summary.total_earnings, currency),
            total_commission: Money::new(summary.total_commission, currency),
            total_net_amount: Money::new(summary.total_net_amount, currency),
            pending_earnings: Money::new(summary.pending_earnings, currency),
            withdrawal_balance: Money::new(summary.withdrawal_balance, currency),
            available_for_withdrawal: Money::new(summary.available_for_withdrawal, currency),
            can_withdraw: summary.withdrawal_balance > Decimal::ZERO,
        },
        computed: ComputedTotalsView {
            total_earnings: Money::new(totals.total_earnings, currency),
            total_commission: Money::new(totals.total_commission, currency),
            total_net_amount: Money::new(totals.total_net_amount, currency),
            row_count: totals.row_count,
            faulty_rows: earnings.iter().filter(|r| r.flagged).count(),
            complete,
        },
        earnings,
        pagination: page.pagination.clone(),
        warnings,
        fetched_at: Utc::now(),
    }
}

fn build_row(
    earning: &crate::models::Earning,
    tracker: &mut WithdrawalFlagTracker,
    currency: &CurrencyCode,
) -> EarningRowView {
    let mut faults = inspect_earning(earning);
    if tracker.observe(earning) {
        faults.push(IntegrityFault::WithdrawalFlagRegressed);
    }

    let status = badge_for_raw(&earning.status).unwrap_or_else(|unknown| {
        warn!("Earning {} has unknown status {:?}", earning.id, unknown.0);
        StatusBadge::unknown(&unknown.0)
    });

    let commission_rate = earning
        .commission
        .checked_div(earning.amount)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(round_minor);

    EarningRowView {
        id: earning.id.clone(),
        order_number: earning.order.as_ref().map(|o| o.order_number.clone()),
        amount: Money::new(earning.amount, currency),
        commission: Money::new(earning.commission, currency),
        net_amount: Money::new(earning.net_amount, currency),
        commission_rate,
        status,
        withdrawal: withdrawal_badge(earning.moved_to_withdrawal),
        paid_at: earning.paid_at,
        moved_to_withdrawal_at: earning.moved_to_withdrawal_at,
        created_at: earning.created_at,
        flagged: !faults.is_empty(),
        faults: faults
            .iter()
            .map(|f| FaultView {
                code: f.code().to_string(),
                message: f.message(),
            })
            .collect(),
    }
}
