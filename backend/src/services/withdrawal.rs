//! # Withdrawal Service
//!
//! Validates withdrawal amounts and drives the withdrawal dialog of a vendor
//! session through its states before anything reaches the payment processor.
//!
//! ## Dialog States
//!
//! ```text
//!            open (balance > 0)
//!   Idle ───────────────────────► Open ◄──────────────────────────┐
//!    ▲                             │ validate (ok)                │ generic failure,
//!    │                             ▼                              │ timeout, invalid input
//!    │ dismiss                 Validating                         │
//!    │ (from any state)            │ submit                       │
//!    │                             ▼                              │
//!    │                         Submitting ────────────────────────┘
//!    │                          │      │
//!    │                 success  │      │ requiresOnboarding
//!    │                          ▼      ▼
//!    └──────────────────── Succeeded  Failed ── redirect after 2s
//! ```
//!
//! ## Guarantees
//!
//! - Invalid amounts never reach the marketplace.
//! - One submission per session at a time; a second one is refused
//!   without calling the marketplace.
//! - Every attempt carries an idempotency key. When the outcome is
//!   unknown (timeout, dropped connection) the key is kept, and submitting
//!   the same amount again reuses it.
//! - A successful withdrawal is reported only after the earnings list and
//!   the vendor profile have been refetched.
//! - Results arriving after the dialog was dismissed, or the session
//!   closed, do not touch the newer dialog.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::ClientError;
use crate::config::AppConfig;
use crate::models::{DialogView, Money, RedirectHint, WithdrawalOutcome, WithdrawalReceipt};
use crate::websocket::{WsEventType, WsRegistry};

use super::currency::{format_currency, parse_currency_amount};
use super::session::VendorSession;

/// Reasons an amount is refused before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Amount must be a number")]
    NotANumber,

    #[error("Amount must be greater than 0")]
    NotPositive,

    #[error("Amount cannot have more than 2 decimal places")]
    TooManyDecimals,

    #[error("No balance is available for withdrawal")]
    NothingToWithdraw,

    #[error("Amount {requested} exceeds your available balance of {available}")]
    ExceedsBalance { requested: Decimal, available: Decimal },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::NotANumber | ValidationError::NotPositive => "INVALID_AMOUNT",
            ValidationError::TooManyDecimals => "TOO_MANY_DECIMALS",
            ValidationError::NothingToWithdraw => "NOTHING_TO_WITHDRAW",
            ValidationError::ExceedsBalance { .. } => "AMOUNT_EXCEEDS_BALANCE",
        }
    }
}

/// Check a typed amount against the current withdrawal balance.
///
/// ## Rules
///
/// | Input | Result |
/// |-------|--------|
/// | not a number | `NotANumber` |
/// | `0`, negative | `NotPositive` |
/// | more than 2 decimal places | `TooManyDecimals` |
/// | balance ≤ 0 | `NothingToWithdraw` |
/// | above balance | `ExceedsBalance` |
///
/// Trailing zeros do not count as decimal places (`20.010` is `20.01`).
/// A pasted display value (`£50.00`) is read like the bare number.
pub fn validate_amount(input: &str, withdrawal_balance: Decimal) -> Result<Decimal, ValidationError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(ValidationError::NotANumber);
    }

    let amount = parse_amount(text).ok_or(ValidationError::NotANumber)?;

    if amount <= Decimal::ZERO {
        return Err(ValidationError::NotPositive);
    }
    if amount.normalize().scale() > 2 {
        return Err(ValidationError::TooManyDecimals);
    }
    if withdrawal_balance <= Decimal::ZERO {
        return Err(ValidationError::NothingToWithdraw);
    }
    if amount > withdrawal_balance {
        return Err(ValidationError::ExceedsBalance {
            requested: amount,
            available: withdrawal_balance,
        });
    }

    Ok(amount.normalize())
}

fn parse_amount(text: &str) -> Option<Decimal> {
    if let Ok(amount) = Decimal::from_str(text) {
        return Some(amount);
    }
    if let Ok(amount) = Decimal::from_scientific(text) {
        return Some(amount);
    }
    // A pasted display value such as "£1,234.50"
    if text.starts_with(['£', '$', '€']) {
        return parse_currency_amount(text).ok();
    }
    None
}

/// Errors from withdrawal operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WithdrawalError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("The withdrawal dialog is not open")]
    DialogNotOpen,

    #[error("A withdrawal is already being submitted")]
    InFlight,

    /// The vendor has not finished payment-processor onboarding.
    #[error("{message}")]
    OnboardingRequired { message: String, redirect: RedirectHint },

    /// The marketplace refused the withdrawal (message shown verbatim).
    #[error("{0}")]
    Rejected(String),

    #[error("The withdrawal request timed out after {}s. Check your withdrawal status before retrying.", .timeout.as_secs())]
    TimedOut { timeout: Duration, idempotency_key: Uuid },

    #[error("Could not reach the marketplace, please try again ({0})")]
    Upstream(ClientError),

    #[error("Withdrawal task failed: {0}")]
    Internal(String),
}

impl WithdrawalError {
    pub fn code(&self) -> &'static str {
        match self {
            WithdrawalError::Validation(v) => v.code(),
            WithdrawalError::DialogNotOpen => "DIALOG_NOT_OPEN",
            WithdrawalError::InFlight => "WITHDRAWAL_IN_FLIGHT",
            WithdrawalError::OnboardingRequired { .. } => "ONBOARDING_REQUIRED",
            WithdrawalError::Rejected(_) => "WITHDRAWAL_REJECTED",
            WithdrawalError::TimedOut { .. } => "WITHDRAWAL_TIMED_OUT",
            WithdrawalError::Upstream(ClientError::Unauthorized) => "UNAUTHORIZED",
            WithdrawalError::Upstream(e) if e.is_ambiguous() => "UPSTREAM_UNAVAILABLE",
            WithdrawalError::Upstream(_) => "UPSTREAM_ERROR",
            WithdrawalError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The marketplace error behind this one, if any.
    pub fn upstream(&self) -> Option<&ClientError> {
        match self {
            WithdrawalError::Upstream(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the marketplace may have processed the request anyway.
    pub fn is_ambiguous(&self) -> bool {
        match self {
            WithdrawalError::TimedOut { .. } => true,
            WithdrawalError::Upstream(e) => e.is_ambiguous(),
            _ => false,
        }
    }
}

/// Error shown inside the dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogError {
    pub code: String,
    pub message: String,
}

impl From<&WithdrawalError> for DialogError {
    fn from(e: &WithdrawalError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

/// State of the withdrawal dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DialogState {
    Idle,
    #[serde(rename_all = "camelCase")]
    Open {
        withdrawal_balance: Decimal,
        error: Option<DialogError>,
    },
    #[serde(rename_all = "camelCase")]
    Validating {
        withdrawal_balance: Decimal,
        amount: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    Submitting {
        withdrawal_balance: Decimal,
        amount: Decimal,
        idempotency_key: Uuid,
        started_at: DateTime<Utc>,
    },
    Succeeded {
        outcome: WithdrawalOutcome,
    },
    Failed {
        error: DialogError,
        redirect: Option<RedirectHint>,
    },
}

/// One submission, as handed to the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub amount: Decimal,
    pub idempotency_key: Uuid,
    /// Balance the amount was validated against.
    pub withdrawal_balance: Decimal,
}

/// Dialog state machine of one session.
#[derive(Debug, Clone)]
pub struct WithdrawalDialog {
    state: DialogState,
    /// Attempt whose outcome is unknown; its key is reused for the same amount.
    unresolved: Option<Attempt>,
}

impl Default for WithdrawalDialog {
    fn default() -> Self {
        Self::new()
    }
}

impl WithdrawalDialog {
    pub fn new() -> Self {
        Self {
            state: DialogState::Idle,
            unresolved: None,
        }
    }

    pub fn state(&self) -> &DialogState {
        &self.state
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, DialogState::Submitting { .. })
    }

    /// `Idle → Open`. Refused when there is nothing to withdraw.
    pub fn open(&mut self, withdrawal_balance: Decimal) -> Result<(), WithdrawalError> {
        match &self.state {
            DialogState::Submitting { .. } => Err(WithdrawalError::InFlight),
            _ if withdrawal_balance <= Decimal::ZERO => {
                Err(ValidationError::NothingToWithdraw.into())
            }
            DialogState::Open { error, .. } => {
                self.state = DialogState::Open {
                    withdrawal_balance,
                    error: error.clone(),
                };
                Ok(())
            }
            DialogState::Validating { amount, .. } => {
                let amount = *amount;
                self.state = DialogState::Validating {
                    withdrawal_balance,
                    amount,
                };
                self.rebound(withdrawal_balance);
                Ok(())
            }
            DialogState::Idle | DialogState::Succeeded { .. } | DialogState::Failed { .. } => {
                self.state = DialogState::Open {
                    withdrawal_balance,
                    error: None,
                };
                Ok(())
            }
        }
    }

    fn current_balance(&self) -> Result<Decimal, WithdrawalError> {
        match &self.state {
            DialogState::Open { withdrawal_balance, .. }
            | DialogState::Validating { withdrawal_balance, .. } => Ok(*withdrawal_balance),
            DialogState::Submitting { .. } => Err(WithdrawalError::InFlight),
            _ => Err(WithdrawalError::DialogNotOpen),
        }
    }

    /// `Open → Validating` on a valid amount; back to `Open` with the
    /// error otherwise.
    pub fn validate(&mut self, input: &str) -> Result<Decimal, WithdrawalError> {
        let withdrawal_balance = self.current_balance()?;
        match validate_amount(input, withdrawal_balance) {
            Ok(amount) => {
                self.state = DialogState::Validating {
                    withdrawal_balance,
                    amount,
                };
                Ok(amount)
            }
            Err(e) => {
                let error = WithdrawalError::from(e);
                self.state = DialogState::Open {
                    withdrawal_balance,
                    error: Some(DialogError::from(&error)),
                };
                Err(error)
            }
        }
    }

    /// `Open | Validating → Submitting`.
    pub fn begin_submit(&mut self, input: &str) -> Result<Attempt, WithdrawalError> {
        let amount = self.validate(input)?;
        let withdrawal_balance = self.current_balance()?;

        let idempotency_key = match self.unresolved {
            Some(previous) if previous.amount == amount => previous.idempotency_key,
            _ => Uuid::new_v4(),
        };

        self.state = DialogState::Submitting {
            withdrawal_balance,
            amount,
            idempotency_key,
            started_at: Utc::now(),
        };

        Ok(Attempt {
            amount,
            idempotency_key,
            withdrawal_balance,
        })
    }

    /// `Submitting → Succeeded`.
    pub fn succeed(&mut self, outcome: WithdrawalOutcome) {
        self.unresolved = None;
        self.state = DialogState::Succeeded { outcome };
    }

    /// `Submitting → Failed` for onboarding, `Submitting → Open` otherwise.
    pub fn fail(&mut self, attempt: &Attempt, error: &WithdrawalError) {
        if let WithdrawalError::OnboardingRequired { redirect, .. } = error {
            self.unresolved = None;
            self.state = DialogState::Failed {
                error: DialogError::from(error),
                redirect: Some(redirect.clone()),
            };
            return;
        }

        self.unresolved = if error.is_ambiguous() { Some(*attempt) } else { None };
        self.state = DialogState::Open {
            withdrawal_balance: attempt.withdrawal_balance,
            error: Some(DialogError::from(error)),
        };
    }

    /// Apply a refreshed withdrawal balance.
    ///
    /// A validated amount that no longer fits sends the dialog back to
    /// `Open` with the validation error, which is returned. Submitting
    /// dialogs are left alone.
    pub fn rebound(&mut self, withdrawal_balance: Decimal) -> Option<ValidationError> {
        match &self.state {
            DialogState::Open { error, .. } => {
                self.state = DialogState::Open {
                    withdrawal_balance,
                    error: error.clone(),
                };
                None
            }
            DialogState::Validating { amount, .. } => {
                let amount = *amount;
                match validate_amount(&amount.to_string(), withdrawal_balance) {
                    Ok(_) => {
                        self.state = DialogState::Validating {
                            withdrawal_balance,
                            amount,
                        };
                        None
                    }
                    Err(e) => {
                        self.state = DialogState::Open {
                            withdrawal_balance,
                            error: Some(DialogError::from(&WithdrawalError::from(e.clone()))),
                        };
                        Some(e)
                    }
                }
            }
            _ => None,
        }
    }

    /// Any state `→ Idle`.
    pub fn dismiss(&mut self) {
        self.unresolved = None;
        self.state = DialogState::Idle;
    }
}

/// Payload of the `withdrawal_bound_changed` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundChangedData {
    pub withdrawal_balance: Money,
    pub code: String,
    pub message: String,
}

/// Payload of the `withdrawal_failed` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalFailedData {
    pub code: String,
    pub message: String,
    pub redirect: Option<RedirectHint>,
}

/// Drives withdrawal dialogs and submissions.
#[derive(Clone)]
pub struct WithdrawalService {
    config: AppConfig,
    ws_registry: WsRegistry,
}

impl WithdrawalService {
    pub fn new(config: AppConfig, ws_registry: WsRegistry) -> Self {
        Self { config, ws_registry }
    }

    fn redirect_hint(&self) -> RedirectHint {
        RedirectHint {
            path: self.config.onboarding_redirect_path.clone(),
            delay_ms: self.config.onboarding_redirect_delay.as_millis() as u64,
        }
    }

    /// Current dialog view.
    pub async fn dialog(&self, session: &VendorSession) -> DialogView {
        let state = session.state.lock().await;
        state.dialog_view()
    }

    /// Open the dialog against the latest known withdrawal balance.
    ///
    /// Fetches the summary first if this session has never loaded earnings.
    pub async fn open(&self, session: &VendorSession) -> Result<DialogView, WithdrawalError> {
        let known = session.state.lock().await.withdrawal_balance();

        let balance = match known {
            Some(balance) => balance,
            None => {
                debug!("No summary cached for session {}, fetching", session.id);
                let query = session.state.lock().await.last_query.clone();
                let page = timeout(self.config.upstream_timeout, session.api.list_earnings(&query))
                    .await
                    .map_err(|_| {
                        WithdrawalError::Upstream(ClientError::Timeout(self.config.upstream_timeout))
                    })?
                    .map_err(WithdrawalError::Upstream)?;
                let balance = page.summary.withdrawal_balance;
                let mut state = session.state.lock().await;
                state.observe_page(&page);
                state.apply_summary(page.summary);
                balance
            }
        };

        let mut state = session.state.lock().await;
        state.touch();
        state.dialog.open(balance)?;
        info!("Withdrawal dialog opened for session {} (balance {})", session.id, balance);
        Ok(state.dialog_view())
    }

    /// Validate a typed amount.
    pub async fn validate(
        &self,
        session: &VendorSession,
        input: &str,
    ) -> Result<DialogView, WithdrawalError> {
        let mut state = session.state.lock().await;
        state.touch();
        state.dialog.validate(input)?;
        Ok(state.dialog_view())
    }

    /// Close the dialog. Late results of an in-flight submission are dropped.
    pub async fn dismiss(&self, session: &VendorSession) -> DialogView {
        let mut state = session.state.lock().await;
        state.touch();
        state.dialog.dismiss();
        state.generation += 1;
        debug!("Withdrawal dialog dismissed for session {}", session.id);
        state.dialog_view()
    }

    /// Submit a withdrawal.
    ///
    /// The marketplace call runs in its own task so that a browser giving
    /// up on this request cannot abort it half-way.
    pub async fn submit(
        &self,
        session: Arc<VendorSession>,
        input: &str,
    ) -> Result<WithdrawalOutcome, WithdrawalError> {
        let (attempt, generation) = {
            let mut state = session.state.lock().await;
            state.touch();
            if state.in_flight {
                warn!("Refusing concurrent withdrawal for session {}", session.id);
                return Err(WithdrawalError::InFlight);
            }
            let attempt = state.dialog.begin_submit(input)?;
            state.in_flight = true;
            (attempt, state.generation)
        };

        info!(
            "Submitting withdrawal of {} for session {} (key {})",
            attempt.amount, session.id, attempt.idempotency_key
        );

        let service = self.clone();
        let task_session = session.clone();
        let handle =
            tokio::spawn(async move { service.execute(task_session, attempt, generation).await });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("Withdrawal task for session {} failed: {}", session.id, e);
                let mut state = session.state.lock().await;
                state.in_flight = false;
                let error = WithdrawalError::Internal(e.to_string());
                if state.generation == generation {
                    state.dialog.fail(&attempt, &error);
                }
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        session: Arc<VendorSession>,
        attempt: Attempt,
        generation: u64,
    ) -> Result<WithdrawalOutcome, WithdrawalError> {
        let limit = self.config.withdrawal_timeout;
        let call = session
            .api
            .request_withdrawal(attempt.amount, attempt.idempotency_key);

        let result = match timeout(limit, call).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(ClientError::Rejected {
                message,
                requires_onboarding: true,
                ..
            })) => Err(WithdrawalError::OnboardingRequired {
                message,
                redirect: self.redirect_hint(),
            }),
            Ok(Err(ClientError::Rejected { message, .. })) => Err(WithdrawalError::Rejected(message)),
            Ok(Err(ClientError::Timeout(_))) | Err(_) => Err(WithdrawalError::TimedOut {
                timeout: limit,
                idempotency_key: attempt.idempotency_key,
            }),
            Ok(Err(other)) => Err(WithdrawalError::Upstream(other)),
        };

        match result {
            Ok(receipt) => Ok(self.settle_success(&session, &attempt, generation, receipt).await),
            Err(error) => Err(self.settle_failure(&session, &attempt, generation, error).await),
        }
    }

    async fn settle_success(
        &self,
        session: &Arc<VendorSession>,
        attempt: &Attempt,
        generation: u64,
        receipt: WithdrawalReceipt,
    ) -> WithdrawalOutcome {
        let currency = &self.config.currency;
        let expected_remaining = attempt.withdrawal_balance - attempt.amount;
        if receipt.remaining_balance != expected_remaining {
            // The marketplace value wins; the cached balance was stale.
            warn!(
                "Remaining balance {} differs from expected {} for session {}",
                receipt.remaining_balance, expected_remaining, session.id
            );
        }

        let outcome = WithdrawalOutcome {
            amount: Money::new(receipt.amount, currency),
            remaining_balance: Money::new(receipt.remaining_balance, currency),
            status: receipt.status.clone(),
            transfer_id: receipt.transfer_id.clone(),
            estimated_arrival: receipt.estimated_arrival.clone(),
            idempotency_key: attempt.idempotency_key,
        };

        // Refetch both before the withdrawal counts as settled.
        let query = session.state.lock().await.last_query.clone();
        let read_limit = self.config.upstream_timeout;
        let (earnings, profile) = tokio::join!(
            timeout(read_limit, session.api.list_earnings(&query)),
            timeout(read_limit, session.api.vendor_profile()),
        );

        {
            let mut state = session.state.lock().await;
            state.in_flight = false;

            match earnings {
                Ok(Ok(page)) => {
                    state.observe_page(&page);
                    state.apply_summary(page.summary);
                }
                Ok(Err(e)) => {
                    warn!("Earnings refetch after withdrawal failed: {}", e);
                    state.set_withdrawal_balance(receipt.remaining_balance);
                }
                Err(_) => {
                    warn!("Earnings refetch after withdrawal timed out");
                    state.set_withdrawal_balance(receipt.remaining_balance);
                }
            }

            match profile {
                Ok(Ok(profile)) => state.profile = Some(profile),
                Ok(Err(e)) => warn!("Vendor profile refetch after withdrawal failed: {}", e),
                Err(_) => warn!("Vendor profile refetch after withdrawal timed out"),
            }

            if state.generation == generation {
                state.dialog.succeed(outcome.clone());
            } else {
                debug!("Dialog of session {} changed during withdrawal, not updating it", session.id);
            }
        }

        info!(
            "Withdrawal of {} settled for session {}, remaining {}",
            format_currency(receipt.amount, currency),
            session.id,
            format_currency(receipt.remaining_balance, currency)
        );

        if let Err(e) = self
            .ws_registry
            .send_to_session(
                &session.id.to_string(),
                WsEventType::WithdrawalSettled,
                outcome.clone(),
            )
            .await
        {
            warn!("Failed to send withdrawal settled via WebSocket: {}", e);
        }

        outcome
    }

    async fn settle_failure(
        &self,
        session: &Arc<VendorSession>,
        attempt: &Attempt,
        generation: u64,
        error: WithdrawalError,
    ) -> WithdrawalError {
        {
            let mut state = session.state.lock().await;
            state.in_flight = false;
            if state.generation == generation {
                state.dialog.fail(attempt, &error);
            }
        }

        warn!(
            "Withdrawal of {} failed for session {}: [{}] {}",
            attempt.amount,
            session.id,
            error.code(),
            error
        );

        let redirect = match &error {
            WithdrawalError::OnboardingRequired { redirect, .. } => Some(redirect.clone()),
            _ => None,
        };

        if let Err(e) = self
            .ws_registry
            .send_to_session(
                &session.id.to_string(),
                WsEventType::WithdrawalFailed,
                WithdrawalFailedData {
                    code: error.code().to_string(),
                    message: error.to_string(),
                    redirect: redirect.clone(),
                },
            )
            .await
        {
            warn!("Failed to send withdrawal failure via WebSocket: {}", e);
        }

        if let Some(redirect) = redirect {
            self.schedule_redirect(session.clone(), redirect);
        }

        error
    }

    /// Push the onboarding redirect once the delay has passed, unless the
    /// session was closed in the meantime.
    fn schedule_redirect(&self, session: Arc<VendorSession>, redirect: RedirectHint) {
        let ws_registry = self.ws_registry.clone();
        let delay = self.config.onboarding_redirect_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if session.state.lock().await.closed {
                debug!("Session {} closed before onboarding redirect", session.id);
                return;
            }

            if let Err(e) = ws_registry
                .send_to_session(&session.id.to_string(), WsEventType::OnboardingRedirect, redirect)
                .await
            {
                warn!("Failed to send onboarding redirect via WebSocket: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockFactory, MockMarketplace, WithdrawBehavior};
    use crate::services::ledger::tests::dec;
    use crate::services::session::SessionRegistry;

    // ==========================================
    // AMOUNT VALIDATION
    // ==========================================

    #[test]
    fn test_validation_boundaries() {
        let balance = dec("20");

        assert_eq!(validate_amount("20", balance), Ok(dec("20")));
        assert_eq!(validate_amount("20.00", balance), Ok(dec("20")));
        assert_eq!(validate_amount("0.01", balance), Ok(dec("0.01")));
        assert_eq!(
            validate_amount("20.01", balance),
            Err(ValidationError::ExceedsBalance {
                requested: dec("20.01"),
                available: dec("20"),
            })
        );
        assert_eq!(validate_amount("0", balance), Err(ValidationError::NotPositive));
        assert_eq!(validate_amount("-5", balance), Err(ValidationError::NotPositive));
        assert_eq!(validate_amount("1.001", balance), Err(ValidationError::TooManyDecimals));
        assert_eq!(validate_amount("1.010", balance), Ok(dec("1.01")));
        assert_eq!(validate_amount("abc", balance), Err(ValidationError::NotANumber));
        assert_eq!(validate_amount("  ", balance), Err(ValidationError::NotANumber));
        assert_eq!(validate_amount("1e-3", balance), Err(ValidationError::TooManyDecimals));
        assert_eq!(validate_amount("£19.50", balance), Ok(dec("19.5")));
        assert_eq!(validate_amount("£", balance), Err(ValidationError::NotANumber));
        assert_eq!(validate_amount("abc5", balance), Err(ValidationError::NotANumber));
        assert_eq!(validate_amount("£-5", balance), Err(ValidationError::NotANumber));
        assert_eq!(validate_amount("£--5", balance), Err(ValidationError::NotANumber));
        assert_eq!(validate_amount("£abc5", balance), Err(ValidationError::NotANumber));
        assert_eq!(validate_amount("£1,2,3", balance), Err(ValidationError::NotANumber));
        assert_eq!(validate_amount("£1,000", dec("2000")), Ok(dec("1000")));
    }

    #[test]
    fn test_validation_without_balance() {
        assert_eq!(
            validate_amount("5", Decimal::ZERO),
            Err(ValidationError::NothingToWithdraw)
        );
    }

    // ==========================================
    // DIALOG STATE MACHINE
    // ==========================================

    #[test]
    fn test_dialog_refuses_to_open_without_balance() {
        let mut dialog = WithdrawalDialog::new();
        assert!(matches!(
            dialog.open(Decimal::ZERO),
            Err(WithdrawalError::Validation(ValidationError::NothingToWithdraw))
        ));
        assert_eq!(dialog.state(), &DialogState::Idle);
    }

    #[test]
    fn test_dialog_happy_transitions() {
        let mut dialog = WithdrawalDialog::new();
        assert!(matches!(dialog.validate("10"), Err(WithdrawalError::DialogNotOpen)));

        dialog.open(dec("85")).unwrap();
        assert!(matches!(dialog.state(), DialogState::Open { error: None, .. }));

        dialog.validate("50").unwrap();
        assert!(matches!(dialog.state(), DialogState::Validating { .. }));

        let attempt = dialog.begin_submit("50").unwrap();
        assert_eq!(attempt.amount, dec("50"));
        assert!(dialog.is_submitting());
        assert!(matches!(dialog.begin_submit("50"), Err(WithdrawalError::InFlight)));

        dialog.dismiss();
        assert_eq!(dialog.state(), &DialogState::Idle);
    }

    #[test]
    fn test_invalid_input_returns_to_open_with_error() {
        let mut dialog = WithdrawalDialog::new();
        dialog.open(dec("20")).unwrap();

        let err = dialog.validate("20.01").unwrap_err();
        assert_eq!(err.code(), "AMOUNT_EXCEEDS_BALANCE");
        match dialog.state() {
            DialogState::Open { error: Some(error), .. } => {
                assert_eq!(error.code, "AMOUNT_EXCEEDS_BALANCE")
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_generic_failure_allows_retry_with_new_key() {
        let mut dialog = WithdrawalDialog::new();
        dialog.open(dec("85")).unwrap();
        let first = dialog.begin_submit("50").unwrap();

        dialog.fail(&first, &WithdrawalError::Rejected("Insufficient balance".to_string()));
        assert!(matches!(dialog.state(), DialogState::Open { error: Some(_), .. }));

        let second = dialog.begin_submit("50").unwrap();
        assert_ne!(first.idempotency_key, second.idempotency_key);
    }

    #[test]
    fn test_ambiguous_failure_keeps_key_for_same_amount() {
        let mut dialog = WithdrawalDialog::new();
        dialog.open(dec("85")).unwrap();
        let first = dialog.begin_submit("50").unwrap();

        let timeout = WithdrawalError::TimedOut {
            timeout: Duration::from_secs(30),
            idempotency_key: first.idempotency_key,
        };
        dialog.fail(&first, &timeout);

        let retry = dialog.begin_submit("50.00").unwrap();
        assert_eq!(retry.idempotency_key, first.idempotency_key);

        dialog.fail(&retry, &timeout);
        let different = dialog.begin_submit("40").unwrap();
        assert_ne!(different.idempotency_key, first.idempotency_key);
    }

    #[test]
    fn test_onboarding_failure_is_terminal() {
        let mut dialog = WithdrawalDialog::new();
        dialog.open(dec("85")).unwrap();
        let attempt = dialog.begin_submit("50").unwrap();

        dialog.fail(
            &attempt,
            &WithdrawalError::OnboardingRequired {
                message: "Complete onboarding".to_string(),
                redirect: RedirectHint {
                    path: "/vendor/profile".to_string(),
                    delay_ms: 2000,
                },
            },
        );
        assert!(matches!(dialog.state(), DialogState::Failed { redirect: Some(_), .. }));
        assert!(matches!(dialog.begin_submit("50"), Err(WithdrawalError::DialogNotOpen)));

        dialog.dismiss();
        dialog.open(dec("85")).unwrap();
        assert!(matches!(dialog.state(), DialogState::Open { error: None, .. }));
    }

    #[test]
    fn test_rebound_rechecks_validated_amount() {
        let mut dialog = WithdrawalDialog::new();
        dialog.open(dec("85")).unwrap();
        dialog.validate("50").unwrap();

        assert_eq!(dialog.rebound(dec("60")), None);
        assert!(matches!(
            dialog.state(),
            DialogState::Validating { withdrawal_balance, .. } if *withdrawal_balance == dec("60")
        ));

        let err = dialog.rebound(dec("20")).unwrap();
        assert!(matches!(err, ValidationError::ExceedsBalance { .. }));
        assert!(matches!(dialog.state(), DialogState::Open { error: Some(_), .. }));

        // Submitting dialogs keep the bound they were validated against.
        dialog.validate("10").unwrap();
        dialog.begin_submit("10").unwrap();
        assert_eq!(dialog.rebound(dec("5")), None);
        assert!(dialog.is_submitting());
    }

    // ==========================================
    // SERVICE
    // ==========================================

    async fn setup(
        mock: MockMarketplace,
    ) -> (Arc<MockMarketplace>, WithdrawalService, Arc<VendorSession>, WsRegistry) {
        let mock = Arc::new(mock);
        let config = AppConfig::for_tests();
        let ws_registry = WsRegistry::new();
        let sessions = SessionRegistry::new(Arc::new(MockFactory(mock.clone())));
        let session = sessions.get_or_create("vendor-token").await;
        let service = WithdrawalService::new(config, ws_registry.clone());
        (mock, service, session, ws_registry)
    }

    #[tokio::test]
    async fn test_happy_path_withdrawal() {
        let (mock, service, session, _ws) = setup(MockMarketplace::happy_path()).await;

        let view = service.open(&session).await.unwrap();
        assert!(view.can_submit);
        assert_eq!(mock.listings(), 1);

        let outcome = service.submit(session.clone(), "50").await.unwrap();
        assert_eq!(outcome.remaining_balance.amount, dec("35"));
        assert_eq!(outcome.remaining_balance.formatted, "£35.00");
        assert_eq!(mock.withdrawals(), 1);

        // Earnings and profile were both refetched before settling.
        assert_eq!(mock.listings(), 2);
        assert_eq!(mock.profiles(), 1);

        let state = session.state.lock().await;
        assert!(!state.in_flight);
        assert_eq!(state.withdrawal_balance(), Some(dec("35")));
        assert!(matches!(state.dialog.state(), DialogState::Succeeded { .. }));
        assert!(state.profile.is_some());
    }

    #[tokio::test]
    async fn test_over_limit_makes_no_network_call() {
        let mock = MockMarketplace::happy_path();
        mock.set_withdrawal_balance(dec("20"));
        let (mock, service, session, _ws) = setup(mock).await;

        service.open(&session).await.unwrap();
        let err = service.submit(session.clone(), "20.01").await.unwrap_err();
        assert_eq!(err.code(), "AMOUNT_EXCEEDS_BALANCE");
        assert_eq!(mock.withdrawals(), 0);
        assert!(!session.state.lock().await.in_flight);
    }

    #[tokio::test]
    async fn test_second_submission_while_submitting_is_refused() {
        let (mock, service, session, _ws) = setup(MockMarketplace::happy_path()).await;
        let gate = mock.hold_withdrawals();
        service.open(&session).await.unwrap();

        let first = {
            let service = service.clone();
            let session = session.clone();
            tokio::spawn(async move { service.submit(session, "50").await })
        };

        while mock.withdrawals() == 0 {
            tokio::task::yield_now().await;
        }

        let second = service.submit(session.clone(), "10").await;
        assert!(matches!(second, Err(WithdrawalError::InFlight)));
        let view = service.dialog(&session).await;
        assert!(!view.can_submit);
        assert!(view.in_flight);

        gate.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome.remaining_balance.amount, dec("35"));
        assert_eq!(mock.withdrawals(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_onboarding_required_schedules_redirect() {
        let (mock, service, session, ws) = setup(MockMarketplace::happy_path()).await;
        mock.set_behavior(WithdrawBehavior::Reject {
            message: "Please complete your payment account setup".to_string(),
            requires_onboarding: true,
        });
        let mut rx = ws.register(session.id.to_string()).await;
        service.open(&session).await.unwrap();

        let started = tokio::time::Instant::now();
        let err = service.submit(session.clone(), "50").await.unwrap_err();
        match &err {
            WithdrawalError::OnboardingRequired { message, redirect } => {
                assert_eq!(message, "Please complete your payment account setup");
                assert_eq!(redirect.delay_ms, 2000);
                assert_eq!(redirect.path, "/vendor/profile");
            }
            other => panic!("unexpected error {:?}", other),
        }

        // The failure is pushed right away...
        let failed = rx.recv().await.unwrap();
        assert!(failed.contains("withdrawal_failed"));
        assert!(started.elapsed() < Duration::from_millis(2000));

        // ...and the redirect two seconds later.
        let redirect = rx.recv().await.unwrap();
        assert!(redirect.contains("onboarding_redirect"));
        assert!(started.elapsed() >= Duration::from_millis(2000));

        assert!(matches!(
            session.state.lock().await.dialog.state(),
            DialogState::Failed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_skipped_after_session_closed() {
        let (mock, service, session, ws) = setup(MockMarketplace::happy_path()).await;
        mock.set_behavior(WithdrawBehavior::Reject {
            message: "Onboarding required".to_string(),
            requires_onboarding: true,
        });
        let mut rx = ws.register(session.id.to_string()).await;
        service.open(&session).await.unwrap();

        service.submit(session.clone(), "50").await.unwrap_err();
        let _failed = rx.recv().await.unwrap();
        session.state.lock().await.closed = true;

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_distinct_and_keeps_the_key() {
        let (mock, service, session, _ws) = setup(MockMarketplace::happy_path()).await;
        mock.set_behavior(WithdrawBehavior::Hang);
        service.open(&session).await.unwrap();

        let err = service.submit(session.clone(), "50").await.unwrap_err();
        assert_eq!(err.code(), "WITHDRAWAL_TIMED_OUT");
        assert!(err.to_string().contains("Check your withdrawal status"));

        // Nothing was deducted locally.
        assert_eq!(session.state.lock().await.withdrawal_balance(), Some(dec("85")));

        mock.set_behavior(WithdrawBehavior::Succeed);
        service.submit(session.clone(), "50").await.unwrap();

        let keys = mock.idempotency_keys.lock().unwrap().clone();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn test_generic_failure_returns_to_open() {
        let (mock, service, session, _ws) = setup(MockMarketplace::happy_path()).await;
        mock.set_behavior(WithdrawBehavior::Reject {
            message: "Insufficient balance".to_string(),
            requires_onboarding: false,
        });
        service.open(&session).await.unwrap();

        let err = service.submit(session.clone(), "50").await.unwrap_err();
        assert_eq!(err.code(), "WITHDRAWAL_REJECTED");
        assert_eq!(err.to_string(), "Insufficient balance");

        let view = service.dialog(&session).await;
        assert!(view.can_submit);
        assert!(matches!(view.dialog, DialogState::Open { error: Some(_), .. }));

        mock.set_behavior(WithdrawBehavior::NetworkError);
        let err = service.submit(session.clone(), "50").await.unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE");
        assert_eq!(mock.withdrawals(), 2);
    }

    #[tokio::test]
    async fn test_result_after_dismiss_leaves_new_dialog_alone() {
        let (mock, service, session, _ws) = setup(MockMarketplace::happy_path()).await;
        let gate = mock.hold_withdrawals();
        service.open(&session).await.unwrap();

        let pending = {
            let service = service.clone();
            let session = session.clone();
            tokio::spawn(async move { service.submit(session, "50").await })
        };
        while mock.withdrawals() == 0 {
            tokio::task::yield_now().await;
        }

        service.dismiss(&session).await;
        assert!(matches!(service.dialog(&session).await.dialog, DialogState::Idle));

        gate.notify_one();
        pending.await.unwrap().unwrap();

        let state = session.state.lock().await;
        assert_eq!(state.dialog.state(), &DialogState::Idle);
        assert!(!state.in_flight);
        assert_eq!(state.withdrawal_balance(), Some(dec("35")));
    }
}
