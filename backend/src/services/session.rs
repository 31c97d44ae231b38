//! # Vendor Sessions
//!
//! One [`VendorSession`] per bearer token. A session owns the marketplace
//! client built for that token and everything the dashboard needs between
//! requests: the last summary, the withdrawal dialog, and the set of
//! earnings already seen as moved to withdrawal.
//!
//! ## Lifecycle
//!
//! ```text
//! first request with token ──► get_or_create ──► session lives in registry
//!                                                        │
//!          DELETE /vendors/session or idle timeout ──────┤
//!                                                        ▼
//!                                            closed = true, removed
//! ```
//!
//! Closing marks the session before removing it, so background tasks still
//! holding an `Arc` (the onboarding redirect timer, a submission) can see
//! that the dashboard is gone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::{ClientFactory, MarketplaceApi};
use crate::models::{DialogView, EarningsPage, EarningsQuery, Summary, VendorProfile};
use crate::utils::mask_token;

use super::ledger::WithdrawalFlagTracker;
use super::withdrawal::{DialogState, ValidationError, WithdrawalDialog};

/// Mutable per-session state.
#[derive(Debug)]
pub struct SessionState {
    pub dialog: WithdrawalDialog,
    pub summary: Option<Summary>,
    pub profile: Option<VendorProfile>,
    pub tracker: WithdrawalFlagTracker,

    /// A withdrawal request is on its way to the marketplace.
    pub in_flight: bool,

    /// Bumped when the dialog is dismissed; results tagged with an older
    /// generation leave the dialog alone.
    pub generation: u64,

    pub closed: bool,

    /// Query of the last earnings load, reused by background refreshes.
    pub last_query: EarningsQuery,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            dialog: WithdrawalDialog::new(),
            summary: None,
            profile: None,
            tracker: WithdrawalFlagTracker::new(),
            in_flight: false,
            generation: 0,
            closed: false,
            last_query: EarningsQuery::default(),
            last_refreshed: None,
            last_seen: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    pub fn withdrawal_balance(&self) -> Option<Decimal> {
        self.summary.as_ref().map(|s| s.withdrawal_balance)
    }

    /// Store a fresh summary and re-check the dialog against its balance.
    ///
    /// Returns the validation error if a validated amount no longer fits.
    pub fn apply_summary(&mut self, summary: Summary) -> Option<ValidationError> {
        let balance = summary.withdrawal_balance;
        self.summary = Some(summary);
        self.last_refreshed = Some(Utc::now());
        self.dialog.rebound(balance)
    }

    /// Overwrite the cached withdrawal balance with a value the marketplace
    /// reported outside a listing (a withdrawal receipt).
    pub fn set_withdrawal_balance(&mut self, balance: Decimal) {
        if let Some(summary) = self.summary.as_mut() {
            summary.withdrawal_balance = balance;
        }
        self.dialog.rebound(balance);
    }

    /// Feed listed earnings to the withdrawal flag tracker.
    pub fn observe_page(&mut self, page: &EarningsPage) -> usize {
        page.earnings
            .iter()
            .filter(|e| self.tracker.observe(e))
            .count()
    }

    pub fn dialog_view(&self) -> DialogView {
        let can_submit = !self.in_flight
            && matches!(
                self.dialog.state(),
                DialogState::Open { .. } | DialogState::Validating { .. }
            );
        DialogView {
            dialog: self.dialog.state().clone(),
            can_submit,
            in_flight: self.in_flight,
        }
    }
}

/// A vendor's dashboard session.
pub struct VendorSession {
    pub id: Uuid,
    /// Masked token, for logs.
    pub label: String,
    pub api: Arc<dyn MarketplaceApi>,
    pub state: Mutex<SessionState>,
}

impl VendorSession {
    pub fn new(token: &str, api: Arc<dyn MarketplaceApi>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: mask_token(token),
            api,
            state: Mutex::new(SessionState::new()),
        }
    }
}

/// All live sessions, keyed by bearer token.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<VendorSession>>>>,
    factory: Arc<dyn ClientFactory>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            factory,
        }
    }

    /// Session for a token, created with its own marketplace client on
    /// first use.
    pub async fn get_or_create(&self, token: &str) -> Arc<VendorSession> {
        if let Some(session) = self.sessions.read().await.get(token) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(token.to_string())
            .or_insert_with(|| {
                let session = Arc::new(VendorSession::new(token, self.factory.for_token(token)));
                info!("Created session {} for token {}", session.id, session.label);
                session
            })
            .clone()
    }

    /// Close and forget a session. Returns false if there was none.
    pub async fn close(&self, token: &str) -> bool {
        let removed = self.sessions.write().await.remove(token);
        match removed {
            Some(session) => {
                session.state.lock().await.closed = true;
                info!("Closed session {} ({})", session.id, session.label);
                true
            }
            None => false,
        }
    }

    pub async fn active(&self) -> Vec<Arc<VendorSession>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close sessions not used for `max_idle`. Sessions with a withdrawal
    /// in flight are kept.
    pub async fn expire_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_idle).unwrap_or_else(|_| chrono::Duration::zero());

        let mut expired = Vec::new();
        for (token, session) in self.sessions.read().await.iter() {
            let state = session.state.lock().await;
            if state.last_seen < cutoff && !state.in_flight {
                expired.push(token.clone());
            }
        }

        for token in &expired {
            self.close(token).await;
        }

        if !expired.is_empty() {
            debug!("Expired {} idle sessions", expired.len());
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockFactory, MockMarketplace};
    use crate::services::ledger::tests::{dec, earning, summary};

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(MockFactory(Arc::new(MockMarketplace::happy_path()))))
    }

    #[tokio::test]
    async fn test_one_session_per_token() {
        let registry = registry();

        let a = registry.get_or_create("token-a").await;
        let again = registry.get_or_create("token-a").await;
        let b = registry.get_or_create("token-b").await;

        assert_eq!(a.id, again.id);
        assert_ne!(a.id, b.id);
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn test_close_marks_session() {
        let registry = registry();
        let session = registry.get_or_create("token-a").await;

        assert!(registry.close("token-a").await);
        assert!(!registry.close("token-a").await);
        assert!(session.state.lock().await.closed);
        assert_eq!(registry.count().await, 0);

        // A new request with the same token starts over
        let again = registry.get_or_create("token-a").await;
        assert_ne!(again.id, session.id);
    }

    #[tokio::test]
    async fn test_expire_idle_keeps_in_flight_sessions() {
        let registry = registry();
        let idle = registry.get_or_create("idle").await;
        let busy = registry.get_or_create("busy").await;
        let fresh = registry.get_or_create("fresh").await;

        let long_ago = Utc::now() - chrono::Duration::hours(2);
        idle.state.lock().await.last_seen = long_ago;
        {
            let mut state = busy.state.lock().await;
            state.last_seen = long_ago;
            state.in_flight = true;
        }

        let expired = registry.expire_idle(Duration::from_secs(1800)).await;
        assert_eq!(expired, 1);
        assert!(idle.state.lock().await.closed);

        let remaining: Vec<Uuid> = registry.active().await.iter().map(|s| s.id).collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&busy.id));
        assert!(remaining.contains(&fresh.id));
    }

    #[tokio::test]
    async fn test_apply_summary_rebounds_dialog() {
        let registry = registry();
        let session = registry.get_or_create("token-a").await;
        let mut state = session.state.lock().await;

        assert_eq!(state.apply_summary(summary("100", "15", "85")), None);
        state.dialog.open(dec("85")).unwrap();
        state.dialog.validate("80").unwrap();

        let err = state.apply_summary(summary("100", "15", "50"));
        assert!(matches!(err, Some(ValidationError::ExceedsBalance { .. })));
        assert_eq!(state.withdrawal_balance(), Some(dec("50")));
    }

    #[tokio::test]
    async fn test_observe_page_counts_regressions() {
        let registry = registry();
        let session = registry.get_or_create("token-a").await;
        let mut state = session.state.lock().await;

        let mut page = EarningsPage {
            earnings: vec![earning("earn_1", "100", "15", "PAID", true)],
            pagination: None,
            summary: summary("100", "15", "85"),
        };
        assert_eq!(state.observe_page(&page), 0);

        page.earnings = vec![earning("earn_1", "100", "15", "PAID", false)];
        assert_eq!(state.observe_page(&page), 1);
    }
}
