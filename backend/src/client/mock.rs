//! In-memory marketplace used by the unit tests.
//!
//! Behaves like the real marketplace for the happy path (a withdrawal
//! lowers the withdrawal balance) and can be told to reject, hang, or
//! hold a withdrawal until the test releases it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::models::{
    Earning, EarningsPage, EarningsQuery, Pagination, Summary, VendorProfile, WithdrawalReceipt,
};

use super::{ClientError, ClientFactory, MarketplaceApi};

/// How the mock answers `POST /vendors/withdraw`.
#[derive(Debug, Clone)]
pub enum WithdrawBehavior {
    /// Deduct from the withdrawal balance and return a receipt.
    Succeed,
    /// Answer `success: false`.
    Reject { message: String, requires_onboarding: bool },
    /// Fail like an unreachable server.
    NetworkError,
    /// Never answer.
    Hang,
}

pub struct MockMarketplace {
    page: Mutex<EarningsPage>,
    behavior: Mutex<WithdrawBehavior>,
    gate: Mutex<Option<Arc<Notify>>>,
    token_revoked: AtomicBool,
    pub list_calls: AtomicUsize,
    pub withdraw_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub idempotency_keys: Mutex<Vec<Uuid>>,
}

impl MockMarketplace {
    pub fn new(earnings: Vec<Earning>, summary: Summary) -> Self {
        let total = earnings.len() as u64;
        Self {
            page: Mutex::new(EarningsPage {
                earnings,
                pagination: Some(Pagination {
                    page: 1,
                    limit: 10,
                    total,
                    total_pages: 1,
                }),
                summary,
            }),
            behavior: Mutex::new(WithdrawBehavior::Succeed),
            gate: Mutex::new(None),
            token_revoked: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            withdraw_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            idempotency_keys: Mutex::new(Vec::new()),
        }
    }

    /// The happy-path vendor: one paid earning of 100 with 15 commission.
    pub fn happy_path() -> Self {
        use crate::services::ledger::tests::{earning, summary};
        Self::new(
            vec![earning("earn_1", "100", "15", "PAID", true)],
            summary("100", "15", "85"),
        )
    }

    pub fn set_behavior(&self, behavior: WithdrawBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Hold withdrawals until the returned handle is notified.
    pub fn hold_withdrawals(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    /// Answer every later call with HTTP 401.
    pub fn revoke_token(&self) {
        self.token_revoked.store(true, Ordering::SeqCst);
    }

    fn check_token(&self) -> Result<(), ClientError> {
        if self.token_revoked.load(Ordering::SeqCst) {
            return Err(ClientError::Unauthorized);
        }
        Ok(())
    }

    pub fn set_withdrawal_balance(&self, balance: Decimal) {
        self.page.lock().unwrap().summary.withdrawal_balance = balance;
    }

    pub fn withdrawals(&self) -> usize {
        self.withdraw_calls.load(Ordering::SeqCst)
    }

    pub fn listings(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn profiles(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketplaceApi for MockMarketplace {
    async fn list_earnings(&self, _query: &EarningsQuery) -> Result<EarningsPage, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_token()?;
        Ok(self.page.lock().unwrap().clone())
    }

    async fn request_withdrawal(
        &self,
        amount: Decimal,
        idempotency_key: Uuid,
    ) -> Result<WithdrawalReceipt, ClientError> {
        self.withdraw_calls.fetch_add(1, Ordering::SeqCst);
        self.idempotency_keys.lock().unwrap().push(idempotency_key);
        self.check_token()?;

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            WithdrawBehavior::Succeed => {
                let mut page = self.page.lock().unwrap();
                if amount > page.summary.withdrawal_balance {
                    return Err(ClientError::Rejected {
                        message: "Insufficient withdrawal balance".to_string(),
                        requires_onboarding: false,
                        stripe_account_id: None,
                    });
                }
                page.summary.withdrawal_balance -= amount;
                Ok(WithdrawalReceipt {
                    amount,
                    remaining_balance: page.summary.withdrawal_balance,
                    status: "pending".to_string(),
                    transfer_id: Some(format!("tr_{}", Utc::now().timestamp_millis())),
                    estimated_arrival: Some("2-3 business days".to_string()),
                })
            }
            WithdrawBehavior::Reject { message, requires_onboarding } => Err(ClientError::Rejected {
                message,
                requires_onboarding,
                stripe_account_id: None,
            }),
            WithdrawBehavior::NetworkError => {
                Err(ClientError::Network("connection reset by peer".to_string()))
            }
            WithdrawBehavior::Hang => std::future::pending().await,
        }
    }

    async fn vendor_profile(&self) -> Result<VendorProfile, ClientError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.check_token()?;
        Ok(VendorProfile {
            id: "vendor_1".to_string(),
            store_name: Some("Test Store".to_string()),
            stripe_account_id: Some("acct_test".to_string()),
            stripe_onboarding_complete: true,
        })
    }
}

/// Factory handing out the same mock for every token.
pub struct MockFactory(pub Arc<MockMarketplace>);

impl ClientFactory for MockFactory {
    fn for_token(&self, _token: &str) -> Arc<dyn MarketplaceApi> {
        self.0.clone()
    }
}
