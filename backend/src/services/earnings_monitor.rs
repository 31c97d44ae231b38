//! # Earnings Monitor Service
//!
//! Keeps open dashboards current without the vendor reloading the page.
//!
//! ## Monitoring Flow
//!
//! ```text
//! EarningsMonitor (background task)
//!              │
//!              ├── Every EARNINGS_REFRESH_INTERVAL: reload each session's
//!              │   last query, push earnings_refreshed, and
//!              │   withdrawal_bound_changed when a pending amount no
//!              │   longer fits
//!              │
//!              └── Every minute: close sessions idle for longer than
//!                  SESSION_IDLE_TIMEOUT_SECS
//! ```
//!
//! Sessions that never loaded their earnings are skipped; there is no
//! query to repeat yet.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;

use super::earnings_view::EarningsService;
use super::session::SessionRegistry;

/// Outcome of one refresh round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub balance_changed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The Earnings Monitor service.
///
/// ## Usage
///
/// ```rust,ignore
/// let monitor = EarningsMonitor::new(sessions, earnings, config);
///
/// // Start monitoring (runs forever)
/// tokio::spawn(async move {
///     monitor.start().await;
/// });
/// ```
#[derive(Clone)]
pub struct EarningsMonitor {
    sessions: SessionRegistry,
    earnings: EarningsService,
    config: AppConfig,
}

impl EarningsMonitor {
    pub fn new(sessions: SessionRegistry, earnings: EarningsService, config: AppConfig) -> Self {
        Self {
            sessions,
            earnings,
            config,
        }
    }

    /// Start the monitoring loop.
    ///
    /// | Check | Interval |
    /// |-------|----------|
    /// | Earnings refresh | `EARNINGS_REFRESH_INTERVAL` (default: 120s) |
    /// | Idle sessions | 60s |
    pub async fn start(&self) {
        info!(
            "Starting Earnings Monitor (refresh every {}s)",
            self.config.earnings_refresh_interval.as_secs()
        );

        let mut refresh_ticker = interval(self.config.earnings_refresh_interval);
        refresh_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut idle_ticker = interval(Duration::from_secs(60));

        // Both intervals fire immediately; nothing is loaded yet.
        refresh_ticker.tick().await;
        idle_ticker.tick().await;

        loop {
            tokio::select! {
                _ = refresh_ticker.tick() => {
                    let report = self.refresh_all().await;
                    if report.failed > 0 {
                        warn!(
                            "Earnings refresh: {} ok, {} failed",
                            report.refreshed, report.failed
                        );
                    } else if report.refreshed > 0 {
                        debug!(
                            "Earnings refresh: {} sessions, {} balance changes",
                            report.refreshed, report.balance_changed
                        );
                    }
                }

                _ = idle_ticker.tick() => {
                    let expired = self.sessions.expire_idle(self.config.session_idle_timeout).await;
                    if expired > 0 {
                        info!("Closed {} idle sessions", expired);
                    }
                }
            }
        }
    }

    /// Refresh every active session once.
    pub async fn refresh_all(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        for session in self.sessions.active().await {
            let never_loaded = {
                let state = session.state.lock().await;
                state.closed || state.last_refreshed.is_none()
            };
            if never_loaded {
                report.skipped += 1;
                continue;
            }

            match self.earnings.refresh(&session).await {
                Ok(changed) => {
                    report.refreshed += 1;
                    if changed {
                        report.balance_changed += 1;
                    }
                }
                Err(e) => {
                    error!("Refresh failed for session {}: [{}] {}", session.id, e.code(), e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}
