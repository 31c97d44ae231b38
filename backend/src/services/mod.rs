//! # Services Module
//!
//! This module contains the business logic of the vendor earnings backend.
//! The marketplace owns the ledger; these services render it, check it,
//! and guard the withdrawal flow in front of it.
//!
//! ## Services Overview
//!
//! | Service | Responsibility |
//! |---------|---------------|
//! | `ledger` | Recomputed totals, integrity faults, summary reconciliation |
//! | `withdrawal` | Amount validation, dialog state machine, submission |
//! | `status` | Payout status and withdrawal flag badges |
//! | `currency` | Currency codes, rounding, display formatting |
//! | `EarningsService` | Page loads and the dashboard view |
//! | `SessionRegistry` | Per-token sessions and their marketplace clients |
//! | `EarningsMonitor` | Background refresh, idle session cleanup |
//!
//! ## Service Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SERVICES LAYER                            │
//! │                                                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                   SessionRegistry                         │   │
//! │  │  • VendorSession per token  • marketplace client          │   │
//! │  │  • summary, dialog, flag tracker, in-flight flag          │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │                              │                                   │
//! │         ┌────────────────────┼────────────────────┐             │
//! │         ▼                    ▼                    ▼             │
//! │  ┌────────────┐      ┌────────────┐       ┌────────────┐       │
//! │  │  Earnings  │      │ Withdrawal │       │  Earnings  │       │
//! │  │  Service   │      │  Service   │       │  Monitor   │       │
//! │  │            │      │            │       │            │       │
//! │  │ Rows, badges│     │ Validate   │       │ Refresh    │       │
//! │  │ Totals     │      │ Submit     │       │ Expire     │       │
//! │  └────────────┘      └────────────┘       └────────────┘       │
//! │         │                    │                                   │
//! │         ▼                    ▼                                   │
//! │     ledger, status, currency (pure functions)                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod currency;
pub mod earnings_monitor;
pub mod earnings_view;
pub mod ledger;
pub mod session;
pub mod status;
pub mod withdrawal;

pub use earnings_monitor::EarningsMonitor;
pub use earnings_view::EarningsService;
pub use session::{SessionRegistry, VendorSession};
pub use withdrawal::WithdrawalService;
