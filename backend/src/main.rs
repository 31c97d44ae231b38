//! # Vendor Earnings Backend Service
//!
//! This is the main entry point for the backend behind the vendor earnings
//! dashboard. The marketplace owns the ledger; this service reads it on the
//! vendor's behalf and guards the withdrawal flow. It provides:
//!
//! - REST API for the dashboard (earnings view, withdrawal dialog)
//! - WebSocket connections for live updates
//! - A background monitor refreshing open dashboards
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        BACKEND SERVICE                           │
//! │                                                                  │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  REST API   │  │  WebSocket  │  │   Background Services   │  │
//! │  │  (Actix)    │  │  Server     │  │  • Earnings Monitor     │  │
//! │  │             │  │             │  │  • Idle session cleanup │  │
//! │  │  /earnings  │  │  /ws        │  │                         │  │
//! │  │  /withdraw  │  │             │  │                         │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! │         │                │                     │                 │
//! │         └────────────────┴─────────────────────┘                 │
//! │                          │                                       │
//! │  ┌───────────────────────┴───────────────────────────────────┐  │
//! │  │                    SERVICE LAYER                           │  │
//! │  │  ┌──────────────┐ ┌──────────────┐ ┌──────────────────┐   │  │
//! │  │  │Earnings      │ │Withdrawal    │ │SessionRegistry   │   │  │
//! │  │  └──────────────┘ └──────────────┘ └──────────────────┘   │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                          │                                       │
//! │                   ┌──────┴──────┐                                │
//! │                   │ Marketplace │                                │
//! │                   │ REST API    │                                │
//! │                   └─────────────┘                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! 1. Set `MARKETPLACE_API_URL` (in the environment or a `.env` file)
//! 2. Start the server: `cargo run`
//!
//! ## Environment Variables
//!
//! See the `config` module for every setting and its default.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod api;
mod client;
mod config;
mod models;
mod services;
mod utils;
mod websocket;

use client::{ClientFactory, HttpClientFactory};
use config::AppConfig;
use services::{EarningsMonitor, EarningsService, SessionRegistry, WithdrawalService};
use websocket::WsRegistry;

/// Application state shared across all handlers.
///
/// This struct contains all the shared resources that API handlers
/// and background services need access to.
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Vendor sessions, one per bearer token
    pub sessions: SessionRegistry,

    /// Earnings view service
    pub earnings: EarningsService,

    /// Withdrawal dialog and submission service
    pub withdrawals: WithdrawalService,

    /// WebSocket connection registry for live updates
    pub ws_registry: WsRegistry,
}

impl AppState {
    /// Wire the services around a marketplace client factory.
    pub fn new(config: AppConfig, factory: Arc<dyn ClientFactory>) -> Self {
        let ws_registry = WsRegistry::new();
        Self {
            sessions: SessionRegistry::new(factory),
            earnings: EarningsService::new(config.clone(), ws_registry.clone()),
            withdrawals: WithdrawalService::new(config.clone(), ws_registry.clone()),
            ws_registry,
            config,
        }
    }
}

/// Main entry point for the backend service.
///
/// This function:
/// 1. Loads configuration from environment
/// 2. Builds the marketplace client factory
/// 3. Starts the earnings monitor
/// 4. Launches the HTTP server
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // =========================================
    // STEP 1: Initialize Logging
    // =========================================
    // RUST_LOG overrides the default level
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("🚀 Starting Vendor Earnings Backend Service");

    // =========================================
    // STEP 2: Load Configuration
    // =========================================
    dotenvy::dotenv().ok(); // It's okay if .env doesn't exist

    let config = AppConfig::from_env().expect("Failed to load configuration");

    info!("📋 Configuration loaded");
    info!("   Marketplace API: {}", config.marketplace_api_url);
    info!("   Currency: {}", config.currency);
    info!(
        "   Withdrawal timeout: {}s, refresh every {}s",
        config.withdrawal_timeout.as_secs(),
        config.earnings_refresh_interval.as_secs()
    );

    // =========================================
    // STEP 3: Marketplace Client Factory
    // =========================================
    let factory = HttpClientFactory::new(&config).expect("Failed to build marketplace client");

    info!("🔗 Marketplace client ready");

    // =========================================
    // STEP 4: Create Application State
    // =========================================
    let app_state = Arc::new(AppState::new(config.clone(), Arc::new(factory)));

    info!("🔧 Services initialized");

    // =========================================
    // STEP 5: Start Background Services
    // =========================================
    let monitor = EarningsMonitor::new(
        app_state.sessions.clone(),
        app_state.earnings.clone(),
        app_state.config.clone(),
    );
    tokio::spawn(async move {
        monitor.start().await;
    });

    info!("👁️  Earnings monitor started");

    // =========================================
    // STEP 6: Start HTTP Server
    // =========================================
    let server_host = config.server_host.clone();
    let server_port = config.server_port;
    let allowed_origin = config.cors_allowed_origin.clone();

    info!("🌐 Starting HTTP server on {}:{}", server_host, server_port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&allowed_origin)
            .allowed_methods(vec!["GET", "POST", "DELETE"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            // Attach shared application state
            .app_data(web::Data::new(app_state.clone()))

            // Dashboard origin only
            .wrap(cors)

            // Add logging middleware; /ws URLs carry the token
            .wrap(middleware::Logger::default().exclude("/ws"))

            // Configure API routes
            .configure(api::configure_routes)

            // Configure WebSocket routes
            .configure(websocket::configure_routes)
    })
    .bind(format!("{}:{}", server_host, server_port))?
    .run()
    .await
}
