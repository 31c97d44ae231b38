//! # WebSocket Module
//!
//! This module pushes updates to open vendor dashboards.
//!
//! ## Features
//!
//! - Background earnings refreshes
//! - Withdrawal outcomes (settled or failed)
//! - Withdrawal balance changing under a typed amount
//! - Delayed onboarding redirect
//!
//! ## Connection Flow
//!
//! ```text
//! 1. Dashboard connects to /ws?token=<bearer token>
//!              ↓
//! 2. Token resolves to the vendor's session (created if needed)
//!              ↓
//! 3. Connection is registered under the session id
//!              ↓
//! 4. Events are pushed as they occur:
//!    - earnings_refreshed
//!    - withdrawal_bound_changed
//!    - withdrawal_settled / withdrawal_failed
//!    - onboarding_redirect
//! ```
//!
//! ## Message Format
//!
//! All messages are JSON:
//!
//! ```json
//! {
//!     "event": "onboarding_redirect",
//!     "data": {
//!         "path": "/vendor/profile",
//!         "delayMs": 2000
//!     },
//!     "timestamp": "2026-10-19T12:00:00Z"
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::models::{ApiResponse, WsQuery};
use crate::utils::truncate_string;
use crate::AppState;

/// WebSocket event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WsEventType {
    /// Earnings were reloaded in the background.
    EarningsRefreshed,
    /// The withdrawal balance no longer covers the amount in the dialog.
    WithdrawalBoundChanged,
    /// A withdrawal went through.
    WithdrawalSettled,
    /// A withdrawal was refused or timed out.
    WithdrawalFailed,
    /// The dashboard should navigate to payment onboarding.
    OnboardingRedirect,
    /// Ping/pong for keepalive.
    Ping,
    /// Error message.
    Error,
}

/// WebSocket message wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsMessage<T> {
    /// Event type.
    pub event: WsEventType,
    /// Event data.
    pub data: T,
    /// Timestamp.
    pub timestamp: chrono::DateTime<Utc>,
}

impl<T: Serialize> WsMessage<T> {
    /// Create a new WebSocket message.
    pub fn new(event: WsEventType, data: T) -> Self {
        Self {
            event,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// WebSocket connection registry.
///
/// Tracks active connections per session id. A vendor with the dashboard
/// open in two tabs has two connections under the same id.
#[derive(Clone)]
pub struct WsRegistry {
    /// Map of session id -> broadcast senders, one per connection.
    sessions: Arc<Mutex<HashMap<String, Vec<broadcast::Sender<String>>>>>,
}

impl WsRegistry {
    /// Create a new WebSocket registry.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a new WebSocket connection for a session.
    /// Returns a receiver that will receive messages for this session.
    pub async fn register(&self, session_id: String) -> broadcast::Receiver<String> {
        let mut sessions = self.sessions.lock().await;
        let (tx, rx) = broadcast::channel(100); // Buffer up to 100 messages

        let senders = sessions.entry(session_id.clone()).or_default();
        senders.push(tx);

        info!(
            "Registered WebSocket for session: {} (total connections: {})",
            session_id,
            senders.len()
        );

        rx
    }

    /// Drop senders whose receivers are gone.
    pub async fn unregister(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(senders) = sessions.get_mut(session_id) {
            senders.retain(|tx| tx.receiver_count() > 0);

            if senders.is_empty() {
                sessions.remove(session_id);
                info!("Unregistered all WebSocket connections for session: {}", session_id);
            } else {
                info!(
                    "Unregistered one WebSocket connection for session: {} (remaining: {})",
                    session_id,
                    senders.len()
                );
            }
        }
    }

    /// Send a message to every connection of a session.
    ///
    /// A session with no open connection is not an error.
    ///
    /// ## Returns
    ///
    /// * `Ok(())` - Message sent (or nobody connected)
    /// * `Err(String)` - Failed to serialize message
    pub async fn send_to_session<T: Serialize>(
        &self,
        session_id: &str,
        event: WsEventType,
        data: T,
    ) -> Result<(), String> {
        let message = WsMessage::new(event, data);
        let json = message
            .to_json()
            .map_err(|e| format!("Failed to serialize message: {}", e))?;

        let mut sessions = self.sessions.lock().await;

        let Some(senders) = sessions.get_mut(session_id) else {
            debug!("No active WebSocket connections for session: {}", session_id);
            return Ok(());
        };

        // Dead senders are dropped while sending
        senders.retain(|sender| sender.receiver_count() > 0 && sender.send(json.clone()).is_ok());
        let sent_count = senders.len();

        if senders.is_empty() {
            sessions.remove(session_id);
        }

        if sent_count > 0 {
            debug!("Sent {:?} to session {} ({} connections)", event, session_id, sent_count);
        }

        Ok(())
    }

    /// Get total number of active connections across all sessions.
    pub async fn total_connections(&self) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.values().map(|v| v.len()).sum()
    }
}

impl Default for WsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Configure WebSocket routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(websocket_handler));
}

/// WebSocket connection handler.
///
/// ## Endpoint
///
/// `GET /ws?token=<bearer token>`
///
/// Browsers cannot set an `Authorization` header on a WebSocket, so the
/// token travels in the query string.
///
/// ## Example (JavaScript)
///
/// ```javascript
/// const ws = new WebSocket(`ws://localhost:8080/ws?token=${token}`);
///
/// ws.onmessage = (event) => {
///     const message = JSON.parse(event.data);
///     if (message.event === 'onboarding_redirect') {
///         setTimeout(() => navigate(message.data.path), 0);
///     }
/// };
/// ```
pub async fn websocket_handler(
    req: HttpRequest,
    query: web::Query<WsQuery>,
    body: web::Payload,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, actix_web::Error> {
    let token = query.into_inner().token;
    if token.trim().is_empty() {
        return Ok(HttpResponse::Unauthorized().json(ApiResponse::<()>::error(
            "UNAUTHORIZED",
            "Missing token",
        )));
    }

    let vendor = state.sessions.get_or_create(&token).await;
    let session_id = vendor.id.to_string();
    info!("WebSocket connection request for session: {} ({})", session_id, vendor.label);

    // Upgrade to WebSocket connection
    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;

    let ws_registry = state.ws_registry.clone();
    let mut rx = ws_registry.register(session_id.clone()).await;

    actix_rt::spawn(async move {
        info!("WebSocket connected for session: {}", session_id);

        let welcome = WsMessage::new(
            WsEventType::Ping,
            serde_json::json!({
                "status": "connected",
                "sessionId": session_id,
                "message": "You will receive live earnings and withdrawal updates"
            }),
        );

        if let Ok(json) = welcome.to_json() {
            if let Err(e) = session.text(json).await {
                error!("Failed to send welcome message: {}", e);
            }
        }

        // Forward messages from the registry to the socket
        let mut session_clone = session.clone();
        let forward_id = session_id.clone();
        let ws_registry_for_cleanup = ws_registry.clone();
        actix_rt::spawn(async move {
            while let Ok(msg) = rx.recv().await {
                if let Err(e) = session_clone.text(msg).await {
                    debug!(
                        "WebSocket session closed for {}: {}. Stopping message forwarding.",
                        forward_id, e
                    );
                    ws_registry_for_cleanup.unregister(&forward_id).await;
                    break;
                }
            }
        });

        while let Some(Ok(msg)) = msg_stream.next().await {
            match msg {
                Message::Ping(bytes) => {
                    debug!("Received ping from {}", session_id);
                    let _ = session.pong(&bytes).await;
                }
                Message::Pong(_) => {
                    debug!("Received pong from {}", session_id);
                }
                Message::Text(text) => {
                    debug!("Received text from {}: {}", session_id, truncate_string(&text, 64));

                    let response = WsMessage::new(
                        WsEventType::Ping,
                        serde_json::json!({
                            "message": "WebSocket is active and listening for events"
                        }),
                    );

                    if let Ok(json) = response.to_json() {
                        let _ = session.text(json).await;
                    }
                }
                Message::Binary(_) => {
                    warn!("Received unexpected binary message from {}", session_id);
                    let error = WsMessage::new(
                        WsEventType::Error,
                        serde_json::json!({ "message": "Binary messages are not supported" }),
                    );
                    if let Ok(json) = error.to_json() {
                        let _ = session.text(json).await;
                    }
                }
                Message::Close(reason) => {
                    info!("WebSocket closed for {}: {:?}", session_id, reason);
                    break;
                }
                _ => {}
            }
        }

        ws_registry.unregister(&session_id).await;
        info!("WebSocket disconnected for session: {}", session_id);
    });

    Ok(response)
}
