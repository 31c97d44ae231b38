//! # API Request Handlers
//!
//! This module contains the handler functions for each API endpoint.
//! Each handler:
//! 1. Resolves the vendor session from the bearer token
//! 2. Calls the appropriate service
//! 3. Returns a formatted response
//!
//! ## Error Handling
//!
//! All errors are caught and returned as JSON:
//!
//! ```json
//! {
//!     "success": false,
//!     "error": {
//!         "code": "AMOUNT_EXCEEDS_BALANCE",
//!         "message": "Amount 20.01 exceeds your available balance of 20"
//!     }
//! }
//! ```
//!
//! | Kind | Status |
//! |------|--------|
//! | Missing token, token rejected upstream | 401 |
//! | Bad query | 400 |
//! | Invalid amount, business rejection | 422 |
//! | Dialog not open, submission in flight | 409 |
//! | Marketplace unreachable or failing | 502 |
//! | Marketplace too slow | 504 |

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use crate::client::ClientError;
use crate::models::{ApiResponse, EarningsQuery, HealthResponse, WithdrawRequest};
use crate::services::earnings_view::EarningsError;
use crate::services::withdrawal::WithdrawalError;
use crate::services::VendorSession;
use crate::AppState;

/// API information endpoint (root).
///
/// ## Endpoint
///
/// `GET /`
pub async fn api_info() -> HttpResponse {
    let info = json!({
        "name": "Vendor Earnings API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Earnings ledger and withdrawals for marketplace vendors",
        "endpoints": {
            "health": {
                "method": "GET",
                "path": "/health",
                "description": "Health check endpoint"
            },
            "vendors": {
                "earnings": {
                    "method": "GET",
                    "path": "/vendors/earnings?page&limit&status",
                    "description": "Earnings rows, summary and integrity warnings"
                },
                "dialog": {
                    "method": "GET | POST | DELETE",
                    "path": "/vendors/withdraw/dialog",
                    "description": "Read, open or dismiss the withdrawal dialog"
                },
                "validate": {
                    "method": "POST",
                    "path": "/vendors/withdraw/validate",
                    "description": "Validate an amount against the withdrawal balance"
                },
                "withdraw": {
                    "method": "POST",
                    "path": "/vendors/withdraw",
                    "description": "Submit a withdrawal"
                },
                "session": {
                    "method": "DELETE",
                    "path": "/vendors/session",
                    "description": "Close the dashboard session"
                }
            },
            "websocket": {
                "path": "/ws?token=",
                "description": "Live earnings and withdrawal events"
            }
        }
    });

    HttpResponse::Ok()
        .content_type("application/json")
        .json(ApiResponse::success(info))
}

/// Health check endpoint.
///
/// ## Endpoint
///
/// `GET /health`
///
/// ## Response
///
/// ```json
/// {
///     "success": true,
///     "data": {
///         "status": "healthy",
///         "activeSessions": 3,
///         "websocketConnections": 2,
///         "version": "0.1.0",
///         "timestamp": "2026-10-19T12:00:00Z"
///     }
/// }
/// ```
pub async fn health_check(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        active_sessions: state.sessions.count().await,
        websocket_connections: state.ws_registry.total_connections().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    };

    HttpResponse::Ok().json(ApiResponse::success(response))
}

/// Extract the bearer token from the `Authorization` header.
fn bearer_token(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(ApiResponse::<()>::error(
        "UNAUTHORIZED",
        "Missing or malformed bearer token",
    ))
}

/// Session for the request's token, or the 401 response.
async fn session_for(
    state: &AppState,
    req: &HttpRequest,
) -> Result<Arc<VendorSession>, HttpResponse> {
    match bearer_token(req) {
        Some(token) => Ok(state.sessions.get_or_create(&token).await),
        None => Err(unauthorized()),
    }
}

/// A token the marketplace refused keeps no session.
async fn forget_refused_token(state: &AppState, req: &HttpRequest, error: Option<&ClientError>) {
    if !matches!(error, Some(ClientError::Unauthorized)) {
        return;
    }
    if let Some(token) = bearer_token(req) {
        state.sessions.close(&token).await;
    }
}

fn upstream_status(error: &ClientError) -> StatusCode {
    match error {
        ClientError::Unauthorized => StatusCode::UNAUTHORIZED,
        ClientError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn earnings_error_response(e: &EarningsError) -> HttpResponse {
    let status = match e {
        EarningsError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        EarningsError::Upstream(client) => upstream_status(client),
    };
    HttpResponse::build(status).json(ApiResponse::<()>::error(e.code(), &e.to_string()))
}

fn withdrawal_error_response(e: &WithdrawalError) -> HttpResponse {
    let status = match e {
        WithdrawalError::Validation(_)
        | WithdrawalError::OnboardingRequired { .. }
        | WithdrawalError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WithdrawalError::DialogNotOpen | WithdrawalError::InFlight => StatusCode::CONFLICT,
        WithdrawalError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        WithdrawalError::Upstream(client) => upstream_status(client),
        WithdrawalError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = match e {
        WithdrawalError::OnboardingRequired { message, redirect } => {
            ApiResponse::<()>::error_with_redirect(e.code(), message, redirect.clone())
        }
        _ => ApiResponse::<()>::error(e.code(), &e.to_string()),
    };

    HttpResponse::build(status).json(body)
}

/// Get the earnings view.
///
/// ## Endpoint
///
/// `GET /vendors/earnings?page=1&limit=10&status=PAID`
///
/// ## Example
///
/// ```bash
/// curl http://127.0.0.1:8080/vendors/earnings?page=1 \
///   -H "Authorization: Bearer $TOKEN"
/// ```
///
/// Rows that break a ledger invariant come back with `flagged: true` and
/// their faults; the request still succeeds.
pub async fn get_earnings(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    query: web::Query<EarningsQuery>,
) -> HttpResponse {
    let session = match session_for(&state, &req).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match state.earnings.load(&session, &query).await {
        Ok(view) => HttpResponse::Ok().json(ApiResponse::success(view)),
        Err(e) => {
            warn!("Earnings request failed for session {}: {}", session.id, e);
            if let EarningsError::Upstream(client) = &e {
                forget_refused_token(&state, &req, Some(client)).await;
            }
            earnings_error_response(&e)
        }
    }
}

/// Get the current withdrawal dialog.
///
/// ## Endpoint
///
/// `GET /vendors/withdraw/dialog`
pub async fn get_dialog(req: HttpRequest, state: web::Data<Arc<AppState>>) -> HttpResponse {
    let session = match session_for(&state, &req).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    HttpResponse::Ok().json(ApiResponse::success(state.withdrawals.dialog(&session).await))
}

/// Open the withdrawal dialog.
///
/// ## Endpoint
///
/// `POST /vendors/withdraw/dialog`
///
/// Refused with `NOTHING_TO_WITHDRAW` when the withdrawal balance is zero.
pub async fn open_dialog(req: HttpRequest, state: web::Data<Arc<AppState>>) -> HttpResponse {
    let session = match session_for(&state, &req).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match state.withdrawals.open(&session).await {
        Ok(view) => HttpResponse::Ok().json(ApiResponse::success(view)),
        Err(e) => {
            forget_refused_token(&state, &req, e.upstream()).await;
            withdrawal_error_response(&e)
        }
    }
}

/// Dismiss the withdrawal dialog.
///
/// ## Endpoint
///
/// `DELETE /vendors/withdraw/dialog`
pub async fn dismiss_dialog(req: HttpRequest, state: web::Data<Arc<AppState>>) -> HttpResponse {
    let session = match session_for(&state, &req).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    HttpResponse::Ok().json(ApiResponse::success(state.withdrawals.dismiss(&session).await))
}

/// Validate an amount without submitting it.
///
/// ## Endpoint
///
/// `POST /vendors/withdraw/validate`
///
/// ## Request Body
///
/// ```json
/// { "amount": "20.01" }
/// ```
pub async fn validate_amount(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    body: web::Json<WithdrawRequest>,
) -> HttpResponse {
    let session = match session_for(&state, &req).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match state.withdrawals.validate(&session, &body.amount.as_text()).await {
        Ok(view) => HttpResponse::Ok().json(ApiResponse::success(view)),
        Err(e) => withdrawal_error_response(&e),
    }
}

/// Submit a withdrawal.
///
/// ## Endpoint
///
/// `POST /vendors/withdraw`
///
/// ## Example
///
/// ```bash
/// curl -X POST http://127.0.0.1:8080/vendors/withdraw \
///   -H "Authorization: Bearer $TOKEN" \
///   -H "Content-Type: application/json" \
///   -d '{ "amount": "50.00" }'
/// ```
///
/// The amount is validated against the withdrawal balance first; an invalid
/// amount never reaches the marketplace. `ONBOARDING_REQUIRED` responses
/// carry a redirect hint, and the redirect itself is pushed over the
/// WebSocket once the delay has passed.
pub async fn withdraw(
    req: HttpRequest,
    state: web::Data<Arc<AppState>>,
    body: web::Json<WithdrawRequest>,
) -> HttpResponse {
    let session = match session_for(&state, &req).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let amount = body.amount.as_text();
    info!("Withdraw request: {} for session {}", amount, session.id);

    match state.withdrawals.submit(session.clone(), &amount).await {
        Ok(outcome) => HttpResponse::Ok().json(ApiResponse::success(outcome)),
        Err(e) => {
            match &e {
                WithdrawalError::Internal(_) => error!("Withdraw failed: {}", e),
                _ => warn!("Withdraw refused: [{}] {}", e.code(), e),
            }
            forget_refused_token(&state, &req, e.upstream()).await;
            withdrawal_error_response(&e)
        }
    }
}

/// Close the vendor's session (the dashboard was left).
///
/// ## Endpoint
///
/// `DELETE /vendors/session`
///
/// Pending redirects for this session are dropped.
pub async fn close_session(req: HttpRequest, state: web::Data<Arc<AppState>>) -> HttpResponse {
    let Some(token) = bearer_token(&req) else {
        return unauthorized();
    };

    let closed = state.sessions.close(&token).await;
    HttpResponse::Ok().json(ApiResponse::success(json!({ "closed": closed })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    use crate::api::configure_routes;
    use crate::client::mock::{MockFactory, MockMarketplace, WithdrawBehavior};
    use crate::config::AppConfig;
    use crate::services::ledger::tests::dec;

    fn app_state(mock: Arc<MockMarketplace>) -> Arc<AppState> {
        Arc::new(AppState::new(AppConfig::for_tests(), Arc::new(MockFactory(mock))))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state.clone()))
                    .configure(configure_routes),
            )
            .await
        };
    }

    const AUTH: (&str, &str) = ("Authorization", "Bearer vendor-token-1234");

    #[actix_web::test]
    async fn test_vendor_routes_require_token() {
        let state = app_state(Arc::new(MockMarketplace::happy_path()));
        let app = app!(state);

        let req = test::TestRequest::get().uri("/vendors/earnings").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert_eq!(state.sessions.count().await, 0);
    }

    #[actix_web::test]
    async fn test_refused_token_keeps_no_session() {
        let mock = Arc::new(MockMarketplace::happy_path());
        mock.revoke_token();
        let state = app_state(mock.clone());
        let app = app!(state);

        for (method, uri) in [("GET", "/vendors/earnings"), ("POST", "/vendors/withdraw/dialog")] {
            let req = match method {
                "GET" => test::TestRequest::get(),
                _ => test::TestRequest::post(),
            }
            .uri(uri)
            .insert_header(AUTH)
            .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
            assert_eq!(state.sessions.count().await, 0, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_token_refused_at_withdrawal_closes_session() {
        let mock = Arc::new(MockMarketplace::happy_path());
        let state = app_state(mock.clone());
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/vendors/withdraw/dialog")
            .insert_header(AUTH)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert_eq!(state.sessions.count().await, 1);

        mock.revoke_token();
        let req = test::TestRequest::post()
            .uri("/vendors/withdraw")
            .insert_header(AUTH)
            .set_json(json!({ "amount": 50 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
        assert_eq!(state.sessions.count().await, 0);
    }

    #[actix_web::test]
    async fn test_get_earnings() {
        let state = app_state(Arc::new(MockMarketplace::happy_path()));
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/vendors/earnings?page=1&limit=10")
            .insert_header(AUTH)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["summary"]["withdrawalBalance"]["formatted"], "£85.00");
        assert_eq!(body["data"]["earnings"][0]["status"]["label"], "Paid");
        assert_eq!(body["data"]["earnings"][0]["flagged"], false);
    }

    #[actix_web::test]
    async fn test_invalid_query_uses_envelope() {
        let state = app_state(Arc::new(MockMarketplace::happy_path()));
        let app = app!(state);

        for uri in ["/vendors/earnings?limit=500", "/vendors/earnings?page=abc"] {
            let req = test::TestRequest::get().uri(uri).insert_header(AUTH).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);

            let body: serde_json::Value = test::read_body_json(resp).await;
            assert_eq!(body["error"]["code"], "INVALID_QUERY");
        }
    }

    #[actix_web::test]
    async fn test_withdrawal_flow() {
        let mock = Arc::new(MockMarketplace::happy_path());
        let state = app_state(mock.clone());
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/vendors/withdraw/dialog")
            .insert_header(AUTH)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/vendors/withdraw")
            .insert_header(AUTH)
            .set_json(json!({ "amount": 50 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["remainingBalance"]["formatted"], "£35.00");
        assert_eq!(mock.withdrawals(), 1);

        let req = test::TestRequest::get()
            .uri("/vendors/withdraw/dialog")
            .insert_header(AUTH)
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["dialog"]["state"], "succeeded");
    }

    #[actix_web::test]
    async fn test_over_limit_is_rejected_locally() {
        let mock = Arc::new(MockMarketplace::happy_path());
        mock.set_withdrawal_balance(dec("20"));
        let state = app_state(mock.clone());
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/vendors/withdraw/dialog")
            .insert_header(AUTH)
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/vendors/withdraw")
            .insert_header(AUTH)
            .set_json(json!({ "amount": "20.01" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "AMOUNT_EXCEEDS_BALANCE");
        assert_eq!(mock.withdrawals(), 0);
    }

    #[actix_web::test]
    async fn test_withdraw_without_dialog_conflicts() {
        let state = app_state(Arc::new(MockMarketplace::happy_path()));
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/vendors/withdraw")
            .insert_header(AUTH)
            .set_json(json!({ "amount": "10" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "DIALOG_NOT_OPEN");
    }

    #[actix_web::test]
    async fn test_onboarding_required_carries_redirect() {
        let mock = Arc::new(MockMarketplace::happy_path());
        mock.set_behavior(WithdrawBehavior::Reject {
            message: "Please complete your payment account setup".to_string(),
            requires_onboarding: true,
        });
        let state = app_state(mock);
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/vendors/withdraw/dialog")
            .insert_header(AUTH)
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/vendors/withdraw")
            .insert_header(AUTH)
            .set_json(json!({ "amount": "50" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "ONBOARDING_REQUIRED");
        assert_eq!(body["error"]["message"], "Please complete your payment account setup");
        assert_eq!(body["error"]["redirect"]["path"], "/vendor/profile");
        assert_eq!(body["error"]["redirect"]["delayMs"], 2000);
    }

    #[actix_web::test]
    async fn test_malformed_amount_body() {
        let state = app_state(Arc::new(MockMarketplace::happy_path()));
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/vendors/withdraw/validate")
            .insert_header(AUTH)
            .set_json(json!({ "amount": true }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "INVALID_AMOUNT");
    }

    #[actix_web::test]
    async fn test_close_session() {
        let state = app_state(Arc::new(MockMarketplace::happy_path()));
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/vendors/withdraw/dialog")
            .insert_header(AUTH)
            .to_request();
        test::call_service(&app, req).await;
        assert_eq!(state.sessions.count().await, 1);

        let req = test::TestRequest::delete()
            .uri("/vendors/session")
            .insert_header(AUTH)
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["closed"], true);
        assert_eq!(state.sessions.count().await, 0);
    }
}
