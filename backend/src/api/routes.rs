//! # API Route Configuration
//!
//! This module sets up all the HTTP routes for the API.

use actix_web::{error, web, HttpResponse};

use crate::models::ApiResponse;

use super::handlers;

/// Configure all API routes.
///
/// This function is called from main.rs to set up
/// all the endpoint routes.
///
/// ## Route Structure
///
/// ```text
/// /
/// ├── /health                  GET - Health check
/// └── /vendors
///     ├── /earnings            GET - Earnings view
///     ├── /withdraw            POST - Submit withdrawal
///     ├── /withdraw/dialog     GET, POST, DELETE - Dialog state
///     ├── /withdraw/validate   POST - Validate amount
///     └── /session             DELETE - Close session
/// ```
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Malformed query strings and bodies use the standard envelope
        .app_data(web::QueryConfig::default().error_handler(|err, _req| {
            let response = HttpResponse::BadRequest()
                .json(ApiResponse::<()>::error("INVALID_QUERY", &err.to_string()));
            error::InternalError::from_response(err, response).into()
        }))
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            let response = HttpResponse::BadRequest()
                .json(ApiResponse::<()>::error("INVALID_AMOUNT", &err.to_string()));
            error::InternalError::from_response(err, response).into()
        }))

        // Root endpoint - API information
        .route("/", web::get().to(handlers::api_info))

        // Health check endpoint
        .route("/health", web::get().to(handlers::health_check))

        // Vendor endpoints
        .service(
            web::scope("/vendors")
                // Earnings list with summary
                .route("/earnings", web::get().to(handlers::get_earnings))

                // Withdrawal dialog
                .route("/withdraw/dialog", web::get().to(handlers::get_dialog))
                .route("/withdraw/dialog", web::post().to(handlers::open_dialog))
                .route("/withdraw/dialog", web::delete().to(handlers::dismiss_dialog))

                // Amount validation (no marketplace call)
                .route("/withdraw/validate", web::post().to(handlers::validate_amount))

                // Submit withdrawal
                .route("/withdraw", web::post().to(handlers::withdraw))

                // Leave the dashboard
                .route("/session", web::delete().to(handlers::close_session)),
        );
}
