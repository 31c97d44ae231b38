//! # Configuration Module
//!
//! This module handles loading and validating configuration from
//! environment variables. All settings are centralized here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = AppConfig::from_env()?;
//! println!("Marketplace API: {}", config.marketplace_api_url);
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Description | Example |
//! |----------|-------------|---------|
//! | `MARKETPLACE_API_URL` | Base URL of the marketplace REST API | `https://api.example.com/api` |
//! | `SERVER_HOST` | HTTP server host | `127.0.0.1` |
//! | `SERVER_PORT` | HTTP server port | `8080` |
//! | `CORS_ALLOWED_ORIGIN` | Origin of the vendor dashboard | `http://localhost:5173` |
//! | `CURRENCY_CODE` | ISO code used for formatting | `GBP` |
//! | `EARNINGS_REFRESH_INTERVAL` | Polling interval in seconds | `120` |
//! | `WITHDRAWAL_TIMEOUT_SECS` | Client-side timeout for a withdrawal | `30` |
//! | `UPSTREAM_TIMEOUT_SECS` | Timeout for read calls | `15` |
//! | `ONBOARDING_REDIRECT_DELAY_MS` | Delay before the onboarding redirect | `2000` |
//! | `ONBOARDING_REDIRECT_PATH` | Where the dashboard sends the vendor | `/vendor/profile` |
//! | `DEFAULT_PAGE_SIZE` | Earnings page size when none is given | `10` |
//! | `SESSION_IDLE_TIMEOUT_SECS` | Idle time before a session is dropped | `1800` |

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::services::currency::CurrencyCode;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable is missing
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// Failed to parse a value
    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

/// Application configuration loaded from environment variables.
///
/// Values are loaded once at startup and cloned into every service
/// that needs them.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // ==========================================
    // MARKETPLACE API SETTINGS
    // ==========================================

    /// Base URL of the external marketplace API, without trailing slash.
    ///
    /// Example: `https://api.example.com/api`
    pub marketplace_api_url: String,

    /// Timeout applied to read calls (earnings list, vendor profile).
    pub upstream_timeout: Duration,

    /// Client-side timeout for `POST /vendors/withdraw`.
    ///
    /// The marketplace gives no guarantee here, so a timed out withdrawal
    /// is reported separately and the vendor is told to check the status
    /// before retrying.
    pub withdrawal_timeout: Duration,

    // ==========================================
    // SERVER SETTINGS
    // ==========================================

    /// HTTP server host address.
    pub server_host: String,

    /// HTTP server port number.
    ///
    /// Default: 8080
    pub server_port: u16,

    /// Origin allowed to call this service from a browser.
    pub cors_allowed_origin: String,

    // ==========================================
    // VIEW SETTINGS
    // ==========================================

    /// Currency all amounts are rendered in.
    pub currency: CurrencyCode,

    /// Page size used when the dashboard does not send `limit`.
    pub default_page_size: u32,

    /// How often active sessions get their earnings refreshed.
    pub earnings_refresh_interval: Duration,

    /// Delay between an onboarding failure and the redirect event, so the
    /// message stays readable.
    pub onboarding_redirect_delay: Duration,

    /// Dashboard path the vendor is sent to for payment onboarding.
    pub onboarding_redirect_path: String,

    /// Sessions unused for this long are closed by the earnings monitor.
    pub session_idle_timeout: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Use `dotenvy::dotenv()` before calling this to load from `.env` file.
    ///
    /// ## Returns
    ///
    /// - `Ok(AppConfig)` - Configuration loaded successfully
    /// - `Err(ConfigError)` - A required variable is missing or invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        let marketplace_api_url = get_env("MARKETPLACE_API_URL")?
            .trim_end_matches('/')
            .to_string();
        if !marketplace_api_url.starts_with("http://") && !marketplace_api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "MARKETPLACE_API_URL".to_string(),
                "must start with http:// or https://".to_string(),
            ));
        }

        let currency_raw = get_env_or_default("CURRENCY_CODE", "GBP");
        let currency = CurrencyCode::parse(&currency_raw)
            .map_err(|e| ConfigError::InvalidValue("CURRENCY_CODE".to_string(), e))?;

        let default_page_size: u32 = parse_env("DEFAULT_PAGE_SIZE", "10")?;
        if default_page_size == 0 || default_page_size > 100 {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_PAGE_SIZE".to_string(),
                "must be between 1 and 100".to_string(),
            ));
        }

        Ok(Self {
            // Marketplace API
            marketplace_api_url,
            upstream_timeout: Duration::from_secs(parse_env("UPSTREAM_TIMEOUT_SECS", "15")?),
            withdrawal_timeout: Duration::from_secs(parse_env("WITHDRAWAL_TIMEOUT_SECS", "30")?),

            // Server
            server_host: get_env_or_default("SERVER_HOST", "127.0.0.1"),
            server_port: parse_env("SERVER_PORT", "8080")?,
            cors_allowed_origin: get_env_or_default("CORS_ALLOWED_ORIGIN", "http://localhost:5173"),

            // View
            currency,
            default_page_size,
            earnings_refresh_interval: Duration::from_secs(
                get_env_or_default("EARNINGS_REFRESH_INTERVAL", "120")
                    .parse()
                    .unwrap_or(120),
            ),
            onboarding_redirect_delay: Duration::from_millis(
                get_env_or_default("ONBOARDING_REDIRECT_DELAY_MS", "2000")
                    .parse()
                    .unwrap_or(2000),
            ),
            onboarding_redirect_path: get_env_or_default(
                "ONBOARDING_REDIRECT_PATH",
                "/vendor/profile",
            ),
            session_idle_timeout: Duration::from_secs(parse_env("SESSION_IDLE_TIMEOUT_SECS", "1800")?),
        })
    }

    /// Configuration used by unit tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            marketplace_api_url: "http://marketplace.test/api".to_string(),
            upstream_timeout: Duration::from_secs(15),
            withdrawal_timeout: Duration::from_secs(30),
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            cors_allowed_origin: "http://localhost:5173".to_string(),
            currency: CurrencyCode::Gbp,
            default_page_size: 10,
            earnings_refresh_interval: Duration::from_secs(120),
            onboarding_redirect_delay: Duration::from_millis(2000),
            onboarding_redirect_path: "/vendor/profile".to_string(),
            session_idle_timeout: Duration::from_secs(1800),
        }
    }
}

/// Get a required environment variable.
///
/// Returns an error if the variable is not set.
fn get_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
///
/// Returns the default if the variable is not set.
fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an environment variable (or its default) and parse it.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse()
        .map_err(|e: T::Err| ConfigError::ParseError(key.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_or_default() {
        // Should return default when not set
        let value = get_env_or_default("NONEXISTENT_VAR_12345", "default_value");
        assert_eq!(value, "default_value");
    }

    #[test]
    fn test_missing_required_var() {
        let err = get_env("NONEXISTENT_MARKETPLACE_VAR_98765").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "NONEXISTENT_MARKETPLACE_VAR_98765"));
    }

    #[test]
    fn test_parse_env_uses_default_and_reports_bad_values() {
        let port: u16 = parse_env("NONEXISTENT_PORT_VAR_4242", "8080").unwrap();
        assert_eq!(port, 8080);

        let err = parse_env::<u16>("NONEXISTENT_PORT_VAR_4243", "not-a-port").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
    }
}
