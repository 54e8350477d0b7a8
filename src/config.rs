use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub credit_retry: CreditRetryPolicy,
}

/// Bounded retry schedule for point-ledger credits that fail after the
/// status write has already landed.
#[derive(Debug, Clone, Copy)]
pub struct CreditRetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for CreditRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let backoff_ms: u64 = parse_or_default("CREDIT_RETRY_BACKOFF_MS", 50)?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            credit_retry: CreditRetryPolicy {
                attempts: parse_or_default("CREDIT_RETRY_ATTEMPTS", 3)?,
                initial_backoff: Duration::from_millis(backoff_ms),
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
