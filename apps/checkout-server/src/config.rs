// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup. Every variable is
//! optional; blank values count as unset.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `MPESA_API_BASE` | Payments backend (`stkPush`, `payment-status`, `confirmPayment`) | `https://sandbox.koyeb.app/api/v1/mpesa` |
//! | `ACCOUNT_API_BASE` | Account backend (`user/getuser`) | `https://sandbox.koyeb.app/api/v1` |
//! | `HTTP_TIMEOUT_SECS` | Timeout for outbound HTTP requests | `15` |
//! | `POLL_INTERVAL_SECS` | Delay between confirmation polls | `5` |
//! | `POLL_MAX_ATTEMPTS` | Polls before giving up | `12` |
//! | `POLL_FALLBACK_EVERY` | Query the provider directly every N polls (`0` disables) | `4` |
//! | `POLL_TICK_TIMEOUT_SECS` | Timeout for a single poll's backend call | `10` |
//! | `RECENT_CHECKOUTS_CAPACITY` | Finished checkouts kept for status reads | `256` |
//! | `OFFER_TITLE` | Offer headline | `SmartBallot Checklist` |
//! | `OFFER_PRICE` | Price in KES sent as the STK Push amount | `99` |
//! | `OFFER_CTA` | Call to action label | `Unlock My SmartBallot` |
//! | `OFFER_PROCESSING_MESSAGE` | Shown while the STK Push is being sent | see [`OfferCopy::default`] |
//! | `OFFER_AWAITING_MESSAGE` | Shown while the payment is pending | see [`OfferCopy::default`] |
//! | `OFFER_CONFIRMED_MESSAGE` | Payment confirmed by the status record | see [`OfferCopy::default`] |
//! | `OFFER_CONFIRMED_VIA_QUERY_MESSAGE` | Payment confirmed by the provider query | see [`OfferCopy::default`] |
//! | `OFFER_FAILED_MESSAGE` | Payment failed or was cancelled | see [`OfferCopy::default`] |
//! | `OFFER_TIMED_OUT_MESSAGE` | No outcome within the poll budget | see [`OfferCopy::default`] |
//! | `OFFER_INITIATE_ERROR_MESSAGE` | STK Push request failed | see [`OfferCopy::default`] |
//! | `OFFER_MISSING_ID_MESSAGE` | STK Push returned no checkout id | see [`OfferCopy::default`] |
//! | `OFFER_ALREADY_PENDING_MESSAGE` | A payment is already pending for the phone | see [`OfferCopy::default`] |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use url::Url;

use crate::poller::PollerConfig;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const MPESA_API_BASE_ENV: &str = "MPESA_API_BASE";
pub const ACCOUNT_API_BASE_ENV: &str = "ACCOUNT_API_BASE";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MPESA_API_BASE: &str = "https://sandbox.koyeb.app/api/v1/mpesa";
const DEFAULT_ACCOUNT_API_BASE: &str = "https://sandbox.koyeb.app/api/v1";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RECENT_CAPACITY: usize = 256;

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

impl ConfigError {
    fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    /// Read `LOG_FORMAT`; anything other than `json` means pretty.
    pub fn from_env() -> Self {
        match env_optional(LOG_FORMAT_ENV) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Copy and price for the landing offer.
///
/// Every message the visitor sees comes from here, so one deployment can run
/// any of the landing variants by changing the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferCopy {
    pub title: String,
    pub price: Decimal,
    pub call_to_action: String,
    pub processing_message: String,
    pub awaiting_payment_message: String,
    pub confirmed_message: String,
    pub confirmed_via_query_message: String,
    pub failed_message: String,
    pub timed_out_message: String,
    pub initiate_error_message: String,
    pub missing_checkout_id_message: String,
    pub already_pending_message: String,
}

impl Default for OfferCopy {
    fn default() -> Self {
        Self {
            title: "SmartBallot Checklist".to_string(),
            price: Decimal::from(99),
            call_to_action: "Unlock My SmartBallot".to_string(),
            processing_message: "Processing your request. You'll receive an M-PESA prompt on your phone. Enter your PIN to complete payment.".to_string(),
            awaiting_payment_message: "STK Push sent. Awaiting confirmation...".to_string(),
            confirmed_message: "You're in! Your payment has been received.".to_string(),
            confirmed_via_query_message: "You're in! Your payment has been confirmed (via query).".to_string(),
            failed_message: "Payment failed or was cancelled. Please try again.".to_string(),
            timed_out_message: "No confirmation received. Please try again later.".to_string(),
            initiate_error_message: "Error initiating STK Push.".to_string(),
            missing_checkout_id_message: "STK Push sent, but no CheckoutRequestID returned. Please try again.".to_string(),
            already_pending_message: "A payment prompt is already pending for this phone. Complete it or wait for it to expire.".to_string(),
        }
    }
}

impl OfferCopy {
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_optional)
    }

    /// Defaults overridden by whatever `lookup` returns for each `OFFER_*`
    /// variable.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut copy = OfferCopy::default();
        let texts: [(&str, &mut String); 11] = [
            ("OFFER_TITLE", &mut copy.title),
            ("OFFER_CTA", &mut copy.call_to_action),
            ("OFFER_PROCESSING_MESSAGE", &mut copy.processing_message),
            ("OFFER_AWAITING_MESSAGE", &mut copy.awaiting_payment_message),
            ("OFFER_CONFIRMED_MESSAGE", &mut copy.confirmed_message),
            (
                "OFFER_CONFIRMED_VIA_QUERY_MESSAGE",
                &mut copy.confirmed_via_query_message,
            ),
            ("OFFER_FAILED_MESSAGE", &mut copy.failed_message),
            ("OFFER_TIMED_OUT_MESSAGE", &mut copy.timed_out_message),
            ("OFFER_INITIATE_ERROR_MESSAGE", &mut copy.initiate_error_message),
            ("OFFER_MISSING_ID_MESSAGE", &mut copy.missing_checkout_id_message),
            ("OFFER_ALREADY_PENDING_MESSAGE", &mut copy.already_pending_message),
        ];
        for (name, field) in texts {
            if let Some(text) = lookup(name) {
                *field = text;
            }
        }

        if let Some(price) = lookup("OFFER_PRICE") {
            copy.price = parse_price(&price)?;
        }
        Ok(copy)
    }
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub host: String,
    pub port: u16,
    pub mpesa_api_base: String,
    pub account_api_base: String,
    pub http_timeout: Duration,
    pub poller: PollerConfig,
    pub recent_capacity: usize,
    pub offer: OfferCopy,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            mpesa_api_base: DEFAULT_MPESA_API_BASE.to_string(),
            account_api_base: DEFAULT_ACCOUNT_API_BASE.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            poller: PollerConfig::default(),
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            offer: OfferCopy::default(),
        }
    }
}

impl CheckoutConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = PollerConfig::default();
        let poller = validate_poller(PollerConfig {
            interval: env_secs("POLL_INTERVAL_SECS", defaults.interval)?,
            max_attempts: env_parse("POLL_MAX_ATTEMPTS", defaults.max_attempts)?,
            fallback_every: env_parse("POLL_FALLBACK_EVERY", defaults.fallback_every)?,
            tick_timeout: env_secs("POLL_TICK_TIMEOUT_SECS", defaults.tick_timeout)?,
        })?;

        Ok(Self {
            host: env_or_default(HOST_ENV, DEFAULT_HOST),
            port: env_parse(PORT_ENV, DEFAULT_PORT)?,
            mpesa_api_base: parse_base_url(
                MPESA_API_BASE_ENV,
                &env_or_default(MPESA_API_BASE_ENV, DEFAULT_MPESA_API_BASE),
            )?,
            account_api_base: parse_base_url(
                ACCOUNT_API_BASE_ENV,
                &env_or_default(ACCOUNT_API_BASE_ENV, DEFAULT_ACCOUNT_API_BASE),
            )?,
            http_timeout: env_secs(
                "HTTP_TIMEOUT_SECS",
                Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            )?,
            poller,
            recent_capacity: env_parse("RECENT_CHECKOUTS_CAPACITY", DEFAULT_RECENT_CAPACITY)?,
            offer: OfferCopy::from_env()?,
        })
    }

    /// `host:port` string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Validate a base URL and strip trailing slashes so paths can be appended.
pub fn parse_base_url(name: &str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|e| ConfigError::invalid(name, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(ConfigError::invalid(
            name,
            format!("unsupported scheme '{other}'"),
        )),
    }
}

fn validate_poller(poller: PollerConfig) -> Result<PollerConfig, ConfigError> {
    if poller.interval.is_zero() {
        return Err(ConfigError::invalid("POLL_INTERVAL_SECS", "must be at least 1"));
    }
    if poller.max_attempts == 0 {
        return Err(ConfigError::invalid("POLL_MAX_ATTEMPTS", "must be at least 1"));
    }
    if poller.tick_timeout.is_zero() {
        return Err(ConfigError::invalid(
            "POLL_TICK_TIMEOUT_SECS",
            "must be at least 1",
        ));
    }
    Ok(poller)
}

fn parse_price(raw: &str) -> Result<Decimal, ConfigError> {
    let price = Decimal::from_str(raw.trim())
        .map_err(|e| ConfigError::invalid("OFFER_PRICE", e.to_string()))?;
    if price <= Decimal::ZERO {
        return Err(ConfigError::invalid("OFFER_PRICE", "must be positive"));
    }
    Ok(price.normalize())
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

fn env_parse<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_optional(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(name, e.to_string())),
        None => Ok(default),
    }
}

fn env_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_parse(name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slashes_are_stripped() {
        assert_eq!(
            parse_base_url("X", "https://sandbox.koyeb.app/api/v1/mpesa//").unwrap(),
            "https://sandbox.koyeb.app/api/v1/mpesa"
        );
    }

    #[test]
    fn base_url_rejects_garbage_and_other_schemes() {
        assert!(parse_base_url("X", "not a url").is_err());
        let err = parse_base_url("MPESA_API_BASE", "ftp://example.com").unwrap_err();
        assert!(err.to_string().contains("MPESA_API_BASE"));
    }

    #[test]
    fn price_must_be_positive_decimal() {
        assert_eq!(parse_price("249").unwrap(), Decimal::from(249));
        assert_eq!(parse_price(" 10.00 ").unwrap().to_string(), "10");
        assert!(parse_price("0").is_err());
        assert!(parse_price("-5").is_err());
        assert!(parse_price("ten").is_err());
    }

    #[test]
    fn zero_poll_timings_are_rejected() {
        let valid = PollerConfig::default();
        assert_eq!(validate_poller(valid.clone()), Ok(valid.clone()));

        let err = validate_poller(PollerConfig {
            interval: Duration::ZERO,
            ..valid.clone()
        })
        .unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL_SECS"));

        let err = validate_poller(PollerConfig {
            tick_timeout: Duration::ZERO,
            ..valid.clone()
        })
        .unwrap_err();
        assert!(err.to_string().contains("POLL_TICK_TIMEOUT_SECS"));

        let err = validate_poller(PollerConfig {
            max_attempts: 0,
            ..valid
        })
        .unwrap_err();
        assert!(err.to_string().contains("POLL_MAX_ATTEMPTS"));
    }

    #[test]
    fn offer_messages_are_read_from_environment() {
        let registered = "You have successfully registered. Our team will contact you via email shortly";
        let copy = OfferCopy::from_lookup(|name| match name {
            "OFFER_CONFIRMED_MESSAGE" => Some(registered.to_string()),
            "OFFER_FAILED_MESSAGE" => Some("Payment failed.".to_string()),
            "OFFER_PRICE" => Some("249".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(copy.confirmed_message, registered);
        assert_eq!(copy.failed_message, "Payment failed.");
        assert_eq!(copy.price, Decimal::from(249));
        assert_eq!(copy.timed_out_message, OfferCopy::default().timed_out_message);
    }

    #[test]
    fn offer_price_from_environment_is_validated() {
        let err = OfferCopy::from_lookup(|name| (name == "OFFER_PRICE").then(|| "free".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("OFFER_PRICE"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = CheckoutConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.poller.max_attempts, 12);
        assert_eq!(config.poller.fallback_every, 4);
        assert_eq!(config.poller.interval, Duration::from_secs(5));
        assert_eq!(config.offer.price, Decimal::from(99));
    }
}
