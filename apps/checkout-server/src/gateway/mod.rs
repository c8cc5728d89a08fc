// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payments and account backend integration.
//!
//! The poller and the submission flow only see the [`PaymentGateway`] trait,
//! so tests can script backend responses without a network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::UserProfile;

pub mod http;

pub use http::HttpGateway;

/// Provider result code that means the payment went through.
pub const PROVIDER_SUCCESS_CODE: i64 = 0;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("request to payments backend failed: {0}")]
    Request(String),

    #[error("payments backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("payments backend response was invalid: {0}")]
    InvalidResponse(String),

    #[error("payments backend did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

/// Body of `POST /stkPush`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StkPushRequest {
    /// Amount as a decimal string, e.g. `"99"`.
    pub amount: String,
    /// Normalized MSISDN.
    pub phone: String,
    #[serde(rename = "Order_ID", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

/// Response of `POST /stkPush`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StkPushResponse {
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: Option<String>,
}

impl StkPushResponse {
    /// The checkout request id, if present and non-blank.
    pub fn checkout_request_id(&self) -> Option<&str> {
        self.checkout_request_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Payment status recorded by the payments backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Map the backend's `status` string; unknown values count as pending.
pub fn map_payment_status(raw_status: &str) -> PaymentStatus {
    let status = raw_status.trim().to_ascii_lowercase();
    match status.as_str() {
        "confirmed" => PaymentStatus::Confirmed,
        "failed" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

/// Outcome of querying the provider directly through `confirmPayment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderQueryResult {
    pub result_code: Option<i64>,
    pub result_desc: Option<String>,
}

impl ProviderQueryResult {
    pub fn from_response(response: &Value) -> Self {
        Self {
            result_code: extract_result_code(response),
            result_desc: extract_result_desc(response).map(str::to_string),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_code == Some(PROVIDER_SUCCESS_CODE)
    }
}

const RESULT_CODE_POINTERS: [&str; 4] = [
    "/ResultCode",
    "/resultCode",
    "/Body/stkCallback/ResultCode",
    "/Body/ResultCode",
];

const RESULT_DESC_POINTERS: [&str; 3] = [
    "/ResultDesc",
    "/resultDesc",
    "/Body/stkCallback/ResultDesc",
];

/// Find the provider result code; it may be a number or a numeric string and
/// sits in different places depending on the backend revision.
pub fn extract_result_code(response: &Value) -> Option<i64> {
    RESULT_CODE_POINTERS
        .iter()
        .filter_map(|pointer| response.pointer(pointer))
        .find(|value| !value.is_null())
        .and_then(|value| match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}

fn extract_result_desc(response: &Value) -> Option<&str> {
    RESULT_DESC_POINTERS
        .iter()
        .find_map(|pointer| response.pointer(pointer).and_then(Value::as_str))
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Ask the backend to send an STK Push prompt.
    async fn initiate_stk_push(
        &self,
        request: &StkPushRequest,
    ) -> Result<StkPushResponse, GatewayError>;

    /// Read the backend's recorded status for a checkout request.
    async fn payment_status(&self, checkout_request_id: &str)
        -> Result<PaymentStatus, GatewayError>;

    /// Have the backend query the provider directly for a checkout request.
    async fn query_provider(
        &self,
        checkout_request_id: &str,
    ) -> Result<ProviderQueryResult, GatewayError>;

    /// Resolve the visitor's session; `Ok(None)` when not signed in.
    async fn current_user(&self, cookie: Option<&str>)
        -> Result<Option<UserProfile>, GatewayError>;
}
