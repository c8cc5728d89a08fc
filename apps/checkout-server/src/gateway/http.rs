// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for the M-Pesa payments backend and the account API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::{
    map_payment_status, GatewayError, PaymentGateway, PaymentStatus, ProviderQueryResult,
    StkPushRequest, StkPushResponse,
};
use crate::models::UserProfile;

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    #[serde(default)]
    user: Option<UserProfile>,
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    mpesa_api_base: Url,
    account_api_base: Url,
    http: Client,
}

fn parse_base(raw: &str) -> Result<Url, GatewayError> {
    Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| GatewayError::Request(format!("invalid base URL {raw}: {e}")))
}

/// Append path segments to `base`. Each segment is percent-encoded, so ids
/// containing `/`, `?` or `#` stay inside their segment.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, GatewayError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| GatewayError::Request(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl HttpGateway {
    pub fn new(
        mpesa_api_base: impl Into<String>,
        account_api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            mpesa_api_base: parse_base(&mpesa_api_base.into())?,
            account_api_base: parse_base(&account_api_base.into())?,
            http,
        })
    }

    fn mpesa_url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        endpoint(&self.mpesa_api_base, segments)
    }

    async fn read_json(response: reqwest::Response, what: &str) -> Result<Value, GatewayError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("{what} invalid JSON: {e}")))
    }

    async fn get_json(&self, url: Url) -> Result<Value, GatewayError> {
        let response = self
            .http
            .get(url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("GET {url} failed: {e}")))?;

        Self::read_json(response, &format!("GET {url}")).await
    }

    async fn post_json(&self, url: Url, payload: Option<&Value>) -> Result<Value, GatewayError> {
        let mut request = self
            .http
            .post(url.clone())
            .header(header::ACCEPT, "application/json");
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("POST {url} failed: {e}")))?;

        Self::read_json(response, &format!("POST {url}")).await
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn initiate_stk_push(
        &self,
        request: &StkPushRequest,
    ) -> Result<StkPushResponse, GatewayError> {
        let payload = serde_json::to_value(request)
            .map_err(|e| GatewayError::InvalidResponse(format!("serialize body failed: {e}")))?;
        let url = self.mpesa_url(&["stkPush"])?;

        info!(phone = %request.phone, amount = %request.amount, "Sending STK Push");
        let response = self.post_json(url, Some(&payload)).await?;
        debug!(response = %response, "STK Push response");

        serde_json::from_value(response)
            .map_err(|e| GatewayError::InvalidResponse(format!("stkPush response: {e}")))
    }

    async fn payment_status(
        &self,
        checkout_request_id: &str,
    ) -> Result<PaymentStatus, GatewayError> {
        let url = self.mpesa_url(&["payment-status", checkout_request_id])?;
        let response = self.get_json(url).await?;
        debug!(checkout_request_id, response = %response, "payment-status response");

        // A record without a status has not been written by the callback yet.
        Ok(response
            .get("status")
            .and_then(Value::as_str)
            .map(map_payment_status)
            .unwrap_or(PaymentStatus::Pending))
    }

    async fn query_provider(
        &self,
        checkout_request_id: &str,
    ) -> Result<ProviderQueryResult, GatewayError> {
        let url = self.mpesa_url(&["confirmPayment", checkout_request_id])?;
        let response = self.post_json(url, None).await?;
        debug!(checkout_request_id, response = %response, "confirmPayment response");

        Ok(ProviderQueryResult::from_response(&response))
    }

    async fn current_user(
        &self,
        cookie: Option<&str>,
    ) -> Result<Option<UserProfile>, GatewayError> {
        let url = endpoint(&self.account_api_base, &["user", "getuser"])?;
        let mut request = self
            .http
            .get(url.clone())
            .header(header::ACCEPT, "application/json");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("GET {url} failed: {e}")))?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(None);
        }

        let body = Self::read_json(response, &format!("GET {url}")).await?;
        let envelope: UserEnvelope = serde_json::from_value(body)
            .map_err(|e| GatewayError::InvalidResponse(format!("getuser response: {e}")))?;
        Ok(envelope.user)
    }
}
