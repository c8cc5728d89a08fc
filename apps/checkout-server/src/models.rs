// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Checkout Data Models
//!
//! Domain types shared by the submission flow, the poller and the HTTP API.
//!
//! ## Model Categories
//!
//! - **Payment**: [`PaymentRequest`] created once the STK Push is accepted
//! - **Polling**: [`PollState`] and [`PollStatus`], the poller's lifecycle
//! - **Registration**: [`RegistrationForm`] submitted by the landing page
//! - **API**: request/response bodies served under `/v1`

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::OfferCopy;

// =============================================================================
// Payment
// =============================================================================

/// A payment the backend accepted and pushed to the customer's phone.
///
/// Built from a successful `stkPush` response and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    request_id: String,
    amount: Decimal,
    phone_number: String,
    order_id: Option<String>,
}

impl PaymentRequest {
    pub fn new(
        request_id: impl Into<String>,
        amount: Decimal,
        phone_number: impl Into<String>,
        order_id: Option<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            amount,
            phone_number: phone_number.into(),
            order_id,
        }
    }

    /// Checkout request id returned by the payments backend.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Normalized MSISDN the prompt was sent to.
    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }
}

// =============================================================================
// Polling
// =============================================================================

/// Lifecycle status of a payment confirmation poll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Pending,
    Confirmed,
    Failed,
    TimedOut,
}

impl PollStatus {
    /// Terminal states end the poll; no tick runs after one is reached.
    pub fn is_terminal(self) -> bool {
        !matches!(self, PollStatus::Pending)
    }
}

/// Which path confirmed the payment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationSource {
    /// The backend's own `payment-status` record.
    StatusEndpoint,
    /// A direct query to the provider via `confirmPayment`.
    ProviderQuery,
}

/// Observable state of a single poller.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct PollState {
    pub request_id: String,
    /// Number of ticks run so far.
    pub attempt_count: u32,
    pub status: PollStatus,
    /// Transport error swallowed by the most recent poll, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_via: Option<ConfirmationSource>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PollState {
    pub fn new(request_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            request_id: request_id.into(),
            attempt_count: 0,
            status: PollStatus::Pending,
            last_error: None,
            confirmed_via: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// User-facing text for the current state, taken from the offer copy.
    pub fn message<'a>(&self, copy: &'a OfferCopy) -> &'a str {
        match (self.status, self.confirmed_via) {
            (PollStatus::Pending, _) => &copy.awaiting_payment_message,
            (PollStatus::Confirmed, Some(ConfirmationSource::ProviderQuery)) => {
                &copy.confirmed_via_query_message
            }
            (PollStatus::Confirmed, _) => &copy.confirmed_message,
            (PollStatus::Failed, _) => &copy.failed_message,
            (PollStatus::TimedOut, _) => &copy.timed_out_message,
        }
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Contact details submitted from the landing page form.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RegistrationForm {
    /// Full name.
    #[serde(default)]
    pub name: String,
    /// Contact email.
    #[serde(default)]
    pub email: String,
    /// Phone number as typed (07..., 011..., 254... or +254...).
    #[serde(default)]
    pub phone: String,
    /// Occupation (asked by some landing variants).
    #[serde(default)]
    pub occupation: Option<String>,
    /// Optional order reference passed through to the payments backend.
    #[serde(default)]
    pub order_id: Option<String>,
}

// =============================================================================
// API Responses
// =============================================================================

/// Checkout status returned after submission and on every status read.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutResponse {
    /// Checkout request id to poll with.
    pub checkout_request_id: String,
    /// Poller state.
    pub state: PollState,
    /// Text to show the visitor.
    pub message: String,
}

impl CheckoutResponse {
    pub fn from_state(state: PollState, copy: &OfferCopy) -> Self {
        let message = state.message(copy).to_string();
        Self {
            checkout_request_id: state.request_id.clone(),
            state,
            message,
        }
    }
}

/// Offer details rendered by the landing page.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OfferResponse {
    pub title: String,
    /// Price charged through M-Pesa, in KES.
    #[schema(value_type = String)]
    pub price: Decimal,
    pub call_to_action: String,
    /// Message shown while the STK Push is being sent.
    pub processing_message: String,
}

impl From<&OfferCopy> for OfferResponse {
    fn from(copy: &OfferCopy) -> Self {
        Self {
            title: copy.title.clone(),
            price: copy.price,
            call_to_action: copy.call_to_action.clone(),
            processing_message: copy.processing_message.clone(),
        }
    }
}

/// Profile returned by the account API's session check.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct UserProfile {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Which landing view applies to the visitor.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum LandingResponse {
    /// Anonymous visitor: show the registration form.
    Register { offer: OfferResponse },
    /// Signed-in visitor: show the welcome view.
    Welcome { user: UserProfile },
}
