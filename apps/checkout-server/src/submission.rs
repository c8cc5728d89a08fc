// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Registration submission: validate the form, send the STK Push and hand
//! the checkout request id to a poller.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::gateway::{GatewayError, PaymentGateway, StkPushRequest};
use crate::models::{PaymentRequest, RegistrationForm};
use crate::phone::{is_valid_msisdn, normalize_phone};
use crate::poller::{PaymentPoller, PollHandle};

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// A required field is missing or malformed. Nothing was sent.
    #[error("{0}")]
    Validation(String),

    /// A payment prompt for this phone is still being confirmed.
    #[error("a payment is already pending for {0}")]
    AlreadyPending(String),

    #[error("failed to initiate STK Push: {0}")]
    Initiate(#[source] GatewayError),

    /// The backend answered without a checkout request id.
    #[error("STK Push response did not include a CheckoutRequestID")]
    MissingCheckoutId,

    #[error("service is shutting down")]
    ShuttingDown,
}

/// A validated form, phone already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub order_id: Option<String>,
}

/// Turns a registration form into a running poller.
#[derive(Clone)]
pub struct SubmissionFlow {
    gateway: Arc<dyn PaymentGateway>,
    poller: PaymentPoller,
    amount: Decimal,
}

impl SubmissionFlow {
    pub fn new(gateway: Arc<dyn PaymentGateway>, poller: PaymentPoller, amount: Decimal) -> Self {
        Self {
            gateway,
            poller,
            amount,
        }
    }

    pub fn poller(&self) -> &PaymentPoller {
        &self.poller
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Check required fields and normalize the phone number.
    pub fn prepare(&self, form: &RegistrationForm) -> Result<PreparedSubmission, SubmissionError> {
        let name = required(&form.name, "name")?;
        let email = required(&form.email, "email")?;
        let raw_phone = required(&form.phone, "phone")?;

        if !email.contains('@') {
            return Err(SubmissionError::Validation(
                "email must be a valid email address".to_string(),
            ));
        }

        let phone = normalize_phone(&raw_phone);
        if phone.is_empty() {
            return Err(SubmissionError::Validation(
                "phone must contain digits".to_string(),
            ));
        }
        if !is_valid_msisdn(&phone) {
            // The backend has the final say on what it accepts.
            warn!(phone = %phone, "Phone number did not normalize to a Kenyan MSISDN");
        }

        Ok(PreparedSubmission {
            name,
            email,
            phone,
            order_id: form
                .order_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        })
    }

    /// Send the STK Push. No poller is started here.
    pub async fn initiate(
        &self,
        submission: &PreparedSubmission,
    ) -> Result<PaymentRequest, SubmissionError> {
        let request = StkPushRequest {
            amount: self.amount.to_string(),
            phone: submission.phone.clone(),
            order_id: submission.order_id.clone(),
        };

        let response = self
            .gateway
            .initiate_stk_push(&request)
            .await
            .map_err(|e| {
                warn!(phone = %submission.phone, error = %e, "STK Push initiation failed");
                SubmissionError::Initiate(e)
            })?;

        let Some(checkout_request_id) = response.checkout_request_id() else {
            warn!(
                phone = %submission.phone,
                customer_message = ?response.customer_message,
                "STK Push response had no CheckoutRequestID"
            );
            return Err(SubmissionError::MissingCheckoutId);
        };

        info!(
            checkout_request_id,
            merchant_request_id = ?response.merchant_request_id,
            phone = %submission.phone,
            "STK Push accepted"
        );

        Ok(PaymentRequest::new(
            checkout_request_id,
            self.amount,
            submission.phone.clone(),
            submission.order_id.clone(),
        ))
    }

    /// Validate, initiate and start polling.
    pub async fn submit(&self, form: &RegistrationForm) -> Result<PollHandle, SubmissionError> {
        let submission = self.prepare(form)?;
        let request = self.initiate(&submission).await?;
        Ok(self.poller.start(request))
    }
}

fn required(value: &str, field: &str) -> Result<String, SubmissionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SubmissionError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}
