// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::checkout::CheckoutRegistry;
use crate::config::{CheckoutConfig, OfferCopy};
use crate::gateway::PaymentGateway;
use crate::poller::PaymentPoller;
use crate::session::SessionState;
use crate::submission::SubmissionFlow;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn PaymentGateway>,
    pub registry: Arc<CheckoutRegistry>,
    pub offer: Arc<OfferCopy>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: &CheckoutConfig) -> Self {
        let poller = PaymentPoller::new(Arc::clone(&gateway), config.poller.clone());
        let flow = SubmissionFlow::new(Arc::clone(&gateway), poller, config.offer.price);
        Self {
            registry: Arc::new(CheckoutRegistry::new(flow, config.recent_capacity)),
            offer: Arc::new(config.offer.clone()),
            gateway,
        }
    }

    /// Fresh, unresolved session state for one request.
    pub fn session(&self) -> SessionState {
        SessionState::new(Arc::clone(&self.gateway))
    }
}
