// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Visitor session state.
//!
//! The landing page shows the registration form to anonymous visitors and a
//! welcome view to signed-in ones. The session is resolved explicitly through
//! the account API, once per request, and handed to whoever needs it.

use std::sync::Arc;

use tracing::debug;

use crate::gateway::PaymentGateway;
use crate::models::UserProfile;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated(UserProfile),
}

pub struct SessionState {
    gateway: Arc<dyn PaymentGateway>,
    session: Session,
}

impl SessionState {
    /// A new, anonymous session. Call [`SessionState::load`] to resolve it.
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            gateway,
            session: Session::Anonymous,
        }
    }

    /// Resolve the session from the visitor's cookies.
    ///
    /// Any failure leaves the visitor anonymous.
    pub async fn load(&mut self, cookie: Option<&str>) -> &Session {
        self.session = match self.gateway.current_user(cookie).await {
            Ok(Some(user)) => Session::Authenticated(user),
            Ok(None) => Session::Anonymous,
            Err(e) => {
                debug!(error = %e, "Session check failed; treating visitor as anonymous");
                Session::Anonymous
            }
        };
        &self.session
    }

    pub fn clear(&mut self) {
        self.session = Session::Anonymous;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self.session, Session::Authenticated(_))
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match &self.session {
            Session::Authenticated(user) => Some(user),
            Session::Anonymous => None,
        }
    }
}
