// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Checkout Registry
//!
//! Owns every running payment poller for the service.
//!
//! - At most one checkout is active per normalized phone number. A second
//!   submission while the first is still pending is rejected, including one
//!   that arrives while the first STK Push request is still in flight.
//! - Finished checkouts move into a bounded LRU so the landing page can read
//!   the final message after the poller is gone.
//! - Cancelled checkouts are forgotten.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::{PollState, RegistrationForm};
use crate::poller::PollHandle;
use crate::submission::{SubmissionError, SubmissionFlow};

struct ActiveCheckout {
    phone: String,
    handle: PollHandle,
}

struct RegistryInner {
    active: HashMap<String, ActiveCheckout>,
    /// Phones with a submission in flight or a pending poller.
    reserved_phones: HashSet<String>,
    recent: LruCache<String, PollState>,
}

impl RegistryInner {
    fn finish(&mut self, state: &PollState) {
        // A cancelled checkout already released its phone, which may have
        // been reserved again since.
        if let Some(active) = self.active.remove(&state.request_id) {
            self.reserved_phones.remove(&active.phone);
        }
        self.recent.put(state.request_id.clone(), state.clone());
    }
}

pub struct CheckoutRegistry {
    flow: SubmissionFlow,
    shutdown: CancellationToken,
    inner: Arc<Mutex<RegistryInner>>,
}

impl CheckoutRegistry {
    pub fn new(flow: SubmissionFlow, recent_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(recent_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            flow,
            shutdown: CancellationToken::new(),
            inner: Arc::new(Mutex::new(RegistryInner {
                active: HashMap::new(),
                reserved_phones: HashSet::new(),
                recent: LruCache::new(capacity),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn flow(&self) -> &SubmissionFlow {
        &self.flow
    }

    /// Submit a registration and start confirming its payment.
    ///
    /// Returns the poller state right after the poller was started.
    pub async fn submit(&self, form: &RegistrationForm) -> Result<PollState, SubmissionError> {
        let submission = self.flow.prepare(form)?;
        let phone = submission.phone.clone();

        if self.shutdown.is_cancelled() {
            return Err(SubmissionError::ShuttingDown);
        }
        if !self.lock().reserved_phones.insert(phone.clone()) {
            info!(phone = %phone, "Rejecting submission: payment already pending");
            return Err(SubmissionError::AlreadyPending(phone));
        }

        let request = match self.flow.initiate(&submission).await {
            Ok(request) => request,
            Err(e) => {
                self.lock().reserved_phones.remove(&phone);
                return Err(e);
            }
        };

        let inner = Arc::clone(&self.inner);
        let handle = self.flow.poller().start_with(
            request,
            self.shutdown.child_token(),
            Some(Box::new(move |state: &PollState| {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .finish(state);
            })),
        );

        let mut inner = self.lock();
        // `shutdown` cancels the token before taking this lock, so a shutdown
        // that began during `initiate` is always seen here.
        if self.shutdown.is_cancelled() {
            inner.reserved_phones.remove(&phone);
            info!(
                request_id = %handle.request_id(),
                "Shutdown began during STK Push; checkout not tracked"
            );
            return Err(SubmissionError::ShuttingDown);
        }

        let state = handle.snapshot();
        // A poller that settled on its first poll never becomes active; its
        // callback has recorded the outcome or is waiting on this lock.
        if state.status.is_terminal() {
            inner.reserved_phones.remove(&phone);
            return Ok(state);
        }

        let request_id = handle.request_id().to_string();
        let checkout = ActiveCheckout {
            phone: phone.clone(),
            handle,
        };
        if let Some(displaced) = inner.active.insert(request_id, checkout) {
            warn!(
                request_id = %state.request_id,
                "Backend reused a checkout request id; replacing the older checkout"
            );
            displaced.handle.cancel();
            if displaced.phone != phone {
                inner.reserved_phones.remove(&displaced.phone);
            }
        }
        Ok(state)
    }

    /// Current state of an active or recently finished checkout.
    pub fn view(&self, request_id: &str) -> Option<PollState> {
        let mut inner = self.lock();
        if let Some(active) = inner.active.get(request_id) {
            return Some(active.handle.snapshot());
        }
        inner.recent.get(request_id).cloned()
    }

    /// Tear down an active checkout. Returns its last state, or `None` if no
    /// such checkout is running.
    pub fn cancel(&self, request_id: &str) -> Option<PollState> {
        let mut inner = self.lock();
        let active = inner.active.remove(request_id)?;
        inner.reserved_phones.remove(&active.phone);
        active.handle.cancel();
        let state = active.handle.snapshot();
        info!(
            request_id = %request_id,
            attempts = state.attempt_count,
            "Checkout cancelled"
        );
        Some(state)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// False once `shutdown` has been called.
    pub fn is_accepting(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Cancel every active poller and refuse new submissions.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let mut inner = self.lock();
        let count = inner.active.len();
        inner.active.clear();
        inner.reserved_phones.clear();
        info!(cancelled = count, "Checkout registry shut down");
    }
}

impl Drop for CheckoutRegistry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
