// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Payment Confirmation Poller
//!
//! Follows a single STK Push from "prompt sent" to a terminal outcome by
//! polling the payments backend.
//!
//! ## Strategy
//!
//! The first poll runs as soon as the poller starts, then one every
//! `interval`. Each poll:
//! 1. Reads `payment-status/{id}`. `confirmed` and `failed` end the poll.
//! 2. On checkpoint attempts (every `fallback_every` polls) asks the backend
//!    to query the provider directly through `confirmPayment/{id}`. Result
//!    code `0` confirms the payment even while the status record still says
//!    pending.
//! 3. Gives up with `TimedOut` once `max_attempts` polls ran without an
//!    outcome.
//!
//! Transport errors and timeouts never end a poll on their own. They are
//! logged and the poll counts as pending.
//!
//! Polls never overlap: the next interval is only awaited once the previous
//! poll has returned.
//!
//! ## Shutdown
//!
//! Each poller runs under a `tokio_util::sync::CancellationToken`. Cancelling
//! it, or dropping the [`PollHandle`], stops the task; a poll in flight is
//! abandoned and no further backend call is made.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gateway::{GatewayError, PaymentGateway, PaymentStatus};
use crate::models::{ConfirmationSource, PaymentRequest, PollState, PollStatus};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_ATTEMPTS: u32 = 12;
const DEFAULT_FALLBACK_EVERY: u32 = 4;
const DEFAULT_TICK_TIMEOUT: Duration = Duration::from_secs(10);

/// `tokio::time::interval` panics on a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Invoked once with the terminal state. Never called for a cancelled poll.
pub type CompletionCallback = Box<dyn FnOnce(&PollState) + Send + 'static>;

/// Timing and budget for a poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay between polls.
    pub interval: Duration,
    /// Polls before giving up.
    pub max_attempts: u32,
    /// Query the provider directly on every Nth poll; `0` disables.
    pub fallback_every: u32,
    /// Timeout for each backend call.
    pub tick_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            fallback_every: DEFAULT_FALLBACK_EVERY,
            tick_timeout: DEFAULT_TICK_TIMEOUT,
        }
    }
}

impl PollerConfig {
    /// Whether `attempt` (1-based) also runs the provider query.
    pub fn is_checkpoint(&self, attempt: u32) -> bool {
        self.fallback_every > 0 && attempt > 0 && attempt % self.fallback_every == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    Pending,
    Confirmed(ConfirmationSource),
    Failed,
}

#[derive(Debug)]
struct TickReport {
    outcome: TickOutcome,
    error: Option<String>,
}

impl TickReport {
    fn settled(outcome: TickOutcome) -> Self {
        Self {
            outcome,
            error: None,
        }
    }
}

/// Starts confirmation pollers against a payments backend.
#[derive(Clone)]
pub struct PaymentPoller {
    gateway: Arc<dyn PaymentGateway>,
    config: PollerConfig,
}

impl PaymentPoller {
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: PollerConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Start polling for `request` on a background task.
    pub fn start(&self, request: PaymentRequest) -> PollHandle {
        self.start_with(request, CancellationToken::new(), None)
    }

    /// Start polling under an existing cancellation token, typically a child
    /// of a service-wide shutdown token.
    pub fn start_with(
        &self,
        request: PaymentRequest,
        cancel: CancellationToken,
        on_complete: Option<CompletionCallback>,
    ) -> PollHandle {
        let request_id = request.request_id().to_string();
        let (state_tx, state_rx) = watch::channel(PollState::new(request_id.clone()));
        let task = tokio::spawn(self.clone().run(request, cancel.clone(), state_tx, on_complete));

        PollHandle {
            request_id,
            cancel,
            state: state_rx,
            task: Some(task),
        }
    }

    async fn run(
        self,
        request: PaymentRequest,
        cancel: CancellationToken,
        state_tx: watch::Sender<PollState>,
        mut on_complete: Option<CompletionCallback>,
    ) -> PollState {
        let request_id = request.request_id();
        let mut state = state_tx.borrow().clone();

        info!(
            request_id = %request_id,
            phone = %request.phone_number(),
            amount = %request.amount(),
            max_attempts = self.config.max_attempts,
            interval_secs = self.config.interval.as_secs(),
            "Payment poller starting"
        );

        let mut ticker = tokio::time::interval(self.config.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(request_id = %request_id, attempts = state.attempt_count, "Payment poller cancelled");
                    return state;
                }
                _ = ticker.tick() => {}
            }

            let attempt = state.attempt_count + 1;
            let report = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(request_id = %request_id, attempt, "Payment poller cancelled during poll");
                    return state;
                }
                report = self.tick(request_id, attempt) => report,
            };

            apply_tick(&mut state, attempt, report, self.config.max_attempts);
            state_tx.send_replace(state.clone());

            if state.status.is_terminal() {
                info!(
                    request_id = %request_id,
                    status = ?state.status,
                    confirmed_via = ?state.confirmed_via,
                    attempts = state.attempt_count,
                    "Payment poller finished"
                );
                if let Some(callback) = on_complete.take() {
                    callback(&state);
                }
                return state;
            }
        }
    }

    /// Run one poll and report what it found. Never fails.
    async fn tick(&self, request_id: &str, attempt: u32) -> TickReport {
        debug!(
            request_id = %request_id,
            attempt,
            max_attempts = self.config.max_attempts,
            "Polling payment status"
        );

        let mut error = None;
        match self.bounded(self.gateway.payment_status(request_id)).await {
            Ok(PaymentStatus::Confirmed) => {
                return TickReport::settled(TickOutcome::Confirmed(
                    ConfirmationSource::StatusEndpoint,
                ));
            }
            Ok(PaymentStatus::Failed) => return TickReport::settled(TickOutcome::Failed),
            Ok(PaymentStatus::Pending) => {}
            Err(e) => {
                warn!(request_id = %request_id, attempt, error = %e, "Payment status query failed");
                error = Some(e.to_string());
            }
        }

        if self.config.is_checkpoint(attempt) {
            debug!(request_id = %request_id, attempt, "Querying provider directly");
            match self.bounded(self.gateway.query_provider(request_id)).await {
                Ok(result) if result.is_success() => {
                    info!(
                        request_id = %request_id,
                        attempt,
                        result_desc = ?result.result_desc,
                        "Provider query confirmed payment"
                    );
                    return TickReport::settled(TickOutcome::Confirmed(
                        ConfirmationSource::ProviderQuery,
                    ));
                }
                Ok(result) => {
                    debug!(
                        request_id = %request_id,
                        attempt,
                        result_code = ?result.result_code,
                        result_desc = ?result.result_desc,
                        "Provider query did not confirm payment"
                    );
                }
                Err(e) => {
                    warn!(request_id = %request_id, attempt, error = %e, "Provider query failed");
                    error = Some(e.to_string());
                }
            }
        }

        TickReport {
            outcome: TickOutcome::Pending,
            error,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        let limit = self.config.tick_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(GatewayError::Timeout(limit)))
    }
}

fn apply_tick(state: &mut PollState, attempt: u32, report: TickReport, max_attempts: u32) {
    state.attempt_count = attempt;
    state.updated_at = Utc::now();
    state.last_error = report.error;

    match report.outcome {
        TickOutcome::Confirmed(source) => {
            state.status = PollStatus::Confirmed;
            state.confirmed_via = Some(source);
        }
        TickOutcome::Failed => state.status = PollStatus::Failed,
        TickOutcome::Pending if attempt >= max_attempts => state.status = PollStatus::TimedOut,
        TickOutcome::Pending => {}
    }
}

/// Owner's handle on a running poller.
///
/// Dropping the handle cancels the poller.
pub struct PollHandle {
    request_id: String,
    cancel: CancellationToken,
    state: watch::Receiver<PollState>,
    task: Option<JoinHandle<PollState>>,
}

impl PollHandle {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Stop polling. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Latest published state.
    pub fn snapshot(&self) -> PollState {
        self.state.borrow().clone()
    }

    /// Receiver that sees every state change.
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the poller to stop and return its final state.
    pub async fn wait(mut self) -> PollState {
        let Some(task) = self.task.take() else {
            return self.snapshot();
        };
        match task.await {
            Ok(state) => state,
            Err(e) => {
                warn!(request_id = %self.request_id, error = %e, "Payment poller task aborted");
                self.snapshot()
            }
        }
    }
}

impl fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollHandle")
            .field("request_id", &self.request_id)
            .field("is_cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gateway::{ProviderQueryResult, StkPushRequest, StkPushResponse};
    use crate::models::UserProfile;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted backend. Status replies are consumed in order; the last one
    /// repeats once the script runs out.
    #[derive(Default)]
    pub(crate) struct ScriptedGateway {
        pub statuses: Mutex<VecDeque<Result<PaymentStatus, GatewayError>>>,
        pub provider_results: Mutex<VecDeque<Result<ProviderQueryResult, GatewayError>>>,
        pub stk_response: Mutex<Option<Result<StkPushResponse, GatewayError>>>,
        pub status_delay: Option<Duration>,
        pub stk_delay: Option<Duration>,
        pub status_calls: AtomicUsize,
        pub provider_calls: AtomicUsize,
        pub stk_calls: AtomicUsize,
        pub provider_call_attempts: Mutex<Vec<usize>>,
        pub user: Option<UserProfile>,
    }

    impl ScriptedGateway {
        pub fn with_statuses(statuses: Vec<PaymentStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into_iter().map(Ok).collect()),
                ..Default::default()
            }
        }

        pub fn status_calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }

        pub fn provider_calls(&self) -> usize {
            self.provider_calls.load(Ordering::SeqCst)
        }
    }

    fn next_or_repeat<T: Clone>(queue: &Mutex<VecDeque<T>>, fallback: T) -> T {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or(fallback)
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn initiate_stk_push(
            &self,
            _request: &StkPushRequest,
        ) -> Result<StkPushResponse, GatewayError> {
            self.stk_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.stk_delay {
                tokio::time::sleep(delay).await;
            }
            self.stk_response
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(StkPushResponse::default()))
        }

        async fn payment_status(
            &self,
            _checkout_request_id: &str,
        ) -> Result<PaymentStatus, GatewayError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.status_delay {
                tokio::time::sleep(delay).await;
            }
            next_or_repeat(&self.statuses, Ok(PaymentStatus::Pending))
        }

        async fn query_provider(
            &self,
            _checkout_request_id: &str,
        ) -> Result<ProviderQueryResult, GatewayError> {
            self.provider_calls.fetch_add(1, Ordering::SeqCst);
            self.provider_call_attempts
                .lock()
                .unwrap()
                .push(self.status_calls());
            next_or_repeat(
                &self.provider_results,
                Ok(ProviderQueryResult {
                    result_code: Some(1032),
                    result_desc: None,
                }),
            )
        }

        async fn current_user(
            &self,
            _cookie: Option<&str>,
        ) -> Result<Option<UserProfile>, GatewayError> {
            Ok(self.user.clone())
        }
    }

    fn request() -> PaymentRequest {
        PaymentRequest::new("ws_CO_1", dec!(99), "254712345678", None)
    }

    fn poller(gateway: Arc<ScriptedGateway>) -> PaymentPoller {
        PaymentPoller::new(gateway, PollerConfig::default())
    }

    #[test]
    fn checkpoints_fall_on_multiples() {
        let config = PollerConfig::default();
        let checkpoints: Vec<u32> = (1..=12).filter(|a| config.is_checkpoint(*a)).collect();
        assert_eq!(checkpoints, vec![4, 8, 12]);

        let disabled = PollerConfig {
            fallback_every: 0,
            ..PollerConfig::default()
        };
        assert!(!(1..=12).any(|a| disabled.is_checkpoint(a)));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_on_first_poll_stops_after_one_query() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(vec![PaymentStatus::Confirmed]));
        let handle = poller(gateway.clone()).start(request());

        let state = handle.wait().await;
        assert_eq!(state.status, PollStatus::Confirmed);
        assert_eq!(state.confirmed_via, Some(ConfirmationSource::StatusEndpoint));
        assert_eq!(state.attempt_count, 1);
        assert_eq!(gateway.status_calls(), 1);
        assert_eq!(gateway.provider_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_debug_shows_id_and_cancellation() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(vec![PaymentStatus::Pending]));
        let handle = poller(gateway).start(request());
        assert_eq!(
            format!("{handle:?}"),
            r#"PollHandle { request_id: "ws_CO_1", is_cancelled: false, .. }"#
        );

        handle.cancel();
        assert!(format!("{handle:?}").contains("is_cancelled: true"));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_failure_is_terminal() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(vec![
            PaymentStatus::Pending,
            PaymentStatus::Failed,
        ]));
        let state = poller(gateway.clone()).start(request()).wait().await;
        assert_eq!(state.status, PollStatus::Failed);
        assert_eq!(state.attempt_count, 2);
        assert_eq!(gateway.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_throughout_times_out_with_fallback_at_checkpoints() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(vec![PaymentStatus::Pending]));
        let started = tokio::time::Instant::now();
        let state = poller(gateway.clone()).start(request()).wait().await;

        assert_eq!(state.status, PollStatus::TimedOut);
        assert_eq!(state.attempt_count, 12);
        assert_eq!(gateway.status_calls(), 12);
        assert_eq!(gateway.provider_calls(), 3);
        assert_eq!(*gateway.provider_call_attempts.lock().unwrap(), vec![4, 8, 12]);
        // First poll is immediate, the remaining eleven are one interval apart.
        assert_eq!(started.elapsed(), Duration::from_secs(55));
    }

    #[tokio::test(start_paused = true)]
    async fn provider_query_success_confirms_while_status_is_pending() {
        let gateway = Arc::new(ScriptedGateway {
            statuses: Mutex::new(VecDeque::from([Ok(PaymentStatus::Pending)])),
            provider_results: Mutex::new(VecDeque::from([Ok(ProviderQueryResult {
                result_code: Some(0),
                result_desc: Some("processed successfully".to_string()),
            })])),
            ..Default::default()
        });
        let state = poller(gateway.clone()).start(request()).wait().await;

        assert_eq!(state.status, PollStatus::Confirmed);
        assert_eq!(state.confirmed_via, Some(ConfirmationSource::ProviderQuery));
        assert_eq!(state.attempt_count, 4);
        assert_eq!(gateway.status_calls(), 4);
        assert_eq!(gateway.provider_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_count_as_pending() {
        let gateway = Arc::new(ScriptedGateway {
            statuses: Mutex::new(VecDeque::from([
                Err(GatewayError::Request("connection reset".to_string())),
                Err(GatewayError::Status {
                    status: 502,
                    body: "bad gateway".to_string(),
                }),
                Ok(PaymentStatus::Confirmed),
            ])),
            ..Default::default()
        });
        let handle = poller(gateway.clone()).start(request());
        let mut updates = handle.subscribe();

        updates.changed().await.unwrap();
        let first = updates.borrow_and_update().clone();
        assert_eq!(first.status, PollStatus::Pending);
        assert_eq!(first.attempt_count, 1);
        assert!(first.last_error.unwrap().contains("connection reset"));

        let state = handle.wait().await;
        assert_eq!(state.status, PollStatus::Confirmed);
        assert_eq!(state.attempt_count, 3);
        assert_eq!(state.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_on_every_poll_still_time_out() {
        let gateway = Arc::new(ScriptedGateway {
            statuses: Mutex::new(VecDeque::from([Err(GatewayError::Request(
                "unreachable".to_string(),
            ))])),
            provider_results: Mutex::new(VecDeque::from([Err(GatewayError::Request(
                "unreachable".to_string(),
            ))])),
            ..Default::default()
        });
        let state = poller(gateway.clone()).start(request()).wait().await;
        assert_eq!(state.status, PollStatus::TimedOut);
        assert_eq!(state.attempt_count, 12);
        assert!(state.last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_call_times_out_per_poll() {
        let gateway = Arc::new(ScriptedGateway {
            statuses: Mutex::new(VecDeque::from([Ok(PaymentStatus::Confirmed)])),
            status_delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let config = PollerConfig {
            max_attempts: 2,
            fallback_every: 0,
            ..PollerConfig::default()
        };
        let state = PaymentPoller::new(gateway.clone(), config)
            .start(request())
            .wait()
            .await;

        assert_eq!(state.status, PollStatus::TimedOut);
        assert_eq!(state.attempt_count, 2);
        assert!(state.last_error.unwrap().contains("did not answer"));
    }

    #[tokio::test(start_paused = true)]
    async fn no_polls_after_terminal_state() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(vec![
            PaymentStatus::Pending,
            PaymentStatus::Confirmed,
        ]));
        let handle = poller(gateway.clone()).start(request());
        let mut updates = handle.subscribe();
        updates
            .wait_for(|s| s.status.is_terminal())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(gateway.status_calls(), 2);
        assert!(handle.is_finished());
        assert_eq!(handle.snapshot().status, PollStatus::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_terminal_stops_polling() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(vec![PaymentStatus::Pending]));
        let handle = poller(gateway.clone()).start(request());
        let mut updates = handle.subscribe();
        updates.wait_for(|s| s.attempt_count == 2).await.unwrap();

        handle.cancel();
        assert!(handle.is_cancelled());
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(gateway.status_calls(), 2);
        let state = handle.wait().await;
        assert_eq!(state.status, PollStatus::Pending);
        assert_eq!(state.attempt_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_tears_the_poller_down() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(vec![PaymentStatus::Pending]));
        let handle = poller(gateway.clone()).start(request());
        let mut updates = handle.subscribe();
        updates.wait_for(|s| s.attempt_count == 1).await.unwrap();

        drop(handle);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(gateway.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_slow_poll_abandons_it() {
        let gateway = Arc::new(ScriptedGateway {
            statuses: Mutex::new(VecDeque::from([Ok(PaymentStatus::Confirmed)])),
            status_delay: Some(Duration::from_secs(8)),
            ..Default::default()
        });
        let handle = poller(gateway.clone()).start(request());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(gateway.status_calls(), 1);

        handle.cancel();
        let state = handle.wait().await;
        assert_eq!(state.status, PollStatus::Pending);
        assert_eq!(state.attempt_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_callback_runs_once_with_terminal_state() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(vec![PaymentStatus::Failed]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = poller(gateway).start_with(
            request(),
            CancellationToken::new(),
            Some(Box::new(move |state: &PollState| {
                sink.lock().unwrap().push(state.status);
            })),
        );
        handle.wait().await;
        assert_eq!(*seen.lock().unwrap(), vec![PollStatus::Failed]);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_token_cancels_child_pollers() {
        let gateway = Arc::new(ScriptedGateway::with_statuses(vec![PaymentStatus::Pending]));
        let shutdown = CancellationToken::new();
        let handle = poller(gateway.clone()).start_with(request(), shutdown.child_token(), None);
        tokio::time::sleep(Duration::from_secs(1)).await;

        shutdown.cancel();
        let state = handle.wait().await;
        assert_eq!(state.attempt_count, 1);
        assert_eq!(gateway.status_calls(), 1);
    }
}
