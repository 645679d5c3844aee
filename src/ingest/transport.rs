/// HTTP transport for the gauge network API.
///
/// Wraps a blocking HTTP sender with:
/// - exponential backoff with random jitter on transport-level failures
///   (connect, timeout, DNS, broken body), never on HTTP status codes
/// - a retry budget (max attempts and/or max elapsed time)
/// - a circuit breaker that stops hammering an upstream that keeps failing
/// - cooperative cancellation and deadlines through `CancelToken`
///
/// Responses with a status outside 200–399 are returned immediately as
/// `FetchError::Upstream`, carrying the `{code, message}` body if the
/// upstream sent one.

use rand::Rng;
use reqwest::Method;
use serde::Deserialize;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

pub const USER_AGENT: &str = concat!("rivers_service/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// Payload format negotiated with the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Csv,
}

impl ContentKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentKind::Json => "application/json; charset=utf-8",
            ContentKind::Csv => "text/csv",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub content: ContentKind,
}

impl Request {
    pub fn get(url: impl Into<String>, content: ContentKind) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            content,
        }
    }
}

/// A request with the headers and per-attempt timeout filled in by the
/// transport; this is what an `HttpSend` implementation sees.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorKind {
    Connect,
    Timeout,
    Body,
    /// The request could not be built (bad URL, bad header). Retrying
    /// cannot help.
    Builder,
    Other,
}

/// Failure below the HTTP layer: no status code was received.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind:?} error: {message}")]
pub struct SendError {
    pub kind: SendErrorKind,
    pub message: String,
}

impl SendError {
    pub fn new(kind: SendErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn is_transient(&self) -> bool {
        self.kind != SendErrorKind::Builder
    }
}

impl From<reqwest::Error> for SendError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_builder() {
            SendErrorKind::Builder
        } else if e.is_timeout() {
            SendErrorKind::Timeout
        } else if e.is_connect() {
            SendErrorKind::Connect
        } else if e.is_body() || e.is_decode() {
            SendErrorKind::Body
        } else {
            SendErrorKind::Other
        };
        SendError::new(kind, e.to_string())
    }
}

/// Sends a single HTTP request. Implementations must not retry.
pub trait HttpSend: Send + Sync {
    fn send(&self, request: &PreparedRequest) -> Result<Response, SendError>;
}

/// Production sender backed by `reqwest::blocking`.
pub struct ReqwestSender {
    client: reqwest::blocking::Client,
}

impl ReqwestSender {
    pub fn new(timeout: Duration) -> Result<Self, SendError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl HttpSend for ReqwestSender {
    fn send(&self, request: &PreparedRequest) -> Result<Response, SendError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(Response { status, body })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("request cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: SendError,
    },
    #[error("circuit open: upstream marked unavailable after repeated failures")]
    CircuitOpen,
    #[error("invalid request: {0}")]
    Request(#[source] SendError),
    #[error("upstream returned status {status}{}", upstream_detail(.code, .message))]
    Upstream {
        status: u16,
        code: Option<i64>,
        message: Option<String>,
    },
}

fn upstream_detail(code: &Option<i64>, message: &Option<String>) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!(" (code {}): {}", code, message),
        (None, Some(message)) => format!(": {}", message),
        (Some(code), None) => format!(" (code {})", code),
        (None, None) => ": unknown error".to_string(),
    }
}

/// Body shape the upstream uses for application errors.
#[derive(Deserialize)]
struct UpstreamErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Why a blocking wait was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

impl From<Interrupted> for FetchError {
    fn from(i: Interrupted) -> Self {
        match i {
            Interrupted::Cancelled => FetchError::Cancelled,
            Interrupted::DeadlineExceeded => FetchError::DeadlineExceeded,
        }
    }
}

/// Shared cancellation flag plus an optional deadline.
///
/// Clones share the flag: cancelling any clone wakes every sleeper. Child
/// tokens made with `with_deadline`/`with_timeout` share the flag too but
/// carry their own (never later) deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<(Mutex<bool>, Condvar)>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }

    /// A timeout too large to represent as an `Instant` adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.flag;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(Interrupted::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Sleeps for `duration`, waking early on cancellation or deadline.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        // `None` wake time: unrepresentable, so only cancellation or the
        // deadline ends the sleep.
        let wake_at = Instant::now().checked_add(duration);
        let (until, hits_deadline) = match (self.deadline, wake_at) {
            (Some(d), Some(w)) if d < w => (Some(d), true),
            (Some(d), None) => (Some(d), true),
            (_, w) => (w, false),
        };

        let (lock, cvar) = &*self.flag;
        let mut cancelled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if *cancelled {
                return Err(Interrupted::Cancelled);
            }
            cancelled = match until {
                Some(until) => {
                    let now = Instant::now();
                    if now >= until {
                        break;
                    }
                    cvar.wait_timeout(cancelled, until - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => cvar.wait(cancelled).unwrap_or_else(PoisonError::into_inner),
            };
        }

        if hits_deadline {
            Err(Interrupted::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Backoff schedule and retry budget for transport-level failures.
///
/// The wait before retry `n` (1-based) is
/// `base_delay + jitter`, where `jitter` is uniform in `[0, 3 × backoff(n))`
/// and `backoff(n) = min(base_delay × 2^(n-1), max_delay)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts including the first; `None` = no attempt limit.
    pub max_attempts: Option<u32>,
    /// Give up instead of sleeping past this much total time.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: Some(8),
            max_elapsed: Some(Duration::from_secs(300)),
        }
    }
}

impl RetryPolicy {
    /// Retries until the caller's deadline or cancellation fires.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            max_elapsed: None,
            ..Self::default()
        }
    }

    /// Capped exponential backoff for the `retry`-th retry.
    pub fn backoff_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Full wait before the `retry`-th retry, jitter included.
    pub fn delay_for_retry(&self, retry: u32, rng: &mut impl Rng) -> Duration {
        let width = self.backoff_for_retry(retry).saturating_mul(3);
        let width_ns = u64::try_from(width.as_nanos()).unwrap_or(u64::MAX);
        let jitter = if width_ns == 0 { 0 } else { rng.gen_range(0..width_ns) };
        self.base_delay.saturating_add(Duration::from_nanos(jitter))
    }

    /// Upper bound on any single wait produced by `delay_for_retry`.
    pub fn max_wait(&self) -> Duration {
        self.base_delay.saturating_add(self.max_delay.saturating_mul(3))
    }

    fn allows_retry(&self, attempts_made: u32, elapsed_after_wait: Duration) -> bool {
        self.max_attempts.is_none_or(|max| attempts_made < max)
            && self.max_elapsed.is_none_or(|max| elapsed_after_wait <= max)
    }
}

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerPolicy {
    /// Consecutive exhausted fetches before the circuit opens; 0 disables.
    pub failure_threshold: u32,
    pub cool_down: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Closed → open after `failure_threshold` exhausted fetches; after
/// `cool_down` one trial fetch is let through (half-open). A trial that
/// fails re-opens the circuit, any HTTP response closes it.
#[derive(Debug)]
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(BreakerState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn allows(&self, now: Instant) -> bool {
        !matches!(self.state().open_until, Some(until) if now < until)
    }

    pub fn is_open(&self) -> bool {
        !self.allows(Instant::now())
    }

    fn record_success(&self) {
        let mut state = self.state();
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    fn record_failure(&self, now: Instant) {
        let mut state = self.state();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if self.policy.failure_threshold > 0
            && state.consecutive_failures >= self.policy.failure_threshold
        {
            state.open_until = Some(now.checked_add(self.policy.cool_down).unwrap_or(now));
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

pub struct Transport {
    sender: Box<dyn HttpSend>,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
    request_timeout: Duration,
}

impl Transport {
    pub fn new(
        sender: Box<dyn HttpSend>,
        policy: RetryPolicy,
        breaker: BreakerPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sender,
            policy,
            breaker: CircuitBreaker::new(breaker),
            request_timeout,
        }
    }

    /// Transport over a real `reqwest` client.
    pub fn with_reqwest(
        request_timeout: Duration,
        policy: RetryPolicy,
        breaker: BreakerPolicy,
    ) -> Result<Self, SendError> {
        let sender = ReqwestSender::new(request_timeout)?;
        Ok(Self::new(Box::new(sender), policy, breaker, request_timeout))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Executes `request`, retrying transport failures per the policy.
    pub fn fetch(&self, request: &Request, cancel: &CancelToken) -> Result<Response, FetchError> {
        if !self.breaker.allows(Instant::now()) {
            return Err(FetchError::CircuitOpen);
        }

        let started = Instant::now();
        let mut rng = rand::thread_rng();
        let mut attempt = 0u32;

        loop {
            cancel.check()?;
            attempt += 1;

            let prepared = self.prepare(request, cancel);
            debug!(url = %prepared.url, attempt, "sending request");

            let err = match self.sender.send(&prepared) {
                Ok(response) => {
                    self.breaker.record_success();
                    return classify(response);
                }
                Err(e) if !e.is_transient() => return Err(FetchError::Request(e)),
                Err(e) => e,
            };

            let delay = self.policy.delay_for_retry(attempt, &mut rng);
            if !self.policy.allows_retry(attempt, started.elapsed().saturating_add(delay)) {
                self.breaker.record_failure(Instant::now());
                warn!(url = %request.url, attempts = attempt, error = %err, "retry budget exhausted");
                return Err(FetchError::RetriesExhausted { attempts: attempt, last: err });
            }

            warn!(
                url = %request.url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transport error, backing off"
            );
            cancel.sleep(delay)?;
        }
    }

    fn prepare(&self, request: &Request, cancel: &CancelToken) -> PreparedRequest {
        let timeout = cancel
            .remaining()
            .map_or(self.request_timeout, |left| left.min(self.request_timeout));

        PreparedRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: vec![
                ("Content-Type", request.content.mime().to_string()),
                ("Accept", request.content.mime().to_string()),
                ("User-Agent", USER_AGENT.to_string()),
            ],
            timeout,
        }
    }
}

/// 2xx and 3xx are success; anything else is an upstream application error.
fn classify(response: Response) -> Result<Response, FetchError> {
    if (200..400).contains(&response.status) {
        return Ok(response);
    }

    let body: Option<UpstreamErrorBody> = serde_json::from_str(&response.body).ok();
    let (code, message) = match body {
        Some(b) => (b.code, b.message),
        None => (None, None),
    };
    Err(FetchError::Upstream {
        status: response.status,
        code,
        message,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
