#![forbid(unsafe_code)]

//! Request layer: API calls as deferred actions.
//!
//! [`ApiCallFactory`] turns a method, a path and an optional JSON body into
//! an [`ApiCall`]. Nothing is sent until the call's action is invoked,
//! usually by a [`CallQueue`]. The wire itself is behind the [`Transport`]
//! trait; this module only builds requests and interprets responses.
//!
//! # Response interpretation
//!
//! | Status      | Outcome                                          |
//! |-------------|--------------------------------------------------|
//! | below 400   | `Ok(body)`                                       |
//! | 500 and up  | [`ApiError::Unavailable`] with the reason phrase |
//! | otherwise   | [`ApiError::Rejected`] with `body["err"]`, or [`ApiError::Malformed`] if absent |

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use habiter_model::SeqError;
use serde_json::Value;
use tracing::debug;

use crate::action::{DeferredAction, Step};
use crate::config::ApiConfig;
use crate::queue::{CallKind, CallQueue, QueuedCall};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Queue classification: reads are idempotent, everything else mutates.
    #[must_use]
    pub const fn call_kind(self) -> CallKind {
        match self {
            Self::Get => CallKind::Idempotent,
            Self::Post | Self::Put | Self::Delete => CallKind::Mutating,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of an API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The transport could not complete the exchange.
    Transport(String),
    /// The server answered with a 5xx status.
    Unavailable(String),
    /// The server refused the request and said why.
    Rejected(String),
    /// The response could not be interpreted.
    Malformed(String),
}

impl ApiError {
    /// Whether retrying later might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Unavailable(_))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Unavailable(reason) => write!(f, "API unavailable: {reason}"),
            Self::Rejected(msg) => write!(f, "API error: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed API response: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// A fully resolved request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub description: String,
}

/// A response as delivered by a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub reason: String,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, reason: impl Into<String>, body: Value) -> Self {
        Self {
            status,
            reason: reason.into(),
            body,
        }
    }

    /// Build a response from raw body text; empty text is `null`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Malformed`] if the text is not JSON.
    pub fn from_text(status: u16, reason: impl Into<String>, text: &str) -> Result<Self, ApiError> {
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(text)?
        };
        Ok(Self::new(status, reason, body))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    /// Interpret the response (see the module table).
    ///
    /// # Errors
    ///
    /// [`ApiError::Unavailable`], [`ApiError::Rejected`] or
    /// [`ApiError::Malformed`] for non-success statuses.
    pub fn into_json(self) -> Result<Value, ApiError> {
        if self.is_success() {
            return Ok(self.body);
        }
        if self.status >= 500 {
            return Err(ApiError::Unavailable(self.reason));
        }
        match self.body.get("err").and_then(Value::as_str) {
            Some(message) => Err(ApiError::Rejected(message.to_owned())),
            None => Err(ApiError::Malformed(format!(
                "status {} without an error message",
                self.status
            ))),
        }
    }
}

/// Sends requests over the wire.
pub trait Transport {
    /// Perform one exchange, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Transport`] when no response was received.
    fn send(&self, request: &ApiRequest, timeout: Duration) -> Result<ApiResponse, ApiError>;
}

impl<F> Transport for F
where
    F: Fn(&ApiRequest, Duration) -> Result<ApiResponse, ApiError>,
{
    fn send(&self, request: &ApiRequest, timeout: Duration) -> Result<ApiResponse, ApiError> {
        self(request, timeout)
    }
}

type PostProc = Box<dyn FnOnce(Value) -> Result<Value, ApiError>>;

/// A not-yet-sent API request plus its follow-up processing.
pub struct ApiCall {
    request: ApiRequest,
    transport: Rc<dyn Transport>,
    timeout: Duration,
    postprocs: Vec<PostProc>,
    on_error: Option<Rc<dyn Fn(&ApiError)>>,
}

impl ApiCall {
    #[must_use]
    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// Classification derived from the request method.
    #[must_use]
    pub fn kind(&self) -> CallKind {
        self.request.method.call_kind()
    }

    /// Transform the decoded body; runs after the request succeeds.
    #[must_use]
    pub fn with_postproc(
        mut self,
        postproc: impl FnOnce(Value) -> Result<Value, ApiError> + 'static,
    ) -> Self {
        self.postprocs.push(Box::new(postproc));
        self
    }

    /// Handle any failure of this call locally.
    #[must_use]
    pub fn on_error(mut self, handler: impl Fn(&ApiError) + 'static) -> Self {
        self.on_error = Some(Rc::new(handler));
        self
    }

    /// The deferred action: send, interpret, then each post-processing step.
    #[must_use]
    pub fn into_action(self) -> DeferredAction<Value, ApiError> {
        let Self {
            request,
            transport,
            timeout,
            postprocs,
            on_error,
        } = self;
        let description = request.description.clone();
        let mut action = DeferredAction::new(description, move || {
            debug!(method = %request.method, url = %request.url, "sending API request");
            transport.send(&request, timeout)?.into_json()
        });
        if let Some(handler) = &on_error {
            let handler = Rc::clone(handler);
            action = action.on_root_error(move |err| handler(err));
        }
        for postproc in postprocs {
            let mut step = Step::with_previous(postproc);
            if let Some(handler) = &on_error {
                let handler = Rc::clone(handler);
                step = step.on_error(move |err| handler(err));
            }
            action = action.chain_action(step);
        }
        action
    }

    /// Register with `queue` under the method's classification.
    ///
    /// # Errors
    ///
    /// Propagates [`CallQueue::add`] errors.
    pub fn enqueue(
        self,
        queue: &mut CallQueue<Value, ApiError>,
    ) -> Result<QueuedCall<Value, ApiError>, SeqError> {
        let kind = self.kind();
        queue.add(self.into_action(), kind)
    }
}

impl fmt::Display for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.request.description)
    }
}

impl fmt::Debug for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ApiCall<{} {} {}>",
            self.request.method, self.request.url, self.request.description
        )
    }
}

/// Builds [`ApiCall`]s against one API root.
#[derive(Clone)]
pub struct ApiCallFactory {
    transport: Rc<dyn Transport>,
    config: ApiConfig,
}

impl ApiCallFactory {
    pub fn new(transport: impl Transport + 'static, config: ApiConfig) -> Self {
        Self::with_shared(Rc::new(transport), config)
    }

    /// Use a transport that is also held elsewhere.
    pub fn with_shared(transport: Rc<dyn Transport>, config: ApiConfig) -> Self {
        Self { transport, config }
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Build a call for `method` on `path`, relative to the API root.
    pub fn request(
        &self,
        description: impl Into<String>,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> ApiCall {
        ApiCall {
            request: ApiRequest {
                method,
                url: self.config.url_for(path),
                body,
                description: description.into(),
            },
            transport: Rc::clone(&self.transport),
            timeout: self.config.timeout(),
            postprocs: Vec::new(),
            on_error: None,
        }
    }

    pub fn get(&self, description: impl Into<String>, path: &str) -> ApiCall {
        self.request(description, Method::Get, path, None)
    }

    pub fn post(&self, description: impl Into<String>, path: &str, body: Option<Value>) -> ApiCall {
        self.request(description, Method::Post, path, body)
    }

    pub fn put(&self, description: impl Into<String>, path: &str, body: Value) -> ApiCall {
        self.request(description, Method::Put, path, Some(body))
    }

    pub fn delete(&self, description: impl Into<String>, path: &str) -> ApiCall {
        self.request(description, Method::Delete, path, None)
    }

    /// Ping the server; resolves to its `ok` flag.
    pub fn status(&self) -> ApiCall {
        self.get("ping server for its status", "status")
            .with_postproc(|json| {
                json.get("ok")
                    .cloned()
                    .ok_or_else(|| ApiError::Malformed("status without `ok`".to_owned()))
            })
    }
}

impl fmt::Debug for ApiCallFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCallFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
