//! HTTP request interception

use std::sync::Arc;

use super::{Interceptor, InterceptorKind, LogSink};
use crate::types::{LogEntry, LogKind};

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

/// What a state-change handler is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestStatus {
    pub ready_state: ReadyState,
    /// HTTP status, 0 until headers arrive
    pub status: u16,
}

impl RequestStatus {
    pub fn new(ready_state: ReadyState, status: u16) -> Self {
        Self { ready_state, status }
    }

    pub fn is_failed(&self) -> bool {
        self.ready_state == ReadyState::Done && self.status >= 400
    }
}

/// A handler the host attached to a request
pub trait StateChangeHandler: Send {
    fn on_state_change(&mut self, status: &RequestStatus);
}

impl<F> StateChangeHandler for F
where
    F: FnMut(&RequestStatus) + Send,
{
    fn on_state_change(&mut self, status: &RequestStatus) {
        self(status)
    }
}

/// Wraps request opening so every request carries an observing handler
pub struct NetworkInterceptor {
    sink: Arc<dyn LogSink>,
}

impl NetworkInterceptor {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Open a request, keeping whatever handler the host already attached
    pub fn open(
        &self,
        method: impl Into<String>,
        url: impl Into<String>,
        existing: Option<Box<dyn StateChangeHandler>>,
    ) -> ObservedRequest {
        ObservedRequest {
            sink: self.sink.clone(),
            method: method.into(),
            url: url.into(),
            original: existing,
        }
    }
}

impl Interceptor for NetworkInterceptor {
    fn kind(&self) -> InterceptorKind {
        InterceptorKind::Network
    }
}

/// One open request.
///
/// Records a `network-error` entry when the request completes with status
/// >= 400, then defers to the original handler.
pub struct ObservedRequest {
    sink: Arc<dyn LogSink>,
    method: String,
    url: String,
    original: Option<Box<dyn StateChangeHandler>>,
}

impl ObservedRequest {
    /// Replace the original handler, as a host assigning one after open would
    pub fn set_handler(&mut self, handler: Box<dyn StateChangeHandler>) {
        self.original = Some(handler);
    }
}

impl StateChangeHandler for ObservedRequest {
    fn on_state_change(&mut self, status: &RequestStatus) {
        if status.is_failed() {
            let message = format!("{} {} {}", self.method, self.url, status.status);
            self.sink.capture(LogEntry::new(LogKind::NetworkError, message));
        }
        if let Some(original) = self.original.as_mut() {
            original.on_state_change(status);
        }
    }
}
