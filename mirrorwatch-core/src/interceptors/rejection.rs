//! Unhandled promise rejection interception

use std::sync::Arc;

use super::{Interceptor, InterceptorKind, LogSink};
use crate::decycle::GraphValue;
use crate::stack::format_stack;
use crate::types::{LogEntry, LogKind, Payload, ScriptError};

/// Handles rejections that reached the top of the event loop unhandled
pub struct RejectionInterceptor {
    sink: Arc<dyn LogSink>,
}

impl RejectionInterceptor {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn handle(&self, reason: &Payload) {
        let message = match reason {
            Payload::Error(error) => format_stack(error),
            Payload::Value(value) => match error_like(value) {
                Some(error) => format_stack(&error),
                None => reason.render(),
            },
            Payload::Text(_) => reason.render(),
        };
        self.sink
            .capture(LogEntry::new(LogKind::UnhandledRejectionError, message));
    }
}

/// An object rejection reason carrying `message` or `stack`, read as an error
fn error_like(value: &GraphValue) -> Option<ScriptError> {
    let message = value.get("message").and_then(|m| m.as_str());
    let stack = value.get("stack").and_then(|s| s.as_str());
    if message.is_none() && stack.is_none() {
        return None;
    }

    let name = value
        .get("name")
        .and_then(|n| n.as_str())
        .unwrap_or_else(|| "Error".to_string());
    let error = ScriptError::new(name, message.unwrap_or_default());
    Some(match stack {
        Some(stack) => error.with_stack(stack),
        None => error,
    })
}

impl Interceptor for RejectionInterceptor {
    fn kind(&self) -> InterceptorKind {
        InterceptorKind::UnhandledRejection
    }
}
