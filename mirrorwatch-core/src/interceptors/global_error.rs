//! Uncaught error and resource failure interception

use std::sync::Arc;

use super::{Interceptor, InterceptorKind, LogSink};
use crate::stack::format_stack;
use crate::types::{LogEntry, LogKind, ScriptError};

/// The element a resource failed to load for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementTarget {
    /// Tag name as the host reports it (`IMG`, `script`, ...)
    pub tag_name: String,
    /// Resolved `src` or `href`
    pub src: String,
}

impl ElementTarget {
    pub fn new(tag_name: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            src: src.into(),
        }
    }
}

/// An error event as seen by a capture-phase listener
#[derive(Debug, Clone, Default)]
pub struct ErrorEvent {
    pub message: String,
    pub filename: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub error: Option<ScriptError>,
    pub target: Option<ElementTarget>,
}

impl ErrorEvent {
    /// An uncaught script error raised from `filename`
    pub fn script(
        error: ScriptError,
        filename: impl Into<String>,
        line: Option<u32>,
        column: Option<u32>,
    ) -> Self {
        Self {
            message: error.to_string(),
            filename: Some(filename.into()),
            line,
            column,
            error: Some(error),
            target: None,
        }
    }

    /// A resource that failed to load; such events carry no filename
    pub fn resource(target: ElementTarget) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }
}

/// Handles `error` events at the window level.
///
/// Registered in the capture phase: resource failures do not bubble, so a
/// bubbling listener would never see them.
pub struct GlobalErrorInterceptor {
    sink: Arc<dyn LogSink>,
}

impl GlobalErrorInterceptor {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn handle(&self, event: &ErrorEvent) {
        self.sink.capture(classify(event));
    }
}

fn classify(event: &ErrorEvent) -> LogEntry {
    if let Some(filename) = event.filename.as_deref().filter(|f| !f.is_empty()) {
        return script_entry(event).with_location(filename, event.line, event.column);
    }

    match &event.target {
        Some(target) => LogEntry::new(
            LogKind::ResourceError,
            format!("{} failed to load: {}", target.tag_name.to_lowercase(), target.src),
        ),
        None => script_entry(event),
    }
}

fn script_entry(event: &ErrorEvent) -> LogEntry {
    let message = match &event.error {
        Some(error) => format_stack(error),
        None => event.message.clone(),
    };
    LogEntry::new(LogKind::JsError, message)
}

impl Interceptor for GlobalErrorInterceptor {
    fn kind(&self) -> InterceptorKind {
        InterceptorKind::GlobalError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptors::testing::VecSink;

    #[test]
    fn test_script_error_records_location() {
        let sink = Arc::new(VecSink::default());
        let interceptor = GlobalErrorInterceptor::new(sink.clone());

        let error = ScriptError::new("TypeError", "x is undefined").with_stack(
            "TypeError: x is undefined\n    at render (https://app.example.com/main.js?v=3:10:4)",
        );
        interceptor.handle(&ErrorEvent::script(
            error,
            "https://app.example.com/main.js",
            Some(10),
            Some(4),
        ));

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LogKind::JsError);
        assert!(entries[0].message.starts_with("TypeError: x is undefined"));
        assert!(!entries[0].message.contains("?v=3"));
        assert_eq!(entries[0].filename.as_deref(), Some("https://app.example.com/main.js"));
        assert_eq!(entries[0].line, Some(10));
        assert_eq!(entries[0].column, Some(4));
    }

    #[test]
    fn test_resource_failure_records_tag_and_url() {
        let sink = Arc::new(VecSink::default());
        let interceptor = GlobalErrorInterceptor::new(sink.clone());

        interceptor.handle(&ErrorEvent::resource(ElementTarget::new(
            "IMG",
            "https://cdn.example.com/logo.png",
        )));

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LogKind::ResourceError);
        assert!(entries[0].message.contains("img"));
        assert!(entries[0].message.contains("https://cdn.example.com/logo.png"));
        assert!(entries[0].filename.is_none());
    }

    #[test]
    fn test_event_without_source_is_a_script_error() {
        let sink = Arc::new(VecSink::default());
        let interceptor = GlobalErrorInterceptor::new(sink.clone());

        interceptor.handle(&ErrorEvent {
            message: "Script error.".to_string(),
            ..ErrorEvent::default()
        });

        let entries = sink.entries();
        assert_eq!(entries[0].kind, LogKind::JsError);
        assert_eq!(entries[0].message, "Script error.");
    }
}
