//! UI framework error hook
//!
//! [`FrameworkPlugin`] follows the framework's plugin convention: the host
//! calls [`FrameworkPlugin::install`] with its application object, and the
//! plugin takes over the global error handler, chaining whatever handler
//! was there before.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{Interceptor, InterceptorKind, LogSink};
use crate::stack::format_stack;
use crate::types::{LogEntry, LogKind, Payload, AGENT_SENTINEL};

/// Oldest framework version whose global error handler can be replaced
const MIN_VERSION: (u32, u32) = (2, 2);

/// An error reported through the framework's error handler
#[derive(Debug, Clone)]
pub struct ComponentError {
    pub error: Payload,
    /// Name of the component the error was raised in, if it has one
    pub component_name: Option<String>,
    /// Lifecycle hook or phase the framework was in
    pub info: Option<String>,
}

pub type ErrorHandler = Box<dyn Fn(&ComponentError) + Send + Sync>;

/// The slice of the framework's application object the plugin needs
pub trait FrameworkApp {
    /// Version string, e.g. `2.6.14`
    fn version(&self) -> &str;
    fn take_error_handler(&mut self) -> Option<ErrorHandler>;
    fn set_error_handler(&mut self, handler: ErrorHandler);
    fn enable_devtools(&mut self);
}

/// Whether a framework `version` supports a replaceable global error handler
pub fn supports_error_handler(version: &str) -> bool {
    let mut parts = version.trim_start_matches('v').split('.');
    let mut next = || parts.next().and_then(|p| p.parse::<u32>().ok());
    match (next(), next()) {
        (Some(major), Some(minor)) => (major, minor) >= MIN_VERSION,
        _ => false,
    }
}

/// `[Component Name: X]->[Info: i]->stack`, omitting the parts that are missing
pub fn format_component_error(err: &ComponentError) -> String {
    let mut message = match &err.error {
        Payload::Error(error) => format_stack(error),
        other => other.render(),
    };
    if let Some(info) = err.info.as_deref().filter(|i| !i.is_empty()) {
        message = format!("[Info: {}]->{}", info, message);
    }
    if let Some(name) = err.component_name.as_deref().filter(|n| !n.is_empty()) {
        message = format!("[Component Name: {}]->{}", name, message);
    }
    message
}

pub struct FrameworkPlugin {
    sink: Arc<dyn LogSink>,
    devtools: bool,
    installed: AtomicBool,
}

impl FrameworkPlugin {
    /// `devtools` turns on the framework's devtools at install time
    pub fn new(sink: Arc<dyn LogSink>, devtools: bool) -> Self {
        Self {
            sink,
            devtools,
            installed: AtomicBool::new(false),
        }
    }

    /// Install into `app`. Returns true when the error handler was taken over.
    ///
    /// Only the first install does anything.
    pub fn install(&self, app: &mut dyn FrameworkApp) -> bool {
        if self.installed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Framework plugin already installed");
            return false;
        }

        if self.devtools {
            app.enable_devtools();
        }

        if !supports_error_handler(app.version()) {
            tracing::info!(
                version = app.version(),
                "Framework too old for error handler, skipping"
            );
            return false;
        }

        let previous = app.take_error_handler();
        let sink = self.sink.clone();
        app.set_error_handler(Box::new(move |err: &ComponentError| {
            tracing::error!("{} Console {}", AGENT_SENTINEL, err.error.render());
            sink.capture(LogEntry::new(
                LogKind::FrameworkError,
                format_component_error(err),
            ));
            if let Some(previous) = &previous {
                previous(err);
            }
        }));
        true
    }
}

impl Interceptor for FrameworkPlugin {
    fn kind(&self) -> InterceptorKind {
        InterceptorKind::Framework
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptors::testing::VecSink;
    use crate::types::ScriptError;
    use std::sync::atomic::AtomicUsize;

    struct FakeApp {
        version: String,
        handler: Option<ErrorHandler>,
        devtools: bool,
    }

    impl FakeApp {
        fn new(version: &str) -> Self {
            Self {
                version: version.to_string(),
                handler: None,
                devtools: false,
            }
        }

        fn raise(&self, err: ComponentError) {
            if let Some(handler) = &self.handler {
                handler(&err);
            }
        }
    }

    impl FrameworkApp for FakeApp {
        fn version(&self) -> &str {
            &self.version
        }

        fn take_error_handler(&mut self) -> Option<ErrorHandler> {
            self.handler.take()
        }

        fn set_error_handler(&mut self, handler: ErrorHandler) {
            self.handler = Some(handler);
        }

        fn enable_devtools(&mut self) {
            self.devtools = true;
        }
    }

    fn component_error(message: &str) -> ComponentError {
        ComponentError {
            error: ScriptError::new("Error", message).into(),
            component_name: Some("OrderList".to_string()),
            info: Some("mounted hook".to_string()),
        }
    }

    #[test]
    fn test_supports_error_handler() {
        assert!(supports_error_handler("2.2.0"));
        assert!(supports_error_handler("2.6.14"));
        assert!(supports_error_handler("3.0.5"));
        assert!(supports_error_handler("v3.4"));
        assert!(!supports_error_handler("2.1.9"));
        assert!(!supports_error_handler("1.0.28"));
        assert!(!supports_error_handler(""));
    }

    #[test]
    fn test_format_component_error() {
        assert_eq!(
            format_component_error(&component_error("boom")),
            "[Component Name: OrderList]->[Info: mounted hook]->Error: boom"
        );

        let bare = ComponentError {
            error: "plain".into(),
            component_name: None,
            info: None,
        };
        assert_eq!(format_component_error(&bare), "plain");
    }

    #[test]
    fn test_install_records_and_chains_previous_handler() {
        let sink = Arc::new(VecSink::default());
        let plugin = FrameworkPlugin::new(sink.clone(), false);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut app = FakeApp::new("2.6.14");
        let counter = calls.clone();
        app.set_error_handler(Box::new(move |_: &ComponentError| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(plugin.install(&mut app));
        app.raise(component_error("boom"));

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LogKind::FrameworkError);
        assert!(entries[0].message.starts_with("[Component Name: OrderList]"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!app.devtools);
    }

    #[test]
    fn test_old_framework_keeps_its_handler() {
        let sink = Arc::new(VecSink::default());
        let plugin = FrameworkPlugin::new(sink.clone(), true);

        let mut app = FakeApp::new("2.1.0");
        assert!(!plugin.install(&mut app));
        assert!(app.handler.is_none());
        assert!(app.devtools);
    }

    #[test]
    fn test_install_is_one_shot() {
        let sink = Arc::new(VecSink::default());
        let plugin = FrameworkPlugin::new(sink.clone(), false);

        let mut app = FakeApp::new("3.3.0");
        assert!(plugin.install(&mut app));
        assert!(!plugin.install(&mut app));

        app.raise(component_error("once"));
        assert_eq!(sink.entries().len(), 1);
    }
}
