//! Interceptors: wrappers around host entry points that observe without interfering
//!
//! Each interceptor stands in front of one foreign subsystem. It always runs
//! the original behavior unchanged and, when its trigger fires, hands a
//! [`LogEntry`] to a [`LogSink`] synchronously. Interceptors never fail: a
//! sink swallows its own errors.
//!
//! | Interceptor | Wraps | Records |
//! |-------------|-------|---------|
//! | [`ConsoleInterceptor`] | a [`Console`] | configured console levels |
//! | [`NetworkInterceptor`] | request state-change handlers | completed requests with status >= 400 |
//! | [`GlobalErrorInterceptor`] | the capture-phase `error` listener | script errors and resource load failures |
//! | [`RejectionInterceptor`] | the `unhandledrejection` listener | unhandled rejection reasons |
//! | [`HistoryInterceptor`] | a [`History`] | nothing; dispatches navigation events |
//! | [`FrameworkPlugin`] | the UI framework's error handler | component errors |
//!
//! Installation goes through [`crate::Agent::install`], which accepts each
//! [`InterceptorKind`] at most once per agent.

mod console;
mod framework;
mod global_error;
mod history;
mod network;
mod rejection;

pub use console::{join_args, Console, ConsoleInterceptor, TracingConsole};
pub use framework::{
    format_component_error, supports_error_handler, ComponentError, ErrorHandler, FrameworkApp,
    FrameworkPlugin,
};
pub use global_error::{ElementTarget, ErrorEvent, GlobalErrorInterceptor};
pub use history::{History, HistoryEvent, HistoryInterceptor, HistoryListener};
pub use network::{NetworkInterceptor, ObservedRequest, ReadyState, RequestStatus, StateChangeHandler};
pub use rejection::RejectionInterceptor;

use crate::types::LogEntry;

/// Receives entries from interceptors
pub trait LogSink: Send + Sync {
    fn capture(&self, entry: LogEntry);
}

/// The foreign subsystems an interceptor can stand in front of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptorKind {
    Console,
    Network,
    GlobalError,
    UnhandledRejection,
    History,
    Framework,
}

impl InterceptorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterceptorKind::Console => "console",
            InterceptorKind::Network => "network",
            InterceptorKind::GlobalError => "global-error",
            InterceptorKind::UnhandledRejection => "unhandled-rejection",
            InterceptorKind::History => "history",
            InterceptorKind::Framework => "framework",
        }
    }
}

/// Common surface of every interceptor
pub trait Interceptor {
    fn kind(&self) -> InterceptorKind;
}
