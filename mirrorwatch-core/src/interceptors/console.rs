//! Console interception

use std::sync::Arc;

use super::{Interceptor, InterceptorKind, LogSink};
use crate::types::{ConsoleLevel, LogEntry, LogKind, Payload};

/// A console the host writes to
pub trait Console: Send + Sync {
    fn write(&self, level: ConsoleLevel, args: &[Payload]);
}

/// Console that forwards to `tracing`, for hosts without a console of their own
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl Console for TracingConsole {
    fn write(&self, level: ConsoleLevel, args: &[Payload]) {
        let message = join_args(args);
        match level {
            ConsoleLevel::Error => tracing::error!(target: "console", "{}", message),
            ConsoleLevel::Warn => tracing::warn!(target: "console", "{}", message),
            ConsoleLevel::Info => tracing::info!(target: "console", "{}", message),
        }
    }
}

/// Join console arguments into one message, comma-separated
pub fn join_args(args: &[Payload]) -> String {
    args.iter().map(Payload::render).collect::<Vec<_>>().join(",")
}

/// Records calls on the configured levels, then writes through to the original console.
///
/// Calls with no arguments, or whose first argument is
/// [`crate::types::AGENT_SENTINEL`], are passed through unrecorded.
pub struct ConsoleInterceptor<C> {
    sink: Arc<dyn LogSink>,
    original: C,
    levels: Vec<ConsoleLevel>,
}

impl<C: Console> ConsoleInterceptor<C> {
    pub fn new(sink: Arc<dyn LogSink>, original: C, levels: &[ConsoleLevel]) -> Self {
        Self {
            sink,
            original,
            levels: levels.to_vec(),
        }
    }

    pub fn error(&self, args: &[Payload]) {
        self.write(ConsoleLevel::Error, args);
    }

    pub fn warn(&self, args: &[Payload]) {
        self.write(ConsoleLevel::Warn, args);
    }

    pub fn info(&self, args: &[Payload]) {
        self.write(ConsoleLevel::Info, args);
    }

    fn records(&self, level: ConsoleLevel, args: &[Payload]) -> bool {
        self.levels.contains(&level) && args.first().is_some_and(|first| !first.is_sentinel())
    }
}

impl<C: Console> Console for ConsoleInterceptor<C> {
    fn write(&self, level: ConsoleLevel, args: &[Payload]) {
        if self.records(level, args) {
            let entry = LogEntry::new(LogKind::ConsoleError, join_args(args)).with_level(level);
            self.sink.capture(entry);
        }
        self.original.write(level, args);
    }
}

impl<C> Interceptor for ConsoleInterceptor<C> {
    fn kind(&self) -> InterceptorKind {
        InterceptorKind::Console
    }
}
