//! Core domain types for mirrorwatch
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **LogEntry** | One observed event, appended to the session queue and never edited |
//! | **Payload** | A value handed to an interceptor by the host (console argument, rejection reason) |
//! | **Flush** | Serializing the queue, transmitting it, and clearing it on confirmed delivery |
//! | **Durable mirror** | The write-through copy of the queue kept in a [`crate::store::LogStore`] |

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decycle::{decycle, GraphValue};

/// Maximum number of characters kept in a [`LogEntry`] message.
pub const MAX_MESSAGE_LEN: usize = 500;

/// First argument the agent passes to its own console output.
///
/// The console interceptor never records a call that starts with this marker,
/// so diagnostics emitted by the agent cannot feed back into the queue.
pub const AGENT_SENTINEL: &str = "[MirrorWatch]";

// ============================================
// Log entries
// ============================================

/// What kind of signal produced a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogKind {
    /// A recorded console call
    ConsoleError,
    /// An HTTP request that completed with status >= 400
    NetworkError,
    /// An uncaught script error
    JsError,
    /// A resource (img, script, link, media) that failed to load
    ResourceError,
    /// A promise rejection nobody handled
    UnhandledRejectionError,
    /// An error routed through the UI framework's error hook
    FrameworkError,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::ConsoleError => "console-error",
            LogKind::NetworkError => "network-error",
            LogKind::JsError => "js-error",
            LogKind::ResourceError => "resource-error",
            LogKind::UnhandledRejectionError => "unhandled-rejection-error",
            LogKind::FrameworkError => "framework-error",
        }
    }
}

impl std::str::FromStr for LogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "console-error" => Ok(LogKind::ConsoleError),
            "network-error" => Ok(LogKind::NetworkError),
            "js-error" => Ok(LogKind::JsError),
            "resource-error" => Ok(LogKind::ResourceError),
            "unhandled-rejection-error" => Ok(LogKind::UnhandledRejectionError),
            "framework-error" => Ok(LogKind::FrameworkError),
            _ => Err(format!("unknown log kind: {}", s)),
        }
    }
}

/// Console method a call went through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Error,
    Warn,
    Info,
}

impl ConsoleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleLevel::Error => "error",
            ConsoleLevel::Warn => "warn",
            ConsoleLevel::Info => "info",
        }
    }
}

/// One observed event.
///
/// Built with [`LogEntry::new`] plus the `with_*` helpers, then handed to the
/// agent. The message is truncated to [`MAX_MESSAGE_LEN`] characters on
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,

    pub message: String,

    /// Capture time, milliseconds since the epoch on the wire
    #[serde(with = "chrono::serde::ts_milliseconds", default = "now_millis")]
    pub created_time: DateTime<Utc>,

    /// Console level, for console entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<ConsoleLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, rename = "lineno", skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    #[serde(default, rename = "colno", skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl LogEntry {
    pub fn new(kind: LogKind, message: impl AsRef<str>) -> Self {
        Self {
            kind,
            message: truncate_message(message.as_ref()),
            created_time: now_millis(),
            level: None,
            filename: None,
            line: None,
            column: None,
        }
    }

    pub fn with_level(mut self, level: ConsoleLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Attach the script location an error originated from
    pub fn with_location(
        mut self,
        filename: impl Into<String>,
        line: Option<u32>,
        column: Option<u32>,
    ) -> Self {
        self.filename = Some(filename.into());
        self.line = line;
        self.column = column;
        self
    }
}

/// Current time at the millisecond precision entries are stored with
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Truncate to at most [`MAX_MESSAGE_LEN`] characters, on a char boundary.
pub fn truncate_message(message: &str) -> String {
    match message.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

// ============================================
// Payloads
// ============================================

/// A raised script error: name, message and the raw stack text, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ScriptError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name.is_empty(), self.message.is_empty()) {
            (_, true) => write!(f, "{}", self.name),
            (true, false) => write!(f, "{}", self.message),
            (false, false) => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

/// Anything the host hands to an interceptor.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Plain text
    Text(String),
    /// A structured error with an optional stack
    Error(ScriptError),
    /// An arbitrary, possibly cyclic, value
    Value(GraphValue),
}

impl Payload {
    /// Whether this is the agent's own sentinel marker
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Payload::Text(text) if text == AGENT_SENTINEL)
    }

    /// Render as message text: primitives as-is, structured values as decycled JSON.
    pub fn render(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Error(error) => serde_json::to_string(error).unwrap_or_else(|_| error.to_string()),
            Payload::Value(value) => match value {
                GraphValue::String(s) => s.clone(),
                GraphValue::Bool(b) => b.to_string(),
                GraphValue::Number(n) => n.to_string(),
                other => decycle(other).to_string(),
            },
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<ScriptError> for Payload {
    fn from(error: ScriptError) -> Self {
        Payload::Error(error)
    }
}

impl From<GraphValue> for Payload {
    fn from(value: GraphValue) -> Self {
        Payload::Value(value)
    }
}
