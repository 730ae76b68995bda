//! # mirrorwatch-core
//!
//! Core library for mirrorwatch - a client-side error monitoring agent.
//!
//! This library provides:
//! - Interceptors for console calls, failed requests, uncaught errors,
//!   unhandled rejections, history navigation and UI framework errors
//! - A session queue mirrored into durable storage for crash/reload recovery
//! - Debounced, budgeted reporting to an HTTP collector
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Signals flow in one direction:
//! - **Interceptors** stand in front of host entry points and hand [`LogEntry`]
//!   values to a [`interceptors::LogSink`]
//! - **The agent** appends them to the queue, rewrites the durable mirror and
//!   applies the flush policy
//! - **The collector transport** sends the decycled queue and clears it once
//!   delivery is confirmed
//!
//! ## Example
//!
//! ```rust,no_run
//! use mirrorwatch_core::{Agent, Config, LogEntry, LogKind};
//!
//! # async fn run() -> mirrorwatch_core::Result<()> {
//! let config = Config::load()?;
//! let agent = Agent::init(config.agent)?;
//!
//! agent.capture(LogEntry::new(LogKind::JsError, "x is undefined"));
//! if let Some(report) = agent.report() {
//!     println!("{}", report.wait().await);
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use agent::{Agent, AgentBuilder};
pub use collector::{Delivery, ReportHandle, Transport};
pub use config::{AgentConfig, Config, Environment};
pub use error::{Error, Result};
pub use page::{PageContext, Visibility};
pub use store::{FileStore, LogStore, MemoryStore};
pub use types::*;

// Public modules
pub mod agent;
pub mod buffer;
pub mod collector;
pub mod config;
pub mod decycle;
pub mod error;
pub mod identity;
pub mod interceptors;
pub mod logging;
pub mod page;
pub mod stack;
pub mod store;
pub mod timing;
pub mod types;
