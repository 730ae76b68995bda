//! Collector transport
//!
//! Everything that leaves the process goes through here:
//! - [`payload`] builds the form-encoded report and page-time bodies
//! - [`client`] defines the [`Transport`] seam and the `reqwest` implementation
//! - [`delivery`] bounds each send by the request timeout and classifies the outcome
//!
//! Failures never propagate to the caller. A report that is not confirmed
//! leaves the queue and its durable mirror untouched for the next attempt.
//!
//! ## Usage
//!
//! Point the agent at a collector in `~/.config/mirrorwatch/config.toml`:
//!
//! ```toml
//! [agent]
//! system_id = "storefront"
//! collector_url = "https://collector.example.com/report"
//! request_timeout_ms = 1000
//! ```

mod client;
mod delivery;
pub mod payload;

pub use client::{HttpTransport, Transport, TransportFuture};
pub use delivery::{deliver, Delivery, ReportHandle};
pub use payload::{PageTimePayload, ReportPayload};
