//! In-memory log queue with a write-through durable mirror
//!
//! [`LogBuffer`] owns the session's queue. Every append rewrites the full
//! queue into the [`LogStore`]; storage failures (quota, IO) are logged and
//! swallowed so capture never fails. [`FlushTimer`] is the single slot for
//! the debounced delayed flush.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::{Environment, LOCAL_RECOVERY_CEILING};
use crate::store::LogStore;
use crate::types::LogEntry;

/// The session's queue of captured entries
pub struct LogBuffer {
    entries: Vec<LogEntry>,
    /// Entries acknowledged over the buffer's lifetime
    acknowledged: u64,
    store: Arc<dyn LogStore>,
    key: String,
}

impl LogBuffer {
    /// Start a buffer, replaying whatever a previous session left under `key`.
    ///
    /// In local/test environments a recovered queue longer than
    /// [`LOCAL_RECOVERY_CEILING`] is discarded instead of replayed.
    pub fn recover(store: Arc<dyn LogStore>, key: String, environment: Environment) -> Self {
        let mut buffer = Self {
            entries: Vec::new(),
            acknowledged: 0,
            store,
            key,
        };

        let raw = match buffer.store.load(&buffer.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return buffer,
            Err(e) => {
                tracing::warn!(key = %buffer.key, error = %e, "Failed to read persisted logs");
                return buffer;
            }
        };

        let recovered: Vec<LogEntry> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(key = %buffer.key, error = %e, "Ignoring unreadable persisted logs");
                return buffer;
            }
        };

        if environment.limits_recovery() && recovered.len() > LOCAL_RECOVERY_CEILING {
            tracing::info!(
                key = %buffer.key,
                count = recovered.len(),
                "Discarding oversized persisted queue"
            );
            if let Err(e) = buffer.store.remove(&buffer.key) {
                tracing::warn!(key = %buffer.key, error = %e, "Failed to clear persisted logs");
            }
            return buffer;
        }

        tracing::debug!(key = %buffer.key, count = recovered.len(), "Recovered persisted logs");
        buffer.entries = recovered;
        buffer
    }

    /// Append an entry and persist the full queue
    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
        self.persist();
    }

    /// Position just past the newest entry, counted over the buffer's lifetime.
    ///
    /// A report remembers the watermark it was built at and hands it back to
    /// [`LogBuffer::acknowledge`] once delivered.
    pub fn watermark(&self) -> u64 {
        self.acknowledged + self.entries.len() as u64
    }

    /// Drop every entry below `watermark` after a confirmed flush.
    ///
    /// Entries captured while the report was in flight stay queued, and an
    /// older report confirming late never drops more than it carried. The
    /// mirror is removed when nothing is left.
    pub fn acknowledge(&mut self, watermark: u64) {
        let delivered = watermark.saturating_sub(self.acknowledged);
        let delivered = (delivered as usize).min(self.entries.len());
        if delivered == 0 {
            return;
        }
        self.entries.drain(..delivered);
        self.acknowledged += delivered as u64;

        if self.entries.is_empty() {
            if let Err(e) = self.store.remove(&self.key) {
                tracing::warn!(key = %self.key, error = %e, "Failed to clear persisted logs");
            }
        } else {
            self.persist();
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.entries)
            .map_err(crate::error::Error::from)
            .and_then(|json| self.store.save(&self.key, &json));

        if let Err(e) = result {
            tracing::warn!(key = %self.key, error = %e, "Failed to persist logs");
        }
    }
}

/// Single-slot handle for the delayed flush.
///
/// Scheduling always cancels the previous timer first, so at most one is
/// outstanding. Each schedule gets a new generation; a timer that fires
/// after being replaced fails [`FlushTimer::claim`] and does nothing.
#[derive(Debug, Default)]
pub struct FlushTimer {
    pending: Option<JoinHandle<()>>,
    generation: u64,
}

impl FlushTimer {
    /// Cancel any pending timer and run `on_fire` after `delay`
    pub fn schedule<F>(&mut self, runtime: &Handle, delay: Duration, on_fire: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;

        self.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(generation);
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Take the slot for a timer that just fired; false if it was replaced or cancelled
    pub fn claim(&mut self, generation: u64) -> bool {
        if self.pending.is_some() && generation == self.generation {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
