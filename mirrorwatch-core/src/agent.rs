//! The agent: session state, flush policy and reporting
//!
//! An [`Agent`] is built once by the host and passed to whatever needs to
//! record errors. It owns the session queue (mirrored into a
//! [`LogStore`]), decides when to flush, and sends reports through a
//! [`Transport`] on the tokio runtime it was built on.
//!
//! ## Flush policy
//!
//! Every capture cancels the pending delayed flush, then either reports
//! immediately (queue at `immediate_flush_threshold`, or
//! `flush_on_every_capture`) or schedules a new delayed flush after
//! `delayed_flush_ms`. A burst of captures therefore produces one report,
//! `delayed_flush_ms` after the last of them.
//!
//! ## Failure model
//!
//! No public method returns an error or panics on agent faults. Storage and
//! transport problems are logged through `tracing` and the queue is kept for
//! the next flush. Every report spawned counts against
//! `max_report_attempts`, delivered or not.

use std::cell::Cell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::runtime::Handle;

use crate::buffer::{FlushTimer, LogBuffer};
use crate::collector::payload::{encode_logs, encode_times};
use crate::collector::{
    deliver, Delivery, HttpTransport, PageTimePayload, ReportHandle, ReportPayload, Transport,
};
use crate::config::{AgentConfig, Config};
use crate::error::{Error, Result};
use crate::identity::SessionId;
use crate::interceptors::{
    Console, ConsoleInterceptor, FrameworkPlugin, GlobalErrorInterceptor, History, HistoryEvent,
    HistoryInterceptor, Interceptor, InterceptorKind, LogSink, NetworkInterceptor,
    RejectionInterceptor,
};
use crate::page::{url_param, PageContext, Visibility};
use crate::store::{FileStore, LogStore};
use crate::timing::{NavigationTiming, PageTimings};
use crate::types::LogEntry;

thread_local! {
    static IN_AGENT: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside the agent.
///
/// A capture raised while the agent is already working on this thread (for
/// example a console call made by a `tracing` layer) is dropped instead of
/// deadlocking on the session state.
struct Reentry;

impl Reentry {
    fn enter() -> Option<Self> {
        IN_AGENT.with(|flag| (!flag.replace(true)).then_some(Reentry))
    }
}

impl Drop for Reentry {
    fn drop(&mut self) {
        IN_AGENT.with(|flag| flag.set(false));
    }
}

struct SessionState {
    /// `None` when the agent is inert
    buffer: Option<LogBuffer>,
    user_info: String,
    report_attempts: u32,
    /// Reports sent and not yet answered
    in_flight: u32,
    first_report_done: bool,
    timings: Option<PageTimings>,
    navigation: Option<NavigationTiming>,
    page: PageContext,
    timer: FlushTimer,
}

struct Inner {
    config: AgentConfig,
    session: SessionId,
    runtime: Handle,
    transport: Option<Arc<dyn Transport>>,
    state: Mutex<SessionState>,
    installed: Mutex<HashSet<InterceptorKind>>,
    warned_unconfigured: AtomicBool,
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    config: AgentConfig,
    store: Option<Arc<dyn LogStore>>,
    transport: Option<Arc<dyn Transport>>,
    page: PageContext,
    navigation: Option<NavigationTiming>,
    runtime: Option<Handle>,
}

impl AgentBuilder {
    /// Durable store for the queue mirror. Defaults to a [`FileStore`] in the data dir.
    pub fn store(mut self, store: Arc<dyn LogStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Transport for reports. Defaults to [`HttpTransport`] when a collector URL is set.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn page(mut self, page: PageContext) -> Self {
        self.page = page;
        self
    }

    pub fn navigation_timing(mut self, timing: NavigationTiming) -> Self {
        self.navigation = Some(timing);
        self
    }

    /// Runtime that timers and reports run on. Defaults to the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Agent> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()
                .map_err(|e| Error::Runtime(format!("no tokio runtime available: {}", e)))?,
        };

        let buffer = match self.config.storage_key() {
            Some(key) => {
                let store: Arc<dyn LogStore> = match self.store {
                    Some(store) => store,
                    None => Arc::new(FileStore::open(Config::data_dir())?),
                };
                Some(LogBuffer::recover(store, key, self.config.environment))
            }
            None => {
                tracing::warn!("agent.system_id is not set, agent stays inert");
                None
            }
        };

        let transport = match (self.transport, self.config.collector_url()) {
            (Some(transport), _) => Some(transport),
            (None, Some(_)) => {
                let http: Arc<dyn Transport> =
                    Arc::new(HttpTransport::new(self.config.request_timeout())?);
                Some(http)
            }
            (None, None) => None,
        };

        let session = SessionId::generate();
        tracing::debug!(
            session = %session,
            system_id = self.config.system_id().unwrap_or_default(),
            recovered = buffer.as_ref().map_or(0, LogBuffer::len),
            "Agent initialized"
        );

        let state = SessionState {
            buffer,
            user_info: String::new(),
            report_attempts: 0,
            in_flight: 0,
            first_report_done: false,
            timings: None,
            navigation: self.navigation,
            page: self.page,
            timer: FlushTimer::default(),
        };

        Ok(Agent {
            inner: Arc::new(Inner {
                config: self.config,
                session,
                runtime,
                transport,
                state: Mutex::new(state),
                installed: Mutex::new(HashSet::new()),
                warned_unconfigured: AtomicBool::new(false),
            }),
        })
    }
}

/// Handle to the error-monitoring agent. Clones share the same session.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<Inner>,
}

impl Agent {
    pub fn builder(config: AgentConfig) -> AgentBuilder {
        AgentBuilder {
            config,
            store: None,
            transport: None,
            page: PageContext::default(),
            navigation: None,
            runtime: None,
        }
    }

    /// Build an agent with the default store and transport on the current runtime
    pub fn init(config: AgentConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    // ============================================
    // Capture and flush
    // ============================================

    /// Append an entry to the queue and apply the flush policy
    pub fn capture(&self, entry: LogEntry) {
        let Some(_reentry) = Reentry::enter() else {
            return;
        };
        let mut state = self.lock_state();
        let Some(buffer) = state.buffer.as_mut() else {
            self.warn_unconfigured();
            return;
        };
        buffer.append(entry);
        self.apply_flush_policy(&mut state);
    }

    /// Flush the queue now.
    ///
    /// Returns `None` without sending anything when the agent is not
    /// configured to transmit or the report budget is spent. The returned
    /// handle may be dropped; the report still completes.
    pub fn report(&self) -> Option<ReportHandle> {
        let _reentry = Reentry::enter()?;
        let mut state = self.lock_state();
        self.report_locked(&mut state)
    }

    /// Flush outstanding entries when the page is hidden
    pub fn on_visibility_change(&self, visibility: Visibility) -> Option<ReportHandle> {
        if visibility != Visibility::Hidden {
            return None;
        }
        let _reentry = Reentry::enter()?;
        let mut state = self.lock_state();
        if state.buffer.as_ref().map_or(true, LogBuffer::is_empty) {
            return None;
        }
        state.timer.cancel();
        self.report_locked(&mut state)
    }

    fn apply_flush_policy(&self, state: &mut SessionState) {
        state.timer.cancel();

        let queued = state.buffer.as_ref().map_or(0, LogBuffer::len);
        let config = &self.inner.config;
        // While a report is outstanding the threshold waits for the delayed
        // flush, so a burst does not resend the same queue per capture.
        let over_threshold = queued >= config.immediate_flush_threshold && state.in_flight == 0;
        if config.flush_on_every_capture || over_threshold {
            self.report_locked(state);
            return;
        }

        let agent = Arc::downgrade(&self.inner);
        state
            .timer
            .schedule(&self.inner.runtime, config.delayed_flush(), move |generation| {
                if let Some(agent) = upgrade(&agent) {
                    agent.on_flush_timer(generation);
                }
            });
    }

    fn on_flush_timer(&self, generation: u64) {
        let Some(_reentry) = Reentry::enter() else {
            return;
        };
        let mut state = self.lock_state();
        if state.timer.claim(generation) {
            self.report_locked(&mut state);
        }
    }

    fn report_locked(&self, state: &mut SessionState) -> Option<ReportHandle> {
        let config = &self.inner.config;
        let (Some(system_id), Some(url), Some(transport)) = (
            config.system_id(),
            config.collector_url(),
            self.inner.transport.clone(),
        ) else {
            self.warn_unconfigured();
            return None;
        };

        if state.report_attempts >= config.max_report_attempts {
            tracing::debug!(
                attempts = state.report_attempts,
                "Report budget exhausted, keeping logs locally"
            );
            return None;
        }

        let buffer = state.buffer.as_ref()?;
        let watermark = buffer.watermark();
        let queued = buffer.len();
        let logs = match encode_logs(buffer.entries()) {
            Ok(logs) => logs,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode logs for report");
                return None;
            }
        };

        let times = if state.first_report_done {
            None
        } else {
            encode_times(&page_timings(state))
                .map_err(|e| tracing::warn!(error = %e, "Failed to encode page timings"))
                .ok()
        };

        let payload = ReportPayload {
            system_id: system_id.to_string(),
            client_origin: state.page.origin.clone(),
            client_href: state.page.href.clone(),
            logs,
            user_info: state.user_info.clone(),
            uuid: self.inner.session.to_string(),
            user_agent: state.page.user_agent.clone(),
            times,
        };

        state.report_attempts += 1;
        state.in_flight += 1;
        tracing::debug!(
            attempt = state.report_attempts,
            entries = queued,
            "Sending report"
        );

        let body = payload.to_form();
        let url = url.to_string();
        let timeout = config.request_timeout();
        let agent = Arc::downgrade(&self.inner);
        let task = self.inner.runtime.spawn(async move {
            let delivery = deliver(transport, &url, body, timeout).await;
            if let Some(agent) = upgrade(&agent) {
                agent.on_delivery(&delivery, watermark);
            }
            delivery
        });
        Some(ReportHandle::new(task))
    }

    fn on_delivery(&self, delivery: &Delivery, watermark: u64) {
        let Some(_reentry) = Reentry::enter() else {
            return;
        };
        let mut state = self.lock_state();
        state.in_flight = state.in_flight.saturating_sub(1);
        if !delivery.is_delivered() {
            tracing::warn!(outcome = %delivery, "Report not delivered, logs kept for the next flush");
            return;
        }
        if let Some(buffer) = state.buffer.as_mut() {
            buffer.acknowledge(watermark);
        }
        state.first_report_done = true;
    }

    // ============================================
    // Manual tagging and reports
    // ============================================

    /// Tag later reports with a user.
    ///
    /// Strings and numbers are kept as they are; anything else is stored as JSON.
    pub fn set_user(&self, user: impl Into<Value>) {
        let user_info = match user.into() {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        self.lock_state().user_info = user_info;
    }

    /// Send a standalone page-timing record.
    ///
    /// Does not touch the queue and does not count against `max_report_attempts`.
    pub fn report_page_time(&self, page_name: &str, duration_ms: u64) -> Option<ReportHandle> {
        let config = &self.inner.config;
        let (Some(system_id), Some(url), Some(transport)) = (
            config.system_id(),
            config.collector_url(),
            self.inner.transport.clone(),
        ) else {
            self.warn_unconfigured();
            return None;
        };

        let payload = {
            let state = self.lock_state();
            PageTimePayload {
                system_id: system_id.to_string(),
                client_origin: state.page.host().to_string(),
                client_href: state.page.path().to_string(),
                user_info: state.user_info.clone(),
                uuid: self.inner.session.to_string(),
                user_agent: state.page.user_agent.clone(),
                page_name: page_name.to_string(),
                page_time_ms: duration_ms,
            }
        };
        let body = match payload.to_form() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode page time");
                return None;
            }
        };

        let url = url.to_string();
        let timeout = config.request_timeout();
        let task = self.inner.runtime.spawn(async move {
            let delivery = deliver(transport, &url, body, timeout).await;
            if !delivery.is_delivered() {
                tracing::warn!(outcome = %delivery, "Page time not delivered");
            }
            delivery
        });
        Some(ReportHandle::new(task))
    }

    pub fn set_page(&self, page: PageContext) {
        self.lock_state().page = page;
    }

    /// Follow a navigation to `url` (absolute, or a path on the current origin)
    pub fn navigate(&self, url: &str) {
        self.lock_state().page.navigate(url);
    }

    /// Supply navigation timing marks. Ignored once timings have been computed.
    pub fn set_navigation_timing(&self, timing: NavigationTiming) {
        let mut state = self.lock_state();
        if state.timings.is_some() {
            tracing::debug!("Page timings already computed, ignoring new marks");
            return;
        }
        state.navigation = Some(timing);
    }

    // ============================================
    // Interceptor registration
    // ============================================

    /// Register an interceptor. Each kind is accepted once per agent;
    /// a repeat registration is refused and returns `None`.
    pub fn install<I: Interceptor>(&self, interceptor: I) -> Option<I> {
        let kind = interceptor.kind();
        let fresh = self
            .inner
            .installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
        if !fresh {
            tracing::warn!(kind = kind.as_str(), "Interceptor already installed");
            return None;
        }
        Some(interceptor)
    }

    pub fn is_installed(&self, kind: InterceptorKind) -> bool {
        self.inner
            .installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind)
    }

    /// This agent as a sink for interceptors built by hand
    pub fn sink(&self) -> Arc<dyn LogSink> {
        Arc::new(self.clone())
    }

    pub fn intercept_console<C: Console>(&self, original: C) -> Option<ConsoleInterceptor<C>> {
        let levels = &self.inner.config.console_levels;
        self.install(ConsoleInterceptor::new(self.sink(), original, levels))
    }

    pub fn intercept_network(&self) -> Option<NetworkInterceptor> {
        self.install(NetworkInterceptor::new(self.sink()))
    }

    pub fn intercept_errors(&self) -> Option<GlobalErrorInterceptor> {
        self.install(GlobalErrorInterceptor::new(self.sink()))
    }

    pub fn intercept_rejections(&self) -> Option<RejectionInterceptor> {
        self.install(RejectionInterceptor::new(self.sink()))
    }

    /// Wrap the host history; navigations also move this agent's page context
    pub fn intercept_history<H: History>(&self, original: H) -> Option<HistoryInterceptor<H>> {
        let mut history = self.install(HistoryInterceptor::new(original))?;
        let agent = Arc::downgrade(&self.inner);
        history.subscribe(Box::new(move |event: &HistoryEvent| {
            if let (Some(agent), Some(url)) = (upgrade(&agent), event.url()) {
                agent.navigate(url);
            }
        }));
        Some(history)
    }

    /// Plugin for the UI framework; enables devtools when the page URL has `devtools`
    pub fn framework_plugin(&self) -> Option<FrameworkPlugin> {
        let devtools = !url_param(&self.lock_state().page.href, "devtools").is_empty();
        self.install(FrameworkPlugin::new(self.sink(), devtools))
    }

    // ============================================
    // Inspection
    // ============================================

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session
    }

    /// Whether the agent lacks a system id and records nothing
    pub fn is_inert(&self) -> bool {
        self.lock_state().buffer.is_none()
    }

    pub fn pending_logs(&self) -> Vec<LogEntry> {
        self.lock_state()
            .buffer
            .as_ref()
            .map(|buffer| buffer.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.lock_state().buffer.as_ref().map_or(0, LogBuffer::len)
    }

    pub fn report_attempts(&self) -> u32 {
        self.lock_state().report_attempts
    }

    pub fn has_pending_flush(&self) -> bool {
        self.lock_state().timer.is_pending()
    }

    pub fn user_info(&self) -> String {
        self.lock_state().user_info.clone()
    }

    pub fn page(&self) -> PageContext {
        self.lock_state().page.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn warn_unconfigured(&self) {
        if !self.inner.warned_unconfigured.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                system_id = self.inner.config.system_id().is_some(),
                collector_url = self.inner.config.collector_url().is_some(),
                "Agent is not configured to report, logs stay local"
            );
        }
    }
}

impl LogSink for Agent {
    fn capture(&self, entry: LogEntry) {
        Agent::capture(self, entry);
    }
}

fn upgrade(inner: &Weak<Inner>) -> Option<Agent> {
    inner.upgrade().map(|inner| Agent { inner })
}

/// Timings for the session, computed on first use
fn page_timings(state: &mut SessionState) -> PageTimings {
    if let Some(timings) = state.timings {
        return timings;
    }
    let timings = state
        .navigation
        .as_ref()
        .map(PageTimings::from_navigation)
        .unwrap_or_default();
    state.timings = Some(timings);
    timings
}
