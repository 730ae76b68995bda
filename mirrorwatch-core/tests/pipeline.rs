//! End-to-end tests for the capture, persist and report pipeline
//!
//! Interceptors feed a real agent backed by a [`MemoryStore`] or a
//! [`FileStore`] in a temp dir; reports go to an in-process transport that
//! records every body it is handed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mirrorwatch_core::collector::TransportFuture;
use mirrorwatch_core::interceptors::{
    ElementTarget, ErrorEvent, ReadyState, RequestStatus, StateChangeHandler, TracingConsole,
};
use mirrorwatch_core::{
    Agent, AgentConfig, Delivery, Environment, FileStore, LogEntry, LogKind, LogStore,
    MemoryStore, PageContext, Transport,
};
use tempfile::TempDir;

/// Transport answering every request with a fixed status
struct RecordingTransport {
    status: u16,
    bodies: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn answering(status: u16) -> Arc<Self> {
        Arc::new(Self {
            status,
            bodies: Mutex::new(Vec::new()),
        })
    }

    fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    /// Entries carried by each report, decoded from the `logs` field
    fn reported_logs(&self) -> Vec<Vec<LogEntry>> {
        self.bodies()
            .iter()
            .map(|body| serde_json::from_str(&form_field(body, "logs").unwrap()).unwrap())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn post_form(&self, _url: &str, body: String) -> TransportFuture {
        self.bodies.lock().unwrap().push(body);
        let status = self.status;
        Box::pin(async move { Ok(status) })
    }
}

fn form_field(body: &str, name: &str) -> Option<String> {
    body.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| urlencoding::decode(value).unwrap().into_owned())
    })
}

fn config(system_id: &str) -> AgentConfig {
    AgentConfig {
        collector_url: Some("https://collector.example.com/report".to_string()),
        ..AgentConfig::for_system(system_id)
    }
}

fn build(config: AgentConfig, store: Arc<dyn LogStore>, transport: &Arc<RecordingTransport>) -> Agent {
    Agent::builder(config)
        .store(store)
        .transport(transport.clone())
        .page(PageContext::from_href("https://shop.example.com/checkout", "pipeline-test"))
        .build()
        .expect("agent should build inside a runtime")
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ============================================
// Scenarios
// ============================================

#[tokio::test(start_paused = true)]
async fn test_console_error_is_flushed_immediately() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::answering(200);
    let agent = build(
        AgentConfig {
            immediate_flush_threshold: 1,
            ..config("app1")
        },
        Arc::new(store.clone()),
        &transport,
    );

    let console = agent.intercept_console(TracingConsole).unwrap();
    console.error(&["boom".into()]);
    settle().await;

    let reports = transport.reported_logs();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].len(), 1);
    assert_eq!(reports[0][0].kind, LogKind::ConsoleError);
    assert!(reports[0][0].message.contains("boom"));

    assert_eq!(agent.pending_count(), 0);
    assert!(store.load("app1_Logs").unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_request_is_recorded() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::answering(200);
    let agent = build(config("app1"), Arc::new(store), &transport);

    let network = agent.intercept_network().unwrap();
    let mut request = network.open("POST", "https://api.example.com/orders", None);
    request.on_state_change(&RequestStatus::new(ReadyState::Loading, 500));
    request.on_state_change(&RequestStatus::new(ReadyState::Done, 500));

    let pending = agent.pending_logs();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, LogKind::NetworkError);
    assert!(pending[0].message.contains("POST"));
    assert!(pending[0].message.contains("https://api.example.com/orders"));
    assert!(pending[0].message.contains("500"));
}

#[tokio::test(start_paused = true)]
async fn test_image_load_failure_is_a_resource_error() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::answering(200);
    let agent = build(config("app1"), Arc::new(store), &transport);

    let errors = agent.intercept_errors().unwrap();
    errors.handle(&ErrorEvent::resource(ElementTarget::new(
        "IMG",
        "https://cdn.example.com/missing.png",
    )));

    let pending = agent.pending_logs();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, LogKind::ResourceError);
    assert!(pending[0].message.contains("img"));
    assert!(pending[0].message.contains("https://cdn.example.com/missing.png"));
    assert!(pending.iter().all(|entry| entry.kind != LogKind::JsError));
}

// ============================================
// Recovery
// ============================================

#[tokio::test(start_paused = true)]
async fn test_reload_recovers_queue_from_file_store() {
    let dir = TempDir::new().unwrap();
    let transport = RecordingTransport::answering(503);

    {
        let store = FileStore::open(dir.path()).unwrap();
        let agent = build(config("app1"), Arc::new(store), &transport);
        for i in 0..3 {
            agent.capture(LogEntry::new(LogKind::JsError, format!("before reload {}", i)));
        }
    }

    let store = FileStore::open(dir.path()).unwrap();
    let agent = build(config("app1"), Arc::new(store), &transport);

    let recovered = agent.pending_logs();
    assert_eq!(recovered.len(), 3);
    assert_eq!(recovered[0].message, "before reload 0");
    assert!(transport.bodies().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_local_environment_drops_oversized_queue() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::answering(200);
    let local = AgentConfig {
        environment: Environment::Local,
        immediate_flush_threshold: 1000,
        ..config("app1")
    };

    {
        let agent = build(local.clone(), Arc::new(store.clone()), &transport);
        for i in 0..101 {
            agent.capture(LogEntry::new(LogKind::ConsoleError, format!("noise {}", i)));
        }
    }

    let agent = build(local, Arc::new(store.clone()), &transport);
    assert_eq!(agent.pending_count(), 0);
    assert!(store.load("app1_Logs").unwrap().is_none());
}

// ============================================
// Reporter properties
// ============================================

#[tokio::test(start_paused = true)]
async fn test_burst_below_threshold_sends_one_report_after_last_capture() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::answering(200);
    let agent = build(config("app1"), Arc::new(store), &transport);
    let errors = agent.intercept_errors().unwrap();

    for i in 0..4 {
        errors.handle(&ErrorEvent {
            message: format!("tick {}", i),
            ..ErrorEvent::default()
        });
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    assert!(transport.bodies().is_empty());

    tokio::time::sleep(Duration::from_millis(2500)).await;
    settle().await;

    let reports = transport.reported_logs();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_report_keeps_queue_for_next_flush() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::answering(500);
    let agent = build(config("app1"), Arc::new(store.clone()), &transport);

    agent.capture(LogEntry::new(LogKind::UnhandledRejectionError, "lost"));
    let delivery = agent.report().unwrap().wait().await;

    assert_eq!(delivery, Delivery::Rejected(500));
    assert_eq!(agent.report_attempts(), 1);
    assert_eq!(agent.pending_count(), 1);
    assert!(store.load("app1_Logs").unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_budget_still_captures() {
    let store = MemoryStore::new();
    let transport = RecordingTransport::answering(500);
    let agent = build(
        AgentConfig {
            max_report_attempts: 1,
            immediate_flush_threshold: 1,
            ..config("app1")
        },
        Arc::new(store),
        &transport,
    );

    for i in 0..5 {
        agent.capture(LogEntry::new(LogKind::JsError, format!("error {}", i)));
        settle().await;
    }

    assert_eq!(transport.bodies().len(), 1);
    assert_eq!(agent.report_attempts(), 1);
    assert_eq!(agent.pending_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_cyclic_console_argument_reaches_collector() {
    use mirrorwatch_core::decycle::GraphValue;

    let store = MemoryStore::new();
    let transport = RecordingTransport::answering(200);
    let agent = build(
        AgentConfig {
            immediate_flush_threshold: 1,
            ..config("app1")
        },
        Arc::new(store),
        &transport,
    );
    let console = agent.intercept_console(TracingConsole).unwrap();

    let state = GraphValue::object();
    state.set("self", state.clone());
    console.error(&["state".into(), state.into()]);
    settle().await;

    let reports = transport.reported_logs();
    assert_eq!(reports[0][0].message, r#"state,{"self":{"$ref":"$"}}"#);
}
