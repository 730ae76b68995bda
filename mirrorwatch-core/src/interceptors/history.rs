//! Session history interception
//!
//! Wraps the host's history so each navigation also notifies subscribers
//! with the original arguments. Nothing is recorded here; route observers
//! subscribe to the events.

use serde_json::Value;

use super::{Interceptor, InterceptorKind};

/// The host's session history
pub trait History: Send {
    fn push_state(&mut self, state: &Value, title: &str, url: Option<&str>);
    fn replace_state(&mut self, state: &Value, title: &str, url: Option<&str>);
    fn go(&mut self, delta: i32);
}

/// A navigation, carrying the arguments it was made with
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    PushState {
        state: Value,
        title: String,
        url: Option<String>,
    },
    ReplaceState {
        state: Value,
        title: String,
        url: Option<String>,
    },
    Go {
        delta: i32,
    },
}

impl HistoryEvent {
    /// Event name dispatched to subscribers
    pub fn name(&self) -> &'static str {
        match self {
            HistoryEvent::PushState { .. } => "pushState",
            HistoryEvent::ReplaceState { .. } => "replaceState",
            HistoryEvent::Go { .. } => "go",
        }
    }

    /// Target URL, when the navigation named one
    pub fn url(&self) -> Option<&str> {
        match self {
            HistoryEvent::PushState { url, .. } | HistoryEvent::ReplaceState { url, .. } => {
                url.as_deref()
            }
            HistoryEvent::Go { .. } => None,
        }
    }
}

pub type HistoryListener = Box<dyn Fn(&HistoryEvent) + Send + Sync>;

pub struct HistoryInterceptor<H> {
    original: H,
    listeners: Vec<HistoryListener>,
}

impl<H: History> HistoryInterceptor<H> {
    pub fn new(original: H) -> Self {
        Self {
            original,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: HistoryListener) {
        self.listeners.push(listener);
    }

    /// Unwrap the original history
    pub fn into_inner(self) -> H {
        self.original
    }

    fn dispatch(&self, event: HistoryEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }
}

impl<H: History> History for HistoryInterceptor<H> {
    fn push_state(&mut self, state: &Value, title: &str, url: Option<&str>) {
        self.original.push_state(state, title, url);
        self.dispatch(HistoryEvent::PushState {
            state: state.clone(),
            title: title.to_string(),
            url: url.map(str::to_string),
        });
    }

    fn replace_state(&mut self, state: &Value, title: &str, url: Option<&str>) {
        self.original.replace_state(state, title, url);
        self.dispatch(HistoryEvent::ReplaceState {
            state: state.clone(),
            title: title.to_string(),
            url: url.map(str::to_string),
        });
    }

    fn go(&mut self, delta: i32) {
        self.original.go(delta);
        self.dispatch(HistoryEvent::Go { delta });
    }
}

impl<H> Interceptor for HistoryInterceptor<H> {
    fn kind(&self) -> InterceptorKind {
        InterceptorKind::History
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct StackHistory {
        entries: Vec<String>,
        index: i32,
    }

    impl History for StackHistory {
        fn push_state(&mut self, _state: &Value, _title: &str, url: Option<&str>) {
            self.entries.push(url.unwrap_or_default().to_string());
            self.index = self.entries.len() as i32 - 1;
        }

        fn replace_state(&mut self, _state: &Value, _title: &str, url: Option<&str>) {
            if let Some(last) = self.entries.last_mut() {
                *last = url.unwrap_or_default().to_string();
            }
        }

        fn go(&mut self, delta: i32) {
            self.index += delta;
        }
    }

    #[test]
    fn test_navigation_reaches_original_and_listeners() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut history = HistoryInterceptor::new(StackHistory::default());

        let recorder = seen.clone();
        history.subscribe(Box::new(move |event: &HistoryEvent| {
            recorder
                .lock()
                .unwrap()
                .push((event.name(), event.url().map(str::to_string)));
        }));

        history.push_state(&json!({"step": 1}), "", Some("/a"));
        history.push_state(&Value::Null, "", Some("/b"));
        history.replace_state(&Value::Null, "", Some("/c"));
        history.go(-1);

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[
                ("pushState", Some("/a".to_string())),
                ("pushState", Some("/b".to_string())),
                ("replaceState", Some("/c".to_string())),
                ("go", None),
            ]
        );

        let original = history.into_inner();
        assert_eq!(original.entries, vec!["/a", "/c"]);
        assert_eq!(original.index, 0);
    }

    #[test]
    fn test_event_carries_original_arguments() {
        let seen = Arc::new(Mutex::new(None));
        let mut history = HistoryInterceptor::new(StackHistory::default());

        let recorder = seen.clone();
        history.subscribe(Box::new(move |event: &HistoryEvent| {
            *recorder.lock().unwrap() = Some(event.clone());
        }));
        history.push_state(&json!({"id": 9}), "Order", Some("/orders/9"));

        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(HistoryEvent::PushState {
                state: json!({"id": 9}),
                title: "Order".to_string(),
                url: Some("/orders/9".to_string()),
            })
        );
    }
}
