//! Timeout-bounded delivery of one report

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::client::Transport;

/// Outcome of sending one report to the collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Collector answered with a 2xx status
    Delivered,
    /// Collector answered with a non-success status
    Rejected(u16),
    /// The request could not be completed
    Failed(String),
    /// No answer within the request timeout; the request was dropped
    TimedOut,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Delivered => write!(f, "delivered"),
            Delivery::Rejected(status) => write!(f, "rejected with status {}", status),
            Delivery::Failed(reason) => write!(f, "failed: {}", reason),
            Delivery::TimedOut => write!(f, "timed out"),
        }
    }
}

/// POST `body` and classify the result. A zero `timeout` waits indefinitely.
pub async fn deliver(
    transport: Arc<dyn Transport>,
    url: &str,
    body: String,
    timeout: Duration,
) -> Delivery {
    let request = transport.post_form(url, body);

    let result = if timeout.is_zero() {
        request.await
    } else {
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => return Delivery::TimedOut,
        }
    };

    match result {
        Ok(status) if (200..300).contains(&status) => Delivery::Delivered,
        Ok(status) => Delivery::Rejected(status),
        Err(e) => Delivery::Failed(e.to_string()),
    }
}

/// An in-flight report.
///
/// Dropping the handle does not cancel the report; awaiting
/// [`ReportHandle::wait`] yields its outcome.
#[derive(Debug)]
pub struct ReportHandle {
    task: JoinHandle<Delivery>,
}

impl ReportHandle {
    pub(crate) fn new(task: JoinHandle<Delivery>) -> Self {
        Self { task }
    }

    pub async fn wait(self) -> Delivery {
        self.task
            .await
            .unwrap_or_else(|e| Delivery::Failed(format!("report task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::client::TransportFuture;
    use crate::error::Error;

    #[derive(Clone, Copy)]
    enum Reply {
        Status(u16),
        Refused,
        Hang,
    }

    struct StubTransport(Reply);

    impl Transport for StubTransport {
        fn post_form(&self, _url: &str, _body: String) -> TransportFuture {
            let reply = self.0;
            Box::pin(async move {
                match reply {
                    Reply::Status(status) => Ok(status),
                    Reply::Refused => Err(Error::Transport("connection refused".to_string())),
                    Reply::Hang => std::future::pending().await,
                }
            })
        }
    }

    async fn run(reply: Reply) -> Delivery {
        deliver(
            Arc::new(StubTransport(reply)),
            "https://collector.example.com",
            String::new(),
            Duration::from_millis(1000),
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_classifies_outcomes() {
        assert_eq!(run(Reply::Status(200)).await, Delivery::Delivered);
        assert_eq!(run(Reply::Status(204)).await, Delivery::Delivered);
        assert_eq!(run(Reply::Status(503)).await, Delivery::Rejected(503));
        assert!(matches!(run(Reply::Refused).await, Delivery::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        assert_eq!(run(Reply::Hang).await, Delivery::TimedOut);
    }
}
