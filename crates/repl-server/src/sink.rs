//! Response delivery for a single message.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use repl_protocol::Response;
use tokio::sync::mpsc;
use tracing::debug;

/// Sends responses for one message. Every response is stamped with the
/// message's `id` and `session`, whatever the caller put there.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    id: String,
    session: Option<String>,
    tx: mpsc::UnboundedSender<Response>,
    /// Shared by every clone.
    sent: Arc<AtomicUsize>,
}

impl ResponseSink {
    /// Create a sink and the stream its responses arrive on.
    pub fn channel(id: &str, session: Option<&str>) -> (Self, ResponseStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            id: id.to_string(),
            session: session.map(str::to_owned),
            tx,
            sent: Arc::new(AtomicUsize::new(0)),
        };
        (sink, ResponseStream { rx })
    }

    /// A blank response already addressed to this message.
    pub fn response(&self) -> Response {
        Response::new(self.id.clone()).with_session(self.session.clone())
    }

    pub fn send(&self, mut response: Response) {
        response.id.clone_from(&self.id);
        response.session.clone_from(&self.session);
        self.sent.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(response).is_err() {
            debug!("Response for {} dropped: receiver gone", self.id);
        }
    }

    /// Responses sent so far through this sink or any of its clones.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

/// Responses produced for one message, in emission order. The stream ends
/// once processing has finished and every sink clone is dropped.
#[derive(Debug)]
pub struct ResponseStream {
    rx: mpsc::UnboundedReceiver<Response>,
}

impl ResponseStream {
    pub async fn next(&mut self) -> Option<Response> {
        self.rx.recv().await
    }

    /// Wait for processing to finish and return every response.
    pub async fn collect(mut self) -> Vec<Response> {
        let mut responses = Vec::new();
        while let Some(response) = self.rx.recv().await {
            responses.push(response);
        }
        responses
    }

    pub fn into_inner(self) -> mpsc::UnboundedReceiver<Response> {
        self.rx
    }
}
