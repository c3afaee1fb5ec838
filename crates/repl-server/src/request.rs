//! The per-message context handed to each extension.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use repl_protocol::{Message, Response, Status};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::chain::HandlerChain;
use crate::extension::OpError;
use crate::interrupt::InFlight;
use crate::session::{Session, SessionStore};
use crate::sink::{ResponseSink, ResponseStream};

/// Everything an extension can see and touch while processing a message:
/// the message itself, its session, the response sink, the interruption
/// flag, and the server-wide session and in-flight registries.
pub struct Request {
    message: Message,
    session: Arc<Session>,
    sink: ResponseSink,
    interrupt: CancellationToken,
    sessions: Arc<SessionStore>,
    in_flight: Arc<InFlight>,
    chain: Arc<HandlerChain>,
    /// Set once a sink handle has left the handler call.
    detached: AtomicBool,
}

impl Request {
    pub(crate) fn new(
        message: Message,
        session: Arc<Session>,
        sink: ResponseSink,
        interrupt: CancellationToken,
        sessions: Arc<SessionStore>,
        in_flight: Arc<InFlight>,
        chain: Arc<HandlerChain>,
    ) -> Self {
        Self {
            message,
            session,
            sink,
            interrupt,
            sessions,
            in_flight,
            chain,
            detached: AtomicBool::new(false),
        }
    }

    /// A request outside any router: ephemeral session, empty registries,
    /// empty chain. Lets a single extension be driven directly.
    pub fn standalone(message: Message) -> (Self, ResponseStream) {
        let (sink, stream) = ResponseSink::channel(message.id(), message.session());
        let request = Self::new(
            message,
            Arc::new(Session::ephemeral()),
            sink,
            CancellationToken::new(),
            Arc::new(SessionStore::new()),
            Arc::new(InFlight::new()),
            Arc::new(HandlerChain::empty()),
        );
        (request, stream)
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn op(&self) -> &str {
        self.message.op()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Id of the session the message named; `None` when it runs in an
    /// ephemeral session.
    pub fn session_id(&self) -> Option<&str> {
        if self.session.is_ephemeral() {
            None
        } else {
            Some(self.session.id())
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// The chain this message is running through.
    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }

    /// A string parameter the op cannot do without.
    pub fn require_str(&self, param: &str) -> Result<&str, OpError> {
        self.message
            .get_str(param)
            .ok_or_else(|| OpError::missing_param(param))
    }

    // ── Responding ──────────────────────────────────────────────────────

    /// A blank response addressed to this message.
    pub fn response(&self) -> Response {
        self.sink.response()
    }

    pub fn send(&self, response: Response) {
        self.sink.send(response);
    }

    /// Send a response carrying only the given status tokens.
    pub fn respond<I, S>(&self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(self.response().with_status(tokens));
    }

    pub fn done(&self) {
        self.respond([Status::DONE]);
    }

    /// A handle on the sink for work that outlives the handler call.
    ///
    /// The chain then no longer expects a response before the handler
    /// returns.
    pub fn sink(&self) -> ResponseSink {
        self.detached.store(true, Ordering::Relaxed);
        self.sink.clone()
    }

    /// Responses sent for this message so far.
    pub fn responses_sent(&self) -> usize {
        self.sink.sent()
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed)
    }

    pub(crate) fn send_error(&self, error: &OpError) {
        let mut response = self
            .response()
            .with_field("err", error.message())
            .with_field("op", Value::String(self.op().to_string()));
        response.status.extend(error.status());
        self.send(response);
    }

    // ── Interruption ────────────────────────────────────────────────────

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Resolves once an `interrupt` targets this message.
    pub async fn interrupted(&self) {
        self.interrupt.cancelled().await;
    }

    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }
}
