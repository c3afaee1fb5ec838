//! Message Router: admits messages, resolves sessions, runs the chain.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use repl_protocol::{Message, Ops, Response, Status};
use repl_transport::MessageHandler;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::chain::HandlerChain;
use crate::error::ChainError;
use crate::extension::Extension;
use crate::interrupt::InFlight;
use crate::lifecycle::{SESSION_EXTENSION_ID, SessionExtension};
use crate::registry::ExtensionRegistry;
use crate::request::Request;
use crate::session::{Session, SessionStore};
use crate::sink::{ResponseSink, ResponseStream};

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Ops that skip the per-session execution order so they can reach a
    /// message that is still running.
    pub unsequenced_ops: BTreeSet<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            unsequenced_ops: [Ops::INTERRUPT, Ops::CLOSE].into_iter().map(String::from).collect(),
        }
    }
}

/// Collects extensions and builds a [`Router`].
///
/// Registration errors are kept and reported by [`build`](Self::build), so
/// a failed setup never yields a router.
#[derive(Default)]
pub struct RouterBuilder {
    registry: ExtensionRegistry,
    config: RouterConfig,
    error: Option<ChainError>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn extension<E: Extension>(mut self, id: impl Into<String>, extension: E) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.registry.register(id, extension) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn build(self) -> Result<Router, ChainError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let chain = compose(self.registry)?;
        Ok(Router {
            inner: Arc::new(RouterInner {
                chain: RwLock::new(Arc::new(chain)),
                sessions: Arc::new(SessionStore::new()),
                in_flight: Arc::new(InFlight::new()),
                config: self.config,
                shut_down: AtomicBool::new(false),
            }),
        })
    }
}

/// Add the baseline session extension when nothing provides `clone`, then
/// resolve and build the chain.
fn compose(mut registry: ExtensionRegistry) -> Result<HandlerChain, ChainError> {
    if registry.provider(Ops::CLONE).is_none() {
        registry.register_first(SESSION_EXTENSION_ID, SessionExtension::new())?;
    }
    HandlerChain::build(registry)
}

struct RouterInner {
    chain: RwLock<Arc<HandlerChain>>,
    sessions: Arc<SessionStore>,
    in_flight: Arc<InFlight>,
    config: RouterConfig,
    shut_down: AtomicBool,
}

/// Routes inbound messages through the handler chain. Cheap to clone.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Admit one message and return the stream its responses arrive on.
    ///
    /// Admission is synchronous: messages for the same session run in the
    /// order `dispatch` was called for them. Must be called from within a
    /// Tokio runtime.
    pub fn dispatch(&self, message: Message) -> ResponseStream {
        let (sink, stream) = ResponseSink::channel(message.id(), message.session());

        if self.inner.shut_down.load(Ordering::Acquire) {
            sink.send(sink.response().with_status([Status::ERROR, Status::SHUTTING_DOWN]));
            return stream;
        }

        let session = match message.session() {
            Some(id) => match self.inner.sessions.get(id) {
                Ok(session) => session,
                Err(e) => {
                    debug!("Rejected {} ({}): {e}", message.id(), message.op());
                    sink.send(sink.response().with_status([Status::ERROR, Status::UNKNOWN_SESSION]));
                    return stream;
                }
            },
            None => Arc::new(Session::ephemeral()),
        };

        let chain = self.chain();
        let guard = self.inner.in_flight.register(message.session(), message.id());
        let turn = if self.inner.config.unsequenced_ops.contains(message.op()) {
            None
        } else {
            Some(session.take_turn())
        };

        debug!("Dispatching {} ({}) session={:?}", message.id(), message.op(), message.session());

        let mut request = Request::new(
            message,
            session,
            sink,
            guard.token(),
            self.inner.sessions.clone(),
            self.inner.in_flight.clone(),
            chain.clone(),
        );

        tokio::spawn(async move {
            let _right = match turn {
                Some(turn) => Some(turn.acquire().await),
                None => None,
            };

            if request.is_interrupted() {
                request.respond([Status::DONE, Status::INTERRUPTED]);
            } else {
                chain.execute(&mut request).await;
            }
            drop(guard);
        });

        stream
    }

    /// Dispatch a message and wait for every response it produces.
    pub async fn request(&self, message: Message) -> Vec<Response> {
        self.dispatch(message).collect().await
    }

    /// The chain new messages are dispatched to.
    pub fn chain(&self) -> Arc<HandlerChain> {
        self.inner.chain.read().clone()
    }

    /// Replace the chain with one built from `registry`. Messages already
    /// admitted finish on the chain they started with. On error the current
    /// chain stays in place.
    pub fn reload(&self, registry: ExtensionRegistry) -> Result<(), ChainError> {
        let chain = compose(registry)?;
        info!("Handler chain reloaded: [{}]", chain.order().join(", "));
        *self.inner.chain.write() = Arc::new(chain);
        Ok(())
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.inner.in_flight
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    /// Interrupt everything in flight, close every session and reject any
    /// further message.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down router...");
        let interrupted = self.inner.in_flight.cancel_all();
        let closed = self.inner.sessions.close_all();
        info!("Router shutdown complete ({interrupted} interrupted, {closed} session(s) closed)");
    }
}

impl MessageHandler for Router {
    fn dispatch(&self, message: Message) -> mpsc::UnboundedReceiver<Response> {
        Router::dispatch(self, message).into_inner()
    }
}
