//! REPL Server: composes extensions into a handler chain and routes
//! messages through it.
//!
//! Extensions are registered once, ordered by their declared op
//! dependencies, and composed into an immutable chain. The router owns the
//! chain, the session store and the in-flight registry, and implements
//! `MessageHandler` for the transport layer.

pub mod chain;
pub mod error;
pub mod extension;
pub mod interrupt;
pub mod lifecycle;
pub mod registry;
pub mod request;
pub mod resolver;
pub mod router;
pub mod session;
pub mod sink;

pub use chain::{HandlerChain, Next, Stage};
pub use error::{ChainError, SessionError};
pub use extension::{BoxFuture, Extension, OpError};
pub use interrupt::InFlight;
pub use lifecycle::{SESSION_EXTENSION_ID, SessionExtension};
pub use registry::ExtensionRegistry;
pub use request::Request;
pub use router::{Router, RouterBuilder, RouterConfig};
pub use session::{Session, SessionState, SessionStore};
pub use sink::{ResponseSink, ResponseStream};
