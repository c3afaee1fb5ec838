//! The extension contract.
//!
//! An extension declares the ops it handles through a [`Descriptor`] and
//! processes messages given the rest of the chain as [`Next`]. It answers by
//! sending responses on the request; it returns nothing but an optional
//! error, which the chain turns into an error response at this boundary.

use std::future::Future;
use std::pin::Pin;

use repl_protocol::{Descriptor, Status};
use thiserror::Error;

use crate::chain::Next;
use crate::request::Request;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait implemented by every extension.
pub trait Extension: Send + Sync + 'static {
    /// What this extension handles and what must be composed ahead of it.
    /// Read once at registration.
    fn descriptor(&self) -> Descriptor;

    /// Whether the chain should also pass messages for ops this extension
    /// does not handle. Such extensions must forward those with
    /// `next.run(req)`.
    fn observes_all(&self) -> bool {
        false
    }

    /// Process one message.
    fn handle(
        &self,
        req: &mut Request,
        next: Next<'_>,
    ) -> impl Future<Output = Result<(), OpError>> + Send;
}

/// Object-safe version of [`Extension`]: all refs share lifetime `'a`.
pub(crate) trait ExtensionDyn: Send + Sync {
    fn handle_dyn<'a>(
        &'a self,
        req: &'a mut Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), OpError>>;
}

impl<T: Extension> ExtensionDyn for T {
    fn handle_dyn<'a>(
        &'a self,
        req: &'a mut Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), OpError>> {
        Box::pin(self.handle(req, next))
    }
}

/// A failure inside an extension while processing one message.
///
/// Converted into a single response carrying `status` and the message as
/// `err`; never propagated past the extension that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OpError {
    status: Status,
    message: String,
}

impl OpError {
    /// A generic handler failure: `{done, error, handler-error}`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: Status::of([Status::DONE, Status::ERROR, Status::HANDLER_ERROR]),
            message: message.into(),
        }
    }

    /// A required parameter is absent: `{done, error, missing-param}`.
    pub fn missing_param(param: &str) -> Self {
        Self {
            status: Status::of([Status::DONE, Status::ERROR, Status::MISSING_PARAM]),
            message: format!("missing required parameter: {param}"),
        }
    }

    /// Add a status token to the response this error becomes.
    pub fn with_status(mut self, token: impl Into<String>) -> Self {
        self.status.insert(token);
        self
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
