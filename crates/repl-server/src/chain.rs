//! Handler chain: resolved extensions composed into one dispatch pipeline.
//!
//! The chain is an explicit list of stages in resolved order; the first
//! stage is the outermost. [`Next`] is the cursor an extension receives to
//! hand a message further down. When no stage is left the terminal handler
//! answers `{error, unknown-op}`.
//!
//! A stage is only entered for ops it handles, or for every op if it
//! observes all traffic. An op handled by exactly one extension therefore
//! always reaches it, unless an observing stage above swallows it; that
//! case still answers `{done, error, handler-error}`.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use repl_protocol::{Descriptor, OpDoc, Status};
use tracing::{debug, info, warn};

use crate::error::ChainError;
use crate::extension::{BoxFuture, ExtensionDyn, OpError};
use crate::registry::ExtensionRegistry;
use crate::request::Request;
use crate::resolver;

/// One composed extension.
pub struct Stage {
    id: String,
    descriptor: Descriptor,
    observes_all: bool,
    extension: Arc<dyn ExtensionDyn>,
}

impl Stage {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn observes_all(&self) -> bool {
        self.observes_all
    }

    /// Whether a message for `op` enters this stage.
    pub fn accepts(&self, op: &str) -> bool {
        self.observes_all || self.descriptor.handles_op(op)
    }

    /// Run this stage's extension, converting an error or panic into an
    /// error response so nothing escapes the extension boundary.
    ///
    /// A stage that returns without responding, forwarding, or detaching
    /// the sink also gets an error response, so the message always
    /// produces at least one.
    fn invoke<'a>(&'a self, req: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let sent_before = req.responses_sent();
            let outcome = AssertUnwindSafe(self.extension.handle_dyn(&mut *req, next))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {
                    if req.responses_sent() == sent_before && !req.is_detached() {
                        warn!("Extension {} returned on {} without responding", self.id, req.op());
                        req.send_error(&OpError::new("extension returned without responding"));
                    }
                }
                Ok(Err(error)) => {
                    warn!("Extension {} failed on {}: {error}", self.id, req.op());
                    req.send_error(&error);
                }
                Err(payload) => {
                    let message = panic_message(&*payload);
                    warn!("Extension {} panicked on {}: {message}", self.id, req.op());
                    req.send_error(&OpError::new(message));
                }
            }
        })
    }
}

/// The fully composed, immutable dispatch pipeline.
pub struct HandlerChain {
    stages: Vec<Stage>,
    /// op → index of the stage handling it
    providers: HashMap<String, usize>,
}

impl HandlerChain {
    /// Resolve the registry's extensions and compose them.
    ///
    /// Fails without building anything on a missing dependency or a cycle.
    pub fn build(registry: ExtensionRegistry) -> Result<Self, ChainError> {
        let order = resolver::resolve(registry.all())?;

        let mut entries: Vec<Option<_>> = registry.into_entries().into_iter().map(Some).collect();
        let mut stages = Vec::with_capacity(order.len());
        for index in order {
            if let Some(entry) = entries[index].take() {
                stages.push(Stage {
                    id: entry.id,
                    descriptor: entry.descriptor,
                    observes_all: entry.observes_all,
                    extension: entry.extension,
                });
            }
        }

        let chain = Self::from_stages(stages);
        info!("Handler chain built: [{}]", chain.order().join(", "));
        Ok(chain)
    }

    /// A chain with only the terminal handler.
    pub fn empty() -> Self {
        Self::from_stages(Vec::new())
    }

    fn from_stages(stages: Vec<Stage>) -> Self {
        let mut providers = HashMap::new();
        for (index, stage) in stages.iter().enumerate() {
            for op in stage.descriptor.ops() {
                providers.insert(op.to_string(), index);
            }
        }
        Self { stages, providers }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Extension ids, outermost first.
    pub fn order(&self) -> Vec<&str> {
        self.stages.iter().map(Stage::id).collect()
    }

    /// Id of the extension handling `op`.
    pub fn provider(&self, op: &str) -> Option<&str> {
        self.providers.get(op).map(|&i| self.stages[i].id())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = (&str, &Descriptor)> {
        self.stages.iter().map(|s| (s.id(), s.descriptor()))
    }

    /// Every op the chain answers, with its documentation.
    pub fn ops(&self) -> BTreeMap<&str, &OpDoc> {
        self.stages
            .iter()
            .flat_map(|s| s.descriptor.handles.iter())
            .map(|(op, doc)| (op.as_str(), doc))
            .collect()
    }

    /// Cursor at the outermost stage.
    pub fn head(&self) -> Next<'_> {
        Next {
            stages: &self.stages,
        }
    }

    /// Cursor starting at stage `index`, for driving the chain stage by stage.
    pub fn from_stage(&self, index: usize) -> Next<'_> {
        Next {
            stages: self.stages.get(index..).unwrap_or(&[]),
        }
    }

    /// Run a message through the whole chain.
    pub async fn execute(&self, req: &mut Request) {
        self.head().run(req).await;
    }
}

/// The remainder of the chain below the current stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Stage],
}

impl<'a> Next<'a> {
    /// Pass the message to the next stage that accepts its op, or to the
    /// terminal handler when none does.
    pub fn run<'r>(self, req: &'r mut Request) -> BoxFuture<'r, ()>
    where
        'a: 'r,
    {
        let op = req.op();
        let Some(position) = self.stages.iter().position(|s| s.accepts(op)) else {
            debug!("No extension handles op {op}");
            unknown_op(req);
            return Box::pin(std::future::ready(()));
        };

        let stage = &self.stages[position];
        let rest = Next {
            stages: &self.stages[position + 1..],
        };
        stage.invoke(req, rest)
    }

    /// Stages left below this point, terminal handler excluded.
    pub fn remaining(&self) -> usize {
        self.stages.len()
    }
}

/// Terminal handler: exactly one `{error, unknown-op}` response.
fn unknown_op(req: &Request) {
    let response = req
        .response()
        .with_status([Status::ERROR, Status::UNKNOWN_OP])
        .with_field("op", req.op());
    req.send(response);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "extension panicked".to_string()
    }
}
