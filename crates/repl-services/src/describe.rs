//! `describe`: reports the ops the running chain answers.

use repl_protocol::{Descriptor, OpDoc, Ops, Status};
use repl_server::{Extension, Next, OpError, Request};
use serde_json::{Map, Value, json};

use crate::namespace::CURRENT_NS_KEY;

pub struct DescribeExtension {
    version: String,
}

impl DescribeExtension {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Report `version` instead of this crate's own.
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl Default for DescribeExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for DescribeExtension {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new().expects(Ops::CLONE).handles(
            Ops::DESCRIBE,
            OpDoc::new("Describe the ops this server answers.")
                .optional("verbose?", "Include each op's documentation.")
                .returns("ops", "Map of op name to its documentation (empty unless verbose).")
                .returns("versions", "Server version information.")
                .returns("extensions", "Extension ids in chain order.")
                .returns("aux", "Session details such as the current namespace."),
        )
    }

    async fn handle(&self, req: &mut Request, _next: Next<'_>) -> Result<(), OpError> {
        let verbose = req.message().get_flag("verbose?");
        let chain = req.chain();

        let mut ops = Map::new();
        for (op, doc) in chain.ops() {
            let entry = if verbose {
                serde_json::to_value(doc).map_err(|e| OpError::new(e.to_string()))?
            } else {
                json!({})
            };
            ops.insert(op.to_string(), entry);
        }

        let extensions: Vec<Value> = chain.order().into_iter().map(Value::from).collect();

        let mut response = req
            .response()
            .with_status([Status::DONE])
            .with_field("ops", ops)
            .with_field(
                "versions",
                json!({ "ultra-repl": { "version-string": self.version } }),
            )
            .with_field("extensions", extensions);

        if let Some(ns) = req.session().get_str(CURRENT_NS_KEY) {
            response = response.with_field("aux", json!({ "current-ns": ns }));
        }

        req.send(response);
        Ok(())
    }
}
