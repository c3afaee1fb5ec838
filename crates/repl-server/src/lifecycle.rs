//! Baseline session extension: `clone`, `close`, `ls-sessions`, `interrupt`.
//!
//! Present in every chain: the router registers it ahead of everything else
//! unless another extension already provides `clone`.

use repl_protocol::{Descriptor, OpDoc, Ops, Status};
use tracing::debug;

use crate::chain::Next;
use crate::extension::{Extension, OpError};
use crate::request::Request;

/// Id the baseline extension is registered under.
pub const SESSION_EXTENSION_ID: &str = "session";

#[derive(Debug, Default, Clone, Copy)]
pub struct SessionExtension;

impl SessionExtension {
    pub fn new() -> Self {
        Self
    }

    fn clone_session(&self, req: &Request) -> Result<(), OpError> {
        let id = req
            .sessions()
            .create(req.session_id())
            .map_err(|e| OpError::new(e.to_string()))?;
        req.send(
            req.response()
                .with_status([Status::DONE])
                .with_field("new-session", id),
        );
        Ok(())
    }

    fn close_session(&self, req: &Request) -> Result<(), OpError> {
        let id = req.session_id().ok_or_else(|| OpError::missing_param("session"))?;
        if req.sessions().close(id).is_err() {
            req.respond([Status::ERROR, Status::UNKNOWN_SESSION]);
            return Ok(());
        }
        let cancelled = req.in_flight().interrupt_session(Some(id), Some(req.message().id()));
        if cancelled > 0 {
            debug!("Closing session {id} interrupted {cancelled} message(s)");
        }
        req.done();
        Ok(())
    }

    fn list_sessions(&self, req: &Request) {
        req.send(
            req.response()
                .with_status([Status::DONE])
                .with_field("sessions", req.sessions().list()),
        );
    }

    fn interrupt(&self, req: &Request) -> Result<(), OpError> {
        let session = req.session_id();
        let status = match req.message().get_str("interrupt-id") {
            Some(target) if req.in_flight().interrupt(session, target) => vec![Status::DONE],
            Some(_) => vec![Status::DONE, Status::INTERRUPT_ID_MISMATCH],
            // Sessionless messages from every client share the `None` key.
            None if session.is_none() => return Err(OpError::missing_param("session")),
            None => {
                let own_id = Some(req.message().id());
                if req.in_flight().interrupt_session(session, own_id) > 0 {
                    vec![Status::DONE]
                } else {
                    vec![Status::DONE, Status::SESSION_IDLE]
                }
            }
        };
        req.respond(status);
        Ok(())
    }
}

impl Extension for SessionExtension {
    fn descriptor(&self) -> Descriptor {
        Descriptor::new()
            .handles(
                Ops::CLONE,
                OpDoc::new("Create a new session, copying the state of the message's session if it names one.")
                    .optional("session", "Session whose state is copied.")
                    .returns("new-session", "Id of the new session."),
            )
            .handles(
                Ops::CLOSE,
                OpDoc::new("Close a session and interrupt anything still running in it.")
                    .requires("session", "Session to close."),
            )
            .handles(
                Ops::LS_SESSIONS,
                OpDoc::new("List the ids of every open session.")
                    .returns("sessions", "Sorted list of session ids."),
            )
            .handles(
                Ops::INTERRUPT,
                OpDoc::new("Interrupt a message still being processed in a session.")
                    .optional("session", "Session the target message runs in.")
                    .optional(
                        "interrupt-id",
                        "Id of the message to interrupt. Without it every other in-flight message of the session is interrupted.",
                    ),
            )
    }

    async fn handle(&self, req: &mut Request, _next: Next<'_>) -> Result<(), OpError> {
        match req.op() {
            Ops::CLONE => self.clone_session(req)?,
            Ops::CLOSE => self.close_session(req)?,
            Ops::LS_SESSIONS => self.list_sessions(req),
            Ops::INTERRUPT => self.interrupt(req)?,
            other => return Err(OpError::new(format!("session extension cannot handle {other}"))),
        }
        Ok(())
    }
}
