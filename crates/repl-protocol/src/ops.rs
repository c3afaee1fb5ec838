//! Op name constants for the ops shipped with the server.
//!
//! Each constant is the exact string sent over the wire as the `op` field.
//! Third-party extensions may add any other op name.

/// Built-in op names, grouped by the extension that handles them.
pub struct Ops;

impl Ops {
    // ── Session lifecycle ───────────────────────────────────────────────
    pub const CLONE: &str = "clone";
    pub const CLOSE: &str = "close";
    pub const LS_SESSIONS: &str = "ls-sessions";
    pub const INTERRUPT: &str = "interrupt";

    // ── Introspection ───────────────────────────────────────────────────
    pub const DESCRIBE: &str = "describe";

    // ── Tooling ─────────────────────────────────────────────────────────
    pub const COMPLETIONS: &str = "completions";
    pub const IN_NS: &str = "in-ns";
}
