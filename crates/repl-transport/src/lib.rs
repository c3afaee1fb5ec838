//! REPL Transport Layer
//!
//! Carries protocol messages over WebSocket. The transport layer handles:
//! - Connection lifecycle (open, message, close)
//! - Decoding text frames into messages and encoding responses
//! - Connection limits and a health endpoint
//!
//! The transport is decoupled from the server logic via the `MessageHandler` trait.

pub mod server;

pub use server::{MessageHandler, TransportConfig, TransportServer, decode_frame};
