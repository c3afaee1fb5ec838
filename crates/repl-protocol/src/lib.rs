//! REPL Protocol - Wire Types
//!
//! Transport-agnostic types for the extensible REPL protocol: inbound
//! messages, outbound responses with their status sets, and the descriptors
//! extensions use to declare the operations they handle.
//! This crate is the single source of truth for op names and status tokens.

pub mod aggregate;
pub mod descriptor;
pub mod error;
pub mod message;
pub mod ops;
pub mod response;

pub use aggregate::combine;
pub use descriptor::{Descriptor, OpDoc};
pub use error::CombineError;
pub use message::Message;
pub use ops::Ops;
pub use response::{Response, Status};
