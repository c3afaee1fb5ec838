//! REPL Tooling Extensions
//!
//! Each extension implements `repl_server::Extension` and declares its ops
//! through a descriptor. They are ordinary plug-ins: the server composes
//! them with the baseline session extension at startup.

pub mod completion;
pub mod describe;
pub mod namespace;

pub use completion::{CompletionExtension, CompletionStrategies, MatchFn};
pub use describe::DescribeExtension;
pub use namespace::{CURRENT_NS_KEY, InNsExtension, NamespaceIndex, Symbol, SymbolKind};
