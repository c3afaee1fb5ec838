//! Inbound request messages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An inbound request.
///
/// `id` and `op` are mandatory; a JSON object missing either one does not
/// deserialize into a `Message`. Everything else the client sends is kept in
/// `fields` and exposed read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session: Option<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Message {
    pub fn new(id: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            op: op.into(),
            session: None,
            fields: Map::new(),
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Parse a message from an already decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Op-specific field by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Op-specific field as a string, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Op-specific field interpreted as a flag. Accepts JSON booleans and the
    /// conventional `"true"` / `1` spellings.
    pub fn get_flag(&self, key: &str) -> bool {
        match self.fields.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}
