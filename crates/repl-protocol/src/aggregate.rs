//! Response aggregation for synchronous callers.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::CombineError;
use crate::response::Response;

/// Merge the responses emitted for one message into a single response.
///
/// - `status`: union of every status set.
/// - fields holding a list in more than one response: their lists
///   concatenated in input order; non-list values of such a field are dropped.
/// - every other field, and `session`: last value wins.
pub fn combine(responses: &[Response]) -> Result<Response, CombineError> {
    let first = responses.first().ok_or(CombineError::Empty)?;
    let mut merged = Response::new(first.id.clone());

    // How many inputs carry each field as a list; decides concat vs overwrite.
    let mut list_counts: HashMap<&str, usize> = HashMap::new();
    for response in responses {
        if response.id != first.id {
            return Err(CombineError::MismatchedId {
                expected: first.id.clone(),
                found: response.id.clone(),
            });
        }
        for (key, value) in &response.fields {
            if value.is_array() {
                *list_counts.entry(key.as_str()).or_default() += 1;
            }
        }
    }

    for response in responses {
        if response.session.is_some() {
            merged.session = response.session.clone();
        }
        merged.status.extend(&response.status);

        for (key, value) in &response.fields {
            let concat = list_counts.get(key.as_str()).is_some_and(|n| *n > 1);
            match (concat, value) {
                (true, Value::Array(items)) => match merged.fields.get_mut(key) {
                    Some(Value::Array(existing)) => existing.extend(items.iter().cloned()),
                    _ => {
                        merged.fields.insert(key.clone(), value.clone());
                    }
                },
                (true, _) => {}
                (false, _) => {
                    merged.fields.insert(key.clone(), value.clone());
                }
            }
        }
    }

    Ok(merged)
}
