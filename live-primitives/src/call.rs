//! Inbound function call requests.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Opaque token correlating a call request with its response.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Wraps a caller supplied token.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random token for callers that must mint their own.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CallId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<CallId> for String {
    fn from(value: CallId) -> Self {
        value.0
    }
}

/// A model-issued request to run a named operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Externally supplied operation name (a registry key or an alias).
    pub name: String,
    /// Argument bag keyed by parameter name.
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Correlation token echoed in the response.
    pub id: CallId,
}

impl FunctionCall {
    /// Creates a call request.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Map<String, Value>, id: impl Into<CallId>) -> Self {
        Self {
            name: name.into(),
            args,
            id: id.into(),
        }
    }

    /// Creates a call request from a JSON value holding the arguments.
    ///
    /// Non-object values produce an empty argument bag.
    #[must_use]
    pub fn from_json(name: impl Into<String>, args: Value, id: impl Into<CallId>) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(name, args, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn decodes_call_without_args() {
        let call: FunctionCall =
            serde_json::from_value(json!({ "name": "web_search", "id": "c-1" })).unwrap();
        assert_eq!(call.name, "web_search");
        assert!(call.args.is_empty());
        assert_eq!(call.id.as_str(), "c-1");
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(CallId::random(), CallId::random());
    }

    #[test]
    fn from_json_ignores_non_objects() {
        let call = FunctionCall::from_json("noop", json!([1, 2]), "x");
        assert!(call.args.is_empty());
        assert_eq!(call.id.to_string(), "x");
    }
}
