//! Response envelopes returned to the model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::call::CallId;

/// Outcome of a single call: exactly one of `output` or `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResponse {
    /// The plugin completed and produced a value.
    Output {
        /// Value returned by the plugin.
        output: Value,
    },
    /// The plugin failed; the message is forwarded to the model verbatim.
    Error {
        /// Descriptive failure message.
        error: String,
    },
}

impl ToolResponse {
    /// Wraps a successful result.
    #[must_use]
    pub fn output(output: Value) -> Self {
        Self::Output { output }
    }

    /// Wraps a failure message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Returns the output value for successful calls.
    #[must_use]
    pub fn as_output(&self) -> Option<&Value> {
        match self {
            Self::Output { output } => Some(output),
            Self::Error { .. } => None,
        }
    }

    /// Returns the error message for failed calls.
    #[must_use]
    pub fn as_error(&self) -> Option<&str> {
        match self {
            Self::Output { .. } => None,
            Self::Error { error } => Some(error),
        }
    }

    /// Returns `true` when the call failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// One entry of the envelope, keyed by the originating call id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// Correlation token copied from the request.
    pub id: CallId,
    /// Outcome of the call.
    pub response: ToolResponse,
}

/// Uniform wrapper sent back to the model after dispatch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// One entry per dispatched call.
    pub function_responses: Vec<FunctionResponse>,
}

impl ResponseEnvelope {
    /// Builds an envelope holding exactly one entry.
    #[must_use]
    pub fn single(id: CallId, response: ToolResponse) -> Self {
        Self {
            function_responses: vec![FunctionResponse { id, response }],
        }
    }

    /// Appends every entry of another envelope.
    pub fn extend(&mut self, other: ResponseEnvelope) {
        self.function_responses.extend(other.function_responses);
    }

    /// Returns the entries in order.
    #[must_use]
    pub fn responses(&self) -> &[FunctionResponse] {
        &self.function_responses
    }

    /// Returns the first entry, which is the only one for single dispatch.
    #[must_use]
    pub fn first(&self) -> Option<&FunctionResponse> {
        self.function_responses.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn envelope_wire_shape() {
        let envelope = ResponseEnvelope::single(
            CallId::new("a"),
            ToolResponse::output(json!({ "temperature": 25 })),
        );
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "functionResponses": [
                    { "id": "a", "response": { "output": { "temperature": 25 } } }
                ]
            })
        );

        let failed = ResponseEnvelope::single(CallId::new("b"), ToolResponse::error("boom"));
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({ "functionResponses": [ { "id": "b", "response": { "error": "boom" } } ] })
        );
    }

    #[test]
    fn exactly_one_outcome_is_populated() {
        let ok = ToolResponse::output(json!(1));
        assert!(ok.as_output().is_some() && ok.as_error().is_none());

        let err = ToolResponse::error("nope");
        assert!(err.as_output().is_none() && err.as_error() == Some("nope"));
        assert!(err.is_error());
    }

    #[test]
    fn decodes_error_entries() {
        let entry: FunctionResponse =
            serde_json::from_value(json!({ "id": "z", "response": { "error": "bad" } })).unwrap();
        assert_eq!(entry.response.as_error(), Some("bad"));
    }
}
