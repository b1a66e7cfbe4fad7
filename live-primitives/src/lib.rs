//! Core wire types shared between the tool dispatcher and its callers.
//!
//! The model negotiates capabilities through [`FunctionDeclaration`]s, sends
//! [`FunctionCall`]s, and receives a [`ResponseEnvelope`] per call.

#![warn(missing_docs, clippy::pedantic)]

mod call;
mod declaration;
mod error;
mod response;

/// Inbound call requests and their correlation identifiers.
pub use call::{CallId, FunctionCall};
/// Declaration schema advertised during capability negotiation.
pub use declaration::{
    DeclarationEntry, Declarations, FunctionDeclaration, FunctionDeclarationBuilder,
    ParameterSchema,
};
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Uniform success/error wrapper returned per call.
pub use response::{FunctionResponse, ResponseEnvelope, ToolResponse};
