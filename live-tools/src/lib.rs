//! Function-calling dispatcher for conversational agents.
//!
//! Plugins implement [`plugin::ToolPlugin`] and are registered with a
//! [`registry::ToolManager`], which aggregates their declarations for the
//! model and routes incoming calls back to them. Plugin failures are folded
//! into the response envelope so a single misbehaving tool never aborts the
//! conversation loop.

#![warn(missing_docs, clippy::pedantic)]

pub mod builtin;
pub mod plugin;
pub mod registry;

mod http_client;

pub use builtin::BuiltinConfig;
pub use plugin::{Arguments, FnPlugin, PluginError, PluginResult, ToolPlugin};
pub use registry::{ToolError, ToolManager, ToolResult};
