//! Capability contract implemented by every tool plugin.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use live_primitives::Declarations;
use serde_json::{Map, Value};
use thiserror::Error;

/// Result alias for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Future alias produced by function-backed plugins.
pub type PluginFuture = Pin<Box<dyn Future<Output = PluginResult<Value>> + Send>>;

/// Trait implemented by tool plugins.
///
/// A plugin describes the operations it exposes and executes calls routed to
/// it. Side effects are the plugin's own business; the dispatcher only sees
/// success or failure.
#[async_trait]
pub trait ToolPlugin: Send + Sync {
    /// Returns the declaration(s) advertised to the model.
    ///
    /// Must be free of side effects. Failures and empty sequences cause the
    /// plugin to be left out of the declaration aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Describe`] when the plugin cannot produce its
    /// schema.
    fn describe(&self) -> PluginResult<Declarations>;

    /// Executes the plugin with the supplied arguments.
    ///
    /// # Errors
    ///
    /// Returns a [`PluginError`] when arguments are missing or malformed or a
    /// downstream collaborator fails.
    async fn execute(&self, args: Arguments) -> PluginResult<Value>;

    /// Extra external operation names that route to this plugin's registry
    /// key.
    ///
    /// The registry always routes the names of the declarations returned by
    /// `describe` at registration time; this hook adds names on top of those.
    /// A plugin whose `describe` fails during registration gets only these
    /// extras, so its declared names stay unroutable until bound with
    /// [`ToolManager::register_alias`](crate::ToolManager::register_alias).
    fn aliases(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Argument bag supplied with a call request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    /// Wraps a JSON object.
    #[must_use]
    pub fn new(args: Map<String, Value>) -> Self {
        Self(args)
    }

    /// Returns the raw value for `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a required, non-blank string argument.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MissingArgument`] when the value is absent, null,
    /// or blank and [`PluginError::InvalidArgument`] when it is not a string.
    pub fn require_str(&self, name: &str) -> PluginResult<&str> {
        self.optional_str(name)?
            .ok_or_else(|| PluginError::missing_argument(name))
    }

    /// Returns an optional string argument, treating blank strings as absent.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidArgument`] when the value is present but
    /// not a string.
    pub fn optional_str(&self, name: &str) -> PluginResult<Option<&str>> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) if value.trim().is_empty() => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.as_str())),
            Some(other) => Err(PluginError::invalid_argument(
                name,
                format!("expected a string, found {}", type_name(other)),
            )),
        }
    }

    /// Returns an optional non-negative integer argument.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidArgument`] when the value is present but
    /// not a non-negative integer.
    pub fn optional_u64(&self, name: &str) -> PluginResult<Option<u64>> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                PluginError::invalid_argument(
                    name,
                    format!("expected a non-negative integer, found {}", type_name(value)),
                )
            }),
        }
    }

    /// Returns the underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the wrapper, returning the underlying JSON object.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

impl TryFrom<Value> for Arguments {
    type Error = PluginError;

    fn try_from(value: Value) -> PluginResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(PluginError::execution(format!(
                "arguments must be an object, found {}",
                type_name(&other)
            ))),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Plugin backed by a static declaration and an async function.
pub struct FnPlugin {
    declarations: Declarations,
    executor: Box<dyn Fn(Arguments) -> PluginFuture + Send + Sync>,
}

impl fmt::Debug for FnPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPlugin")
            .field("operations", &self.declarations.names())
            .finish_non_exhaustive()
    }
}

impl FnPlugin {
    /// Binds the declaration(s) to an executor function.
    pub fn new<F, Fut>(declarations: impl Into<Declarations>, executor: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PluginResult<Value>> + Send + 'static,
    {
        Self {
            declarations: declarations.into(),
            executor: Box::new(move |args| -> PluginFuture { Box::pin(executor(args)) }),
        }
    }
}

#[async_trait]
impl ToolPlugin for FnPlugin {
    fn describe(&self) -> PluginResult<Declarations> {
        Ok(self.declarations.clone())
    }

    async fn execute(&self, args: Arguments) -> PluginResult<Value> {
        (self.executor)(args).await
    }
}

/// Errors raised by plugins while describing or executing.
///
/// The dispatcher forwards the `Display` text to the model, so messages are
/// written for a reader who only sees the sentence.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A required argument was absent or blank.
    #[error("missing required argument `{name}`")]
    MissingArgument {
        /// Name of the missing argument.
        name: String,
    },

    /// An argument was present but malformed.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The plugin lacks configuration it needs (credentials, endpoints).
    #[error("plugin is not configured: {reason}")]
    Configuration {
        /// Human-readable description of the missing configuration.
        reason: String,
    },

    /// A downstream request could not be completed.
    #[error("transport error: {reason}")]
    Transport {
        /// Human-readable transport failure.
        reason: String,
    },

    /// A downstream collaborator returned an unusable response.
    #[error("unexpected response: {reason}")]
    Response {
        /// Human-readable description of the response problem.
        reason: String,
    },

    /// Generic execution failure.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the plugin.
        reason: String,
    },

    /// The plugin could not describe itself.
    #[error("failed to describe tool: {reason}")]
    Describe {
        /// Human-readable reason.
        reason: String,
    },
}

impl PluginError {
    /// Creates a missing-argument error.
    #[must_use]
    pub fn missing_argument(name: impl Into<String>) -> Self {
        Self::MissingArgument { name: name.into() }
    }

    /// Creates an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Creates a response error.
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }

    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    /// Creates a describe error.
    #[must_use]
    pub fn describe(reason: impl Into<String>) -> Self {
        Self::Describe {
            reason: reason.into(),
        }
    }
}
