//! Tool manager: plugin registry, declaration aggregation, and call routing.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::FutureExt;
use futures::future::join_all;
use indexmap::IndexMap;
use live_primitives::{
    CallId, DeclarationEntry, FunctionCall, FunctionResponse, ResponseEnvelope, ToolResponse,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::builtin::{self, BuiltinConfig};
use crate::plugin::{Arguments, ToolPlugin};

/// Result alias for registry and dispatch operations.
pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Default)]
struct RegistryState {
    plugins: IndexMap<String, Arc<dyn ToolPlugin>>,
    aliases: HashMap<String, String>,
}

impl RegistryState {
    /// Registry key for an external operation name: alias table first, then
    /// a direct key match.
    fn resolve(&self, name: &str) -> Option<&str> {
        if let Some(key) = self.aliases.get(name) {
            return Some(key.as_str());
        }
        self.plugins.get_key_value(name).map(|(key, _)| key.as_str())
    }

    fn check_alias(&self, alias: &str, key: &str) -> ToolResult<()> {
        if let Some(existing) = self.aliases.get(alias) {
            if existing != key {
                return Err(ToolError::AliasConflict {
                    alias: alias.to_owned(),
                    existing: existing.clone(),
                });
            }
        }
        if alias != key && self.plugins.contains_key(alias) {
            return Err(ToolError::AliasConflict {
                alias: alias.to_owned(),
                existing: alias.to_owned(),
            });
        }
        Ok(())
    }
}

/// Owns the plugin registry and routes model-issued calls to it.
///
/// Lifecycle: construct, seed built-ins, accept dynamic registrations, then
/// serve dispatches. Entries are never removed. Registration takes a write
/// lock for the whole check-and-insert, so concurrent registrations of one
/// name have exactly one winner and every successful registration is visible
/// to later dispatches. Dispatch only holds a read lock long enough to clone
/// the plugin handle.
pub struct ToolManager {
    inner: RwLock<RegistryState>,
}

impl std::fmt::Debug for ToolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        let names: Vec<_> = inner.plugins.keys().cloned().collect();
        f.debug_struct("ToolManager")
            .field("registered", &names)
            .field("aliases", &inner.aliases.len())
            .finish()
    }
}

impl ToolManager {
    /// Creates a manager seeded with the built-in plugins.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] if a built-in fails to register, which means
    /// the built-in set itself is inconsistent.
    pub fn new(config: BuiltinConfig) -> ToolResult<Self> {
        let manager = Self::empty();
        manager.register_builtins(&config)?;
        Ok(manager)
    }

    /// Creates a manager without any plugins.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(RegistryState::default()),
        }
    }

    fn register_builtins(&self, config: &BuiltinConfig) -> ToolResult<()> {
        for (name, plugin) in builtin::plugins(config) {
            self.register_shared(name, plugin)?;
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a plugin under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is taken,
    /// [`ToolError::InvalidCapability`] if the name is blank or the plugin's
    /// declarations are malformed (an empty set is accepted with a warning), and [`ToolError::AliasConflict`] if one of
    /// its aliases already routes elsewhere. The registry is unchanged on
    /// error.
    pub fn register<P>(&self, name: impl Into<String>, plugin: P) -> ToolResult<()>
    where
        P: ToolPlugin + 'static,
    {
        self.register_shared(name, Arc::new(plugin))
    }

    /// Registers an already shared plugin handle under `name`.
    ///
    /// # Errors
    ///
    /// See [`ToolManager::register`].
    pub fn register_shared(
        &self,
        name: impl Into<String>,
        plugin: Arc<dyn ToolPlugin>,
    ) -> ToolResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ToolError::InvalidCapability {
                name,
                reason: "tool name cannot be empty".into(),
            });
        }

        let mut aliases = match plugin.describe() {
            Ok(declarations) if declarations.is_empty() => {
                warn!(tool = %name, "tool declared no operations during registration");
                Vec::new()
            }
            Ok(declarations) => {
                declarations
                    .validate()
                    .map_err(|err| ToolError::InvalidCapability {
                        name: name.clone(),
                        reason: err.to_string(),
                    })?;
                declarations
                    .names()
                    .into_iter()
                    .map(str::to_owned)
                    .collect()
            }
            Err(err) => {
                warn!(tool = %name, error = %err, "tool describe failed during registration");
                Vec::new()
            }
        };
        aliases.extend(plugin.aliases());
        aliases.retain(|alias| alias != &name);
        aliases.sort();
        aliases.dedup();

        let mut inner = self.write();
        if inner.plugins.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }
        if let Some(existing) = inner.aliases.get(&name) {
            return Err(ToolError::AliasConflict {
                alias: name.clone(),
                existing: existing.clone(),
            });
        }
        for alias in &aliases {
            inner.check_alias(alias, &name)?;
        }

        for alias in &aliases {
            inner.aliases.insert(alias.clone(), name.clone());
        }
        inner.plugins.insert(name.clone(), plugin);
        drop(inner);

        info!(tool = %name, aliases = ?aliases, "tool registered");
        Ok(())
    }

    /// Routes an external operation name to a registered key.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when `key` is not registered and
    /// [`ToolError::AliasConflict`] when `alias` already routes elsewhere or
    /// names another registered plugin.
    pub fn register_alias(&self, alias: impl Into<String>, key: &str) -> ToolResult<()> {
        let alias = alias.into();
        let mut inner = self.write();
        if !inner.plugins.contains_key(key) {
            return Err(ToolError::UnknownTool {
                name: key.to_owned(),
            });
        }
        inner.check_alias(&alias, key)?;
        if alias != key {
            inner.aliases.insert(alias.clone(), key.to_owned());
        }
        drop(inner);

        debug!(alias = %alias, tool = %key, "tool alias registered");
        Ok(())
    }

    /// Returns the registry key that serves the external operation `name`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.read().resolve(name).map(str::to_owned)
    }

    /// Returns `true` if a plugin is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.read().plugins.contains_key(name)
    }

    /// Returns the registered keys in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.read().plugins.keys().cloned().collect()
    }

    /// Returns the alias table as `(external name, registry key)` pairs,
    /// sorted by external name.
    #[must_use]
    pub fn aliases(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .read()
            .aliases
            .iter()
            .map(|(alias, key)| (alias.clone(), key.clone()))
            .collect();
        pairs.sort();
        pairs
    }

    /// Returns the number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().plugins.len()
    }

    /// Returns `true` when no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().plugins.is_empty()
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn ToolPlugin>)> {
        self.read()
            .plugins
            .iter()
            .map(|(name, plugin)| (name.clone(), Arc::clone(plugin)))
            .collect()
    }

    /// Aggregates every plugin's declaration in registration order.
    ///
    /// Plugins whose `describe` fails or yields nothing are skipped with a
    /// warning; aggregation itself never fails.
    #[must_use]
    pub fn list_declarations(&self) -> Vec<DeclarationEntry> {
        self.snapshot()
            .into_iter()
            .filter_map(|(name, plugin)| match plugin.describe() {
                Ok(declaration) if declaration.is_empty() => {
                    warn!(tool = %name, "tool returned no declarations; skipping");
                    None
                }
                Ok(declaration) => Some(DeclarationEntry { name, declaration }),
                Err(err) => {
                    warn!(tool = %name, error = %err, "tool describe failed; skipping");
                    None
                }
            })
            .collect()
    }

    fn lookup(&self, name: &str) -> ToolResult<(String, Arc<dyn ToolPlugin>)> {
        let inner = self.read();
        inner
            .resolve(name)
            .and_then(|key| {
                inner
                    .plugins
                    .get(key)
                    .map(|plugin| (key.to_owned(), Arc::clone(plugin)))
            })
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_owned(),
            })
    }

    /// Dispatches a single call and wraps its outcome in an envelope.
    ///
    /// Plugin failures, including panics, become `{error: message}` entries.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when neither the alias table nor the
    /// registry knows `call.name`. This is the only error `dispatch` surfaces.
    pub async fn dispatch(&self, call: FunctionCall) -> ToolResult<ResponseEnvelope> {
        let FunctionCall { name, args, id } = call;
        let (key, plugin) = self.lookup(&name)?;
        let response = invoke(&name, &key, plugin, Arguments::new(args), &id).await;
        Ok(ResponseEnvelope::single(id, response))
    }

    /// Dispatches a batch of calls concurrently.
    ///
    /// Entries appear in request order. Every call is resolved before any
    /// plugin runs, so an unknown name fails the batch without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] for the first unresolvable call.
    pub async fn dispatch_all<I>(&self, calls: I) -> ToolResult<ResponseEnvelope>
    where
        I: IntoIterator<Item = FunctionCall>,
    {
        let resolved = calls
            .into_iter()
            .map(|call| self.lookup(&call.name).map(|target| (call, target)))
            .collect::<ToolResult<Vec<_>>>()?;

        let responses = join_all(resolved.into_iter().map(|(call, (key, plugin))| async move {
            let FunctionCall { name, args, id } = call;
            let response = invoke(&name, &key, plugin, Arguments::new(args), &id).await;
            FunctionResponse { id, response }
        }))
        .await;

        Ok(ResponseEnvelope {
            function_responses: responses,
        })
    }
}

async fn invoke(
    name: &str,
    key: &str,
    plugin: Arc<dyn ToolPlugin>,
    args: Arguments,
    id: &CallId,
) -> ToolResponse {
    debug!(operation = %name, tool = %key, call_id = %id, "dispatching tool call");

    match AssertUnwindSafe(plugin.execute(args)).catch_unwind().await {
        Ok(Ok(output)) => {
            debug!(tool = %key, call_id = %id, "tool call completed");
            ToolResponse::output(output)
        }
        Ok(Err(err)) => {
            warn!(tool = %key, call_id = %id, error = %err, "tool call failed");
            ToolResponse::error(err.to_string())
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            warn!(tool = %key, call_id = %id, panic = %detail, "tool call panicked");
            ToolResponse::error(format!("tool `{name}` panicked: {detail}"))
        }
    }
}

/// Errors produced by tool registration and dispatch.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Plugin failed validation at registration.
    #[error("invalid capability `{name}`: {reason}")]
    InvalidCapability {
        /// Name the plugin was registered under.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// An external operation name already routes to another tool.
    #[error("operation name `{alias}` already routes to tool `{existing}`")]
    AliasConflict {
        /// External operation name.
        alias: String,
        /// Registry key currently bound to it.
        existing: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use live_primitives::{Declarations, FunctionDeclaration, ParameterSchema};
    use serde_json::{Value, json};

    use crate::plugin::{FnPlugin, PluginError, PluginResult};

    fn declaration(name: &str) -> FunctionDeclaration {
        FunctionDeclaration::builder(name)
            .description("Echo incoming payload")
            .parameters(ParameterSchema::object().property("value", json!({ "type": "number" })))
            .build()
            .unwrap()
    }

    fn echo(name: &str) -> FnPlugin {
        FnPlugin::new(declaration(name), |args: Arguments| async move {
            Ok(Value::Object(args.into_inner()))
        })
    }

    fn call(name: &str, args: Value, id: &str) -> FunctionCall {
        FunctionCall::from_json(name, args, id)
    }

    struct Multi;

    #[async_trait]
    impl ToolPlugin for Multi {
        fn describe(&self) -> PluginResult<Declarations> {
            Ok(Declarations::Many(vec![declaration("list_items"), declaration("add_item")]))
        }

        async fn execute(&self, _args: Arguments) -> PluginResult<Value> {
            Ok(json!("multi"))
        }
    }

    struct Panicky;

    #[async_trait]
    impl ToolPlugin for Panicky {
        fn describe(&self) -> PluginResult<Declarations> {
            Ok(declaration("panicky").into())
        }

        async fn execute(&self, _args: Arguments) -> PluginResult<Value> {
            panic!("exploded")
        }
    }

    #[tokio::test]
    async fn register_and_dispatch_by_key() {
        let manager = ToolManager::empty();
        manager.register("echo", echo("echo")).unwrap();

        let envelope = manager
            .dispatch(call("echo", json!({ "value": 1 }), "c1"))
            .await
            .unwrap();
        let entry = envelope.first().unwrap();
        assert_eq!(entry.id.as_str(), "c1");
        assert_eq!(entry.response.as_output(), Some(&json!({ "value": 1 })));
    }

    #[tokio::test]
    async fn declaration_names_route_to_owning_key() {
        let manager = ToolManager::empty();
        manager.register("inventory", Multi).unwrap();

        assert_eq!(manager.resolve("add_item").as_deref(), Some("inventory"));
        assert_eq!(manager.resolve("list_items").as_deref(), Some("inventory"));
        assert_eq!(manager.resolve("inventory").as_deref(), Some("inventory"));

        let envelope = manager
            .dispatch(call("add_item", json!({}), "m"))
            .await
            .unwrap();
        assert_eq!(envelope.first().unwrap().response.as_output(), Some(&json!("multi")));
    }

    #[test]
    fn duplicate_registration_errors() {
        let manager = ToolManager::empty();
        manager.register("echo", echo("echo")).unwrap();

        let err = manager
            .register("echo", echo("other"))
            .expect_err("duplicate registration should fail");
        assert!(matches!(err, ToolError::DuplicateTool { name } if name == "echo"));
        assert_eq!(manager.len(), 1);
        assert!(manager.resolve("other").is_none());
    }

    #[test]
    fn blank_name_is_invalid() {
        let manager = ToolManager::empty();
        let err = manager.register("  ", echo("echo")).expect_err("blank name");
        assert!(matches!(err, ToolError::InvalidCapability { .. }));
        assert!(manager.is_empty());
    }

    #[test]
    fn alias_conflicts_are_rejected() {
        let manager = ToolManager::empty();
        manager.register("first", echo("shared_op")).unwrap();

        let err = manager
            .register("second", echo("shared_op"))
            .expect_err("alias already taken");
        assert!(matches!(
            err,
            ToolError::AliasConflict { alias, existing } if alias == "shared_op" && existing == "first"
        ));
        assert!(!manager.contains("second"));

        let err = manager
            .register("third", echo("first"))
            .expect_err("alias shadows a registry key");
        assert!(matches!(err, ToolError::AliasConflict { .. }));
    }

    #[test]
    fn explicit_aliases_extend_routing() {
        let manager = ToolManager::empty();
        manager.register("echo", echo("echo")).unwrap();

        manager.register_alias("repeat", "echo").unwrap();
        manager.register_alias("repeat", "echo").unwrap();
        assert_eq!(manager.resolve("repeat").as_deref(), Some("echo"));
        assert_eq!(manager.aliases(), vec![("repeat".to_owned(), "echo".to_owned())]);

        let err = manager
            .register_alias("x", "missing")
            .expect_err("unknown key");
        assert!(matches!(err, ToolError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn panics_become_error_entries() {
        let manager = ToolManager::empty();
        manager.register("panicky", Panicky).unwrap();

        let envelope = manager
            .dispatch(call("panicky", json!({}), "p"))
            .await
            .unwrap();
        let error = envelope.first().unwrap().response.as_error().unwrap();
        assert!(error.contains("exploded"));
    }

    #[tokio::test]
    async fn batch_dispatch_keeps_request_order() {
        let manager = ToolManager::empty();
        manager.register("echo", echo("echo")).unwrap();
        manager
            .register(
                "fail",
                FnPlugin::new(declaration("fail"), |_args: Arguments| async move {
                    Err::<Value, _>(PluginError::execution("nope"))
                }),
            )
            .unwrap();

        let envelope = manager
            .dispatch_all(vec![
                call("echo", json!({ "value": 1 }), "a"),
                call("fail", json!({}), "b"),
                call("echo", json!({ "value": 3 }), "c"),
            ])
            .await
            .unwrap();

        let ids: Vec<_> = envelope.responses().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(envelope.responses()[1].response.is_error());

        let err = manager
            .dispatch_all(vec![call("echo", json!({}), "a"), call("ghost", json!({}), "b")])
            .await
            .expect_err("unknown tool fails the batch");
        assert!(matches!(err, ToolError::UnknownTool { name } if name == "ghost"));
    }

    struct Flaky;

    #[async_trait]
    impl ToolPlugin for Flaky {
        fn describe(&self) -> PluginResult<Declarations> {
            Err(PluginError::describe("schema store offline"))
        }

        async fn execute(&self, _args: Arguments) -> PluginResult<Value> {
            Ok(json!("flaky"))
        }

        fn aliases(&self) -> Vec<String> {
            vec!["flaky_fallback".to_owned()]
        }
    }

    #[tokio::test]
    async fn describe_failure_keeps_only_explicit_routes() {
        let manager = ToolManager::empty();
        manager.register("flaky", Flaky).unwrap();

        assert_eq!(manager.resolve("flaky_fallback").as_deref(), Some("flaky"));
        let err = manager
            .dispatch(call("flaky_op", json!({}), "f1"))
            .await
            .expect_err("declared name was never routed");
        assert!(matches!(err, ToolError::UnknownTool { .. }));

        manager.register_alias("flaky_op", "flaky").unwrap();
        let envelope = manager
            .dispatch(call("flaky_op", json!({}), "f2"))
            .await
            .unwrap();
        assert_eq!(envelope.first().unwrap().response.as_output(), Some(&json!("flaky")));
    }

    #[test]
    fn duplicate_operations_are_invalid() {
        let manager = ToolManager::empty();
        let twice = FnPlugin::new(
            Declarations::Many(vec![declaration("same_op"), declaration("same_op")]),
            |_args: Arguments| async move { Ok(Value::Null) },
        );

        let err = manager.register("twice", twice).expect_err("ambiguous set");
        assert!(matches!(err, ToolError::InvalidCapability { name, .. } if name == "twice"));
        assert!(manager.is_empty());
    }

    #[test]
    fn names_follow_insertion_order() {
        let manager = ToolManager::empty();
        for name in ["zeta", "alpha", "mid"] {
            manager.register(name, echo(name)).unwrap();
        }
        assert_eq!(manager.names(), vec!["zeta", "alpha", "mid"]);

        let listed: Vec<_> = manager
            .list_declarations()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(listed, vec!["zeta", "alpha", "mid"]);
    }
}
