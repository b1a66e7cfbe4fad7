use std::sync::Arc;

use async_trait::async_trait;
use live_primitives::{Declarations, FunctionCall, FunctionDeclaration, ParameterSchema};
use live_tools::builtin::{MAIL_KEY, SEARCH_KEY, WEATHER_KEY};
use live_tools::{
    Arguments, BuiltinConfig, FnPlugin, PluginError, PluginResult, ToolError, ToolManager,
    ToolPlugin,
};
use serde_json::{Value, json};

fn declaration(name: &str) -> FunctionDeclaration {
    FunctionDeclaration::builder(name)
        .description("Test operation")
        .parameters(ParameterSchema::object().property("value", json!({ "type": "string" })))
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

struct BrokenDescribe;

#[async_trait]
impl ToolPlugin for BrokenDescribe {
    fn describe(&self) -> PluginResult<Declarations> {
        Err(PluginError::describe("schema unavailable"))
    }

    async fn execute(&self, _args: Arguments) -> PluginResult<Value> {
        Ok(Value::Null)
    }
}

struct Silent;

#[async_trait]
impl ToolPlugin for Silent {
    fn describe(&self) -> PluginResult<Declarations> {
        Ok(Declarations::Many(Vec::new()))
    }

    async fn execute(&self, _args: Arguments) -> PluginResult<Value> {
        Ok(Value::Null)
    }
}

#[test]
fn builtins_are_seeded_at_construction() {
    let manager = ToolManager::new(BuiltinConfig::default()).unwrap();
    assert_eq!(manager.names(), vec![WEATHER_KEY, MAIL_KEY, SEARCH_KEY]);
    assert_eq!(manager.resolve("get_weather_on_date").as_deref(), Some(WEATHER_KEY));
    assert_eq!(manager.resolve("send_email").as_deref(), Some(MAIL_KEY));
    assert_eq!(manager.resolve("web_search").as_deref(), Some(SEARCH_KEY));

    let declarations = manager.list_declarations();
    assert_eq!(declarations.len(), 3);
    let wire = serde_json::to_value(&declarations).unwrap();
    assert_eq!(wire[0]["name"], "weather");
    assert_eq!(wire[0]["declaration"]["name"], "get_weather_on_date");
    assert_eq!(wire[0]["declaration"]["parameters"]["type"], "object");
}

#[test]
fn second_registration_under_same_name_conflicts() {
    let manager = ToolManager::empty();
    manager.register("tool", echo("first_op")).unwrap();

    let err = manager
        .register("tool", echo("second_op"))
        .expect_err("duplicate should fail");
    assert!(matches!(err, ToolError::DuplicateTool { name } if name == "tool"));

    let declarations = manager.list_declarations();
    assert_eq!(declarations.len(), 1);
    assert_eq!(declarations[0].declaration.names(), vec!["first_op"]);
}

#[test]
fn empty_declaration_set_is_registered_but_not_listed() {
    let manager = ToolManager::empty();
    manager.register("a", echo("op_a")).unwrap();
    manager.register("silent", Silent).unwrap();
    manager.register("c", echo("op_c")).unwrap();

    assert_eq!(manager.len(), 3);
    assert!(manager.contains("silent"));
    let names: Vec<_> = manager
        .list_declarations()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, vec!["a", "c"]);
}

#[test]
fn malformed_declaration_is_invalid_capability() {
    let manager = ToolManager::empty();
    let decoded: FunctionDeclaration = serde_json::from_value(json!({
        "name": "bad op",
        "description": "Spaces are not allowed in operation names",
        "parameters": { "type": "object", "properties": {} }
    }))
    .unwrap();
    let bad_name = FnPlugin::new(decoded, |_args: Arguments| async move { Ok(Value::Null) });

    let err = manager
        .register("bad", bad_name)
        .expect_err("malformed declaration");
    assert!(matches!(err, ToolError::InvalidCapability { name, .. } if name == "bad"));
    assert!(manager.is_empty());
}

#[test]
fn aggregation_skips_plugins_that_fail_to_describe() {
    let manager = ToolManager::empty();
    manager.register("a", echo("op_a")).unwrap();
    manager.register("broken", BrokenDescribe).unwrap();
    manager.register("c", echo("op_c")).unwrap();

    assert_eq!(manager.len(), 3);
    let names: Vec<_> = manager
        .list_declarations()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, vec!["a", "c"]);
}

#[tokio::test]
async fn unknown_tool_fails_dispatch_outright() {
    let manager = ToolManager::new(BuiltinConfig::default()).unwrap();
    let err = manager
        .dispatch(call("teleport", json!({}), "x"))
        .await
        .expect_err("unknown tool should error");
    assert!(matches!(err, ToolError::UnknownTool { name } if name == "teleport"));
}

#[tokio::test]
async fn weather_alias_is_deterministic() {
    let manager = ToolManager::new(BuiltinConfig::default()).unwrap();
    let args = json!({ "location": "Manila", "date": "2024-03-01" });

    let first = manager
        .dispatch(call("get_weather_on_date", args.clone(), "a"))
        .await
        .unwrap();
    let second = manager
        .dispatch(call("get_weather_on_date", args, "a"))
        .await
        .unwrap();

    assert_eq!(first.responses().len(), 1);
    let entry = first.first().unwrap();
    assert_eq!(entry.id.as_str(), "a");
    let output = entry.response.as_output().expect("output populated");
    assert_eq!(output["location"], "Manila");
    assert_eq!(output["date"], "2024-03-01");
    assert!(output["condition"].is_string());
    assert!(output["temperature"].is_number());

    let again = second.first().unwrap().response.as_output().unwrap();
    assert_eq!(output["condition"], again["condition"]);
    assert_eq!(output["temperature"], again["temperature"]);
}

#[tokio::test]
async fn mail_failure_becomes_error_entry() {
    let manager = ToolManager::new(BuiltinConfig::default()).unwrap();
    let envelope = manager
        .dispatch(call(
            "send_email",
            json!({ "to": "", "subject": "s", "body": "b" }),
            "m1",
        ))
        .await
        .expect("plugin failures never escape dispatch");

    let entry = envelope.first().unwrap();
    assert_eq!(entry.id.as_str(), "m1");
    assert!(entry.response.as_output().is_none());
    let error = entry.response.as_error().expect("error populated");
    assert!(error.contains("to"));

    let wire = serde_json::to_value(&envelope).unwrap();
    assert!(wire["functionResponses"][0]["response"]["error"].is_string());
    assert!(wire["functionResponses"][0]["response"].get("output").is_none());
}

#[tokio::test]
async fn successful_dispatch_round_trips_id() {
    let manager = ToolManager::empty();
    manager.register("echo", echo("echo_op")).unwrap();

    for id in ["1", "call-42", ""] {
        let envelope = manager
            .dispatch(call("echo_op", json!({ "value": id }), id))
            .await
            .unwrap();
        assert_eq!(envelope.responses().len(), 1);
        let entry = envelope.first().unwrap();
        assert_eq!(entry.id.as_str(), id);
        assert_eq!(entry.response.as_output(), Some(&json!({ "value": id })));
        assert!(entry.response.as_error().is_none());
    }
}

#[tokio::test]
async fn dynamic_registration_is_visible_to_dispatch() {
    let manager = Arc::new(ToolManager::new(BuiltinConfig::default()).unwrap());
    manager.register("late", echo("late_op")).unwrap();

    let envelope = manager
        .dispatch(call("late_op", json!({ "value": "v" }), "l"))
        .await
        .unwrap();
    assert!(!envelope.first().unwrap().response.is_error());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_have_one_winner() {
    let manager = Arc::new(ToolManager::empty());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.register("contested", echo("contested_op")) })
        })
        .collect();

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => wins += 1,
            Err(ToolError::DuplicateTool { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(manager.len(), 1);
}
