//! End-to-end dispatch scenarios
//!
//! Each test builds a registry from scratch, wraps it in a dispatcher and
//! drives it only through `invoke` and `query`.

use std::collections::BTreeSet;
use std::sync::Arc;

use agentese::core::error::{DenialReason, DispatchError, HandlerError};
use agentese::node::pure_fn;
use agentese::{
    Arguments, AspectMetadata, Dispatcher, NodeRegistry, Observer, PolyAgent, StaticNode,
};
use serde_json::json;

fn house() -> StaticNode {
    StaticNode::builder("world.house")
        .description("A house")
        .aspect(
            "manifest",
            AspectMetadata::read_only("Describe the house"),
            pure_fn(|_| Ok(json!({"rooms": 4}))),
        )
        .aspect(
            "demolish",
            AspectMetadata::mutating("Tear it down").requires("architect"),
            pure_fn(|_| Ok(json!("demolished"))),
        )
        .build()
}

fn town() -> StaticNode {
    StaticNode::builder("world.town")
        .description("A town")
        .build()
}

fn dispatcher(nodes: Vec<StaticNode>) -> Dispatcher {
    let registry = Arc::new(NodeRegistry::new());
    for node in nodes {
        registry.register(Arc::new(node)).unwrap();
    }
    Dispatcher::new(registry)
}

// ============================================================================
// Scenario A: archetype-gated aspects
// ============================================================================

#[tokio::test]
async fn test_explorer_can_manifest_but_not_demolish() {
    let dispatcher = dispatcher(vec![house()]);
    let explorer = Observer::new("e-1", "explorer");

    let out = dispatcher
        .invoke("world.house.manifest", &explorer, Arguments::new())
        .await
        .unwrap();
    assert_eq!(out, json!({"rooms": 4}));

    let err = dispatcher
        .invoke("world.house.demolish", &explorer, Arguments::new())
        .await
        .unwrap_err();
    match err {
        DispatchError::Denied(denied) => {
            assert_eq!(denied.path, "world.house.demolish");
            assert_eq!(denied.archetype, "explorer");
            assert_eq!(denied.reason, DenialReason::NotAfforded);
        }
        other => panic!("expected affordance denial, got {:?}", other),
    }
    assert!(!dispatcher
        .invoke("world.house.demolish", &explorer, Arguments::new())
        .await
        .unwrap_err()
        .is_retryable());
}

#[tokio::test]
async fn test_architect_can_demolish() {
    let dispatcher = dispatcher(vec![house()]);
    let architect = Observer::new("a-1", "architect");

    let out = dispatcher
        .invoke("world.house.demolish", &architect, Arguments::new())
        .await
        .unwrap();
    assert_eq!(out, json!("demolished"));
}

#[tokio::test]
async fn test_permission_tag_satisfies_requirement_when_granted() {
    let registry = Arc::new(NodeRegistry::new());
    registry.register(Arc::new(house())).unwrap();
    let dispatcher = Dispatcher::builder(registry)
        .grant("contractor", ["demolish"])
        .build();

    // Granted but lacking the archetype: visible, still refused
    let contractor = Observer::new("c-1", "contractor");
    let err = dispatcher
        .invoke("world.house.demolish", &contractor, Arguments::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Denied(ref denied)
            if denied.reason == DenialReason::MissingArchetype(vec!["architect".into()])
    ));

    let licensed = Observer::new("c-2", "contractor").with_permission("architect");
    assert!(dispatcher
        .invoke("world.house.demolish", &licensed, Arguments::new())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_affordances_aspect_reflects_archetype() {
    let dispatcher = dispatcher(vec![house()]);

    let explorer = dispatcher
        .invoke("world.house.affordances", &Observer::new("e", "explorer"), Arguments::new())
        .await
        .unwrap();
    assert_eq!(explorer, json!(["manifest", "witness", "affordances", "help"]));

    let architect = dispatcher
        .invoke("world.house.affordances", &Observer::new("a", "architect"), Arguments::new())
        .await
        .unwrap();
    assert_eq!(
        architect,
        json!(["manifest", "witness", "affordances", "help", "demolish"])
    );
}

// ============================================================================
// Scenario B: discovery
// ============================================================================

#[test]
fn test_query_lists_world_nodes() {
    let dispatcher = dispatcher(vec![house(), town()]);
    let explorer = Observer::new("e-1", "explorer");

    let found = dispatcher.query("world.*", &explorer, None, 0);
    let paths: Vec<&str> = found.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["world.house", "world.town"]);

    let base = vec!["manifest", "witness", "affordances", "help"];
    assert_eq!(found[0].affordances, base);
    assert_eq!(found[1].affordances, base);
}

#[test]
fn test_empty_pattern_yields_nothing() {
    let dispatcher = dispatcher(vec![house(), town()]);
    let explorer = Observer::new("e-1", "explorer");

    assert!(dispatcher.query("", &explorer, None, 0).is_empty());
    assert!(dispatcher.query("time.*", &explorer, None, 0).is_empty());
}

#[test]
fn test_query_hides_aspects_the_observer_cannot_invoke() {
    let dispatcher = dispatcher(vec![house()]);

    let explorer = dispatcher.query("world.house.*", &Observer::new("e", "explorer"), None, 0);
    let paths: Vec<&str> = explorer.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["world.house.manifest"]);

    let architect = dispatcher.query("world.house.*", &Observer::new("a", "architect"), None, 0);
    assert_eq!(architect.len(), 2);
}

// ============================================================================
// Scenario C: state-dependent agent
// ============================================================================

fn mode_agent() -> PolyAgent<String, String> {
    PolyAgent::new(
        String::from("DORMANT"),
        |state: &String| -> BTreeSet<String> {
            match state.as_str() {
                "DORMANT" => BTreeSet::from(["start".to_string()]),
                _ => BTreeSet::from(["stop".to_string(), "pause".to_string()]),
            }
        },
        |_state: &String, input: &String| match input.as_str() {
            "start" => String::from("FLOWING"),
            _ => String::from("DORMANT"),
        },
    )
}

#[tokio::test]
async fn test_agent_rejects_then_accepts() {
    let agent = Arc::new(mode_agent());
    let dispatcher = dispatcher(vec![agent.clone().into_node("self.mode")]);
    let observer = Observer::new("o-1", "operator");

    let mut stop = Arguments::new();
    stop.insert("input".into(), json!("stop"));
    let err = dispatcher
        .invoke("self.mode.step", &observer, stop)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    match err {
        DispatchError::Invocation(invocation) => {
            assert!(invocation.source.is_rejection());
            if let HandlerError::Rejected { state, valid, .. } = invocation.source {
                assert_eq!(state, "DORMANT");
                assert_eq!(valid, vec!["start"]);
            }
        }
        other => panic!("expected invocation error, got {:?}", other),
    }
    assert_eq!(agent.state().await, "DORMANT");

    let out = dispatcher
        .invoke("self.mode.step[input=start]", &observer, Arguments::new())
        .await
        .unwrap();
    assert_eq!(out, json!({"state": "FLOWING", "directions": ["pause", "stop"]}));

    let directions = dispatcher
        .invoke("self.mode.directions", &observer, Arguments::new())
        .await
        .unwrap();
    assert_eq!(directions, json!(["pause", "stop"]));
}
