//! State-dependent agents
//!
//! A [`PolyAgent`] owns a state, a directions function listing the inputs
//! valid in that state, and a deterministic transition function. Inputs
//! outside the current directions are rejected before the transition runs.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::core::error::HandlerError;
use crate::core::types::Value;
use crate::node::{handler_fn, AspectMetadata, CallContext, Handler, HandlerResult, StaticNode};

type DirectionsFn<S, I> = Box<dyn Fn(&S) -> BTreeSet<I> + Send + Sync>;
type TransitionFn<S, I> = Box<dyn Fn(&S, &I) -> S + Send + Sync>;

pub struct PolyAgent<S, I> {
    state: Mutex<S>,
    directions: DirectionsFn<S, I>,
    transition: TransitionFn<S, I>,
}

impl<S, I> PolyAgent<S, I>
where
    S: Clone + Serialize + Send + Sync + 'static,
    I: Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new<D, T>(initial: S, directions: D, transition: T) -> Self
    where
        D: Fn(&S) -> BTreeSet<I> + Send + Sync + 'static,
        T: Fn(&S, &I) -> S + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(initial),
            directions: Box::new(directions),
            transition: Box::new(transition),
        }
    }

    pub async fn state(&self) -> S {
        self.state.lock().await.clone()
    }

    pub async fn directions(&self) -> BTreeSet<I> {
        let state = self.state.lock().await;
        (self.directions)(&state)
    }

    /// Apply one input; the state is unchanged on rejection
    ///
    /// Steps on one agent are serialized. The new state is committed before
    /// the lock is released.
    pub async fn step(&self, input: I) -> Result<S, HandlerError> {
        self.advance(input).await.map(|(next, _)| next)
    }

    /// Step and read the new state's directions under the same guard
    ///
    /// The only await is acquiring the lock, so a dropped call either
    /// commits in full or not at all.
    async fn advance(&self, input: I) -> Result<(S, BTreeSet<I>), HandlerError> {
        let mut state = self.state.lock().await;
        let valid = (self.directions)(&state);
        if !valid.contains(&input) {
            tracing::debug!(input = %label(&input), state = %label(&*state), "input rejected");
            return Err(HandlerError::Rejected {
                input: label(&input),
                state: label(&*state),
                valid: valid.iter().map(label).collect(),
            });
        }

        let next = (self.transition)(&state, &input);
        let directions = (self.directions)(&next);
        *state = next.clone();
        Ok((next, directions))
    }

    async fn directions_json(&self) -> HandlerResult {
        let valid: Vec<Value> = self
            .directions()
            .await
            .iter()
            .map(to_json)
            .collect::<Result<_, _>>()?;
        Ok(Value::Array(valid))
    }

    async fn snapshot(&self) -> HandlerResult {
        let state = self.state.lock().await;
        render(&*state, &(self.directions)(&state))
    }

    /// Expose the agent as a node with `step`, `directions` and `state`
    pub fn into_node(self: Arc<Self>, prefix: impl Into<String>) -> StaticNode {
        let directions = {
            let agent = self.clone();
            handler_fn(move |_cx: CallContext, _input: Value| {
                let agent = agent.clone();
                async move { agent.directions_json().await }
            })
        };
        let state = {
            let agent = self.clone();
            handler_fn(move |_cx: CallContext, _input: Value| {
                let agent = agent.clone();
                async move { agent.snapshot().await }
            })
        };

        StaticNode::builder(prefix)
            .description("State-dependent agent")
            .aspect_arc(
                "step",
                AspectMetadata::mutating("Apply one input valid in the current state"),
                self,
            )
            .aspect(
                "directions",
                AspectMetadata::introspective("Inputs valid in the current state"),
                directions,
            )
            .aspect(
                "state",
                AspectMetadata::read_only("Current state and its directions"),
                state,
            )
            .build()
    }
}

#[async_trait]
impl<S, I> Handler for PolyAgent<S, I>
where
    S: Clone + Serialize + Send + Sync + 'static,
    I: Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Accepts the input itself or `{"input": ...}`
    async fn call(&self, _cx: &CallContext, input: Value) -> HandlerResult {
        let raw = match input {
            Value::Object(mut args) if args.contains_key("input") => {
                args.remove("input").unwrap_or(Value::Null)
            }
            other => other,
        };
        let input: I = serde_json::from_value(raw)
            .map_err(|e| HandlerError::invalid(format!("unrecognized agent input: {}", e)))?;

        let (next, directions) = self.advance(input).await?;
        render(&next, &directions)
    }
}

impl<S, I> fmt::Debug for PolyAgent<S, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolyAgent").finish_non_exhaustive()
    }
}

fn render<S: Serialize, I: Serialize>(state: &S, directions: &BTreeSet<I>) -> HandlerResult {
    let directions: Vec<Value> = directions.iter().map(to_json).collect::<Result<_, _>>()?;
    Ok(json!({
        "state": to_json(state)?,
        "directions": directions,
    }))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(value).map_err(|e| HandlerError::failed(e.to_string()))
}

/// Strings render bare, everything else as JSON
fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => String::from("?"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    enum Mode {
        Dormant,
        Flowing,
        Paused,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    enum Signal {
        Start,
        Stop,
        Pause,
        Resume,
    }

    fn flow() -> PolyAgent<Mode, Signal> {
        PolyAgent::new(
            Mode::Dormant,
            |mode: &Mode| match mode {
                Mode::Dormant => BTreeSet::from([Signal::Start]),
                Mode::Flowing => BTreeSet::from([Signal::Stop, Signal::Pause]),
                Mode::Paused => BTreeSet::from([Signal::Resume, Signal::Stop]),
            },
            |_mode: &Mode, signal: &Signal| match signal {
                Signal::Stop => Mode::Dormant,
                Signal::Start | Signal::Resume => Mode::Flowing,
                Signal::Pause => Mode::Paused,
            },
        )
    }

    #[tokio::test]
    async fn test_valid_step_transitions() {
        let agent = flow();
        assert_eq!(agent.step(Signal::Start).await.unwrap(), Mode::Flowing);
        assert_eq!(
            agent.directions().await,
            BTreeSet::from([Signal::Stop, Signal::Pause])
        );
    }

    #[tokio::test]
    async fn test_rejected_step_keeps_state() {
        let agent = flow();
        let err = agent.step(Signal::Stop).await.unwrap_err();
        assert!(err.is_rejection());
        match err {
            HandlerError::Rejected { input, state, valid } => {
                assert_eq!(input, "stop");
                assert_eq!(state, "DORMANT");
                assert_eq!(valid, vec!["start"]);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(agent.state().await, Mode::Dormant);
    }

    #[tokio::test]
    async fn test_handler_accepts_wrapped_input() {
        let agent = flow();
        let cx = CallContext::default();
        let out = agent.call(&cx, json!({"input": "start"})).await.unwrap();
        assert_eq!(out, json!({"state": "FLOWING", "directions": ["stop", "pause"]}));

        let out = agent.call(&cx, json!("pause")).await.unwrap();
        assert_eq!(out["state"], json!("PAUSED"));

        let err = agent.call(&cx, json!("explode")).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_concurrent_steps_are_serialized() {
        let agent = Arc::new(flow());
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let agent = agent.clone();
            tasks.push(tokio::spawn(async move { agent.step(Signal::Start).await }));
        }
        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        // Only the first start is valid from DORMANT
        assert_eq!(accepted, 1);
        assert_eq!(agent.state().await, Mode::Flowing);
    }

    fn counter() -> PolyAgent<u64, String> {
        PolyAgent::new(
            0,
            |_n: &u64| BTreeSet::from(["inc".to_string()]),
            |n: &u64, _input: &String| n + 1,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_each_call_reports_its_own_transition() {
        let agent = Arc::new(counter());
        let mut tasks = Vec::new();
        for _ in 0..500 {
            let agent = agent.clone();
            tasks.push(tokio::spawn(async move {
                agent.call(&CallContext::default(), json!("inc")).await
            }));
        }

        let mut seen = BTreeSet::new();
        for task in tasks {
            let out = task.await.unwrap().unwrap();
            assert_eq!(out["directions"], json!(["inc"]));
            let n = out["state"].as_u64().unwrap();
            assert!(seen.insert(n), "state {} reported twice", n);
        }
        assert_eq!(seen, (1..=500).collect::<BTreeSet<u64>>());
        assert_eq!(agent.state().await, 500);
    }

    #[tokio::test]
    async fn test_cancelled_step_commits_nothing() {
        let agent = flow();
        agent.step(Signal::Start).await.unwrap();

        let held = agent.state.lock().await;
        let cancelled = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            agent.step(Signal::Pause),
        )
        .await;
        assert!(cancelled.is_err());
        drop(held);

        // Last committed transition wins
        assert_eq!(agent.state().await, Mode::Flowing);
        assert_eq!(agent.step(Signal::Pause).await.unwrap(), Mode::Paused);
        assert_eq!(agent.state().await, Mode::Paused);
    }

    #[test]
    fn test_node_projection() {
        let node = Arc::new(flow()).into_node("self.flow");
        let names: Vec<&str> = crate::node::Node::aspects(&node)
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["step", "directions", "state"]);
    }
}
