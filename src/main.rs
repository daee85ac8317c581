//! Agentese - command-line entry point
//!
//! Builds a small demonstration registry and invokes or queries it. Output
//! is JSON on stdout; logs go to stderr and are filtered by `RUST_LOG`.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use agentese::core::error::HandlerError;
use agentese::node::{handler_fn, pure_fn};
use agentese::{
    Arguments, AspectMetadata, CallContext, Composition, DispatchConfig, Dispatcher, Effect,
    LawVerifier, NodeRegistry, Observer, PolyAgent, StaticNode, Value,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::runtime::Runtime;

/// Agentese - address capabilities by semantic path
#[derive(Parser, Debug)]
#[command(name = "agentese")]
#[command(about = "Invoke or discover aspects in a demonstration registry")]
struct Args {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invoke one aspect, e.g. `world.house.manifest`
    Invoke {
        path: String,

        /// Observer archetype
        #[arg(long, default_value = "guest")]
        archetype: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// List paths matching a glob pattern, e.g. `world.*`
    Query {
        pattern: String,

        #[arg(long, default_value = "guest")]
        archetype: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("agentese=info")),
        )
        .init();

    let args = Args::parse();
    if let Err(message) = run(args) {
        eprintln!("error: {}", message);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), String> {
    let config = match &args.config {
        Some(path) => DispatchConfig::load(path).map_err(|e| e.to_string())?,
        None => DispatchConfig::default(),
    };

    let rt = Runtime::new().map_err(|e| e.to_string())?;
    let dispatcher = demo_dispatcher(&rt, config)?;

    let output = match args.command {
        Command::Invoke {
            path,
            archetype,
            args,
        } => {
            let arguments: Arguments =
                serde_json::from_str(&args).map_err(|e| format!("--args: {}", e))?;
            let observer = Observer::anonymous(archetype);
            rt.block_on(dispatcher.invoke(&path, &observer, arguments))
                .map_err(|e| e.to_string())?
        }
        Command::Query {
            pattern,
            archetype,
            limit,
            offset,
        } => {
            let observer = Observer::anonymous(archetype);
            let found = dispatcher.query(&pattern, &observer, limit, offset);
            serde_json::to_value(found).map_err(|e| e.to_string())?
        }
    };

    let rendered = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}

fn demo_dispatcher(rt: &Runtime, config: DispatchConfig) -> Result<Dispatcher, String> {
    let registry = Arc::new(NodeRegistry::new());
    let register = |node: StaticNode| registry.register(Arc::new(node)).map_err(|e| e.to_string());

    register(
        StaticNode::builder("world.house")
            .description("A two-storey house on the hill")
            .aspect(
                "manifest",
                AspectMetadata::read_only("Describe the house"),
                pure_fn(|_| Ok(json!({"rooms": 6, "storeys": 2, "condition": "sound"}))),
            )
            .aspect(
                "demolish",
                AspectMetadata::mutating("Tear the house down")
                    .requires("architect")
                    .with_effect(Effect::Writes("world.house".into())),
                pure_fn(|_| Ok(json!({"status": "scheduled"}))),
            )
            .build(),
    )?;

    register(
        StaticNode::builder("world.town")
            .description("The market town below")
            .aspect(
                "census",
                AspectMetadata::read_only("Population by district"),
                pure_fn(|_| Ok(json!({"north": 412, "south": 380}))),
            )
            .build(),
    )?;

    register(
        StaticNode::builder("void.dice")
            .description("Fair dice")
            .aspect(
                "roll",
                AspectMetadata::entropy("Roll n six-sided dice")
                    .with_effect(Effect::Consumes("entropy".into())),
                handler_fn(|_cx: CallContext, input: Value| async move {
                    // Path params arrive as strings
                    let n = input
                        .get("n")
                        .and_then(|n| n.as_u64().or_else(|| n.as_str()?.parse().ok()))
                        .unwrap_or(1)
                        .min(100);
                    let rolls: Vec<u64> = (0..n).map(|_| rand::random::<u64>() % 6 + 1).collect();
                    Ok::<_, HandlerError>(json!(rolls))
                }),
            )
            .build(),
    )?;

    let mode = Arc::new(PolyAgent::new(
        String::from("DORMANT"),
        |state: &String| {
            let valid: &[&str] = match state.as_str() {
                "DORMANT" => &["start"],
                "FLOWING" => &["stop", "pause"],
                _ => &["resume", "stop"],
            };
            valid.iter().map(|s| s.to_string()).collect::<BTreeSet<String>>()
        },
        |_state: &String, input: &String| match input.as_str() {
            "start" | "resume" => String::from("FLOWING"),
            "pause" => String::from("PAUSED"),
            _ => String::from("DORMANT"),
        },
    ));
    register(mode.into_node("self.mode"))?;

    let words = |name: &str, f: fn(&str) -> String| {
        Composition::unit(
            name,
            pure_fn(move |input: Value| {
                let text = input
                    .get("input")
                    .and_then(Value::as_str)
                    .or_else(|| input.as_str())
                    .ok_or_else(|| HandlerError::invalid("expected text"))?;
                Ok(json!(f(text)))
            }),
        )
    };
    let units = [
        words("trim", |s| s.trim().to_string()),
        words("squash", |s| s.split_whitespace().collect::<Vec<_>>().join(" ")),
        words("upper", |s| s.to_uppercase()),
    ];
    let headline = Composition::sequence(
        units[0].clone(),
        Composition::sequence(units[1].clone(), units[2].clone()).map_err(|e| e.to_string())?,
    )
    .map_err(|e| e.to_string())?;
    let verifier = LawVerifier::new(vec![
        json!("  breaking   news "),
        json!("calm"),
        json!({"input": " two  words"}),
        json!(7),
    ]);
    let headline = rt
        .block_on(verifier.verified(headline, &units))
        .map_err(|e| format!("concept.headline: {}", e))?;
    register(
        StaticNode::builder("concept.headline")
            .description("Text normalization pipeline")
            .aspect(
                "render",
                AspectMetadata::composing("Trim, collapse spaces, uppercase").idempotent(true),
                headline,
            )
            .build(),
    )?;

    Ok(Dispatcher::builder(registry)
        .config(config)
        .grant("auditor", ["census", "demolish"])
        .build())
}
