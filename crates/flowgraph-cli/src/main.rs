//! Flow graph command-line tools.
//!
//! Provides the `flowgraph` binary for working with graphs stored by the
//! JSON codec: `inspect` prints a summary and the element tree, `validate`
//! runs static validation, and `run` executes a graph headlessly by raising
//! one host event and ticking the coroutine scheduler for a number of frames.
//!
//! Logging goes to stderr through `tracing_subscriber`; set `RUST_LOG`
//! (for example `RUST_LOG=flowgraph_runtime=debug`) to see rebinds, routine
//! scheduling and state transitions.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;

use clap::{Parser, Subcommand};

use flowgraph_core::{validate_graph, ElementId, Graph, NodeKind, TypeRegistry, Value};
use flowgraph_runtime::{GraphHandle, GraphInstance, InstanceConfig, ResolutionPolicy, RuntimeError, TraceEntry};
use flowgraph_storage::{codec, GraphStore, InMemoryStore};

/// Flow graph inspection and execution tools.
#[derive(Parser)]
#[command(name = "flowgraph", about = "Flow graph inspection and execution tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print a graph's summary and element tree.
    Inspect {
        /// Path to the serialized graph.
        file: PathBuf,
    },

    /// Run static validation and list every diagnostic.
    Validate {
        /// Path to the serialized graph.
        file: PathBuf,
    },

    /// Execute a graph headlessly.
    Run {
        /// Path to the serialized graph.
        file: PathBuf,

        /// Host event to raise.
        #[arg(short, long, default_value = "Start")]
        event: String,

        /// Frames to tick after the event, resuming waiting routines.
        #[arg(short, long, default_value_t = 0)]
        frames: u32,

        /// Seconds per frame.
        #[arg(long, default_value_t = 0.016)]
        delta: f64,

        /// Print the execution trace as JSON after the output.
        #[arg(long)]
        trace: bool,

        /// Treat unresolved graph targets as null instead of failing.
        #[arg(long)]
        best_effort: bool,

        /// Maximum nesting of function calls.
        #[arg(long, default_value_t = 256)]
        max_call_depth: usize,

        /// Maximum iterations of a single loop activation.
        #[arg(long, default_value_t = 1_000_000)]
        max_loop_iterations: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Inspect { file } => run_inspect(&file),
        Commands::Validate { file } => run_validate(&file),
        Commands::Run {
            file,
            event,
            frames,
            delta,
            trace,
            best_effort,
            max_call_depth,
            max_loop_iterations,
        } => {
            let options = RunOptions {
                event,
                frames,
                delta,
                config: InstanceConfig {
                    trace_enabled: trace,
                    max_call_depth,
                    max_loop_iterations,
                    resolution: if best_effort {
                        ResolutionPolicy::BestEffort
                    } else {
                        ResolutionPolicy::Strict
                    },
                },
            };
            run_graph(&file, &options)
        }
    };
    process::exit(exit_code);
}

/// Reads and decodes a graph file. Errors are reported on stderr.
fn load_graph(path: &Path) -> Result<Graph, i32> {
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", path.display(), e);
        3
    })?;
    codec::decode(&bytes).map_err(|e| {
        eprintln!("Error: failed to decode '{}': {}", path.display(), e);
        3
    })
}

/// Execute the inspect subcommand.
///
/// Returns exit code: 0 = success, 3 = I/O or decode error.
fn run_inspect(path: &Path) -> i32 {
    let graph = match load_graph(path) {
        Ok(g) => g,
        Err(code) => return code,
    };

    // The store computes the fingerprint the same way a save would.
    let mut store = InMemoryStore::new();
    let summary = match store.save(&graph).and_then(|_| store.list()) {
        Ok(list) => list.into_iter().next(),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    };
    if let Some(summary) = summary {
        let json = serde_json::to_string_pretty(&summary)
            .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize summary: {}\"}}", e));
        println!("{}", json);
    }

    for line in tree_lines(&graph) {
        println!("{}", line);
    }
    0
}

/// One line per element in pre-order, indented by depth.
fn tree_lines(graph: &Graph) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack: Vec<(ElementId, usize)> = vec![(graph.root(), 0)];
    while let Some((id, depth)) = stack.pop() {
        let Some(element) = graph.get(id) else {
            continue;
        };
        let kind = match element.as_node() {
            Some(node) => node_label(&node.kind),
            None => format!("{:?}", element.kind.tag()),
        };
        out.push(format!("{}{} {} [{}]", "  ".repeat(depth), id, element.name, kind));
        for &child in graph.children(id).iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    out
}

fn node_label(kind: &NodeKind) -> String {
    match kind {
        NodeKind::EventEntry { event } => format!("on {}", event),
        NodeKind::FunctionEntry => "entry".to_string(),
        NodeKind::Literal { value } => format!("literal {}", value),
        NodeKind::Member { target, flow: true } => format!("call {}", target),
        NodeKind::Member { target, flow: false } => format!("get {}", target),
        NodeKind::SetValue { target } => format!("set {}", target),
        NodeKind::Sequence { count } => format!("sequence {}", count),
        NodeKind::Jump { kind } => format!("{:?}", kind),
        NodeKind::Return { .. } => "return".to_string(),
        NodeKind::Wait { wait } => format!("wait {:?}", wait),
        NodeKind::Operator { op } => format!("{:?}", op),
        NodeKind::Convert { to } => format!("convert {}", to),
        other => format!("{:?}", other),
    }
}

/// Execute the validate subcommand.
///
/// Returns exit code: 0 = no diagnostics, 2 = diagnostics found,
/// 3 = I/O or decode error.
fn run_validate(path: &Path) -> i32 {
    let graph = match load_graph(path) {
        Ok(g) => g,
        Err(code) => return code,
    };
    let diagnostics = validate_graph(&graph, &TypeRegistry::new());
    if diagnostics.is_empty() {
        println!("{}: ok", graph.name);
        return 0;
    }
    eprintln!("Validation failed with {} diagnostic(s):", diagnostics.len());
    for diagnostic in &diagnostics {
        eprintln!("  - {}", diagnostic);
    }
    2
}

struct RunOptions {
    event: String,
    frames: u32,
    delta: f64,
    config: InstanceConfig,
}

/// What a headless run produced.
#[derive(Debug)]
struct RunReport {
    handlers: usize,
    output: Vec<Value>,
    trace: Vec<TraceEntry>,
    /// Routines still waiting after the last frame.
    pending: usize,
}

/// Execute the run subcommand.
///
/// Returns exit code: 0 = success, 1 = runtime fault, 3 = I/O or decode error.
fn run_graph(path: &Path, options: &RunOptions) -> i32 {
    let graph = match load_graph(path) {
        Ok(g) => g,
        Err(code) => return code,
    };
    let report = match execute(graph, options) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Runtime error: {}", e);
            return 1;
        }
    };

    if report.handlers == 0 {
        eprintln!("warning: no handler for event '{}'", options.event);
    }
    for value in &report.output {
        println!("{}", value);
    }
    if options.config.trace_enabled {
        let json = serde_json::to_string_pretty(&report.trace)
            .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize trace: {}\"}}", e));
        println!("{}", json);
    }
    if report.pending > 0 {
        eprintln!("{} routine(s) still waiting after {} frame(s)", report.pending, options.frames);
    }
    0
}

/// Raises the event on a fresh instance and ticks the requested frames.
fn execute(graph: Graph, options: &RunOptions) -> Result<RunReport, RuntimeError> {
    let mut instance = GraphInstance::new(
        GraphHandle::new(graph),
        Rc::new(TypeRegistry::new()),
        Value::Null,
        options.config.clone(),
    );
    let handlers = instance.trigger_event(&options.event)?;
    for frame in 0..options.frames {
        let resumed = instance.tick(options.delta)?;
        tracing::debug!(frame, resumed, "frame");
    }
    Ok(RunReport {
        handlers,
        output: instance.take_output(),
        trace: instance.trace().to_vec(),
        pending: instance.pending_routines(),
    })
}
