use clap::{Parser, Subcommand};
use nagare::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Orders, runs, or generates a program from a dataflow graph description
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print node ids in execution order
    Order {
        /// Path to the graph description JSON file
        graph: PathBuf,
    },
    /// Generate the equivalent Python program
    Generate {
        /// Path to the graph description JSON file
        graph: PathBuf,
        /// Write the program here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Interpret the graph and print every node's outputs as JSON
    Run {
        /// Path to the graph description JSON file, or a plan with --from-plan
        graph: PathBuf,
        /// Treat the input as a plan artifact written by `plan`
        #[arg(long)]
        from_plan: bool,
        /// Run ready nodes concurrently on this many worker threads
        #[arg(long)]
        parallel: Option<usize>,
        /// Accept any mapping for multi-output nodes
        #[arg(long)]
        lenient: bool,
        /// JSON engine config; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Resolve the graph and save the execution plan artifact
    Plan {
        /// Path to the graph description JSON file
        graph: PathBuf,
        /// Where to write the bincode plan
        #[arg(short, long, default_value = "graph.plan")]
        output: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nagare=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Order { graph } => {
            let graph = load_graph(&graph);
            let order = Engine::builder()
                .build()
                .order(&graph)
                .unwrap_or_else(|e| exit_with_error(&e.to_string()));
            for id in order {
                println!("{}", id);
            }
        }
        Command::Generate { graph, output } => {
            let graph = load_graph(&graph);
            let program = Engine::builder()
                .build()
                .generate(&graph)
                .unwrap_or_else(|e| exit_with_error(&format!("Generation failed: {}", e)));
            match output {
                Some(path) => fs::write(&path, program).unwrap_or_else(|e| {
                    exit_with_error(&format!("Failed to write '{}': {}", path.display(), e))
                }),
                None => print!("{}", program),
            }
        }
        Command::Run {
            graph,
            from_plan,
            parallel,
            lenient,
            config,
        } => run(graph, from_plan, parallel, lenient, config),
        Command::Plan { graph, output } => {
            let graph = load_graph(&graph);
            let plan = Engine::builder()
                .build()
                .plan(&graph)
                .unwrap_or_else(|e| exit_with_error(&e.to_string()));
            plan.save(&output)
                .unwrap_or_else(|e| exit_with_error(&e.to_string()));
            eprintln!("Saved plan for {} nodes to '{}'", plan.len(), output.display());
        }
    }
}

fn run(
    path: PathBuf,
    from_plan: bool,
    parallel: Option<usize>,
    lenient: bool,
    config_path: Option<PathBuf>,
) {
    let mut config = match config_path {
        Some(config_path) => {
            let text = fs::read_to_string(&config_path).unwrap_or_else(|e| {
                exit_with_error(&format!(
                    "Failed to read config file '{}': {}",
                    config_path.display(),
                    e
                ))
            });
            EngineConfig::from_json(&text)
                .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse config: {}", e)))
        }
        None => EngineConfig::default(),
    };
    if let Some(workers) = parallel {
        config.mode = ExecutionMode::Parallel { workers };
    }
    if lenient {
        config.output_policy = OutputPolicy::Lenient;
    }

    let engine = Engine::builder().with_config(config).build();
    let plan = if from_plan {
        ExecutionPlan::from_file(&path).unwrap_or_else(|e| exit_with_error(&e.to_string()))
    } else {
        engine
            .plan(&load_graph(&path))
            .unwrap_or_else(|e| exit_with_error(&e.to_string()))
    };

    let start = Instant::now();
    let report = engine.run_plan(&plan);
    let elapsed = start.elapsed();

    let json = serde_json::to_string_pretty(&report.outputs)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to encode outputs: {}", e)));
    println!("{}", json);

    for failure in &report.failures {
        eprintln!("  -> {}", failure.error);
    }
    eprintln!(
        "Ran {} of {} nodes in {:?} ({} failed)",
        report.outputs.len(),
        plan.len(),
        elapsed,
        report.failures.len()
    );
    if !report.failures.is_empty() {
        std::process::exit(2);
    }
}

fn load_graph(path: &Path) -> Graph {
    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        exit_with_error(&format!(
            "Failed to read graph file '{}': {}",
            path.display(),
            e
        ))
    });
    Graph::from_json(&text).unwrap_or_else(|e| exit_with_error(&e.to_string()))
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
