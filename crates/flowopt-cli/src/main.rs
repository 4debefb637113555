use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flowopt_core::compile::{optimize, CompilationUnit, CompileOutcome};
use flowopt_core::ir::{verify, ClassTable, FeedbackStore, FlowGraph, VerifyLevel};
use flowopt_core::lowering::{call_sequence, collect_call_sites, ObjectPool, Reg};
use flowopt_core::pipeline::{OptimizerConfig, PassConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowopt", about = "Feedback-directed flow graph optimizer")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a JSON flow graph in human-readable form.
    Print {
        /// Path to a JSON flow graph.
        graph: PathBuf,
    },
    /// Check a flow graph's structure and environments.
    Verify {
        graph: PathBuf,
        /// Also require every input to arrive in its expected representation.
        #[arg(long)]
        output: bool,
    },
    /// Run the optimizer pipeline over a flow graph.
    Optimize {
        graph: PathBuf,
        /// JSON optimizer configuration.
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSON feedback store keyed by deopt id.
        #[arg(long)]
        feedback: Option<PathBuf>,
        /// Passes to skip (e.g. "widen-smi-to-int32", "canonicalize").
        #[arg(long = "skip-pass")]
        skip_passes: Vec<String>,
        /// Print the optimized graph to stderr.
        #[arg(long)]
        dump_ir: bool,
        /// Write the optimized graph as JSON here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the calls left in a flow graph with their ARM call sequences.
    CallSites {
        graph: PathBuf,
        /// Machine word size in bytes.
        #[arg(long, default_value_t = 4)]
        word_size: u32,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_graph(path: &Path) -> Result<FlowGraph> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read graph: {}", path.display()))?;
    FlowGraph::from_json(&json).with_context(|| format!("failed to parse graph: {}", path.display()))
}

fn load_config(path: Option<&Path>, skip_passes: &[String]) -> Result<OptimizerConfig> {
    let mut config = match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            OptimizerConfig::from_json(&json)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => OptimizerConfig::default(),
    };
    let skip_refs: Vec<&str> = skip_passes.iter().map(|s| s.as_str()).collect();
    for &name in &skip_refs {
        if PassConfig::from_skip_list(&[name]) == PassConfig::default() {
            warn!(pass = name, "ignoring unknown pass name");
        }
    }
    config.passes.skip(&skip_refs);
    Ok(config)
}

fn load_unit(path: Option<&Path>) -> Result<CompilationUnit> {
    let Some(path) = path else {
        return Ok(CompilationUnit::default());
    };
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read feedback: {}", path.display()))?;
    let feedback: FeedbackStore = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse feedback: {}", path.display()))?;
    Ok(CompilationUnit::new(feedback, ClassTable::default()))
}

fn cmd_print(path: &Path) -> Result<()> {
    let graph = load_graph(path)?;
    println!("{graph}");
    Ok(())
}

fn cmd_verify(path: &Path, output: bool) -> Result<()> {
    let graph = load_graph(path)?;
    let level = if output {
        VerifyLevel::Output
    } else {
        VerifyLevel::Input
    };
    verify(&graph, level).with_context(|| format!("{} is malformed", path.display()))?;
    println!("{}: ok ({} instructions)", graph.name, graph.instruction_count());
    Ok(())
}

fn cmd_optimize(
    path: &Path,
    config_path: Option<&Path>,
    feedback_path: Option<&Path>,
    skip_passes: &[String],
    dump_ir: bool,
    output: Option<&Path>,
) -> Result<()> {
    let graph = load_graph(path)?;
    let config = load_config(config_path, skip_passes)?;
    let unit = load_unit(feedback_path)?;

    let before = graph.instruction_count();
    let outcome = optimize(&graph, &unit, &config);
    let optimized = match outcome {
        CompileOutcome::Optimized(graph) => graph,
        CompileOutcome::Unoptimized { reason, .. } => {
            bail!("optimization of {} failed: {reason}", graph.name)
        }
    };
    info!(
        function = %optimized.name,
        before,
        after = optimized.instruction_count(),
        "optimized"
    );

    if dump_ir {
        eprintln!("{optimized}");
    }
    match output {
        Some(out) => {
            let json = optimized.to_json()?;
            fs::write(out, json).with_context(|| format!("failed to write {}", out.display()))?;
            eprintln!("[optimize] wrote {}", out.display());
        }
        None if !dump_ir => println!("{optimized}"),
        None => {}
    }
    Ok(())
}

fn cmd_call_sites(path: &Path, word_size: u32) -> Result<()> {
    let graph = load_graph(path)?;
    let mut pool = ObjectPool::new(word_size);
    let sites = collect_call_sites(&graph, &mut pool);
    for site in &sites {
        let tail = if site.is_tailcall { " (tail)" } else { "" };
        println!("{:?} {:?}{tail}", site.inst, site.kind);
        for instr in call_sequence(site, Reg::R(0)) {
            println!("    {instr}");
        }
    }
    println!("pool: {} entries", pool.len());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Print { graph } => cmd_print(&graph),
        Command::Verify { graph, output } => cmd_verify(&graph, output),
        Command::Optimize {
            graph,
            config,
            feedback,
            skip_passes,
            dump_ir,
            output,
        } => cmd_optimize(
            &graph,
            config.as_deref(),
            feedback.as_deref(),
            &skip_passes,
            dump_ir,
            output.as_deref(),
        ),
        Command::CallSites { graph, word_size } => cmd_call_sites(&graph, word_size),
    }
}
