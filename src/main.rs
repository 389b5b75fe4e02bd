//! Pod Composer CLI
//!
//! Runs allocation requests against a pod inventory and attaches assets to
//! composed nodes through a fabric manager.
//!
//! ```text
//! pod-composer allocate   --inventory pod.yaml --request node.yaml
//! pod-composer attach     --inventory pod.yaml --node <id> --resource <id> [--simulate]
//! pod-composer attachable --inventory pod.yaml --node <id>
//! ```

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pod_composer::{
    AllocationPipeline, AttachableAssets, Attacher, ComposerConfig, ComposerMetrics, Error,
    FabricServices, Protocol, ResourceGraph, ResourceId, ResourceRequest, ResourceStore, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Pod Composer - resource matching and fabric attachment for composed nodes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long, global = true, env = "POD_COMPOSER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long, global = true, env = "PRINT_METRICS")]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the computer systems able to host a resource request
    Allocate {
        /// Pod inventory (YAML or JSON list of resources)
        #[arg(long, env = "POD_INVENTORY")]
        inventory: PathBuf,

        /// Resource request (YAML or JSON)
        #[arg(long)]
        request: PathBuf,
    },

    /// Attach an asset to a composed node
    Attach {
        #[arg(long, env = "POD_INVENTORY")]
        inventory: PathBuf,

        /// Composed node identifier
        #[arg(long)]
        node: String,

        /// Drive, volume, processor or endpoint identifier
        #[arg(long)]
        resource: String,

        /// Attach protocol (NVMe, NVMeOverFabrics, PCIe, FPGA-oF)
        #[arg(long)]
        protocol: Option<String>,

        /// Use an in-memory fabric manager seeded from the inventory
        #[arg(long)]
        simulate: bool,
    },

    /// List the assets a composed node could attach
    Attachable {
        #[arg(long, env = "POD_INVENTORY")]
        inventory: PathBuf,

        #[arg(long)]
        node: String,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging.level, config.logging.json);
    info!("Starting {} {}", pod_composer::NAME, pod_composer::VERSION);

    let metrics = match ComposerMetrics::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(e) => {
            error!("Cannot initialize metrics: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(cli.command, config, metrics.clone()).await;

    if cli.print_metrics {
        match metrics.encode() {
            Ok(text) => eprint!("{}", text),
            Err(e) => error!("Cannot encode metrics: {}", e),
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// Configuration file (or defaults) with command-line overrides applied
fn load_config(cli: &Cli) -> Result<ComposerConfig> {
    let mut config = match &cli.config {
        Some(path) => ComposerConfig::load(path)?,
        None => ComposerConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.log_json {
        config.logging.json = true;
    }
    if let Command::Attach { simulate: true, .. } = cli.command {
        config.fabric.adapter = "memory".to_string();
    }
    config.validate()?;
    Ok(config)
}

async fn run(command: Command, config: ComposerConfig, metrics: Arc<ComposerMetrics>) -> Result<()> {
    match command {
        Command::Allocate { inventory, request } => {
            let graph = ResourceGraph::load(&inventory)?;
            let request = ResourceRequest::load(&request)?;

            let result = AllocationPipeline::new().matches_all(&request, &graph);
            metrics.record_allocation_result(&result, result.as_ref().ok().map(|o| &o.diagnostics));
            let outcome = result?;

            let systems: Vec<&ResourceId> = outcome.systems.iter().map(|s| &s.id).collect();
            print_json(&json!({
                "systems": systems,
                "diagnostics": outcome.diagnostics,
            }))
        }

        Command::Attach {
            inventory,
            node,
            resource,
            protocol,
            ..
        } => {
            let protocol = protocol.map(|p| p.parse::<Protocol>()).transpose()?;
            let graph = ResourceGraph::load(&inventory)?;
            let fabric = FabricServices::create(&config.fabric, &graph)?;
            let store = ResourceStore::new(graph);

            let attacher =
                Attacher::new(store, fabric, &config.attach).with_metrics(metrics.clone());
            let outcome = attacher
                .attach(&ResourceId::from(node), &ResourceId::from(resource), protocol)
                .await?;
            print_json(&json!({
                "node": outcome.node.id,
                "connections": outcome.node.connections,
                "resolution": {
                    "initiator_endpoint": outcome.attachment.initiator_endpoint,
                    "target_endpoint": outcome.attachment.target_endpoint,
                    "zone": outcome.attachment.zone,
                },
            }))
        }

        Command::Attachable { inventory, node } => {
            let graph = ResourceGraph::load(&inventory)?;
            let assets = AttachableAssets::list(&graph, &ResourceId::from(node))?;
            print_json(&assets)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Violations and diagnostics go to stdout so scripts can parse them
fn print_error(e: &Error) {
    let mut body = json!({ "error": e.to_string() });
    if let Some(violations) = e.violations() {
        body["violations"] = json!(violations);
    }
    if let Error::AllocationInfeasible { diagnostics, .. } = e {
        body["diagnostics"] = json!(diagnostics);
    }
    if let Ok(text) = serde_json::to_string_pretty(&body) {
        println!("{}", text);
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(log_level: &str, json: bool) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Logs go to stderr; stdout carries the JSON results
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
