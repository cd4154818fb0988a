// src/lib.rs

pub mod cli;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod model;
pub mod scheduler;
pub mod state;

use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::cluster::LocalCluster;
use crate::config::{ConfigFile, load_and_validate};
use crate::controller::{ControllerEvent, ControllerRuntime, Reconciler};
use crate::graph::DependencyGraph;
use crate::state::RunPhase;

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config, admits its graphs and runs into a
/// [`LocalCluster`], then drives the controller until shutdown (or, with
/// `--once`, until every run is terminal).
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    // Room for one creation event per configured run before the loop starts.
    let (tx, rx) = mpsc::channel::<ControllerEvent>(256 + cfg.runs.len());
    let cluster = LocalCluster::new(tx.clone());

    for graph in cfg.graphs.values() {
        cluster.apply_graph(graph.clone()).await?;
    }
    for run in cfg.runs.values() {
        cluster.create_run(run.clone()).await?;
    }

    let reconciler = Reconciler::new(Arc::new(cluster.clone()), cfg.scheduling_context());
    let mut runtime =
        ControllerRuntime::new(reconciler, tx.clone(), rx, cfg.controller_options(args.once));
    for key in cluster.run_keys().await {
        runtime.track(key);
    }

    // Ctrl-C -> graceful shutdown.
    {
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(ControllerEvent::ShutdownRequested).await;
        });
    }

    let phases = runtime.run().await?;

    let mut failed = 0usize;
    for (key, phase) in &phases {
        info!(run = %key, %phase, "final run phase");
        if *phase == RunPhase::Failed {
            failed += 1;
        }
    }

    if args.once && failed > 0 {
        bail!("{failed} of {} run(s) failed", phases.len());
    }
    Ok(())
}

/// Print every graph in start order and the configured runs.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    println!("rundag dry-run");
    println!("  controller.namespace = {}", cfg.controller.namespace);
    println!("  controller.finalizer = {}", cfg.controller.finalizer);
    println!("  controller.unit_port = {}", cfg.controller.unit_port);
    println!();

    println!("graphs ({}):", cfg.graphs.len());
    for (name, graph) in &cfg.graphs {
        let deps = DependencyGraph::from_definition(graph);
        println!("  {name} (starts with: {}):", deps.roots().join(", "));
        for step_name in deps.topological_order()? {
            let Some(step) = graph.step(&step_name) else {
                continue;
            };
            println!("    - {} (image: {}, replicas: {})", step.name, step.image, step.replicas);
            let after = deps.dependencies_of(&step_name);
            if !after.is_empty() {
                println!("        after: {after:?}");
            }
            let unblocks = deps.dependents_of(&step_name);
            if !unblocks.is_empty() {
                println!("        unblocks: {unblocks:?}");
            }
            if !step.command.is_empty() {
                println!("        command: {:?}", step.command);
            }
            if !step.args.is_empty() {
                println!("        args: {:?}", step.args);
            }
        }
    }

    println!();
    println!("runs ({}):", cfg.runs.len());
    for (name, run) in &cfg.runs {
        println!("  - {name} -> {}", run.spec.graph_name);
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
