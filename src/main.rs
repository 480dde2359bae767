//! EvidenceFlow CLI entry point

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use evidenceflow::backend::{self, ExecContext};
use evidenceflow::core::TaskReport;
use evidenceflow::output::{self, OutputFormat};
use evidenceflow::{plugins, Config, Runner, Workflow, WorkflowResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "evidenceflow")]
#[command(about = "Run forensic processing workflows against evidence stores")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow against one or more stores
    Run {
        /// Workflow definition (YAML)
        workflow: PathBuf,

        /// Store locations, processed one after another
        #[arg(required = true)]
        stores: Vec<String>,

        #[arg(long)]
        plugin_dir: Option<PathBuf>,

        #[arg(long)]
        scripts_dir: Option<PathBuf>,

        #[arg(long)]
        dockerfiles_dir: Option<PathBuf>,

        /// docker-compatible engine CLI
        #[arg(long)]
        engine: Option<String>,

        #[arg(long)]
        docker_host: Option<String>,

        /// Maximum number of tasks running at once
        #[arg(long)]
        max_parallel: Option<usize>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write a JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Validate a workflow and print its execution order
    Graph {
        workflow: PathBuf,

        /// Group tasks that may run side by side
        #[arg(long)]
        levels: bool,
    },

    /// List built-in plugins and those found in the plugin directory
    Plugins {
        #[arg(long)]
        plugin_dir: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct StoreReport<'a> {
    store: &'a str,
    started: Option<DateTime<Utc>>,
    ended: Option<DateTime<Utc>>,
    tasks: Vec<TaskReport<'a>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Run {
            workflow,
            stores,
            plugin_dir,
            scripts_dir,
            dockerfiles_dir,
            engine,
            docker_host,
            max_parallel,
            format,
            report,
        } => {
            let mut config = config;
            if plugin_dir.is_some() {
                config.plugin_dir = plugin_dir;
            }
            if scripts_dir.is_some() {
                config.scripts_dir = scripts_dir;
            }
            if dockerfiles_dir.is_some() {
                config.container.dockerfiles_dir = dockerfiles_dir;
            }
            if let Some(engine) = engine {
                config.container.engine = engine;
            }
            if docker_host.is_some() {
                config.container.host = docker_host;
            }
            run(&config, &workflow, &stores, max_parallel, format, report).await
        }
        Commands::Graph { workflow, levels } => print_graph(&workflow, levels),
        Commands::Plugins { plugin_dir } => {
            let dir = plugin_dir.unwrap_or_else(|| config.plugin_dir());
            list_plugins(&dir);
            Ok(())
        }
    }
}

async fn run(
    config: &Config,
    path: &Path,
    stores: &[String],
    max_parallel: Option<usize>,
    format: OutputFormat,
    report: Option<PathBuf>,
) -> Result<()> {
    log::info!("🚀 EvidenceFlow v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Loading workflow from: {}", path.display());

    let mut workflow = Workflow::from_file(path)?;
    workflow.setup_graph()?;
    let max_parallel = max_parallel
        .or(workflow.max_parallel)
        .or(config.max_parallel);

    let mut results: Vec<(&str, WorkflowResult)> = Vec::new();
    for store in stores {
        let ctx = ExecContext::new(store.as_str(), config.plugin_dir(), plugins::builtin())
            .with_scripts_dir(config.scripts_dir())
            .with_options(Some(config.container.clone()));
        let runner = Runner::new(ctx).with_max_parallel(max_parallel);

        let result = workflow.run_with(&runner).await?;
        print_outputs(&workflow, &result, format);
        results.push((store.as_str(), result));
    }

    if let Some(report_path) = report {
        let reports: Vec<StoreReport<'_>> = results
            .iter()
            .map(|(store, result)| StoreReport {
                store: *store,
                started: result.started,
                ended: result.ended,
                tasks: result.report(),
            })
            .collect();
        let json = serde_json::to_string_pretty(&reports)?;
        std::fs::write(&report_path, json)
            .with_context(|| format!("writing report {}", report_path.display()))?;
        log::info!("Report written to {}", report_path.display());
    }

    let mut failed = false;
    for (store, result) in &results {
        if let Some(err) = result.error() {
            log::error!("{}: {}", store, err);
            failed = true;
        }
    }
    if failed {
        anyhow::bail!("workflow failed for at least one store");
    }
    Ok(())
}

/// Print successful task output in execution order
fn print_outputs(workflow: &Workflow, result: &WorkflowResult, format: OutputFormat) {
    let Some(graph) = workflow.graph() else {
        return;
    };
    for name in graph.ordered_names() {
        let Some(out) = result.get(name).and_then(|o| o.output()) else {
            continue;
        };
        if out.stdout.trim().is_empty() {
            continue;
        }
        print!("{}", output::render(&out.stdout, format));
    }
}

fn print_graph(path: &Path, levels: bool) -> Result<()> {
    let mut workflow = Workflow::from_file(path)?;
    let graph = workflow.setup_graph()?;
    if levels {
        for (level, names) in graph.levels().iter().enumerate() {
            println!("{}: {}", level, names.join(" "));
        }
    } else {
        for name in graph.ordered_names() {
            println!("{}", name);
        }
    }
    Ok(())
}

fn list_plugins(dir: &Path) {
    for name in plugins::builtin().names() {
        println!("{} (built-in)", name);
    }
    for name in backend::discover(dir) {
        println!("{}", name);
    }
}
