use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use skein_agent::Workflow;
use skein_core::config::AppConfig;

#[derive(Parser)]
#[command(name = "skein", version, about = "DAG workflow engine for tool-calling LLM agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a workflow, then print its execution plan
    Validate {
        /// Path to the workflow JSON file
        workflow: PathBuf,
        /// Comma-separated tool names every action must draw from
        #[arg(long, value_delimiter = ',')]
        tools: Option<Vec<String>>,
    },
    /// Print the topological execution order of a workflow as JSON
    Plan {
        /// Path to the workflow JSON file
        workflow: PathBuf,
    },
    /// Load a config file and print the effective configuration
    Config {
        /// Path to the TOML config file
        #[arg(default_value = "skein.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skein=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { workflow, tools } => {
            let wf = match load_workflow(&workflow, tools.as_deref()) {
                Ok(wf) => wf,
                Err(e) => {
                    error!(path = %workflow.display(), error = %e, "Workflow rejected");
                    return Err(e);
                }
            };
            let plan = wf.plan()?;
            info!(workflow_id = %wf.id, nodes = plan.len(), "Workflow is valid");

            println!("Workflow: {} ({})", wf.name, wf.id);
            if let Some(desc) = &wf.description {
                println!("  {}", desc);
            }
            println!();
            for (step, node_id) in plan.iter().enumerate() {
                let node = wf.get_node(node_id)?;
                if node.dependencies.is_empty() {
                    println!("{:>3}. {} -> {}", step + 1, node.id, node.output.name);
                } else {
                    println!(
                        "{:>3}. {} -> {}  (after {})",
                        step + 1,
                        node.id,
                        node.output.name,
                        node.dependencies.join(", ")
                    );
                }
            }
        }
        Commands::Plan { workflow } => {
            let wf = load_workflow(&workflow, None)?;
            let plan = wf.plan()?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Config { path } => {
            let mut config = AppConfig::load(&path)?;
            if config.model.api_key.is_some() {
                config.model.api_key = Some("********".to_string());
            }
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_workflow(path: &Path, tools: Option<&[String]>) -> anyhow::Result<Workflow> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read workflow file {}", path.display()))?;
    debug!(path = %path.display(), bytes = json.len(), "Loaded workflow file");
    let wf = Workflow::from_json(&json, tools)?;
    Ok(wf)
}
