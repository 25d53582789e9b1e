use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::json;
use visionflow_service::{
    EditorSession, HttpWorkflowApi, SaveOutcome, ServiceConfig, WorkflowApi,
};
use workflow_graph::{CatalogDescription, GraphPayload, GraphStore, KindCompatibilityIndex};

/// Command-line front end for the VisionFlow workflow editor core
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/visionflow/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a graph offline and print validation issues and available references
    Check {
        /// `describe` response JSON
        #[arg(long)]
        catalog: PathBuf,
        /// Workflow payload JSON
        #[arg(long)]
        graph: PathBuf,
    },
    /// Fetch a workflow and print its payload
    Pull {
        workflow_id: String,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Save a local payload as a workflow
    Push {
        workflow_id: String,
        #[arg(long)]
        graph: PathBuf,
    },
    /// List models selectable in model fields
    Models,
}

type CliResult<T> = Result<T, Box<dyn Error>>;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Check { catalog, graph } => check(&catalog, &graph).await,
        command => {
            let config = load_config(cli.config.as_deref()).await?;
            remote(command, config).await
        }
    }
}

async fn load_config(path: Option<&Path>) -> CliResult<ServiceConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match ServiceConfig::default_path() {
            Some(path) => path,
            None => {
                log::warn!("No config directory on this platform, using defaults");
                return Ok(ServiceConfig::default());
            }
        },
    };
    Ok(ServiceConfig::load(&path).await?)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let value = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", path.display(), e))?;
    Ok(value)
}

async fn check(catalog: &Path, graph: &Path) -> CliResult<ExitCode> {
    let description: CatalogDescription = read_json(catalog).await?;
    let payload: GraphPayload = read_json(graph).await?;

    let index = Arc::new(KindCompatibilityIndex::new(description.kinds_connections));
    let store = GraphStore::from_payload(payload, index)?;
    let issues = store.validate();

    let report = json!({
        "issues": issues,
        "availability": store.availability(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if issues.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        for issue in &issues {
            log::warn!("{}", issue);
        }
        Ok(ExitCode::FAILURE)
    }
}

async fn remote(command: Command, config: ServiceConfig) -> CliResult<ExitCode> {
    let api: Arc<dyn WorkflowApi> = Arc::new(HttpWorkflowApi::from_config(&config));

    match command {
        Command::Models => {
            let models = api.list_models().await?;
            println!("{}", serde_json::to_string_pretty(&models)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Pull { workflow_id, out } => {
            let mut session = EditorSession::new(api, config);
            session.fetch_catalog().await?;
            session.open(&workflow_id).await?;

            let Some(store) = session.store() else {
                return Ok(ExitCode::FAILURE);
            };
            for issue in store.validate() {
                log::warn!("{}", issue);
            }
            let contents = serde_json::to_string_pretty(&store.payload())?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, contents).await?;
                    log::info!("Wrote workflow to {}", path.display());
                }
                None => println!("{}", contents),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Push { workflow_id, graph } => {
            let payload: GraphPayload = read_json(&graph).await?;
            let mut session = EditorSession::new(api, config);
            session.fetch_catalog().await?;
            session.import(&workflow_id, payload)?;

            match session.save().await? {
                SaveOutcome::Saved => Ok(ExitCode::SUCCESS),
                SaveOutcome::Failed { message } => {
                    eprintln!("Save failed: {}", message);
                    Ok(ExitCode::FAILURE)
                }
                SaveOutcome::Unknown => {
                    eprintln!("Save timed out; check the remote workflow before pushing again");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Check { .. } => Ok(ExitCode::FAILURE),
    }
}
