use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trellis_config::{ConstructionMode, GraphConfig};
use trellis_graph::{Graph, GraphError};
use trellis_kv::SqliteKvStore;
use trellis_script::Compiler;

/// Trellis - declare build workflows in Lua, persist them as a dependency graph
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.trellis)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to a JSON config file
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile a workflow script into the graph
  Schedule {
    /// Path to the workflow script
    workflow_file: PathBuf,

    /// Clear the graph before building
    #[arg(long)]
    wipe: bool,

    /// Commit each action with all of its edges in one transaction
    #[arg(long)]
    atomic: bool,
  },

  /// Print every action and artifact in the graph
  Show,

  /// Clear the graph
  Wipe,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".trellis"),
  };

  let mut config = match &cli.config {
    Some(path) => GraphConfig::load(path)
      .with_context(|| format!("failed to load config file: {}", path.display()))?,
    None => GraphConfig::default(),
  };

  let Some(command) = cli.command else {
    println!("trellis - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let (store, graph) = open_graph(&data_dir, &config).await?;

    let result = match command {
      Commands::Schedule {
        workflow_file,
        wipe,
        atomic,
      } => {
        if wipe {
          config.wipe_before_build = true;
        }
        if atomic {
          config.construction = ConstructionMode::Atomic;
        }
        schedule(&graph, &config, &workflow_file, &cancel).await
      }
      Commands::Show => show(&graph, &cancel).await,
      Commands::Wipe => graph.wipe(&cancel).await.context("failed to wipe graph"),
    };

    store.close().await;
    result
  })
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt_received");
      cancel.cancel();
    }
  });
}

async fn open_graph(data_dir: &Path, config: &GraphConfig) -> Result<(Arc<SqliteKvStore>, Graph)> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let db_path = data_dir.join("graph.db");
  let store = SqliteKvStore::connect(&db_path)
    .await
    .with_context(|| format!("failed to open graph database: {}", db_path.display()))?;
  let store = Arc::new(store);

  let graph = Graph::from_config(store.clone(), config);
  Ok((store, graph))
}

async fn schedule(
  graph: &Graph,
  config: &GraphConfig,
  workflow_file: &Path,
  cancel: &CancellationToken,
) -> Result<()> {
  if config.wipe_before_build {
    graph.wipe(cancel).await.context("failed to wipe graph")?;
  }

  let report = Compiler::from_config(graph.clone(), config)
    .compile_file(workflow_file, cancel)
    .await
    .with_context(|| format!("failed to compile workflow: {}", workflow_file.display()))?;

  info!(actions = report.actions.len(), "workflow_scheduled");

  let actions: Vec<Value> = report
    .actions
    .iter()
    .map(|action| {
      json!({
        "statement": action.statement,
        "id": action.id.to_string(),
        "name": action.label,
        "inputs": id_map(action.inputs.iter().map(|(k, v)| (k, v.to_string()))),
        "outputs": id_map(action.outputs.iter().map(|(k, v)| (k, v.to_string()))),
      })
    })
    .collect();

  println!("{}", serde_json::to_string_pretty(&actions)?);
  Ok(())
}

async fn show(graph: &Graph, cancel: &CancellationToken) -> Result<()> {
  let mut actions = Vec::new();
  let mut stream = graph.list_actions(cancel);
  while let Some(action) = stream.try_next().await.context("failed to list actions")? {
    let inputs = action.inputs(cancel).await?;
    let outputs = action.outputs(cancel).await?;
    actions.push(json!({
      "id": action.id().to_string(),
      "name": action.label(),
      "cmd": action.command(),
      "inputs": id_map(inputs.iter().map(|(k, a)| (k, a.id().to_string()))),
      "outputs": id_map(outputs.iter().map(|(k, a)| (k, a.id().to_string()))),
    }));
  }

  let mut artifacts = Vec::new();
  let mut stream = graph.list_artifacts(cancel);
  while let Some(artifact) = stream.try_next().await.context("failed to list artifacts")? {
    let producer = match artifact.producer(cancel).await {
      Ok(action) => Value::String(action.id().to_string()),
      Err(GraphError::NoProducer(_)) => Value::Null,
      Err(e) => return Err(e.into()),
    };
    let consumers: Vec<String> = artifact
      .consumers(cancel)
      .await?
      .iter()
      .map(|action| action.id().to_string())
      .collect();
    artifacts.push(json!({
      "id": artifact.id().to_string(),
      "label": artifact.label(),
      "kind": artifact.kind().to_string(),
      "producer": producer,
      "consumers": consumers,
    }));
  }

  let output = json!({ "actions": actions, "artifacts": artifacts });
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

fn id_map<'a>(entries: impl Iterator<Item = (&'a String, String)>) -> Map<String, Value> {
  entries
    .map(|(name, id)| (name.clone(), Value::String(id)))
    .collect()
}
