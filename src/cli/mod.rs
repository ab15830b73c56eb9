//! CLI commands for teamwire using clap.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::{load_settings_from, load_settings_or_default, Settings};
use crate::core::{AgentDirectory, CollaborationProtocol, ProtocolConfig, SendOptions};
use crate::protocol::{is_expired, validate, validate_wire, MessageType, Priority, ProtocolMessage};

const COORDINATOR: &str = "coordinator";

/// teamwire - prioritized messaging between collaborating agents.
#[derive(Parser)]
#[command(name = "teamwire")]
#[command(version)]
#[command(about = "teamwire - inter-agent collaboration protocol", long_about = None)]
pub struct Commands {
    /// Settings file (defaults to ~/.teamwire/settings.json)
    #[arg(long, global = true, env = "TEAMWIRE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an in-process team exchanging tasks, then print every agent's stats
    Demo {
        /// Workers to spawn when settings list no agents
        #[arg(long, default_value_t = 3)]
        workers: usize,

        /// Task requests sent by the coordinator
        #[arg(long, default_value_t = 6)]
        tasks: usize,
    },

    /// Check a canonical message JSON file
    Validate {
        /// Path to the message file
        path: PathBuf,
    },

    /// Show effective settings
    Settings,
}

impl Commands {
    /// Settings from `--config`, or the default location with fallback to defaults.
    pub fn load_settings(&self) -> crate::error::Result<Settings> {
        match &self.config {
            Some(path) => load_settings_from(path),
            None => Ok(load_settings_or_default()),
        }
    }

    pub async fn run(&self, settings: &Settings) -> Result<()> {
        match &self.command {
            Command::Demo { workers, tasks } => cmd_demo(settings, *workers, *tasks).await,
            Command::Validate { path } => cmd_validate(path),
            Command::Settings => cmd_settings(settings),
        }
    }
}

// Command implementations

async fn cmd_demo(settings: &Settings, workers: usize, tasks: usize) -> Result<()> {
    let config = settings.protocol.protocol_config();
    let roster: Vec<(String, String)> = if settings.agents.is_empty() {
        (1..=workers.max(1))
            .map(|i| (format!("worker-{}", i), "worker".to_string()))
            .collect()
    } else {
        settings
            .agents
            .iter()
            .map(|(id, agent)| (id.clone(), agent.role.clone()))
            .collect()
    };

    let directory = AgentDirectory::new();
    let coordinator = CollaborationProtocol::with_config(COORDINATOR, COORDINATOR, config.clone());
    coordinator.register_in(&directory).await;

    let (results_tx, mut results) = mpsc::unbounded_channel();
    coordinator
        .register_handler(MessageType::TaskResponse, move |msg: ProtocolMessage| {
            let results_tx = results_tx.clone();
            async move {
                results_tx.send(msg)?;
                anyhow::Ok(())
            }
        })
        .await;

    let mut team = Vec::with_capacity(roster.len());
    for (id, role) in &roster {
        let worker = spawn_worker(id, role, config.clone(), &coordinator).await;
        worker.register_in(&directory).await;
        coordinator.connect_via(id.as_str(), &directory).await;
        team.push(worker);
    }

    coordinator.start().await;
    for worker in &team {
        worker.start().await;
    }

    let participants: Vec<String> = roster.iter().map(|(id, _)| id.clone()).collect();
    coordinator
        .create_conversation(&participants, "demo sprint", Some(json!("welcome aboard")))
        .await;

    for n in 0..tasks {
        let (worker_id, _) = &roster[n % roster.len()];
        let priority = Priority::ALL[n % Priority::ALL.len()];
        coordinator
            .send_with(
                Some(worker_id.as_str()),
                MessageType::TaskRequest,
                "execute_task",
                json!({"task": format!("task-{}", n + 1)}),
                SendOptions::default().with_priority(priority),
            )
            .await;
    }
    coordinator
        .send(None, MessageType::StatusUpdate, "status_update", json!({"status": "tasks_dispatched"}))
        .await;

    let mut completed = 0;
    while completed < tasks {
        match tokio::time::timeout(Duration::from_secs(5), results.recv()).await {
            Ok(Some(msg)) => {
                completed += 1;
                println!(
                    "{} finished {} ({})",
                    msg.sender(),
                    msg.data()["task"].as_str().unwrap_or("?"),
                    msg.priority()
                );
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!("Timed out waiting for task results ({}/{})", completed, tasks);
                break;
            }
        }
    }

    coordinator.stop().await;
    let mut stats = vec![coordinator.stats().await];
    for worker in &team {
        worker.stop().await;
        stats.push(worker.stats().await);
    }

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn spawn_worker(
    id: &str,
    role: &str,
    config: ProtocolConfig,
    coordinator: &CollaborationProtocol,
) -> CollaborationProtocol {
    let worker = CollaborationProtocol::with_config(id, role, config);
    worker.connect(COORDINATOR, coordinator).await;

    let responder = worker.clone();
    worker
        .register_handler(MessageType::TaskRequest, move |msg: ProtocolMessage| {
            let responder = responder.clone();
            async move {
                let task = msg.data().get("task").cloned().unwrap_or(Value::Null);
                tracing::debug!("{} working on {}", responder.employee_id(), task);
                responder
                    .reply(
                        &msg,
                        MessageType::TaskResponse,
                        "task_result",
                        json!({"task": task, "status": "done"}),
                    )
                    .await;
                anyhow::Ok(())
            }
        })
        .await;

    let joiner = worker.clone();
    worker
        .register_handler(MessageType::CollaborationRequest, move |msg: ProtocolMessage| {
            let joiner = joiner.clone();
            async move {
                match joiner.accept_invitation(&msg).await {
                    Some(id) => tracing::info!("{} joined {}", joiner.employee_id(), id),
                    None => tracing::debug!("{} ignored {}", joiner.employee_id(), msg.action()),
                }
                anyhow::Ok(())
            }
        })
        .await;

    worker
        .register_handler(MessageType::StatusUpdate, |msg: ProtocolMessage| async move {
            tracing::info!("Status from {}: {}", msg.sender(), msg.data());
            anyhow::Ok(())
        })
        .await;

    worker
}

fn cmd_validate(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let mut errors = validate_wire(&value);
    let message = if errors.is_empty() {
        let message = ProtocolMessage::from_canonical(value)?;
        errors = validate(&message);
        Some(message)
    } else {
        None
    };

    if !errors.is_empty() {
        for error in &errors {
            println!("  - {}", error);
        }
        anyhow::bail!("{} has {} validation error(s)", path.display(), errors.len());
    }

    if let Some(msg) = message {
        println!("Valid message {}", msg.id());
        println!("  type:     {}", msg.message_type());
        println!("  priority: {}", msg.priority());
        println!("  route:    {} -> {}", msg.sender(), msg.receiver().unwrap_or("(broadcast)"));
        println!("  action:   {}", msg.action());
        if is_expired(&msg) {
            println!("  expired:  yes");
        }
    }
    Ok(())
}

fn cmd_settings(settings: &Settings) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
