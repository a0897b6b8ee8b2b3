//! Delegation Agent CLI
//!
//! Command-line interface for managing delegated spending authorities and
//! the automated operations that run through them.

use alloy::primitives::{Address, U256};
use chrono::Utc;
use clap::{Parser, Subcommand};
use defi_delegation_agent::{
    AuditLog, AuthorizationGate, Config, DelegateRegistry, Error, ExecutionRequest,
    OperationScheduler, PersistedState, Result, SimulatedForwarder, TaskKind,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "delegation-agent")]
#[command(about = "Delegated spending authority for automated agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Grant a spending allowance to a delegate
    CreateDelegate {
        /// Delegate address
        #[arg(long)]
        delegate: String,

        /// Owner address granting the allowance
        #[arg(long)]
        owner: String,

        /// Spending limit in smallest currency units
        #[arg(long)]
        limit: String,

        /// Allowed operation tags (repeatable); empty follows the
        /// configured allowlist policy
        #[arg(long)]
        allow: Vec<String>,
    },

    /// Change a delegate's spending limit
    UpdateLimit {
        #[arg(long)]
        delegate: String,

        #[arg(long)]
        owner: String,

        /// New limit in smallest currency units
        #[arg(long)]
        limit: String,
    },

    /// Zero a delegate's spent amount
    ResetSpent {
        #[arg(long)]
        delegate: String,

        #[arg(long)]
        owner: String,
    },

    /// Turn a delegate off
    Deactivate {
        #[arg(long)]
        delegate: String,

        #[arg(long)]
        owner: String,
    },

    /// Permanently delete an inactive delegate
    Remove {
        #[arg(long)]
        delegate: String,

        #[arg(long)]
        owner: String,
    },

    /// List all delegates
    Delegates,

    /// Execute a single request through the authorization gate
    Execute {
        #[arg(long)]
        delegate: String,

        /// Target address
        #[arg(long)]
        target: String,

        /// Value charged against quota (smallest currency units)
        #[arg(long)]
        value: String,

        /// Operation tag (send, swap, stake, unstake, claim)
        #[arg(long)]
        tag: String,

        /// Opaque payload as JSON
        #[arg(long)]
        payload: Option<String>,
    },

    /// Schedule an automated operation
    Schedule {
        #[arg(long)]
        delegate: String,

        /// Human-readable operation name
        #[arg(long)]
        name: String,

        /// Task as JSON, e.g. '{"task":"stake","pool":"0x..","amount":"1000"}'
        #[arg(long)]
        task: String,

        /// Re-arm interval in milliseconds (omit for one-shot)
        #[arg(long)]
        repeat_ms: Option<u64>,

        /// Maximum number of successful executions
        #[arg(long)]
        max_executions: Option<u32>,
    },

    /// List operations, optionally filtered by delegate
    Operations {
        #[arg(long)]
        delegate: Option<String>,
    },

    /// Cancel a scheduled or running operation
    Cancel {
        /// Operation id
        id: Uuid,
    },

    /// Delete a terminal operation record
    DeleteOp {
        /// Operation id
        id: Uuid,
    },

    /// Run the scheduler loop
    Run,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load config
    let config: Config = if let Some(config_path) = cli.config {
        let content =
            std::fs::read_to_string(&config_path).map_err(|e| Error::Config(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
    } else {
        Config::default()
    };

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    // Restore persisted state and wire the core together
    let state = match &config.state_file {
        Some(path) => PersistedState::load_or_create(path)
            .await
            .map_err(|e| Error::Config(format!("failed to load state: {e}")))?,
        None => PersistedState::default(),
    };

    let registry = DelegateRegistry::from_snapshot(state.delegates);
    let mut gate = AuthorizationGate::new(
        registry.clone(),
        Arc::new(SimulatedForwarder::new()),
        &config,
    );
    if let Some(audit_path) = &config.audit_log_path {
        gate = gate.with_audit(AuditLog::new(audit_path));
    }
    let scheduler = OperationScheduler::new(gate.clone());
    scheduler.restore(state.operations).await;

    match cli.command {
        Commands::CreateDelegate {
            delegate,
            owner,
            limit,
            allow,
        } => {
            let created = registry
                .create_delegate(
                    parse_address(&owner)?,
                    parse_address(&delegate)?,
                    parse_amount(&limit)?,
                    allow.into_iter().collect::<HashSet<_>>(),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        Commands::UpdateLimit {
            delegate,
            owner,
            limit,
        } => {
            registry
                .update_spending_limit(
                    parse_address(&owner)?,
                    parse_address(&delegate)?,
                    parse_amount(&limit)?,
                )
                .await?;
            let updated = registry.get_delegate(parse_address(&delegate)?).await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        Commands::ResetSpent { delegate, owner } => {
            registry
                .reset_spent_amount(parse_address(&owner)?, parse_address(&delegate)?)
                .await?;
        }
        Commands::Deactivate { delegate, owner } => {
            registry
                .deactivate(parse_address(&owner)?, parse_address(&delegate)?)
                .await?;
        }
        Commands::Remove { delegate, owner } => {
            registry
                .remove_delegate(parse_address(&owner)?, parse_address(&delegate)?)
                .await?;
        }
        Commands::Delegates => {
            let delegates = registry.list_delegates().await;
            println!("{}", serde_json::to_string_pretty(&delegates)?);
        }
        Commands::Execute {
            delegate,
            target,
            value,
            tag,
            payload,
        } => {
            let payload = match payload {
                Some(raw) => serde_json::from_str(&raw)?,
                None => serde_json::json!({}),
            };
            let request = ExecutionRequest::new(
                parse_address(&delegate)?,
                parse_address(&target)?,
                parse_amount(&value)?,
                tag,
                payload,
            );
            let result = gate.authorize_and_execute(request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Schedule {
            delegate,
            name,
            task,
            repeat_ms,
            max_executions,
        } => {
            let task: TaskKind = serde_json::from_str(&task)?;
            let operation = scheduler
                .schedule_operation(
                    parse_address(&delegate)?,
                    name,
                    task,
                    repeat_ms,
                    max_executions,
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&operation)?);
        }
        Commands::Operations { delegate } => {
            let filter = match delegate {
                Some(raw) => Some(parse_address(&raw)?),
                None => None,
            };
            let operations = scheduler.list_operations(filter).await;
            println!("{}", serde_json::to_string_pretty(&operations)?);
        }
        Commands::Cancel { id } => {
            scheduler.cancel_operation(id).await?;
            let operation = scheduler.get_operation(id).await?;
            println!("{}", serde_json::to_string_pretty(&operation)?);
        }
        Commands::DeleteOp { id } => {
            let removed = scheduler.delete_operation(id).await?;
            println!("{}", serde_json::to_string_pretty(&removed)?);
        }
        Commands::Run => {
            run_scheduler(&config, &registry, &scheduler).await?;
        }
        Commands::Config => {}
    }

    save_state(&config, &registry, &scheduler).await?;
    Ok(())
}

/// Drive the scheduler, persisting state after every tick
async fn run_scheduler(
    config: &Config,
    registry: &DelegateRegistry,
    scheduler: &OperationScheduler,
) -> Result<()> {
    tracing::info!(
        tick_interval_ms = config.tick_interval_ms,
        "Starting scheduler loop"
    );

    let interval = Duration::from_millis(config.tick_interval_ms);
    if config.state_file.is_none() {
        scheduler.run(interval).await;
        return Ok(());
    }

    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        timer.tick().await;
        let attempts = scheduler.tick(Utc::now()).await;
        if attempts > 0 {
            save_state(config, registry, scheduler).await?;
        }
    }
}

async fn save_state(
    config: &Config,
    registry: &DelegateRegistry,
    scheduler: &OperationScheduler,
) -> Result<()> {
    if let Some(path) = &config.state_file {
        let state = PersistedState {
            delegates: registry.snapshot().await,
            operations: scheduler.snapshot().await,
        };
        state
            .save(path)
            .await
            .map_err(|e| Error::Config(format!("failed to save state: {e}")))?;
    }
    Ok(())
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw).map_err(|e| Error::InvalidArgument(format!("invalid address {raw}: {e}")))
}

fn parse_amount(raw: &str) -> Result<U256> {
    U256::from_str(raw).map_err(|e| Error::InvalidArgument(format!("invalid amount {raw}: {e}")))
}
