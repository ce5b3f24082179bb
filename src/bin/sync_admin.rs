// src/bin/sync_admin.rs
// Operator CLI for DLQ management and conflict review: batched,
// ambient-identity-friendly commands rather than a REPL. Authentication to
// the underlying store is via the same `DATABASE_URL` the server process
// uses (ambient identity) or an explicit `--database-url` override.

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crm_sync_engine::domain::{ModuleKind, ResolutionStrategy};
use crm_sync_engine::store::Store;

/// Batch size used by `dlq list` / `conflicts list` pagination so a single
/// invocation never pulls an unbounded result set into memory.
const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Parser)]
#[command(name = "sync-admin")]
#[command(about = "Operator runbook for the CRM sync engine: DLQ and conflict management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override the database connection string (default: $DATABASE_URL).
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Dead-letter queue management
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },
    /// Sync conflict review and resolution
    Conflicts {
        #[command(subcommand)]
        action: ConflictAction,
    },
}

#[derive(Subcommand)]
enum DlqAction {
    /// List dead-lettered messages
    List {
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Requeue a dead-lettered message onto the active queue, preserving
    /// its body fingerprint, correlation id, and application properties.
    Replay { id: String },
    /// Permanently remove a dead-lettered message.
    Purge { id: String },
}

#[derive(Subcommand)]
enum ConflictAction {
    /// List sync conflicts
    List {
        #[arg(long)]
        module: Option<String>,
        #[arg(long)]
        unresolved: bool,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Resolve a conflict with an explicit strategy
    Resolve {
        id: String,
        /// One of: last_write_wins, manual_review, discard
        #[arg(long)]
        strategy: String,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let database_url = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite://sync_engine.db?mode=rwc".to_string());

    let config = crm_sync_engine::config::server::DatabaseConfig {
        url: database_url,
        max_connections: 5,
    };
    let store = Store::connect(&config).await?;

    match cli.command {
        Commands::Dlq { action } => run_dlq(&store, action).await,
        Commands::Conflicts { action } => run_conflicts(&store, action).await,
    }
}

async fn run_dlq(store: &Store, action: DlqAction) -> anyhow::Result<()> {
    let bus = crm_sync_engine::bus::Bus::new(store.pool.clone(), crm_sync_engine::config::CONFIG.bus.clone());
    match action {
        DlqAction::List { limit, offset } => {
            let entries = bus.list_dlq(limit, offset).await?;
            if entries.is_empty() {
                println!("no dead-lettered messages");
            }
            for entry in entries {
                println!(
                    "{}\tmodule={}\texternal_id={}\tattempts={}\tcorrelation_id={}\terror={}",
                    entry.id,
                    entry.module,
                    entry.external_id,
                    entry.attempts,
                    entry.correlation_id.as_deref().unwrap_or("-"),
                    entry.last_error.as_deref().unwrap_or("-"),
                );
            }
        }
        DlqAction::Replay { id } => match bus.replay_from_dlq(&id).await? {
            Some(msg) => println!("requeued {} (correlation_id={})", msg.id, msg.correlation_id.as_deref().unwrap_or("-")),
            None => println!("no dlq entry with id {id}"),
        },
        DlqAction::Purge { id } => {
            if bus.purge_dlq(&id).await? {
                println!("purged {id}");
            } else {
                println!("no dlq entry with id {id}");
            }
        }
    }
    Ok(())
}

async fn run_conflicts(store: &Store, action: ConflictAction) -> anyhow::Result<()> {
    match action {
        ConflictAction::List { module, unresolved, limit, offset } => {
            let module: Option<ModuleKind> = module
                .map(|m| m.parse())
                .transpose()
                .map_err(|_| anyhow::anyhow!("unknown module"))?;
            let conflicts = store.conflicts.list(module, unresolved, limit, offset).await?;
            if conflicts.is_empty() {
                println!("no conflicts");
            }
            for c in conflicts {
                println!(
                    "{}\tmodule={}\texternal_id={}\tkind={}\tdetected_at={}",
                    c.id,
                    c.module,
                    c.external_id,
                    c.conflict_kind.as_str(),
                    c.detection_time.to_rfc3339(),
                );
            }
        }
        ConflictAction::Resolve { id, strategy, notes } => {
            let strategy = ResolutionStrategy::from_str(&strategy)
                .ok_or_else(|| anyhow::anyhow!("unknown resolution strategy: {strategy}"))?;
            match store.conflicts.resolve(&id, strategy, "operator-cli", notes.as_deref()).await? {
                Some(_) => println!("resolved {id}"),
                None => println!("no conflict with id {id}"),
            }
        }
    }
    Ok(())
}
