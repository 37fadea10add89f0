mod handlers;
mod server;
mod session;


use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use seatlock_core::types::Participant;
use seatlock_core::QueueConfig;

#[derive(Parser)]
#[command(
    name = "seatlock",
    about = "Seatlock: single-editor coordination queue for shared documents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Queue tunables shared by every command that opens a store.
#[derive(Args, Debug, Clone)]
struct QueueArgs {
    /// Storage backend: "memory" or "sqlite:<path>"
    #[arg(long, default_value = "memory", env = "SEATLOCK_STORAGE")]
    storage: String,

    /// Milliseconds without a heartbeat before the editor is evicted
    #[arg(long, default_value_t = 30_000, env = "SEATLOCK_LEASE_TIMEOUT_MS")]
    lease_timeout_ms: u64,

    /// Milliseconds between heartbeats sent by a session
    #[arg(long, default_value_t = 5_000, env = "SEATLOCK_HEARTBEAT_INTERVAL_MS")]
    heartbeat_interval_ms: u64,

    /// Milliseconds a viewer stays listed without a ping
    #[arg(long, default_value_t = 15_000, env = "SEATLOCK_PRESENCE_TTL_MS")]
    presence_ttl_ms: u64,

    /// Attempts per operation when the store reports a conflicting commit
    #[arg(long, default_value_t = 3, env = "SEATLOCK_MAX_ATTEMPTS")]
    max_attempts: u32,

    #[arg(long, default_value_t = 10, env = "SEATLOCK_RETRY_BACKOFF_MS")]
    retry_backoff_ms: u64,

    #[arg(long, default_value_t = 200, env = "SEATLOCK_MAX_BACKOFF_MS")]
    max_backoff_ms: u64,
}

impl QueueArgs {
    fn config(&self) -> QueueConfig {
        QueueConfig {
            lease_timeout_ms: self.lease_timeout_ms,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            presence_ttl_ms: self.presence_ttl_ms,
            max_attempts: self.max_attempts,
            retry_backoff_ms: self.retry_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Seatlock HTTP coordination server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3100")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[command(flatten)]
        queue: QueueArgs,

        /// Only accept these resource ids (comma separated); empty accepts any
        #[arg(long, env = "SEATLOCK_RESOURCES", value_delimiter = ',')]
        resources: Vec<String>,

        /// Evict stale editors in the background every N ms (0 = lazy only)
        #[arg(long, default_value_t = 0, env = "SEATLOCK_SWEEP_INTERVAL_MS")]
        sweep_interval_ms: u64,

        /// Maximum requests served at once
        #[arg(long, default_value_t = 256, env = "SEATLOCK_MAX_IN_FLIGHT")]
        max_in_flight: usize,
    },

    /// Join a resource's queue and keep the place alive until Ctrl-C
    Session {
        /// Resource to edit
        resource: String,

        /// Caller's user id
        #[arg(long, env = "SEATLOCK_USER")]
        user: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        queue: QueueArgs,
    },

    /// Print a user's view of a resource's queue as JSON
    Status {
        resource: String,

        #[arg(long, env = "SEATLOCK_USER")]
        user: String,

        #[command(flatten)]
        queue: QueueArgs,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match execute(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Serve {
            port,
            host,
            queue,
            resources,
            sweep_interval_ms,
            max_in_flight,
        } => {
            server::run(server::ServeOptions {
                host,
                port,
                storage: queue.storage.clone(),
                config: queue.config(),
                resources,
                sweep_interval_ms,
                max_in_flight,
            })
            .await?;
        }
        Commands::Session {
            resource,
            user,
            email,
            name,
            queue,
        } => {
            let client = server::create_client(&queue.storage, queue.config(), &[])?;
            let participant = Participant {
                user_id: user,
                user_email: email,
                user_name: name,
            };
            session::run(client, resource, participant).await?;
        }
        Commands::Status {
            resource,
            user,
            queue,
        } => {
            let client = server::create_client(&queue.storage, queue.config(), &[])?;
            let snapshot = client.status(&resource, &user)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Version => {
            println!("seatlock {}", env!("CARGO_PKG_VERSION"));
            println!("Single-editor coordination queue for shared documents");
        }
    }
    Ok(())
}
