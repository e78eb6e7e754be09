mod backend;
mod commands;
mod utils;

use backend::{BackendKind, Session};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "driftwood")]
#[command(about = "Reconcile Azure resources against a local state file", long_about = None)]
struct Cli {
    /// Management API backend
    #[arg(long, global = true, value_enum, env = "DRIFTWOOD_BACKEND", default_value_t = BackendKind::Arm)]
    backend: BackendKind,

    /// Directory holding .driftwood/
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported resource types
    Types,
    /// Create a resource and record it in state
    Create {
        /// Resource type, e.g. azurerm_resource_group
        resource_type: String,
        /// Name of the instance in state
        name: String,
        /// Resource configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Take over a remote object that already exists
        #[arg(long)]
        adopt: bool,
    },
    /// Refresh an instance from the remote API
    Read {
        /// Instance address, <type>.<name>
        address: String,
    },
    /// Update an instance in place
    Update {
        /// Instance address, <type>.<name>
        address: String,
        /// Resource configuration (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Delete an instance and remove it from state
    Delete {
        /// Instance address, <type>.<name>
        address: String,
    },
    /// Bring an existing remote object under management
    Import {
        resource_type: String,
        name: String,
        /// Remote resource ID
        id: String,
    },
    /// Inspect recorded state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum StateCommands {
    /// List managed instances
    List,
    /// Show one instance with its attributes
    Show { address: String },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_root = cli.project_dir;
    let command = match cli.command {
        Commands::Version => {
            println!("driftwood {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Types => {
            commands::types::handle();
            return Ok(());
        }
        Commands::State { command } => {
            return match command {
                StateCommands::List => commands::state::list(&project_root).await,
                StateCommands::Show { address } => commands::state::show(&project_root, &address).await,
            };
        }
        other => other,
    };

    // Ctrl-C cancels in-flight operations
    let stop = CancellationToken::new();
    let trigger = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            trigger.cancel();
        }
    });

    let session = Session::open(cli.backend, &project_root, stop).await?;
    let provider = session.provider();

    let result = match command {
        Commands::Create {
            resource_type,
            name,
            config,
            adopt,
        } => commands::resource::create(provider, &project_root, &resource_type, &name, &config, adopt).await,
        Commands::Read { address } => commands::resource::read(provider, &project_root, &address).await,
        Commands::Update { address, config } => {
            commands::resource::update(provider, &project_root, &address, &config).await
        }
        Commands::Delete { address } => commands::resource::delete(provider, &project_root, &address).await,
        Commands::Import {
            resource_type,
            name,
            id,
        } => commands::resource::import(provider, &project_root, &resource_type, &name, &id).await,
        Commands::Types | Commands::State { .. } | Commands::Version => Ok(()),
    };

    // remote changes made before a failure are kept
    session.close().await?;
    result
}
