//! Rafiq - Peer-Replicated Key-Value Store
//!
//! Runs a cluster node or talks to one as a client.

use clap::{Parser, Subcommand};
use rafiq_core::RafiqConfig;
use rafiq_server::NodeServer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod client;

#[derive(Parser)]
#[command(name = "rafiq")]
#[command(author = "Rafiq Team")]
#[command(version = rafiq_core::VERSION)]
#[command(about = "Peer-Replicated Key-Value Store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Node identity (must be one of the configured members)
    #[arg(long, env = "RAFIQ_NODE_ID")]
    node_id: Option<String>,

    /// Bind address
    #[arg(long, env = "RAFIQ_BIND_ADDRESS")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, env = "RAFIQ_PORT")]
    port: Option<u16>,

    /// Data directory
    #[arg(long, env = "RAFIQ_DATA_DIR")]
    data_dir: Option<String>,

    /// WebSocket URL of the node to talk to as a client
    #[arg(
        long,
        env = "RAFIQ_URL",
        default_value = "ws://127.0.0.1:8080/client/ws",
        global = true
    )]
    url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RAFIQ_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a cluster node
    Server,

    /// Store a value under a key
    Put {
        key: String,
        /// JSON value; plain text is stored as a JSON string
        value: String,
    },

    /// Fetch the value for a key
    Get { key: String },

    /// Remove a key everywhere
    Delete { key: String },

    /// Stream store changes as they happen
    Watch,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    // Load or create config
    let mut config = if let Some(config_path) = &cli.config {
        RafiqConfig::from_file(config_path)?
    } else {
        RafiqConfig::from_env()
    };

    // Override with CLI args
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir.into();
    }

    match cli.command {
        Some(Commands::Version) => print_banner(),
        Some(Commands::Server) | None => {
            print_banner();
            run_server(config).await?;
        }
        Some(Commands::Put { key, value }) => client::put(&cli.url, &key, &value).await?,
        Some(Commands::Get { key }) => client::get(&cli.url, &key).await?,
        Some(Commands::Delete { key }) => client::delete(&cli.url, &key).await?,
        Some(Commands::Watch) => client::watch(&cli.url).await?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ____        __ _
   |  _ \ __ _ / _(_) __ _
   | |_) / _` | |_| |/ _` |
   |  _ < (_| |  _| | (_| |
   |_| \_\__,_|_| |_|\__, |
                        |_|
   Peer-Replicated Key-Value Store
   Version: {}
"#,
        rafiq_core::VERSION
    );
}

async fn run_server(config: RafiqConfig) -> anyhow::Result<()> {
    info!("Starting Rafiq node {}...", config.node_id);
    info!("Data directory: {:?}", config.storage.data_dir);
    info!("Cluster members: {:?}", config.member_ids());

    let server = NodeServer::new(config);
    server.run().await?;

    Ok(())
}
