//! Hotel session CLI - Entry Point
//!
//! Operator tool for logging in, checking the session and issuing
//! authenticated requests against the hotel management API.

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use hotel_session::{Config, PersistenceMode, Session};

#[derive(Parser, Debug)]
#[command(name = "hotel-session")]
#[command(about = "Session client for the hotel management API")]
#[command(version)]
struct Cli {
    /// API base URL
    #[arg(long, env = "HOTEL_API_BASE_URL")]
    base_url: Option<String>,

    /// Keep tokens in memory only or mirror them to the token file
    #[arg(long, env = "HOTEL_TOKEN_STORAGE", default_value = "durable")]
    storage: PersistenceMode,

    /// Token file used with durable storage
    #[arg(long, env = "HOTEL_TOKEN_STORAGE_PATH")]
    storage_path: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the access token
    Login {
        /// Staff email
        #[arg(long, env = "HOTEL_EMAIL")]
        email: String,

        /// Staff password
        #[arg(long, env = "HOTEL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show whether a valid access token is available
    Status,
    /// Authenticated GET, printing the response body
    Get {
        /// Endpoint path, e.g. /rooms
        endpoint: String,
    },
    /// Log out and clear all tokens
    Logout,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let mut config = Config::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.api_base_url = base_url;
    }
    if let Some(path) = cli.storage_path {
        config.storage_path = path;
    }
    config.persistence = cli.storage;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.api_base_url,
        "Starting hotel session client"
    );

    let session = Session::new(config)?;

    match cli.command {
        Command::Login { email, password } => {
            session.auth().login(&email, &password).await?;
            println!("logged in");
        }
        Command::Status => {
            if session.tokens().is_authenticated() {
                println!("authenticated");
            } else {
                println!("not authenticated");
            }
        }
        Command::Get { endpoint } => {
            let body = session.api().get(&endpoint).await?;
            println!("{body}");
        }
        Command::Logout => {
            session.auth().logout().await;
            println!("logged out");
        }
    }

    Ok(())
}
