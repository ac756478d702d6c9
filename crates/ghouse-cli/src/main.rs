//! Command-line interface for the GHouse backend.

use anyhow::Result;
use clap::{Parser, Subcommand};

use ghouse_core::Settings;
use ghouse_core::config::env_vars;

/// GHouse backend - monitoring and control for the agro facility.
#[derive(Parser, Debug)]
#[command(name = "ghouse")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the web server.
    Serve {
        /// Host to bind to (overrides GHOUSE_HOST).
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (overrides GHOUSE_PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the effective configuration and exit.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Check if JSON logging is requested (for production/container environments)
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_level = if args.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("ghouse={default_level},info")));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }

    match args.command {
        Command::Serve { host, port } => {
            let mut settings = Settings::from_env();
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            ghouse_api::run(settings).await
        }
        Command::Config => {
            let settings = Settings::from_env();
            println!("GHouse configuration");
            println!("====================\n");
            println!("Server:   {}", settings.bind_addr());
            println!("Data dir: {}", settings.server.data_dir);
            println!(
                "MQTT:     {}:{} (client id: {})",
                settings.mqtt.broker, settings.mqtt.port, settings.mqtt.client_id
            );
            println!(
                "Telegram: {}",
                if settings.telegram.is_configured() {
                    "configured"
                } else {
                    "not configured"
                }
            );
            Ok(())
        }
    }
}
