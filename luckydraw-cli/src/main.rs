mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::CliConfig;
use luckydraw_core::LuckyDrawError;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "luckydraw")]
#[command(about = "LuckyDraw - live prize draw roles for one event")]
#[command(version)]
struct Cli {
    /// Data directory for config and the local ticket store
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Draw service base URL
    #[arg(short, long, global = true, env = "LUCKYDRAW_SERVER_URL")]
    server: Option<String>,

    /// Event to join
    #[arg(short, long, global = true)]
    event: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a presentation surface (big screen)
    Present(commands::PresentArgs),

    /// Join as an audience device
    Audience(commands::AudienceArgs),

    /// Controller commands
    #[command(subcommand)]
    Control(commands::ControlCommands),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "luckydraw={}",
            log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Get data directory
    let data_dir = cli.data_dir.unwrap_or_else(|| CliConfig::default().data_dir);

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir).await?;

    let mut config = CliConfig::load(&data_dir).await?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(event) = cli.event {
        config.event_id = event;
    }
    config.client_config().validate()?;

    // Execute command
    let result = match cli.command {
        Commands::Present(args) => commands::handle_present_command(args, &config).await,
        Commands::Audience(args) => commands::handle_audience_command(args, &config).await,
        Commands::Control(cmd) => commands::handle_control_command(cmd, &config).await,
    };

    if let Err(e) = result {
        match e {
            LuckyDrawError::InvalidWinnerCount {
                mode,
                requested,
                max,
            } => {
                eprintln!("Error: {} draws show at most {} winner(s)", mode, max);
                eprintln!("Requested: {}", requested);
            }
            LuckyDrawError::NotConnected => {
                eprintln!("Error: Not connected to the event");
            }
            LuckyDrawError::NetworkConnection(msg) => {
                eprintln!("Error: Could not reach {}: {}", config.server_url, msg);
                eprintln!("Use --server or LUCKYDRAW_SERVER_URL to point at the draw service");
            }
            LuckyDrawError::Service(msg) => {
                eprintln!("Error: Draw service rejected the request: {}", msg);
            }
            _ => {
                eprintln!("Error: {}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
