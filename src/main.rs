use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dhcpsim::{Config, Result, Simulation};

#[derive(Parser)]
#[command(name = "dhcpsim")]
#[command(author, version, about = "Simulates the DHCP lease handshake", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Overrides `peer_count` from the config file.
    #[arg(short, long)]
    peers: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let mut config = Config::load_or_create(&cli.config).await?;
    if let Some(peers) = cli.peers {
        config.peer_count = peers;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting simulation with config: {:?}", cli.config);
            let simulation = Simulation::new(config)?;

            let report = tokio::select! {
                result = simulation.run() => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping simulation...");
                    return Ok(());
                }
            };

            println!("{:<12} {:<16} {:<10}", "Peer", "Address", "Attempts");
            println!("{}", "-".repeat(38));
            for outcome in &report.peers {
                println!(
                    "{:<12} {:<16} {:<10}",
                    outcome.lease.peer.to_string(),
                    outcome.lease.address.to_string(),
                    outcome.discover_attempts
                );
            }

            println!();
            println!("{}", serde_json::to_string_pretty(&report.allocator)?);
            Ok(())
        }
        Commands::ShowConfig => {
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
