use std::io::read_to_string;

use anyhow::{Context, Result};
use avatar_backend::{api::*, chat::Turn, client::RemoteClient, config::Config, LocalClient};
use clap::*;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the language of stdin and print the voice locale for it
    Detect {},
    /// Read a JSON transcript from stdin and print the reply with any product cards
    Message {},
    /// Runs a daemon that provides a HTTP REST interface
    Daemon {},
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if dotenv::dotenv().is_err() {
        warn!("didn't load a .env file")
    }

    let args = Cli::parse();

    match args.command {
        Commands::Detect {} => {
            println!("Enter text to detect:");
            let input = read_to_string(std::io::stdin())?;

            let locale = connect()?.detect_language(input.trim()).await?;
            println!("{locale}");
        }
        Commands::Message {} => {
            println!("Enter transcript as a JSON array:");
            let input = read_to_string(std::io::stdin())?;
            let transcript: Vec<Turn> =
                serde_json::from_str(&input).context("transcript is not valid JSON")?;

            let exchange = connect()?.message(transcript).await?;
            println!("{}", serde_json::to_string_pretty(&exchange)?);
        }
        Commands::Daemon {} => {
            let config = Config::from_env().context("failed to load configuration")?;
            LocalClient::new(&config)
                .context("failed to create local client")?
                .daemonize(&config.host, config.port)
                .await?;
        }
    }

    Ok(())
}

/// Talks to the daemon at `API_URL` when set, otherwise runs everything in-process.
fn connect() -> Result<Box<dyn ClientApi>> {
    if let Ok(url) = std::env::var("API_URL") {
        return Ok(Box::new(RemoteClient::new(&url)));
    }
    let config = Config::from_env().context("failed to load configuration")?;
    Ok(Box::new(
        LocalClient::new(&config).context("failed to create client")?,
    ))
}
