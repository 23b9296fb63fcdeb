//! Hearth CLI
//!
//! Line-oriented relay between a terminal and the reasoning engine.

use anyhow::Context;
use clap::{Parser, Subcommand};
use hearth::{
    ContextStore, EngineGateway, HearthConfig, Relay, RestStore, SessionManager,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Hearth - personal assistant relay
#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Hearth home directory (default: $HEARTH_HOME or ~/.hearth)
    #[arg(long)]
    home: Option<PathBuf>,

    /// Config file (default: <home>/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Relay stdin lines to the engine (default)
    Chat,
    /// Run one proactive check-in and print the message, if any
    CheckIn,
    /// Show token usage
    Usage,
    /// Show session settings
    Status,
    /// Start a fresh conversation on the next message
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let home = match cli.home {
        Some(home) => home,
        None => hearth::config::default_home()?,
    };
    let config = HearthConfig::load(home, cli.config.as_deref())
        .context("Failed to load configuration")?;
    info!("Hearth home: {:?}", config.home);

    tokio::fs::create_dir_all(&config.workspace_dir)
        .await
        .with_context(|| format!("Failed to create workspace {:?}", config.workspace_dir))?;

    let session = Arc::new(
        SessionManager::load(&config.session_file)
            .await
            .context("Failed to load session state")?,
    );
    let store = connect_store(&config).await;
    let engine = Arc::new(
        EngineGateway::new(&config.engine.binary).with_timeout(config.engine.timeout),
    );
    let relay = Arc::new(Relay::new(config, session, engine, store));

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(relay).await,
        Command::CheckIn => {
            if let Some(message) = relay.check_in().await {
                println!("{}", message);
            }
        }
        Command::Usage => println!("{}", relay.session().token_usage_summary().await),
        Command::Status => println!("{}", relay.status_report().await),
        Command::Clear => {
            relay.session().clear().await;
            println!("Session cleared.");
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Check the store once; an unreachable store disables memory features.
async fn connect_store(config: &HearthConfig) -> Option<Arc<dyn ContextStore>> {
    let Some(settings) = &config.store else {
        info!("No store configured; memory features disabled");
        return None;
    };

    let store = match RestStore::new(&settings.url, &settings.key) {
        Ok(store) => store,
        Err(e) => {
            warn!("Failed to create store client: {}; memory features disabled", e);
            return None;
        }
    };
    match store.health_check().await {
        Ok(()) => {
            info!("Connected to store at {}", settings.url);
            Some(Arc::new(store))
        }
        Err(e) => {
            warn!("Store unreachable ({}); memory features disabled", e);
            None
        }
    }
}

async fn run_chat(relay: Arc<Relay>) {
    let (input_tx, input_rx) = mpsc::channel::<String>(32);
    let (output_tx, mut output_rx) = mpsc::channel::<String>(32);

    // Stdin is blocking; read it on its own thread
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if input_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(msg) = output_rx.recv().await {
            if let Err(e) = writeln!(io::stdout(), "{}\n", msg) {
                error!("Error writing stdout: {}", e);
                break;
            }
            let _ = io::stdout().flush();
        }
    });

    relay.run(input_rx, output_tx).await;
    let _ = writer.await;
}
