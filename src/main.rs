// Kraken WebSocket v2 test proxy

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kraken_test_proxy::server::{self, ProxyContext};
use kraken_test_proxy::{Config, ProxyError};

#[derive(Parser)]
#[command(name = "kraken-proxy")]
#[command(about = "TLS proxy for Kraken WebSocket v2 with synthetic trade execution")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept client connections and relay them to Kraken (default)
    Serve,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.config).await,
        Commands::Init { force } => init(cli.config, force),
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("\n{}", e.user_message());
        std::process::exit(1);
    }
}

async fn serve(config_path: PathBuf) -> Result<(), ProxyError> {
    let config = Config::from_file(&config_path)?;
    info!("📄 Loaded configuration from {}", config_path.display());
    info!(
        "🔀 Trade intercept {} (fee ratio {}, {} fills)",
        if config.trade_intercept.enabled { "enabled" } else { "disabled" },
        config.trade_intercept.fee_ratio,
        if config.trade_intercept.match_order_book { "order book" } else { "immediate" }
    );

    let ctx = Arc::new(ProxyContext::new(config));
    if !ctx.orderbooks.is_empty() {
        info!("📖 Simulated order books: {}", ctx.orderbooks.symbols().join(", "));
    }

    server::listen(ctx).await
}

fn init(config_path: PathBuf, force: bool) -> Result<(), ProxyError> {
    if config_path.exists() && !force {
        info!("Configuration already exists at {} (use --force to overwrite)", config_path.display());
        return Ok(());
    }

    Config::default().to_file(&config_path)?;
    info!("✅ Wrote default configuration to {}", config_path.display());
    Ok(())
}
