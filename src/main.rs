// src/main.rs

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use eternyx_scanner::config::Config;
use eternyx_scanner::core::models::{DnsScanRequest, WebScanRequest};
use eternyx_scanner::core::persistence::{RetryPolicy, ScanStore, SqliteStore};
use eternyx_scanner::core::scanner::context::CancelToken;
use eternyx_scanner::core::scanner::ScanEngine;
use eternyx_scanner::core::service::ScanService;
use eternyx_scanner::{logging, server};

#[derive(Parser, Debug)]
#[command(version, about = "Web application and DNS security scanner")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the scan API over HTTP.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Scan one web application and print the result as JSON.
    Web {
        url: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        depth: Option<u32>,
        #[arg(long)]
        no_persist: bool,
    },
    /// Analyze the DNS configuration of one domain and print the result as JSON.
    Dns {
        domain: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        no_persist: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::initialize_logging(matches!(cli.command, Command::Serve { .. }))?;

    let config = Config::load(cli.config.as_deref()).wrap_err("failed to load configuration")?;

    match cli.command {
        Command::Serve { bind } => {
            let service = Arc::new(build_service(&config, true).await?);
            let address = bind.unwrap_or_else(|| config.server.bind.clone());
            let listener = TcpListener::bind(&address).await.wrap_err_with(|| format!("cannot bind {address}"))?;
            server::serve(listener, service).await?;
        }
        Command::Web { url, user, depth, no_persist } => {
            let service = build_service(&config, !no_persist).await?;
            let request = WebScanRequest { target_url: url, scan_depth: depth, user_id: user };
            let cancel = cancel_on_ctrl_c();
            print_json(&service.web_scan(&request, &cancel).await?)?;
        }
        Command::Dns { domain, user, no_persist } => {
            let service = build_service(&config, !no_persist).await?;
            let request = DnsScanRequest { domain, user_id: user };
            let cancel = cancel_on_ctrl_c();
            print_json(&service.dns_scan(&request, &cancel).await?)?;
        }
    }
    Ok(())
}

async fn build_service(config: &Config, persist: bool) -> Result<ScanService> {
    let engine = ScanEngine::new(config.scanner.clone())?;
    let store: Option<Arc<dyn ScanStore>> = if persist {
        match SqliteStore::connect(&config.database).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(error = %e, "Database unavailable, scans will not be persisted.");
                None
            }
        }
    } else {
        info!("Persistence disabled.");
        None
    };
    Ok(ScanService::new(engine, store, RetryPolicy::from(&config.database), config.scanner.preview_limit))
}

fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling scan.");
            trigger.cancel();
        }
    });
    cancel
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
