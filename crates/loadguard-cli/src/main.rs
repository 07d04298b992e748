//! Loadguard CLI - config checks, live stats and a protected demo server

use anyhow::Context;
use clap::Parser;
use loadguard_core::{protect, GuardConfig, LoadGuard, OverloadResponse, Protection, Response};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "loadguard")]
#[command(about = "Loadguard - overload protection for request-serving processes")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Check configuration validity
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "config/loadguard.json")]
        config: PathBuf,
    },
    /// Print current load stats as JSON
    Status {
        /// Configuration file path (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run a demo HTTP server behind the gate
    Serve {
        /// Configuration file path (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen address
        #[arg(short, long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Some(Commands::Check { config }) => {
            let loaded = GuardConfig::load(&config)
                .with_context(|| format!("invalid config {}", config.display()))?;
            println!("Config OK: {}", config.display());
            println!("{:#?}", loaded);
        }
        Some(Commands::Status { config }) => {
            let config = load_config(config.as_deref())?;
            runtime()?.block_on(status(config))?;
        }
        Some(Commands::Serve { config, addr }) => {
            let config = load_config(config.as_deref())?;
            runtime()?.block_on(serve(config, addr))?;
        }
        None => {
            println!("Loadguard v{} - Use --help for commands", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<GuardConfig> {
    match path {
        Some(path) => GuardConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(GuardConfig::default()),
    }
}

/// Single-threaded runtime: the sampler shares its thread with the handlers.
fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
}

async fn status(config: GuardConfig) -> anyhow::Result<()> {
    let guard = LoadGuard::new(config)?;

    // Give the sampler one full interval.
    tokio::time::sleep(guard.sample_period()).await;
    tokio::task::yield_now().await;

    let stats = guard.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    guard.stop();
    Ok(())
}

async fn serve(config: GuardConfig, addr: SocketAddr) -> anyhow::Result<()> {
    let protection = Arc::new(protect("http", config)?);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "demo server listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accept failed")?;
                let protection = Arc::clone(&protection);
                tokio::spawn(async move {
                    if let Err(e) = handle(stream, &protection).await {
                        warn!(%peer, error = %e, "connection failed");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    protection.stop();
    Ok(())
}

async fn handle(mut stream: TcpStream, protection: &Protection) -> std::io::Result<()> {
    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let target = request.split_whitespace().nth(1).unwrap_or("/");
    debug!(request_target = target, "request");

    let mut response = Response::new();
    if !protection.intercept(&mut response) {
        route(target, &mut response);
    }

    stream.write_all(response.to_http1().as_bytes()).await?;
    stream.shutdown().await
}

fn route(target: &str, response: &mut Response) {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    match path {
        "/" => response.set_body("content"),
        "/busy" => {
            let ms = busy_millis(query);
            // Stalls the runtime thread to provoke event-loop delay.
            std::thread::sleep(Duration::from_millis(ms));
            response.set_body(&format!("busy for {ms} ms"));
        }
        _ => {
            response.set_status(404);
            response.set_body("Not Found");
        }
    }
}

fn busy_millis(query: &str) -> u64 {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "ms")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(100)
}
