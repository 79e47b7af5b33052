use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use servient::{Config, ShutdownHandle, default_servient, expose_management};

/// Servient - expose resources over HTTP and CoAP
#[derive(Parser)]
#[command(name = "servient", version, about)]
struct Cli {
    /// Explicit TOML config file (replaces ~/.config/servient/config.toml)
    #[arg(short, long, env = "SERVIENT_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port override
    #[arg(long)]
    http_port: Option<u16>,

    /// CoAP port override; also enables the CoAP server
    #[arg(long)]
    coap_port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,servient=info",
        1 => "info,servient=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Config::from_toml_str(&content)?
        }
        None => Config::load()?,
    };
    if let Some(port) = cli.http_port {
        config.http.port = port;
    }
    if let Some(port) = cli.coap_port {
        config.coap.enabled = true;
        config.coap.port = port;
    }

    let servient = default_servient(&config);
    let shutdown = ShutdownHandle::new();
    expose_management(&servient, shutdown.clone());

    servient.start().await.context("starting servers")?;
    for server in servient.server_descriptions() {
        tracing::info!(
            scheme = %server.scheme,
            port = server.port,
            resources = server.paths.len(),
            "listening"
        );
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for ctrl-c")?;
            tracing::info!("interrupted");
        }
        () = shutdown.triggered() => {}
    }

    servient.shutdown().await?;
    Ok(())
}
