mod collectors;
mod config;
mod http;
mod metrics;
mod render;
mod snapshot;
mod stream;

use axum::serve;
use clap::Parser;
use collectors::system::SysinfoProvider;
use config::{Config, FailurePolicy};
use metrics::Metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use stream::{FrameHub, Sampler};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sysdash")]
#[command(version)]
struct Cli {
    /// YAML config file; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    /// Overrides `listen` from the config file.
    #[arg(long)]
    listen: Option<String>,
    /// Stop the process on the first failed tick instead of skipping it.
    #[arg(long)]
    exit_on_error: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(listen) = cli.listen {
        cfg.listen = listen;
    }
    if cli.exit_on_error {
        cfg.failure_policy = FailurePolicy::Exit;
    }
    if let Err(err) = cfg.validate() {
        error!(error = %err, "invalid configuration");
        std::process::exit(1);
    }
    let keep_alive = match cfg.keep_alive_interval() {
        Ok(d) => d,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };
    let addr: SocketAddr = match cfg.listen.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "invalid listen address");
            std::process::exit(1);
        }
    };

    info!(
        listen = %addr,
        disk_path = %cfg.disk_path,
        failure_policy = ?cfg.failure_policy,
        "starting sysdash"
    );

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialise metrics");
            std::process::exit(1);
        }
    };
    let hub = FrameHub::new(cfg.broadcast_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, listen = %addr, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };

    let http_task = {
        let app = http::build_router(http::HttpAppState {
            metrics: metrics.clone(),
            hub: hub.clone(),
            keep_alive,
            shutdown: shutdown_rx.clone(),
        });
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    };

    let mut sampler_task = {
        let sampler = Sampler::new(
            Arc::new(SysinfoProvider::new()),
            cfg.disk_path.clone(),
            cfg.thresholds.clone(),
            cfg.failure_policy,
            hub.clone(),
            metrics.clone(),
        );
        tokio::spawn(sampler.run(shutdown_rx.clone()))
    };

    let exit_code = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                error!(error = %err, "failed to wait for Ctrl+C");
            }
            info!("received Ctrl+C, shutting down");
            0
        }
        finished = &mut sampler_task => {
            match finished {
                Ok(Ok(())) => 0,
                Ok(Err(err)) => {
                    error!(error = %err, "sampler failed, shutting down");
                    1
                }
                Err(err) => {
                    error!(error = %err, "sampler task panicked");
                    1
                }
            }
        }
    };

    let _ = shutdown_tx.send(true);

    if !sampler_task.is_finished() {
        let _ = sampler_task.await;
    }
    let _ = http_task.await;

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
