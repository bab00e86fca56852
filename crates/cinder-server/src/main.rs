//! Server entry point: wires the shared state, background tasks, and
//! the three network surfaces together.

mod config;
mod db;
mod dispatch;
mod http;
mod net;
mod pubsub;
mod tasks;
mod txn;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use config::Options;
use db::Db;

/// Identifies one client across dispatch, transactions, and pub/sub.
pub type ClientId = u64;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinder=info".into()),
        )
        .init();

    let options = Options::parse();
    info!("cinder server starting...");

    let aof_path = options.appendonly.then(|| options.aof_path());
    let db = match Db::open(aof_path, options.snapshot_path()) {
        Ok(db) => db,
        Err(e) => {
            error!("failed to open append-only log: {e}");
            return ExitCode::FAILURE;
        }
    };

    let tcp_listener = match TcpListener::bind(options.tcp_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %options.tcp_addr, "failed to bind tcp listener: {e}");
            return ExitCode::FAILURE;
        }
    };
    let ws_listener = match TcpListener::bind(options.ws_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %options.ws_addr, "failed to bind websocket listener: {e}");
            return ExitCode::FAILURE;
        }
    };
    let http_listener = match TcpListener::bind(options.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %options.http_addr, "failed to bind http listener: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(tasks::run_expirer(db.clone(), shutdown_rx.clone()));
    tokio::spawn(tasks::run_snapshot_scheduler(
        db.clone(),
        Duration::from_secs(options.snapshot_interval_secs),
        shutdown_rx,
    ));

    tokio::spawn(net::run(db.clone(), tcp_listener));

    let ws_app = http::ws_router(db.clone());
    info!(addr = %options.ws_addr, "websocket listener ready");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(ws_listener, ws_app).await {
            error!("websocket server failed: {e}");
        }
    });

    let command_app = http::command_router(db.clone());
    info!(addr = %options.http_addr, "http command listener ready");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, command_app).await {
            error!("http command server failed: {e}");
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(e) => error!("failed to listen for shutdown signal: {e}"),
    }

    // stop background tasks, then flush and close the log
    let _ = shutdown_tx.send(true);
    db.close();
    ExitCode::SUCCESS
}
