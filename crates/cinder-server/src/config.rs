//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Command-line options for the server binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "cinder-server", about = "In-memory keyspace server")]
pub struct Options {
    /// Address for the line-protocol TCP listener.
    #[arg(long, default_value = "0.0.0.0:6379")]
    pub tcp_addr: SocketAddr,

    /// Address for the WebSocket listener (`/ws`).
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub ws_addr: SocketAddr,

    /// Address for the HTTP command endpoint (`POST /command`).
    #[arg(long, default_value = "0.0.0.0:8081")]
    pub http_addr: SocketAddr,

    /// Directory holding the append-only log and snapshots.
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Whether mutations are appended to the log.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub appendonly: bool,

    /// Seconds between scheduled snapshots.
    #[arg(long, default_value_t = 300)]
    pub snapshot_interval_secs: u64,
}

impl Options {
    /// Path of the append-only log file.
    pub fn aof_path(&self) -> PathBuf {
        self.data_dir.join("appendonly.aof")
    }

    /// Path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("snapshot.json")
    }
}
