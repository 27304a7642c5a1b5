use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use listsync::{ServerConfig, SyncServer};
use log::{error, info};

/// Real-time shared list server
#[derive(Parser, Debug)]
#[command(name = "listsync-server")]
#[command(about = "Serve shared lists over WebSocket")]
struct Args {
    /// Address to listen on
    #[arg(long, short = 'b', env = "LISTSYNC_BIND", default_value = "127.0.0.1:9090")]
    bind: String,

    /// RocksDB directory; lists are kept in memory only when omitted
    #[arg(long, short = 'd', env = "LISTSYNC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Seconds an untouched list stays cached
    #[arg(
        long,
        env = "LISTSYNC_TTL_SECS",
        default_value_t = 3600,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    ttl_secs: u64,

    /// Updates buffered per subscriber before it starts dropping
    #[arg(long, default_value_t = 256)]
    broadcast_capacity: usize,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind.clone(),
            broadcast_capacity: self.broadcast_capacity,
            list_ttl: Duration::from_secs(self.ttl_secs),
            storage_path: self.data_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("Starting listsync server...");

    let server = match SyncServer::new(args.server_config()) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to open list store: {e}");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {e}");
                server.shutdown().await;
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
        }
    }

    server.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["listsync-server"]).unwrap();
        let config = args.server_config();
        assert_eq!(config.list_ttl, Duration::from_secs(3600));
        assert_eq!(config.broadcast_capacity, 256);
        assert!(config.storage_path.is_none() || std::env::var("LISTSYNC_DATA_DIR").is_ok());
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from([
            "listsync-server",
            "--bind",
            "0.0.0.0:8080",
            "--data-dir",
            "/tmp/lists",
            "--ttl-secs",
            "60",
        ])
        .unwrap();
        let config = args.server_config();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.storage_path, Some(PathBuf::from("/tmp/lists")));
        assert_eq!(config.list_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let result = Args::try_parse_from(["listsync-server", "--ttl-secs", "0"]);
        assert!(result.is_err());
    }
}
