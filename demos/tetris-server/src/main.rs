//! Two-player Tetris session server.
//!
//! Run: `cargo run -p tetris-server -- --port 8100`
//!
//! Open two browser tabs on the same `/ws/tetris/<room-id>` path; the log
//! prints a fresh invite path at startup.

use std::time::Duration;

use clap::Parser;
use pairplay::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tetris-server", about = "Two-player Tetris session server")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8100)]
    port: u16,

    /// Interface to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Destroy rooms with no activity for this many seconds. Off by default.
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Seconds to wait for a single frame to reach a client.
    #[arg(long, default_value_t = 5)]
    write_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let rooms = RoomConfig {
        idle_timeout: args.idle_timeout.map(Duration::from_secs),
        ..RoomConfig::default()
    };
    let sessions = SessionConfig {
        write_timeout: Duration::from_secs(args.write_timeout),
        ..SessionConfig::default()
    };

    let server = PairplayServer::builder()
        .bind(&addr)
        .room_config(rooms)
        .session_config(sessions)
        .build()
        .await?;

    tracing::info!(addr = %server.local_addr()?, "tetris server listening");
    tracing::info!(
        "invite path: {}{}",
        pairplay::DEFAULT_PATH_PREFIX,
        RoomId::generate()
    );

    server.run().await?;
    Ok(())
}
