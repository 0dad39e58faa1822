//! `share` - serve a directory to the local network
//!
//! ```bash
//! share                     # current directory on 0.0.0.0:5999
//! share ~/Public -p 8080
//! RUST_LOG=debug share /srv/files
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lanshare::config::ServerConfig;
use lanshare::types::{CHUNK_SIZE, DEFAULT_PORT, MAX_UPLOAD_BYTES};
use lanshare::{routes, Share};

#[derive(Parser, Debug)]
#[command(name = "share")]
#[command(about = "Share a directory on the local network")]
#[command(version)]
struct Args {
    /// Directory to serve
    #[arg(env = "SHARE_ROOT", default_value = ".")]
    root: PathBuf,

    /// Bind address
    #[arg(short, long, env = "SHARE_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "SHARE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bytes per chunk when streaming files
    #[arg(long, env = "SHARE_CHUNK_SIZE", default_value_t = CHUNK_SIZE)]
    chunk_size: usize,

    /// Pause between streamed chunks in milliseconds (0 = unthrottled)
    #[arg(long, env = "SHARE_CHUNK_DELAY_MS", default_value_t = 0)]
    chunk_delay_ms: u64,

    /// Largest accepted upload body in bytes
    #[arg(long, env = "SHARE_MAX_UPLOAD", default_value_t = MAX_UPLOAD_BYTES)]
    max_upload: u64,

    /// HTML page served at `/` instead of the built-in one
    #[arg(long, env = "SHARE_INDEX")]
    index: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            root: self.root,
            bind: self.bind,
            port: self.port,
            chunk_size: self.chunk_size.max(1),
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
            max_upload: self.max_upload,
            index: self.index,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Args::parse().into_config();
    let share = Arc::new(Share::new(config)?);

    let (addr, server) = warp::serve(routes(share.clone())).try_bind_with_graceful_shutdown(
        share.config.addr(),
        async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        },
    )?;

    println!("Serving {} on http://{}", share.root.display(), addr);
    if let Ok(name) = hostname::get() {
        println!("  http://{}:{}", name.to_string_lossy(), addr.port());
    }
    info!("Listening on {}", addr);

    server.await;
    Ok(())
}
