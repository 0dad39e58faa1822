//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{CHUNK_SIZE, DEFAULT_PORT, MAX_UPLOAD_BYTES};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Directory exposed to clients
    pub root: PathBuf,
    /// Listen address
    pub bind: IpAddr,
    pub port: u16,
    /// Bytes per streamed chunk
    pub chunk_size: usize,
    /// Pause between streamed chunks; zero disables throttling
    pub chunk_delay: Duration,
    /// Maximum accepted multipart body
    pub max_upload: u64,
    /// Landing page served instead of the embedded one
    pub index: Option<PathBuf>,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            chunk_size: CHUNK_SIZE,
            chunk_delay: Duration::ZERO,
            max_upload: MAX_UPLOAD_BYTES,
            index: None,
        }
    }
}
