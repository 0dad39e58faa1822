//! Share a directory on the local network over HTTP.
//!
//! Clients browse folders as JSON listings, download files with single-range
//! resume support, upload files through a multipart form and delete the
//! files they uploaded themselves.
//!
//! | Method   | Path        | Behavior                                   |
//! |----------|-------------|--------------------------------------------|
//! | GET/HEAD | `/`         | landing page, unless a `Referer` is sent   |
//! | GET/HEAD | `/<path>`   | directory listing or (partial) file        |
//! | POST     | any         | multipart upload (`folder`, `file`...)     |
//! | DELETE   | `/<path>`   | remove a file the caller uploaded          |

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use warp::http::Method;
use warp::{Filter, Rejection, Reply};

pub mod config;
pub mod endpoints;
pub mod error;
pub mod fs;
pub mod ownership;
pub mod paths;
pub mod range;
pub mod types;

use config::ServerConfig;
use endpoints::{handle_delete, handle_serve, handle_upload};
use ownership::OwnershipRegistry;

const EMBEDDED_INDEX: &[u8] = include_bytes!("../static/index.html");

/// State shared by every request.
pub struct Share {
    pub config: ServerConfig,
    /// Canonical form of `config.root`
    pub root: PathBuf,
    pub registry: OwnershipRegistry,
    landing: Bytes,
}

impl Share {
    /// Fails if the root does not exist or the landing page override
    /// cannot be read.
    pub fn new(config: ServerConfig) -> std::io::Result<Self> {
        let root = std::fs::canonicalize(&config.root)?;
        let landing = match &config.index {
            Some(path) => Bytes::from(std::fs::read(path)?),
            None => Bytes::from_static(EMBEDDED_INDEX),
        };

        Ok(Self {
            config,
            root,
            registry: OwnershipRegistry::new(),
            landing,
        })
    }

    pub fn landing(&self) -> Bytes {
        self.landing.clone()
    }
}

/// All routes, wrapped in a request tracing span.
pub fn routes(share: Arc<Share>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let browse = get_or_head()
        .and(warp::path::full())
        .and(warp::header::headers_cloned())
        .and(client_identity())
        .and(with_share(share.clone()))
        .and_then(handle_serve);

    let upload = warp::post()
        .and(client_identity())
        .and(with_share(share.clone()))
        .and(warp::multipart::form().max_length(share.config.max_upload))
        .and_then(handle_upload);

    let delete = warp::delete()
        .and(warp::path::full())
        .and(client_identity())
        .and(with_share(share))
        .and_then(handle_delete);

    browse.or(upload).or(delete).with(warp::trace::request())
}

fn get_or_head() -> impl Filter<Extract = (Method,), Error = Rejection> + Clone {
    warp::get()
        .map(|| Method::GET)
        .or(warp::head().map(|| Method::HEAD))
        .unify()
}

/// Clients are identified by their IP address.
fn client_identity() -> impl Filter<Extract = (String,), Error = Infallible> + Clone {
    warp::addr::remote().map(|addr: Option<SocketAddr>| match addr {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    })
}

fn with_share(share: Arc<Share>) -> impl Filter<Extract = (Arc<Share>,), Error = Infallible> + Clone {
    warp::any().map(move || share.clone())
}
