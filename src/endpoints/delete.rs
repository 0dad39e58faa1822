use std::convert::Infallible;
use std::io::ErrorKind;
use std::sync::Arc;

use tracing::info;
use warp::http::{Method, Response, StatusCode};
use warp::hyper::Body;
use warp::path::FullPath;

use crate::error::ShareError;
use crate::fs;
use crate::paths::{confine, decode_request_path, resolve};
use crate::Share;

pub async fn handle_delete(
    path: FullPath,
    client: String,
    share: Arc<Share>,
) -> Result<Response<Body>, Infallible> {
    match delete_owned(path.as_str(), &client, &share).await {
        Ok(()) => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::OK;
            Ok(response)
        }
        Err(e) => Ok(e.into_response(&Method::DELETE)),
    }
}

/// Remove a file the client uploaded itself.
async fn delete_owned(raw_path: &str, client: &str, share: &Share) -> Result<(), ShareError> {
    let target = resolve(&share.root, &decode_request_path(raw_path))?;
    let node = fs::stat(&target).await?.ok_or(ShareError::NotFound)?;
    confine(&share.root, &target).await?;

    if node.is_dir() {
        return Err(ShareError::Forbidden(format!(
            "directories cannot be deleted: {}",
            target.display()
        )));
    }
    if !share.registry.owns(client, &target) {
        return Err(ShareError::Forbidden(format!(
            "{} does not own {}",
            client,
            target.display()
        )));
    }

    match fs::remove_file(&target).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            share.registry.release(client, &target);
            return Err(ShareError::NotFound);
        }
        Err(e) => return Err(e.into()),
    }

    share.registry.release(client, &target);
    info!("{} deleted {}", client, target.display());
    Ok(())
}
