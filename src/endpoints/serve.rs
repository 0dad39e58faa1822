use std::convert::Infallible;
use std::sync::Arc;

use warp::http::{header, HeaderMap, Method, Response, StatusCode};
use warp::hyper::Body;
use warp::path::FullPath;

use crate::endpoints::{file::send_file, list::send_listing};
use crate::error::ShareError;
use crate::fs;
use crate::paths::{confine, decode_request_path, resolve};
use crate::Share;

/// GET/HEAD on any path: landing page, directory listing or file.
pub async fn handle_serve(
    method: Method,
    path: FullPath,
    headers: HeaderMap,
    client: String,
    share: Arc<Share>,
) -> Result<Response<Body>, Infallible> {
    // A top-level navigation gets the page; fetches from that page list `/`.
    if path.as_str() == "/" && !headers.contains_key(header::REFERER) {
        return Ok(send_landing(&method, &share));
    }

    let result = serve_path(&method, path.as_str(), &headers, &client, &share).await;
    Ok(result.unwrap_or_else(|e| e.into_response(&method)))
}

async fn serve_path(
    method: &Method,
    raw_path: &str,
    headers: &HeaderMap,
    client: &str,
    share: &Share,
) -> Result<Response<Body>, ShareError> {
    let target = resolve(&share.root, &decode_request_path(raw_path))?;
    let node = fs::stat(&target).await?.ok_or(ShareError::NotFound)?;
    confine(&share.root, &target).await?;

    if node.is_dir() {
        send_listing(&node, method, client, share).await
    } else {
        send_file(&node, method, headers, share).await
    }
}

fn send_landing(method: &Method, share: &Share) -> Response<Body> {
    let page = share.landing();
    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CONTENT_LENGTH, page.len());

    let body = if *method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(page)
    };
    builder
        .body(body)
        .unwrap_or_else(|e| ShareError::from(e).into_response(method))
}
