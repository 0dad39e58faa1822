//! Error types for request handling

use thiserror::Error;
use tracing::{error, info};
use warp::http::{header, Method, Response, StatusCode};
use warp::hyper::Body;

use crate::range::RangeError;
use crate::types::NOT_FOUND_BODY;

#[derive(Error, Debug)]
pub enum ShareError {
    #[error("not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("range not satisfiable for {size} bytes: {source}")]
    Range { source: RangeError, size: u64 },

    #[error("multipart body: {0}")]
    Multipart(#[from] warp::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding listing: {0}")]
    Json(#[from] serde_json::Error),

    #[error("building response: {0}")]
    Http(#[from] warp::http::Error),
}

impl ShareError {
    pub fn status(&self) -> StatusCode {
        match self {
            ShareError::NotFound => StatusCode::NOT_FOUND,
            ShareError::Forbidden(_) => StatusCode::FORBIDDEN,
            ShareError::Range { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ShareError::Multipart(_)
            | ShareError::Io(_)
            | ShareError::Json(_)
            | ShareError::Http(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Render the error as a response to a request made with `method`.
    ///
    /// Only 404 carries a body, and never for HEAD.
    pub fn into_response(self, method: &Method) -> Response<Body> {
        let status = self.status();
        let mut builder = Response::builder().status(status);

        match &self {
            ShareError::NotFound => {
                builder = builder.header(header::CONTENT_TYPE, "text/plain");
                if *method != Method::HEAD {
                    return plain(builder, NOT_FOUND_BODY);
                }
            }
            ShareError::Range { size, .. } => {
                builder = builder.header(header::CONTENT_RANGE, format!("bytes */{size}"));
            }
            ShareError::Forbidden(reason) => {
                info!("forbidden: {}", reason);
            }
            _ => error!("request failed: {}", self),
        }

        plain(builder, "")
    }
}

fn plain(builder: warp::http::response::Builder, body: &'static str) -> Response<Body> {
    builder.body(Body::from(body)).unwrap_or_else(|_| {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}
