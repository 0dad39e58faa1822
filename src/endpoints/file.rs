use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use httpdate::{fmt_http_date, parse_http_date};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use warp::http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use warp::hyper::Body;

use crate::error::ShareError;
use crate::fs::{self, Node};
use crate::range::{RangeError, RangeWindow};
use crate::Share;

/// Last second `fmt_http_date` can represent (9999-12-31T23:59:59Z).
const LAST_HTTP_DATE_SECS: u64 = 253_402_300_799;

/// Answer GET/HEAD on a file.
///
/// Honors a single `Range`, gated by `If-Range`, and answers 304 when
/// `If-Modified-Since` is not older than the file.
pub async fn send_file(
    node: &Node,
    method: &Method,
    headers: &HeaderMap,
    share: &Share,
) -> Result<Response<Body>, ShareError> {
    let modified = http_mtime(node);

    if let Some(modified) = modified {
        let since = headers.get(header::IF_MODIFIED_SINCE).and_then(header_date);
        if since.is_some_and(|since| modified <= since) {
            return Ok(Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .header(header::LAST_MODIFIED, fmt_http_date(modified))
                .body(Body::empty())?);
        }
    }

    let window = range_header(headers, modified)
        .and_then(|range| RangeWindow::negotiate(range, node.size))
        .map_err(|source| ShareError::Range {
            source,
            size: node.size,
        })?;

    let status = if window.partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_LENGTH, window.length)
        .header(header::ACCEPT_RANGES, "bytes");
    if let Some(mime) = node.media_type() {
        builder = builder.header(header::CONTENT_TYPE, mime);
    }
    if let Some(modified) = modified {
        builder = builder.header(header::LAST_MODIFIED, fmt_http_date(modified));
    }
    if window.partial {
        builder = builder.header(header::CONTENT_RANGE, window.content_range());
    }

    if *method == Method::HEAD {
        return Ok(builder.body(Body::empty())?);
    }

    let reader = fs::open_window(&node.path, &window).await?;
    let chunks = ReaderStream::with_capacity(reader, share.config.chunk_size);
    let transfer = Transfer::new(
        throttle(chunks, share.config.chunk_delay),
        node.path.clone(),
        window.length,
    );

    Ok(builder.body(Body::wrap_stream(transfer))?)
}

/// Modification time at the one-second resolution of HTTP dates.
fn http_mtime(node: &Node) -> Option<SystemTime> {
    let secs = node.modified?.duration_since(UNIX_EPOCH).ok()?.as_secs();
    (secs <= LAST_HTTP_DATE_SECS).then(|| UNIX_EPOCH + Duration::from_secs(secs))
}

fn header_date(value: &HeaderValue) -> Option<SystemTime> {
    value.to_str().ok().and_then(|value| parse_http_date(value).ok())
}

/// The `Range` value to apply, if any.
///
/// A failed `If-Range` drops the range so the whole file is sent. Only dates
/// are understood there; an entity tag never matches.
fn range_header(headers: &HeaderMap, modified: Option<SystemTime>) -> Result<Option<&str>, RangeError> {
    let Some(value) = headers.get(header::RANGE) else {
        return Ok(None);
    };

    if let Some(condition) = headers.get(header::IF_RANGE) {
        let holds = match (modified, header_date(condition)) {
            (Some(modified), Some(date)) => modified <= date,
            _ => false,
        };
        if !holds {
            debug!("If-Range {:?} failed, sending whole file", condition);
            return Ok(None);
        }
    }

    value
        .to_str()
        .map(Some)
        .map_err(|_| RangeError::Malformed(String::from_utf8_lossy(value.as_bytes()).into_owned()))
}

fn throttle<S>(chunks: S, delay: Duration) -> BoxStream<'static, io::Result<Bytes>>
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    if delay.is_zero() {
        return chunks.boxed();
    }
    chunks
        .then(move |chunk| async move {
            tokio::time::sleep(delay).await;
            chunk
        })
        .boxed()
}

/// Body stream that notices when the peer goes away before the window is
/// fully sent. Hyper drops the body on a reset connection; the drop is where
/// an interrupted transfer gets logged.
struct Transfer {
    inner: BoxStream<'static, io::Result<Bytes>>,
    path: PathBuf,
    expected: u64,
    sent: u64,
}

impl Transfer {
    fn new(inner: BoxStream<'static, io::Result<Bytes>>, path: PathBuf, expected: u64) -> Self {
        Self {
            inner,
            path,
            expected,
            sent: 0,
        }
    }

    fn interrupted(&self) -> bool {
        self.sent < self.expected
    }
}

impl Stream for Transfer {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.poll_next_unpin(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => self.sent += chunk.len() as u64,
            Poll::Ready(Some(Err(e))) => {
                warn!("reading {} failed: {}", self.path.display(), e);
            }
            _ => {}
        }
        polled
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        if self.interrupted() {
            warn!(
                "transfer of {} interrupted after {} of {} bytes",
                self.path.display(),
                self.sent,
                self.expected
            );
        } else {
            debug!("sent {} bytes of {}", self.sent, self.path.display());
        }
    }
}
