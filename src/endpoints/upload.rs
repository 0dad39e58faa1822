//! Multipart upload ingestion with streamed progress.
//!
//! Each file part is streamed to a staging file inside the served root while
//! the form is read, then renamed into place. The response body is a run of
//! undelimited ASCII percentages: `50` once the form has been received, then
//! one token per committed file ending in `100`.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use futures_util::{pin_mut, stream, TryStreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use warp::http::{header, Method, Response, StatusCode};
use warp::hyper::Body;
use warp::multipart::{FormData, Part};

use crate::error::ShareError;
use crate::fs;
use crate::paths;
use crate::types::STAGING_PREFIX;
use crate::Share;

/// Progress reported once the request body has been parsed.
pub const UPLOAD_START_PERCENT: usize = 50;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A received file waiting under a staging name. Removed on drop unless it
/// was moved into place first.
#[derive(Debug)]
pub struct StagedFile {
    /// Filename the client sent
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

impl StagedFile {
    fn new(name: String, dir: &Path) -> Self {
        let id = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            name,
            path: dir.join(format!("{}{}-{}", STAGING_PREFIX, std::process::id(), id)),
            size: 0,
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Target folder and files extracted from one upload form.
#[derive(Debug, Default)]
pub struct UploadBatch {
    /// Relative to the served root
    pub folder: String,
    pub files: Vec<StagedFile>,
}

impl UploadBatch {
    /// Collect the `folder` field and stage every `file` field, in form order.
    ///
    /// A filename that cannot land under `root` fails the whole form as soon
    /// as it is seen, provided the folder was sent before it.
    pub async fn read(form: FormData, root: &Path) -> Result<Self, ShareError> {
        let mut batch = UploadBatch::default();
        let mut folder_seen = false;
        pin_mut!(form);

        while let Some(part) = form.try_next().await? {
            let field = part.name().to_string();
            match field.as_str() {
                "folder" => {
                    let value = read_part(part).await?;
                    batch.folder = String::from_utf8_lossy(&value)
                        .trim_start_matches('/')
                        .to_string();
                    folder_seen = true;
                }
                "file" => {
                    let name = part.filename().unwrap_or_default().to_string();
                    // browsers send an empty part when no file was picked
                    if name.is_empty() {
                        read_part(part).await?;
                        continue;
                    }
                    if folder_seen {
                        paths::upload_destination(root, &batch.folder, &name)?;
                    }
                    batch.files.push(stage_part(part, name, root).await?);
                }
                other => debug!("ignoring form field {}", other),
            }
        }

        Ok(batch)
    }

    /// Resolve every file to its destination under `root`.
    ///
    /// Fails as a whole if any name would land outside the root.
    pub fn into_targets(self, root: &Path) -> Result<Vec<(PathBuf, StagedFile)>, ShareError> {
        let folder = self.folder;
        self.files
            .into_iter()
            .map(|file| {
                let dest = paths::upload_destination(root, &folder, &file.name)?;
                Ok((dest, file))
            })
            .collect()
    }
}

async fn read_part(part: Part) -> Result<Vec<u8>, warp::Error> {
    let mut bytes = Vec::new();
    let stream = part.stream();
    pin_mut!(stream);

    while let Some(chunk) = stream.try_next().await? {
        bytes.extend_from_slice(chunk.chunk());
    }
    Ok(bytes)
}

async fn stage_part(part: Part, name: String, dir: &Path) -> Result<StagedFile, ShareError> {
    let mut staged = StagedFile::new(name, dir);
    let mut file = tokio::fs::File::create(&staged.path).await?;
    let stream = part.stream();
    pin_mut!(stream);

    while let Some(mut chunk) = stream.try_next().await? {
        while chunk.has_remaining() {
            let bytes = chunk.chunk();
            let len = bytes.len();
            file.write_all(bytes).await?;
            chunk.advance(len);
            staged.size += len as u64;
        }
    }
    file.flush().await?;

    debug!("staged {} ({} bytes)", staged.name, staged.size);
    Ok(staged)
}

/// Percentage reported after `done` of `total` files are written.
pub fn progress(done: usize, total: usize) -> usize {
    if total == 0 {
        return 100;
    }
    let remaining = 100 - UPLOAD_START_PERCENT;
    UPLOAD_START_PERCENT + (done * remaining + total / 2) / total
}

fn token(percent: usize) -> Bytes {
    Bytes::from(percent.to_string())
}

async fn prepare(
    client: &str,
    share: &Share,
    form: FormData,
) -> Result<Vec<(PathBuf, StagedFile)>, ShareError> {
    let batch = UploadBatch::read(form, &share.root).await?;
    info!(
        "{} uploading {} file(s) to /{}",
        client,
        batch.files.len(),
        batch.folder
    );

    let targets = batch.into_targets(&share.root)?;
    for (dest, _) in &targets {
        paths::confine(&share.root, dest).await?;
    }
    Ok(targets)
}

pub async fn handle_upload(
    client: String,
    share: Arc<Share>,
    form: FormData,
) -> Result<Response<Body>, Infallible> {
    let targets = match prepare(&client, &share, form).await {
        Ok(targets) => targets,
        Err(e) => return Ok(e.into_response(&Method::POST)),
    };

    // Writes carry on in their own task even if the client stops reading.
    let (tx, rx) = mpsc::channel(targets.len() + 2);
    tokio::spawn(write_batch(client, share, targets, tx));

    let progress = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::wrap_stream(progress));
    Ok(response.unwrap_or_else(|e| ShareError::from(e).into_response(&Method::POST)))
}

async fn write_batch(
    client: String,
    share: Arc<Share>,
    targets: Vec<(PathBuf, StagedFile)>,
    tx: mpsc::Sender<Result<Bytes, ShareError>>,
) {
    let total = targets.len();
    let _ = tx.send(Ok(token(UPLOAD_START_PERCENT))).await;

    for (done, (dest, staged)) in targets.into_iter().enumerate() {
        if let Err(e) = fs::move_into_place(&staged.path, &dest).await {
            error!("writing upload {} failed: {}", dest.display(), e);
            let _ = tx.send(Err(e.into())).await;
            return;
        }
        share.registry.record(&client, &dest);
        debug!("{} wrote {} ({} bytes)", client, dest.display(), staged.size);

        if tx.send(Ok(token(progress(done + 1, total)))).await.is_err() {
            debug!("{} stopped reading upload progress", client);
        }
    }

    if total == 0 {
        let _ = tx.send(Ok(token(progress(0, 0)))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn staged(dir: &Path, name: &str, content: &[u8]) -> StagedFile {
        let mut file = StagedFile::new(name.to_string(), dir);
        std::fs::write(&file.path, content).unwrap();
        file.size = content.len() as u64;
        file
    }

    fn staging_leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with(STAGING_PREFIX))
            .collect()
    }

    #[test]
    fn test_progress_for_four_files() {
        let tokens: Vec<_> = (1..=4).map(|done| progress(done, 4)).collect();
        assert_eq!(tokens, vec![63, 75, 88, 100]);
    }

    #[test]
    fn test_progress_single_file() {
        assert_eq!(progress(0, 1), 50);
        assert_eq!(progress(1, 1), 100);
    }

    #[test]
    fn test_progress_ends_at_hundred() {
        for total in 1..200 {
            assert_eq!(progress(total, total), 100);
            assert!(progress(1, total) >= UPLOAD_START_PERCENT);
        }
        assert_eq!(progress(0, 0), 100);
    }

    #[test]
    fn test_targets_reject_escape() {
        let dir = tempfile::tempdir().unwrap();
        let batch = UploadBatch {
            folder: "docs".into(),
            files: vec![
                staged(dir.path(), "ok.txt", b"1"),
                staged(dir.path(), "../../escape.txt", b"2"),
            ],
        };
        assert!(matches!(
            batch.into_targets(Path::new("/srv")),
            Err(ShareError::Forbidden(_))
        ));
        assert!(staging_leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_targets_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let batch = UploadBatch {
            folder: "docs".into(),
            files: vec![staged(dir.path(), "b.txt", b""), staged(dir.path(), "a.txt", b"")],
        };
        let targets = batch.into_targets(Path::new("/srv")).unwrap();
        assert_eq!(targets[0].0, Path::new("/srv/docs/b.txt"));
        assert_eq!(targets[1].0, Path::new("/srv/docs/a.txt"));
    }

    #[tokio::test]
    async fn test_write_failure_stops_batch() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let share = Arc::new(Share::new(config).unwrap());
        let root = share.root.clone();
        std::fs::create_dir(root.join("taken")).unwrap();

        let targets = vec![
            (root.join("first.txt"), staged(&root, "first.txt", b"1")),
            (root.join("taken"), staged(&root, "taken", b"2")),
            (root.join("never.txt"), staged(&root, "never.txt", b"3")),
        ];
        let (tx, mut rx) = mpsc::channel(8);
        write_batch("10.0.0.1".into(), share.clone(), targets, tx).await;

        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from("50"));
        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from("67"));
        assert!(rx.recv().await.unwrap().is_err());
        assert!(rx.recv().await.is_none());

        assert_eq!(std::fs::read(root.join("first.txt")).unwrap(), b"1");
        assert!(share.registry.owns("10.0.0.1", &root.join("first.txt")));
        assert!(root.join("taken").is_dir());
        assert!(!root.join("never.txt").exists());
        assert!(staging_leftovers(&root).is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_reports_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let share = Arc::new(Share::new(config).unwrap());

        let (tx, mut rx) = mpsc::channel(4);
        write_batch("10.0.0.1".into(), share, Vec::new(), tx).await;

        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from("50"));
        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from("100"));
        assert!(rx.recv().await.is_none());
    }
}
