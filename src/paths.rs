//! Request path decoding and resolution under the served root.
//!
//! Every path handed to the filesystem goes through [`resolve`], which walks
//! the relative path component by component and refuses anything that could
//! leave the root. The resolved path is what the ownership registry keys on;
//! [`confine`] then follows symlinks on disk and refuses targets that end up
//! outside the root.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::error::ShareError;

/// Decode a raw URL path into a root-relative path.
///
/// Percent escapes are decoded and leading/trailing slashes stripped, so
/// `/` and the empty string both name the root.
pub fn decode_request_path(raw: &str) -> String {
    let path = raw.split(['?', '#']).next().unwrap_or("");
    percent_decode_str(path)
        .decode_utf8_lossy()
        .trim_matches('/')
        .to_string()
}

/// Join `relative` under `root`, rejecting escapes.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf, ShareError> {
    if relative.contains('\0') {
        return Err(ShareError::Forbidden("path contains null byte".into()));
    }

    let mut result = root.to_path_buf();
    for component in Path::new(relative.trim_start_matches('/')).components() {
        match component {
            Component::Normal(name) => result.push(name),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ShareError::Forbidden(format!(
                    "parent directory not allowed: {relative}"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ShareError::Forbidden(format!(
                    "absolute path not allowed: {relative}"
                )));
            }
        }
    }

    if !result.starts_with(root) {
        return Err(ShareError::Forbidden(format!(
            "path escapes served root: {relative}"
        )));
    }

    Ok(result)
}

/// Refuse `path` if it leaves `root` once symlinks are followed.
///
/// `root` must be canonical. A path that does not exist yet is judged by its
/// nearest existing ancestor; a dangling symlink is refused outright.
pub async fn confine(root: &Path, path: &Path) -> Result<(), ShareError> {
    let mut existing = path;
    loop {
        match tokio::fs::canonicalize(existing).await {
            Ok(real) if real.starts_with(root) => return Ok(()),
            Ok(real) => {
                return Err(ShareError::Forbidden(format!(
                    "{} resolves outside served root to {}",
                    path.display(),
                    real.display()
                )));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if tokio::fs::symlink_metadata(existing).await.is_ok() {
                    return Err(ShareError::Forbidden(format!(
                        "dangling symlink: {}",
                        existing.display()
                    )));
                }
                existing = existing.parent().ok_or_else(|| {
                    ShareError::Forbidden(format!("no existing ancestor: {}", path.display()))
                })?;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Destination of an uploaded file: `root / folder / filename`.
pub fn upload_destination(root: &Path, folder: &str, filename: &str) -> Result<PathBuf, ShareError> {
    if filename.is_empty() {
        return Err(ShareError::Forbidden("empty upload filename".into()));
    }
    let dir = resolve(root, folder)?;
    let dest = resolve(&dir, filename)?;
    if dest == dir {
        return Err(ShareError::Forbidden(format!(
            "upload filename names no file: {filename:?}"
        )));
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_slashes_and_escapes() {
        assert_eq!(decode_request_path("/"), "");
        assert_eq!(decode_request_path(""), "");
        assert_eq!(decode_request_path("/docs/"), "docs");
        assert_eq!(decode_request_path("/my%20files/a%2Bb.txt"), "my files/a+b.txt");
        assert_eq!(decode_request_path("/a.txt?x=1"), "a.txt");
    }

    #[test]
    fn test_resolve_nested() {
        let root = Path::new("/srv/share");
        assert_eq!(resolve(root, "").unwrap(), root);
        assert_eq!(resolve(root, "a/./b").unwrap(), root.join("a/b"));
        assert_eq!(resolve(root, "/a").unwrap(), root.join("a"));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let root = Path::new("/srv/share");
        assert!(matches!(resolve(root, ".."), Err(ShareError::Forbidden(_))));
        assert!(matches!(resolve(root, "a/../../etc"), Err(ShareError::Forbidden(_))));
        assert!(matches!(resolve(root, "a\0b"), Err(ShareError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_confine_allows_new_paths_inside() {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::write(root.join("a.txt"), b"1").unwrap();

        confine(&root, &root).await.unwrap();
        confine(&root, &root.join("a.txt")).await.unwrap();
        confine(&root, &root.join("new/deeper/file.txt")).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_confine_rejects_symlink_out_of_root() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), b"s").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();
        std::os::unix::fs::symlink(root.join("gone"), root.join("dangling")).unwrap();
        std::fs::create_dir(root.join("inner")).unwrap();
        std::os::unix::fs::symlink(root.join("inner"), root.join("alias")).unwrap();

        for target in ["link", "link/secret.txt", "link/new.txt", "dangling"] {
            assert!(
                matches!(confine(&root, &root.join(target)).await, Err(ShareError::Forbidden(_))),
                "{target} should be refused"
            );
        }
        confine(&root, &root.join("alias/x.txt")).await.unwrap();
    }

    #[test]
    fn test_upload_destination() {
        let root = Path::new("/srv/share");
        assert_eq!(
            upload_destination(root, "pics", "cat.png").unwrap(),
            root.join("pics/cat.png")
        );
        assert_eq!(
            upload_destination(root, "", "cat.png").unwrap(),
            root.join("cat.png")
        );
        assert!(upload_destination(root, "", "../cat.png").is_err());
        assert!(upload_destination(root, "../up", "cat.png").is_err());
        assert!(upload_destination(root, "pics", "").is_err());
        assert!(upload_destination(root, "pics", ".").is_err());
    }
}
