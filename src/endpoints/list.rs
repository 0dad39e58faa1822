use std::collections::HashSet;
use std::path::{Path, PathBuf};

use warp::http::{header, Method, Response, StatusCode};
use warp::hyper::Body;

use crate::error::ShareError;
use crate::fs::{self, Node};
use crate::types::{DirectoryEntry, STAGING_PREFIX};
use crate::Share;

/// Answer GET/HEAD on a directory with its JSON listing.
pub async fn send_listing(
    node: &Node,
    method: &Method,
    client: &str,
    share: &Share,
) -> Result<Response<Body>, ShareError> {
    let owned = share.registry.owned_by(client);
    let entries = load_directory(&node.path, &owned).await?;
    let json = serde_json::to_vec(&entries)?;

    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, json.len());

    let body = if *method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(json)
    };
    Ok(builder.body(body)?)
}

/// Immediate children of `dir`, flagged with whether `owned` contains them.
/// Uploads still being received are left out.
pub async fn load_directory(
    dir: &Path,
    owned: &HashSet<PathBuf>,
) -> Result<Vec<DirectoryEntry>, ShareError> {
    let children = fs::list_dir(dir).await?;

    Ok(children
        .into_iter()
        .filter(|child| !child.name.starts_with(STAGING_PREFIX))
        .map(|child| {
            let path = dir.join(&child.name);
            let kind = if child.is_dir {
                Some(DirectoryEntry::FOLDER.to_string())
            } else {
                fs::media_type(&path)
            };
            DirectoryEntry {
                kind,
                own: owned.contains(&path),
                name: child.name,
                size: child.size,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_directory_flags_owned() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("photos")).unwrap();
        std::fs::write(dir.path().join("mine.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("theirs.weird"), b"22").unwrap();
        std::fs::write(dir.path().join(".share-upload-1-0"), b"partial").unwrap();

        let owned: HashSet<PathBuf> = [dir.path().join("mine.txt")].into_iter().collect();
        let entries = load_directory(dir.path(), &owned).await.unwrap();

        assert_eq!(
            entries,
            vec![
                DirectoryEntry {
                    kind: Some("text/plain".into()),
                    name: "mine.txt".into(),
                    own: true,
                    size: Some(1),
                },
                DirectoryEntry {
                    kind: Some("folder".into()),
                    name: "photos".into(),
                    own: false,
                    size: None,
                },
                DirectoryEntry {
                    kind: None,
                    name: "theirs.weird".into(),
                    own: false,
                    size: Some(2),
                },
            ]
        );
    }

    #[test]
    fn test_folders_serialize_without_size() {
        let entries = vec![
            DirectoryEntry {
                kind: Some("folder".into()),
                name: "photos".into(),
                own: false,
                size: None,
            },
            DirectoryEntry {
                kind: None,
                name: "blob".into(),
                own: true,
                size: Some(7),
            },
        ];
        assert_eq!(
            serde_json::to_string(&entries).unwrap(),
            r#"[{"type":"folder","name":"photos","own":false},{"type":null,"name":"blob","own":true,"size":7}]"#
        );
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let entries = load_directory(dir.path(), &HashSet::new()).await.unwrap();
        assert!(entries.is_empty());
    }
}
