use serde::Serialize;

pub const DEFAULT_PORT: u16 = 5999;

/// Size of each chunk written while streaming a file window.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Default cap on a multipart upload body (24 GiB).
pub const MAX_UPLOAD_BYTES: u64 = 24 * 1024 * 1024 * 1024;

/// Name prefix of uploads still being received into the served root.
pub const STAGING_PREFIX: &str = ".share-upload-";

/// Body sent with every 404.
pub const NOT_FOUND_BODY: &str = "404: Not found";

/// One child of a listed directory, as serialized in the listing payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    /// `"folder"`, a media type, or `null` when the extension is unknown.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: String,
    /// Whether the requesting client uploaded this entry.
    pub own: bool,
    /// Byte size, files only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl DirectoryEntry {
    pub const FOLDER: &'static str = "folder";
}
