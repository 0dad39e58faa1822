//! Single byte-range negotiation for file transfers.
//!
//! Only `bytes=<start>-<end>` with at most one side omitted is understood.
//! Multi-range values are not split; they fail to parse and are rejected
//! like any other malformed header.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed range header: {0}")]
    Malformed(String),

    #[error("range starting at {start} not satisfiable for {size} bytes")]
    Unsatisfiable { start: u64, size: u64 },
}

/// Span of a file selected for transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    pub start: u64,
    pub length: u64,
    /// Total size of the file the window was cut from
    pub size: u64,
    /// Whether a `Range` header selected this window (206) or not (200)
    pub partial: bool,
}

impl RangeWindow {
    /// The whole file, answered with 200.
    pub fn full(size: u64) -> Self {
        Self {
            start: 0,
            length: size,
            size,
            partial: false,
        }
    }

    /// Resolve an optional `Range` header against a file of `size` bytes.
    pub fn negotiate(header: Option<&str>, size: u64) -> Result<Self, RangeError> {
        match header {
            Some(value) => Self::parse(value, size),
            None => Ok(Self::full(size)),
        }
    }

    /// Parse a `Range` header value.
    ///
    /// `bytes=-N` selects the last `N` bytes, `bytes=N-` runs to end of file
    /// and `bytes=A-B` is inclusive. The result always satisfies
    /// `start < size` and `start + length <= size`.
    pub fn parse(value: &str, size: u64) -> Result<Self, RangeError> {
        let malformed = || RangeError::Malformed(value.to_string());

        let spec = value.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
        let (first, last) = spec.split_once('-').ok_or_else(malformed)?;
        let (first, last) = (first.trim(), last.trim());

        let (start, length) = match (first.is_empty(), last.is_empty()) {
            (true, true) => return Err(malformed()),
            (true, false) => {
                let suffix: u64 = last.parse().map_err(|_| malformed())?;
                let length = suffix.min(size);
                (size - length, length)
            }
            (false, true) => {
                let start: u64 = first.parse().map_err(|_| malformed())?;
                (start, size.saturating_sub(start))
            }
            (false, false) => {
                let start: u64 = first.parse().map_err(|_| malformed())?;
                let end: u64 = last.parse().map_err(|_| malformed())?;
                if end < start {
                    return Err(malformed());
                }
                let requested = end.saturating_sub(start).saturating_add(1);
                (start, requested.min(size.saturating_sub(start)))
            }
        };

        if start >= size || length == 0 {
            return Err(RangeError::Unsatisfiable { start, size });
        }

        Ok(Self {
            start,
            length,
            size,
            partial: true,
        })
    }

    /// Offset of the last byte in the window (inclusive).
    pub fn last_byte(&self) -> u64 {
        (self.start + self.length).saturating_sub(1)
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.last_byte(), self.size)
    }
}
