//! Documents held by the content store

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use super::path::DocPath;

/// A text document together with its freshness metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Canonical root-relative path
    pub path: DocPath,
    /// Full document body
    pub content: String,
    /// Last modification time
    pub last_modified: SystemTime,
    /// Strong validator derived from `last_modified`
    pub validator: String,
}

impl Document {
    pub fn new(path: DocPath, content: String, last_modified: SystemTime) -> Self {
        let validator = Self::validator_for(last_modified);
        Self {
            path,
            content,
            last_modified,
            validator,
        }
    }

    /// Quoted modification time in milliseconds, usable as an `ETag`.
    pub fn validator_for(time: SystemTime) -> String {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        format!("\"{millis}\"")
    }

    /// `last_modified` as an IMF-fixdate, suitable for `Last-Modified`.
    pub fn http_date(&self) -> String {
        let time: DateTime<Utc> = self.last_modified.into();
        time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Content type classified from the path extension
    pub fn content_type(&self) -> &'static str {
        match self.path.extension().as_deref() {
            Some("md" | "markdown") => "text/markdown; charset=utf-8",
            Some("js" | "jsx") => "text/javascript; charset=utf-8",
            Some("json") => "application/json; charset=utf-8",
            _ => "text/plain; charset=utf-8",
        }
    }

    /// File name without its extension
    pub fn title(&self) -> &str {
        let name = self.path.file_name();
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }
}
