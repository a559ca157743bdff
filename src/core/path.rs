//! Root-relative document paths and their canonicalization

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PatchError, Result};

/// A validated, root-relative document path.
///
/// Holding a `DocPath` means traversal checks already passed: every segment is
/// a plain name, so joining it onto a root cannot leave that root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    /// Canonicalize a raw (possibly percent-encoded) path.
    pub fn parse(raw: &str) -> Result<Self> {
        // Encoded form first, so `..` never reaches the decoder.
        if has_parent_segment(raw) {
            return Err(PatchError::rejected(raw, "parent traversal segment"));
        }

        let decoded = percent_decode_utf8(raw)
            .ok_or_else(|| PatchError::rejected(raw, "malformed percent-encoding"))?;

        if has_parent_segment(&decoded) {
            return Err(PatchError::rejected(raw, "parent traversal segment"));
        }
        if decoded.contains('\0') {
            return Err(PatchError::rejected(raw, "NUL byte in path"));
        }

        let segments: Vec<String> = decoded
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string)
            .collect();

        let Some(first) = segments.first() else {
            return Err(PatchError::rejected(raw, "empty path"));
        };
        if first.contains(':') {
            return Err(PatchError::rejected(raw, "drive or scheme prefix"));
        }

        Ok(Self { segments })
    }

    /// Location of this document under `root`. Pure; performs no I/O.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        path
    }

    /// Lowercased extension of the final segment, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn file_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

fn has_parent_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

fn percent_decode_utf8(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hi = (*bytes.get(i + 1)? as char).to_digit(16)? as u8;
                let lo = (*bytes.get(i + 2)? as char).to_digit(16)? as u8;
                out.push((hi << 4) | lo);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}
