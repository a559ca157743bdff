//! File names for documents created from a change request

use crate::core::path::DocPath;
use crate::error::Result;

const MAX_STEM_CHARS: usize = 50;
const FALLBACK_STEM: &str = "new_analysis";

fn is_kept(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Safe markdown file stem derived from free text.
pub fn file_stem_for(request: &str) -> String {
    let mut stem = String::with_capacity(request.len());
    for c in request.chars() {
        let c = if is_kept(c) { c } else { '_' };
        if c == '_' && stem.ends_with('_') {
            continue;
        }
        stem.push(c);
    }

    let stem: String = stem.trim_matches('_').chars().take(MAX_STEM_CHARS).collect();
    let stem = stem.trim_end_matches('_');
    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    }
}

/// Path under `dir` for a new document answering `request`.
pub fn document_path_for_request(dir: &str, request: &str) -> Result<DocPath> {
    let name = format!("{}.md", file_stem_for(request));
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        DocPath::parse(&name)
    } else {
        DocPath::parse(&format!("{dir}/{name}"))
    }
}
