//! Document read/write routes

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::response::failure;
use crate::app::DocpatchApp;
use crate::core::path::DocPath;
use crate::core::store::Freshness;

/// URL prefixes that address the document namespace
pub const PREFIXES: [&str; 2] = ["/api/workspace/", "/workspace/"];

/// Undecoded document path of a request, query excluded.
pub fn raw_document_path(uri: &Uri) -> &str {
    let path = uri.path();
    PREFIXES
        .iter()
        .find_map(|prefix| path.strip_prefix(prefix))
        .unwrap_or(path)
}

fn wants_revalidate(headers: &HeaderMap) -> bool {
    let has_no_cache = |name: header::HeaderName| {
        headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| {
                let v = v.to_ascii_lowercase();
                v.contains("no-cache") || v.contains("no-store")
            })
    };
    has_no_cache(header::CACHE_CONTROL) || has_no_cache(header::PRAGMA)
}

fn not_modified(headers: &HeaderMap, validator: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|tag| tag.trim() == validator))
        .unwrap_or(false)
}

pub async fn read_document(
    State(app): State<Arc<DocpatchApp>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = match DocPath::parse(raw_document_path(&uri)) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("Rejected read of {}: {}", uri.path(), e);
            return e.into_response();
        }
    };

    let freshness = if wants_revalidate(&headers) {
        Freshness::Revalidate
    } else {
        Freshness::Cached
    };

    let document = match app.store().get(&path, freshness).await {
        Ok(document) => document,
        Err(e) => return e.into_response(),
    };

    if not_modified(&headers, &document.validator) {
        return (
            StatusCode::NOT_MODIFIED,
            [(header::ETAG, document.validator.clone())],
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, document.content_type().to_string()),
            (header::LAST_MODIFIED, document.http_date()),
            (header::ETAG, document.validator.clone()),
        ],
        document.content,
    )
        .into_response()
}

pub async fn write_document(State(app): State<Arc<DocpatchApp>>, uri: Uri, body: Bytes) -> Response {
    let path = match DocPath::parse(raw_document_path(&uri)) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("Rejected write to {}: {}", uri.path(), e);
            return e.into_response();
        }
    };

    let content = match String::from_utf8(body.to_vec()) {
        Ok(content) => content,
        Err(_) => return failure(StatusCode::BAD_REQUEST, "body is not valid UTF-8 text"),
    };

    match app.store().put(&path, &content).await {
        Ok(written) => Json(json!({ "success": true, "path": written.to_string() })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_document_path() {
        let uri: Uri = "/workspace/reports/a.md?t=123&_=0.5".parse().unwrap();
        assert_eq!(raw_document_path(&uri), "reports/a.md");

        let uri: Uri = "/api/workspace/reports/%E6%8A%A5.md".parse().unwrap();
        assert_eq!(raw_document_path(&uri), "reports/%E6%8A%A5.md");
    }

    #[test]
    fn test_cache_directives() {
        let mut headers = HeaderMap::new();
        assert!(!wants_revalidate(&headers));
        headers.insert(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate".parse().unwrap());
        assert!(wants_revalidate(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(header::PRAGMA, "no-cache".parse().unwrap());
        assert!(wants_revalidate(&headers));
    }

    #[test]
    fn test_if_none_match() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, "\"1\", \"2\"".parse().unwrap());
        assert!(not_modified(&headers, "\"2\""));
        assert!(!not_modified(&headers, "\"3\""));

        headers.insert(header::IF_NONE_MATCH, "*".parse().unwrap());
        assert!(!not_modified(&headers, "\"2\""));
    }
}
