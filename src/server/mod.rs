//! HTTP surface: an explicit dispatcher from method and path prefix to handlers

pub mod edits;
pub mod response;
pub mod workspace;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::app::DocpatchApp;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

const ALLOWED_METHODS: &str = "GET, PUT, POST, DELETE, OPTIONS";

/// Build the router for `app`.
pub fn router(app: Arc<DocpatchApp>) -> Router {
    Router::new()
        .route(
            "/workspace/*path",
            get(workspace::read_document).put(workspace::write_document),
        )
        .route(
            "/api/workspace/*path",
            get(workspace::read_document).put(workspace::write_document),
        )
        .route("/api/ai/generate-edit", post(edits::generate_edit))
        .route("/api/edits", post(edits::request_edit))
        .route("/api/edits/plan", post(edits::plan_edit))
        .route("/api/edits/:id/apply", post(edits::apply_edit))
        .route("/api/edits/:id", delete(edits::cancel_edit))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(app.clone(), cors))
        .with_state(app)
}

/// Serve `app` on `listener` until ctrl-c.
pub async fn serve(listener: tokio::net::TcpListener, app: Arc<DocpatchApp>) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("Serving documents at http://{}/workspace/", addr);
    tracing::info!("Edit API at http://{}/api/edits", addr);

    axum::serve(listener, router(app))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn cors(State(app): State<Arc<DocpatchApp>>, request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    if let Ok(origin) = HeaderValue::from_str(&app.config.server.allow_origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Cache-Control, Pragma, If-None-Match"),
    );
    response
}

async fn health(State(app): State<Arc<DocpatchApp>>) -> Response {
    Json(json!({
        "status": "ok",
        "root": app.config.workspace.root.display().to_string(),
        "generator": app.orchestrator.generator().name(),
        "inFlight": app.tokens.in_flight(),
        "pending": app.pending_count(),
        "stats": app.orchestrator.stats(),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::core::config::AppConfig;
    use crate::core::store::FsContentStore;
    use crate::error::{PatchError, Result};
    use crate::patch::generator::{EditPlanGenerator, GenerationRequest};

    /// Echoes a fixed plan, or fails when none is set.
    struct FixedGenerator(Option<&'static str>, Duration);

    #[async_trait]
    impl EditPlanGenerator for FixedGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            tokio::time::sleep(self.1).await;
            self.0
                .map(str::to_string)
                .ok_or_else(|| PatchError::GenerationFailed("collaborator offline".into()))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct TestServer {
        base: String,
        addr: SocketAddr,
        app: Arc<DocpatchApp>,
        dir: tempfile::TempDir,
    }

    async fn start(plan: Option<&'static str>, delay: Duration) -> TestServer {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.workspace.root = dir.path().join("workspace");
        let store = FsContentStore::open(&config.workspace.root, false).unwrap();
        let app = Arc::new(DocpatchApp::new(
            config,
            Arc::new(store),
            Arc::new(FixedGenerator(plan, delay)),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = router(app.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        TestServer {
            base: format!("http://{addr}"),
            addr,
            app,
            dir,
        }
    }

    async fn raw_request(addr: SocketAddr, request_line: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("{request_line}\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_put_then_get_document() {
        let server = start(None, Duration::ZERO).await;
        let client = reqwest::Client::new();

        let resp = client
            .put(format!("{}/workspace/reports/q3.md", server.base))
            .header("content-type", "text/plain; charset=utf-8")
            .body("# Q3\n")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body, json!({ "success": true, "path": "reports/q3.md" }));

        let resp = client
            .get(format!("{}/api/workspace/reports/q3.md?t=1&_=0.2", server.base))
            .header("cache-control", "no-cache")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["content-type"], "text/markdown; charset=utf-8");
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        assert!(resp.headers()["last-modified"].to_str().unwrap().ends_with("GMT"));
        let etag = resp.headers()["etag"].to_str().unwrap().to_string();
        assert_eq!(resp.text().await.unwrap(), "# Q3\n");

        let resp = client
            .get(format!("{}/workspace/reports/q3.md", server.base))
            .header("if-none-match", etag)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 304);
    }

    #[tokio::test]
    async fn test_encoded_names_round_trip() {
        let server = start(None, Duration::ZERO).await;
        let client = reqwest::Client::new();
        let url = format!("{}/workspace/reports/%E6%8A%A5%E5%91%8A.md", server.base);

        client.put(&url).body("内容").send().await.unwrap();
        assert!(server.dir.path().join("workspace/reports/报告.md").is_file());
        assert_eq!(client.get(&url).send().await.unwrap().text().await.unwrap(), "内容");
    }

    #[tokio::test]
    async fn test_missing_document_is_structured_404() {
        let server = start(None, Duration::ZERO).await;
        let resp = reqwest::get(format!("{}/workspace/nope.md", server.base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body, json!({ "success": false, "error": "not found" }));
    }

    #[tokio::test]
    async fn test_traversal_rejected_on_the_wire() {
        let server = start(None, Duration::ZERO).await;
        std::fs::write(server.dir.path().join("secret.txt"), "top secret").unwrap();

        for target in [
            "/workspace/../secret.txt",
            "/workspace/%2e%2e/secret.txt",
            "/workspace/a/%2E%2E/%2e%2e/secret.txt",
            "/api/workspace/..%2fsecret.txt",
        ] {
            let response = raw_request(server.addr, &format!("GET {target} HTTP/1.1")).await;
            assert!(response.starts_with("HTTP/1.1 400"), "{target}: {response}");
            assert!(!response.contains("top secret"));

            let response = raw_request(
                server.addr,
                &format!("PUT {target} HTTP/1.1\r\nContent-Length: 0"),
            )
            .await;
            assert!(response.starts_with("HTTP/1.1 400"), "{target}: {response}");
        }
        assert_eq!(
            std::fs::read_to_string(server.dir.path().join("secret.txt")).unwrap(),
            "top secret"
        );
    }

    #[tokio::test]
    async fn test_preflight() {
        let server = start(None, Duration::ZERO).await;
        let resp = reqwest::Client::new()
            .request(Method::OPTIONS, format!("{}/api/ai/generate-edit", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["access-control-allow-methods"], ALLOWED_METHODS);
    }

    #[tokio::test]
    async fn test_generate_edit_envelope() {
        let server = start(Some("## New\n////...existing code...////"), Duration::ZERO).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/ai/generate-edit", server.base))
            .json(&json!({
                "originalContent": "# Doc",
                "editRequirements": "add a section",
                "model": "qwen-plus"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["code"], 20000);
        assert_eq!(body["data"]["output_text"], "## New\n////...existing code...////");
    }

    #[tokio::test]
    async fn test_generate_edit_failure_envelope() {
        let server = start(None, Duration::ZERO).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/ai/generate-edit", server.base))
            .json(&json!({ "editRequirements": "anything" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], 50000);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_orchestrated_edit() {
        let server = start(
            Some("# Report\n////...existing code...////\n## Conclusion\nDone.\n"),
            Duration::ZERO,
        )
        .await;
        std::fs::create_dir_all(server.dir.path().join("workspace/reports")).unwrap();
        std::fs::write(
            server.dir.path().join("workspace/reports/r.md"),
            "# Report\nLine1\n",
        )
        .unwrap();

        let resp = reqwest::Client::new()
            .post(format!("{}/api/edits", server.base))
            .json(&json!({ "path": "reports/r.md", "editRequirements": "conclude" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["mode"], "edit");
        assert_eq!(body["markersExpanded"], 1);
        assert_eq!(body["verification"]["status"], "matched");
        assert_eq!(
            std::fs::read_to_string(server.dir.path().join("workspace/reports/r.md")).unwrap(),
            "# Report\n# Report\nLine1\n\n## Conclusion\nDone.\n"
        );
        assert_eq!(server.app.tokens.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_creation_without_path_derives_name() {
        let server = start(Some("# Stock X\n\nCheap.\n"), Duration::ZERO).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/edits", server.base))
            .json(&json!({ "editRequirements": "analyze stock X valuation" }))
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["mode"], "create");
        assert_eq!(body["path"], "reports/analyze_stock_X_valuation.md");
        assert_eq!(
            std::fs::read_to_string(
                server
                    .dir
                    .path()
                    .join("workspace/reports/analyze_stock_X_valuation.md")
            )
            .unwrap(),
            "# Stock X\n\nCheap.\n"
        );
    }

    #[tokio::test]
    async fn test_repeated_pathless_request_creates_again() {
        let server = start(Some("# Stock X\n\nFresh.\n"), Duration::ZERO).await;
        let client = reqwest::Client::new();

        for _ in 0..2 {
            let body: serde_json::Value = client
                .post(format!("{}/api/edits", server.base))
                .json(&json!({ "editRequirements": "analyze stock X valuation" }))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(body["success"], true);
            assert_eq!(body["mode"], "create");
            assert_eq!(body["markersExpanded"], 0);
        }
        assert_eq!(
            std::fs::read_to_string(
                server
                    .dir
                    .path()
                    .join("workspace/reports/analyze_stock_X_valuation.md")
            )
            .unwrap(),
            "# Stock X\n\nFresh.\n"
        );
        assert_eq!(server.app.orchestrator.stats().created, 2);
    }

    #[tokio::test]
    async fn test_plan_then_apply() {
        let server = start(Some("PREFIX\n////...existing code...////"), Duration::ZERO).await;
        let client = reqwest::Client::new();
        client
            .put(format!("{}/workspace/a.md", server.base))
            .body("body")
            .send()
            .await
            .unwrap();

        let plan: serde_json::Value = client
            .post(format!("{}/api/edits/plan", server.base))
            .json(&json!({ "path": "a.md", "editRequirements": "prefix it" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(plan["markers"], 1);
        assert!(plan.get("original").is_none());
        let id = plan["id"].as_str().unwrap().to_string();

        // Nothing is written before confirmation.
        assert_eq!(
            std::fs::read_to_string(server.dir.path().join("workspace/a.md")).unwrap(),
            "body"
        );

        let resp = client
            .post(format!("{}/api/edits/{id}/apply", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            std::fs::read_to_string(server.dir.path().join("workspace/a.md")).unwrap(),
            "PREFIX\nbody"
        );

        let again = client
            .post(format!("{}/api/edits/{id}/apply", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(again.status(), 404);
    }

    #[tokio::test]
    async fn test_discarded_plan_is_not_applied() {
        let server = start(Some("replacement"), Duration::ZERO).await;
        let client = reqwest::Client::new();
        let plan: serde_json::Value = client
            .post(format!("{}/api/edits/plan", server.base))
            .json(&json!({ "path": "b.md", "editRequirements": "write" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = plan["id"].as_str().unwrap().to_string();

        let resp = client
            .delete(format!("{}/api/edits/{id}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let resp = client
            .post(format!("{}/api/edits/{id}/apply", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        assert!(!server.dir.path().join("workspace/b.md").exists());
    }

    #[tokio::test]
    async fn test_cancel_in_flight_edit_by_id() {
        let server = start(Some("late plan"), Duration::from_millis(400)).await;
        let client = reqwest::Client::new();
        let id = uuid::Uuid::new_v4();

        let edit = {
            let client = client.clone();
            let url = format!("{}/api/edits", server.base);
            tokio::spawn(async move {
                client
                    .post(url)
                    .json(&json!({ "path": "c.md", "editRequirements": "w", "requestId": id }))
                    .send()
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        let resp = client
            .delete(format!("{}/api/edits/{id}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let resp = edit.await.unwrap();
        assert_eq!(resp.status(), 409);
        assert!(!server.dir.path().join("workspace/c.md").exists());
        assert_eq!(server.app.orchestrator.stats().cancelled, 1);
    }

    #[tokio::test]
    async fn test_health_reports_stats() {
        let server = start(None, Duration::ZERO).await;
        let body: serde_json::Value = reqwest::get(format!("{}/health", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["generator"], "fixed");
        assert_eq!(body["stats"]["verificationMismatches"], 0);
    }
}
