// API 集成测试
//
// 通过 tower oneshot 直接驱动路由，浏览器由假实现代替

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use image_harvester::api::{self, AppState};
use image_harvester::external::{HttpClient, HttpClientConfig};
use image_harvester::models::ScanMode;
use image_harvester::services::scan::{BrowserError, BrowserLauncher, ElementSnapshot, PageSession};
use image_harvester::services::HarvestConfig;

/// 返回固定页面的假浏览器
struct StaticPageLauncher {
    html: String,
}

struct StaticPage {
    html: String,
}

impl BrowserLauncher for StaticPageLauncher {
    fn launch(&self) -> Result<Box<dyn PageSession>, BrowserError> {
        Ok(Box::new(StaticPage {
            html: self.html.clone(),
        }))
    }
}

impl PageSession for StaticPage {
    fn set_timeouts(&mut self, _: Duration, _: Duration) -> Result<(), BrowserError> {
        Ok(())
    }

    fn navigate(&mut self, _: &str, _: Duration) -> Result<(), BrowserError> {
        Ok(())
    }

    fn page_source(&mut self) -> Result<String, BrowserError> {
        Ok(self.html.clone())
    }

    fn execute_script(&mut self, _: &str) -> Result<Option<Value>, BrowserError> {
        Ok(None)
    }

    fn find_elements(&mut self, _: &str) -> Result<Vec<ElementSnapshot>, BrowserError> {
        Ok(vec![ElementSnapshot::new([("src", "/live.jpg")])])
    }

    fn quit(&mut self) -> Result<(), BrowserError> {
        Ok(())
    }
}

fn test_app(dir: &TempDir) -> Router {
    let config = HarvestConfig {
        scan_mode: ScanMode::Fast,
        stability_check_interval_ms: 0,
        stability_threshold: 2,
        scroll_delay_ms: 0,
        fast_settle_delay_ms: 0,
        memory_cache_capacity: 8,
        disk_cache_dir: dir.path().join("previews"),
        download_dir: dir.path().join("downloads"),
        ..HarvestConfig::default()
    };
    let http = HttpClient::new(HttpClientConfig::default()).unwrap();
    let launcher = Arc::new(StaticPageLauncher {
        html: r#"<html><body><img src="/a.jpg"><a href="/full/b.png"><img src="/b_thumb.png"></a></body></html>"#
            .to_string(),
    });

    api::router(AppState::new(config, http, launcher).unwrap())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(&app, get("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["scan_mode"], "fast");
}

#[tokio::test]
async fn test_resolve_site_rule_and_plain_url() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(
        &app,
        post_json("/api/resolve", json!({"url": "https://i.pinimg.com/236x/aa/bb/cc/pin.jpg"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["resolved_url"], "https://i.pinimg.com/originals/aa/bb/cc/pin.jpg");
    assert_eq!(body["data"]["used_fallback"], false);

    let (_, body) = send(
        &app,
        post_json("/api/resolve", json!({"url": "https://example.invalid/photo.jpg"})),
    )
    .await;
    assert_eq!(body["data"]["resolved_url"], "https://example.invalid/photo.jpg");
    assert_eq!(body["data"]["used_fallback"], false);
}

#[tokio::test]
async fn test_resolve_rejects_invalid_url() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(&app, post_json("/api/resolve", json!({"url": "::"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_scan_runs_to_completion() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(
        &app,
        post_json("/api/scan/start", json!({"url": "https://gallery.example.com/page"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["data"]["session_id"].as_str().unwrap().to_string();

    let mut progress = Value::Null;
    for _ in 0..200 {
        let (_, body) = send(&app, get(&format!("/api/scan/progress/{}", session_id))).await;
        progress = body["data"].clone();
        if progress["state"] == "done" || progress["state"] == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(progress["state"], "done");
    assert_eq!(progress["mode"], "fast");
    assert_eq!(
        progress["images"],
        json!([
            "https://gallery.example.com/a.jpg",
            "https://gallery.example.com/full/b.png"
        ])
    );
}

#[tokio::test]
async fn test_thorough_scan_mode_override() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (_, body) = send(
        &app,
        post_json(
            "/api/scan/start",
            json!({"url": "https://gallery.example.com/", "mode": "thorough"}),
        ),
    )
    .await;
    assert_eq!(body["data"]["mode"], "thorough");
    let session_id = body["data"]["session_id"].as_str().unwrap().to_string();

    let mut progress = Value::Null;
    for _ in 0..200 {
        let (_, body) = send(&app, get(&format!("/api/scan/progress/{}", session_id))).await;
        progress = body["data"].clone();
        if progress["finished_at"].is_string() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // 实时 DOM 一次读数后保持不变：第 1 次增长，第 2 次稳定
    assert_eq!(progress["state"], "done");
    assert_eq!(progress["iteration"], 2);
    assert_eq!(progress["images"][0], "https://gallery.example.com/live.jpg");
}

#[tokio::test]
async fn test_scan_rejects_invalid_url() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, _) = send(&app, post_json("/api/scan/start", json!({"url": "ftp://x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_scan_session() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(&app, get("/api/scan/progress/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");

    let (status, _) = send(&app, post_json("/api/scan/cancel/nope", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cache_stats_and_clear() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(&app, get("/api/cache/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["memory_capacity"], 8);
    assert_eq!(body["data"]["disk_enabled"], true);

    let (status, body) = send(&app, post_json("/api/cache/clear", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["memory_entries"], 0);
    assert!(dir.path().join("previews").is_dir());

    let (status, _) = send(&app, post_json("/api/cache/clear-memory", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_preview_rejects_zero_width() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, _) = send(&app, get("/api/preview?url=https%3A%2F%2Fa.com%2Fx.png&width=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_empty_list() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(&app, post_json("/api/download", json!({"urls": []}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);
    assert_eq!(body["data"]["outcomes"], json!([]));
}

#[tokio::test]
async fn test_download_rejects_dir_outside_download_root() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    for target in ["/tmp/x", "../x"] {
        let (status, body) = send(
            &app,
            post_json("/api/download", json!({"urls": ["https://a.com/x.jpg"], "target_dir": target})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
    assert!(!dir.path().join("x").exists());
}

#[tokio::test]
async fn test_download_sub_dir_lands_under_download_root() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(
        &app,
        post_json("/api/download", json!({"urls": [], "target_dir": "album"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let expected = dir.path().join("downloads").join("album");
    assert_eq!(body["data"]["target_dir"], expected.display().to_string());
}

#[tokio::test]
async fn test_preview_rejects_oversized_width() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, _) = send(&app, get("/api/preview?url=https%3A%2F%2Fa.com%2Fx.png&width=60000")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json("/api/preview/reload", json!({"urls": ["https://a.com/x.png"], "width": 60000})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
