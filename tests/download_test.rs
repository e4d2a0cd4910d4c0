//! Streaming download tests against a local axum server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use serde_json::json;

use review_grabber::download::{download_video, header_map, CHUNK_SIZE};
use review_grabber::network_log::{performance_entry, RESPONSE_RECEIVED};
use review_grabber::{GrabError, GrabberConfig, NetworkLog, TriggerHandler, TriggerOutcome};

fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

fn video_body() -> Vec<u8> {
    // Not a multiple of the chunk size, so the last write is short.
    (0..(CHUNK_SIZE * 3 + 123)).map(|i| (i % 251) as u8).collect()
}

async fn serve() -> String {
    let router = Router::new()
        .route("/cdn/video/abc/1.ts", get(|| async { video_body() }))
        .route(
            "/cdn/video/gone/1.ts",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        )
        .route(
            "/cdn/video/broken/1.ts",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/cdn/video/echo/1.ts",
            get(|headers: HeaderMap| async move {
                let ua = headers
                    .get("user-agent")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let referer = headers
                    .get("referer")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                format!("{}|{}", ua, referer)
            }),
        )
        .route(
            "/cdn/video/chunked/1.ts",
            get(|| async {
                let parts: Vec<Result<Bytes, std::io::Error>> = vec![
                    Ok(Bytes::from_static(b"abc")),
                    Ok(Bytes::new()),
                    Ok(Bytes::from_static(b"def")),
                    Ok(Bytes::new()),
                ];
                Body::from_stream(futures::stream::iter(parts))
            }),
        )
        .route(
            "/cdn/video/cut/1.ts",
            get(|| async {
                let parts: Vec<Result<Bytes, std::io::Error>> = vec![
                    Ok(Bytes::from(vec![7u8; CHUNK_SIZE * 2 + 3616])),
                    Err(std::io::Error::other("connection cut")),
                ];
                Body::from_stream(futures::stream::iter(parts))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn temp_folder() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("review-grabber-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn files_in(dir: &PathBuf) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    files
}

fn test_config(folder: &PathBuf) -> GrabberConfig {
    let mut cfg = GrabberConfig::default();
    cfg.download_folder = folder.clone();
    cfg.video_load_delay = Duration::ZERO;
    cfg
}

#[tokio::test]
async fn test_200_body_round_trips_to_disk() {
    init_logger();
    let base = serve().await;
    let folder = temp_folder();
    let headers = header_map(&GrabberConfig::default().request_headers).unwrap();

    let outcome = download_video(
        &reqwest::Client::new(),
        &format!("{}/cdn/video/abc/1.ts", base),
        &headers,
        &folder,
    )
    .await
    .unwrap();

    let expected = video_body();
    assert_eq!(outcome.bytes_written, expected.len() as u64);
    assert_eq!(std::fs::read(&outcome.path).unwrap(), expected);

    let name = outcome.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("video_"), "unexpected name {}", name);
    assert!(name.ends_with(".mp4"), "unexpected name {}", name);
    // video_YYYYMMDD_HHMMSS.mp4
    assert_eq!(name.len(), "video_20240101_000000.mp4".len());

    std::fs::remove_dir_all(&folder).ok();
}

#[tokio::test]
async fn test_non_200_writes_nothing() {
    init_logger();
    let base = serve().await;
    let folder = temp_folder();
    let headers = header_map(&GrabberConfig::default().request_headers).unwrap();

    let err = download_video(
        &reqwest::Client::new(),
        &format!("{}/cdn/video/gone/1.ts", base),
        &headers,
        &folder,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, GrabError::HttpStatus(404)), "got {:?}", err);
    assert!(files_in(&folder).is_empty());

    std::fs::remove_dir_all(&folder).ok();
}

#[tokio::test]
async fn test_midstream_failure_removes_partial_file() {
    init_logger();
    let base = serve().await;
    let folder = temp_folder();
    let headers = header_map(&GrabberConfig::default().request_headers).unwrap();

    let err = download_video(
        &reqwest::Client::new(),
        &format!("{}/cdn/video/cut/1.ts", base),
        &headers,
        &folder,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, GrabError::Http(_)), "got {:?}", err);
    assert!(files_in(&folder).is_empty());

    std::fs::remove_dir_all(&folder).ok();
}

#[tokio::test]
async fn test_configured_headers_are_sent() {
    init_logger();
    let base = serve().await;
    let folder = temp_folder();
    let cfg = GrabberConfig::default();
    let headers = header_map(&cfg.request_headers).unwrap();

    let outcome = download_video(
        &reqwest::Client::new(),
        &format!("{}/cdn/video/echo/1.ts", base),
        &headers,
        &folder,
    )
    .await
    .unwrap();

    let body = std::fs::read_to_string(&outcome.path).unwrap();
    assert_eq!(
        body,
        format!(
            "{}|{}",
            cfg.request_headers["User-Agent"], cfg.request_headers["Referer"]
        )
    );

    std::fs::remove_dir_all(&folder).ok();
}

#[tokio::test]
async fn test_empty_chunks_are_skipped() {
    init_logger();
    let base = serve().await;
    let folder = temp_folder();
    let headers = header_map(&GrabberConfig::default().request_headers).unwrap();

    let outcome = download_video(
        &reqwest::Client::new(),
        &format!("{}/cdn/video/chunked/1.ts", base),
        &headers,
        &folder,
    )
    .await
    .unwrap();

    assert_eq!(outcome.bytes_written, 6);
    assert_eq!(std::fs::read(&outcome.path).unwrap(), b"abcdef");

    std::fs::remove_dir_all(&folder).ok();
}

#[tokio::test]
async fn test_back_to_back_downloads_do_not_overwrite() {
    init_logger();
    let base = serve().await;
    let folder = temp_folder();
    let headers = header_map(&GrabberConfig::default().request_headers).unwrap();
    let client = reqwest::Client::new();
    let url = format!("{}/cdn/video/abc/1.ts", base);

    let first = download_video(&client, &url, &headers, &folder).await.unwrap();
    let second = download_video(&client, &url, &headers, &folder).await.unwrap();

    assert_ne!(first.path, second.path);
    assert_eq!(files_in(&folder).len(), 2);

    std::fs::remove_dir_all(&folder).ok();
}

#[tokio::test]
async fn test_trigger_scans_log_and_downloads_primary_segment() {
    init_logger();
    let base = serve().await;
    let folder = temp_folder();

    let log = NetworkLog::new();
    log.push(performance_entry(
        RESPONSE_RECEIVED,
        json!({ "response": { "url": format!("{}/cdn/video/abc/2.ts", base) } }),
    ))
    .await;
    log.push(performance_entry(
        RESPONSE_RECEIVED,
        json!({ "response": { "url": format!("{}/cdn/video/abc/1.ts", base) } }),
    ))
    .await;

    let handler = TriggerHandler::new(&test_config(&folder), log).unwrap();
    match handler.try_download().await.unwrap() {
        TriggerOutcome::Saved(outcome) => {
            assert_eq!(std::fs::read(&outcome.path).unwrap(), video_body());
        }
        other => panic!("expected a saved video, got {:?}", other),
    }

    std::fs::remove_dir_all(&folder).ok();
}

#[tokio::test]
async fn test_trigger_without_primary_segment_does_nothing() {
    init_logger();
    let base = serve().await;
    let folder = temp_folder();

    let log = NetworkLog::new();
    log.push(performance_entry(
        RESPONSE_RECEIVED,
        json!({ "response": { "url": format!("{}/cdn/video/2.ts", base) } }),
    ))
    .await;

    let handler = TriggerHandler::new(&test_config(&folder), log).unwrap();
    assert!(matches!(
        handler.try_download().await.unwrap(),
        TriggerOutcome::NotFound
    ));
    assert!(files_in(&folder).is_empty());

    std::fs::remove_dir_all(&folder).ok();
}

#[tokio::test]
async fn test_trigger_swallows_server_errors() {
    init_logger();
    let base = serve().await;
    let folder = temp_folder();

    let log = NetworkLog::new();
    log.push(performance_entry(
        RESPONSE_RECEIVED,
        json!({ "response": { "url": format!("{}/cdn/video/broken/1.ts", base) } }),
    ))
    .await;

    let handler = Arc::new(TriggerHandler::new(&test_config(&folder), log).unwrap());
    assert!(matches!(
        handler.try_download().await,
        Err(GrabError::HttpStatus(500))
    ));

    // The key-press entry point logs and returns normally.
    handler.download_current_video().await;
    assert!(files_in(&folder).is_empty());

    std::fs::remove_dir_all(&folder).ok();
}
