//! Performance-log capture and the video-segment scan over it.
//!
//! Entries use the devtools performance-log schema: each record carries a
//! `message` field holding a JSON string of the shape
//! `{"message": {"method": ..., "params": {...}}}`. Entries accumulate for the
//! whole session and are never trimmed.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::Page;
use chrono::Utc;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

pub const RESPONSE_RECEIVED: &str = "Network.responseReceived";
pub const REQUEST_WILL_BE_SENT: &str = "Network.requestWillBeSent";

/// Marks a URL as coming from the video host.
const VIDEO_MARKER: &str = "video";
/// The host splits videos into numbered segments; `/1.ts` is the primary one.
const PRIMARY_SEGMENT_MARKER: &str = "/1.ts";

/// Wrap a CDP event in a performance-log record.
pub fn performance_entry(method: &str, params: Value) -> Value {
    let inner = json!({ "message": { "method": method, "params": params } });
    json!({
        "level": "INFO",
        "timestamp": Utc::now().timestamp_millis(),
        "message": inner.to_string(),
    })
}

/// URL of a `Network.responseReceived` record, or `None` for any other or
/// malformed record.
fn response_received_url(entry: &Value) -> Option<String> {
    let message = entry.get("message")?;
    let decoded;
    let envelope = match message {
        Value::String(raw) => {
            decoded = serde_json::from_str::<Value>(raw).ok()?;
            &decoded
        }
        other => other,
    };
    let log = envelope.get("message")?;
    let method = log.get("method")?.as_str()?;
    if !method.contains(RESPONSE_RECEIVED) {
        return None;
    }
    log.get("params")?
        .get("response")?
        .get("url")?
        .as_str()
        .map(str::to_string)
}

pub fn is_primary_video_segment(url: &str) -> bool {
    url.contains(VIDEO_MARKER) && url.contains(PRIMARY_SEGMENT_MARKER)
}

/// First primary-segment video URL in log order.
pub fn find_video_url(entries: &[Value]) -> Option<String> {
    let url = entries
        .iter()
        .filter_map(response_received_url)
        .find(|url| is_primary_video_segment(url))?;
    info!("found primary video link");
    Some(url)
}

/// Shared, append-only performance log fed by CDP network events.
#[derive(Clone, Default)]
pub struct NetworkLog {
    entries: Arc<Mutex<Vec<Value>>>,
}

impl NetworkLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, entry: Value) {
        self.entries.lock().await.push(entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Copy of everything captured so far; the lock is released before the
    /// caller starts scanning.
    pub async fn snapshot(&self) -> Vec<Value> {
        self.entries.lock().await.clone()
    }

    pub async fn find_video_url(&self) -> Option<String> {
        find_video_url(&self.snapshot().await)
    }

    /// Enable the Network domain on `page` and record its request/response
    /// events. The returned tasks end when the page goes away.
    pub async fn attach(&self, page: &Page) -> Result<Vec<JoinHandle<()>>> {
        page.execute(EnableParams::default())
            .await
            .map_err(|e| anyhow!("Failed to enable network events: {}", e))?;

        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| anyhow!("Failed to subscribe to responses: {}", e))?;
        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| anyhow!("Failed to subscribe to requests: {}", e))?;

        let log = self.clone();
        let response_task = tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let params = json!({
                    "requestId": event.request_id.inner(),
                    "response": {
                        "url": event.response.url,
                        "status": event.response.status,
                        "mimeType": event.response.mime_type,
                    },
                });
                log.push(performance_entry(RESPONSE_RECEIVED, params)).await;
            }
        });

        let log = self.clone();
        let request_task = tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let params = json!({
                    "requestId": event.request_id.inner(),
                    "request": {
                        "url": event.request.url,
                        "method": event.request.method,
                    },
                });
                log.push(performance_entry(REQUEST_WILL_BE_SENT, params)).await;
            }
        });

        Ok(vec![response_task, request_task])
    }
}
