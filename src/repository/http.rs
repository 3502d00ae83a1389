//! Chore repository backed by a remote chore-sync server.
//!
//! Writes are JSON requests; subscriptions read the server's Server-Sent
//! Events stream, where every `snapshot` event carries a full JSON array.

use futures::StreamExt;
use reqwest::{Client, StatusCode};

use super::{ChoreRepository, SnapshotEvent, SnapshotSender, Subscription};
use crate::error::RepoError;
use crate::models::{normalize_family_code, Chore, ChoreDocument, ChorePatch, CreateChoreInput};

#[derive(Debug, Clone)]
pub struct HttpChoreRepository {
    base_url: String,
    client: Client,
}

impl HttpChoreRepository {
    /// `base_url` points at the API root, e.g. `http://127.0.0.1:17020/api/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn a non-success response into the matching repository error.
async fn error_from_response(response: reqwest::Response, id: Option<&str>) -> RepoError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => RepoError::NotFound(id.unwrap_or(body.as_str()).to_string()),
        StatusCode::BAD_REQUEST => RepoError::Invalid(body),
        _ => RepoError::Write(format!("{}: {}", status, body)),
    }
}

impl ChoreRepository for HttpChoreRepository {
    fn subscribe(&self, family_code: &str) -> Result<Subscription, RepoError> {
        let family_code = normalize_family_code(family_code);
        if family_code.is_empty() {
            return Err(RepoError::Invalid("family code cannot be empty".to_string()));
        }

        let (sink, subscription) = Subscription::channel(family_code.clone());
        let request = self
            .client
            .get(self.url(&format!(
                "/families/{}/chores/stream",
                urlencoding::encode(&family_code)
            )))
            .header("Accept", "text/event-stream");

        tokio::spawn(async move {
            tokio::select! {
                _ = sink.closed() => {}
                _ = read_event_stream(request, &sink) => {}
            }
            tracing::debug!(family_code = %family_code, "Remote subscription ended");
        });
        Ok(subscription)
    }

    async fn create(&self, input: CreateChoreInput) -> Result<Chore, RepoError> {
        let response = self
            .client
            .post(self.url("/chores"))
            .json(&input)
            .send()
            .await
            .map_err(|e| RepoError::Write(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, None).await);
        }
        response
            .json::<Chore>()
            .await
            .map_err(|e| RepoError::Write(format!("unreadable create response: {e}")))
    }

    async fn update(&self, id: &str, patch: ChorePatch) -> Result<(), RepoError> {
        let response = self
            .client
            .patch(self.url(&format!("/chores/{}", urlencoding::encode(id))))
            .json(&patch)
            .send()
            .await
            .map_err(|e| RepoError::Write(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response, Some(id)).await);
        }
        Ok(())
    }
}

/// Pump server events into `sink` until the stream fails or ends. Every way
/// out of this function other than a closed sink reports an error event.
async fn read_event_stream(request: reqwest::RequestBuilder, sink: &SnapshotSender) {
    let response = match request.send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            let status = response.status();
            sink.send(SnapshotEvent::Error(format!("server answered {status}")))
                .await;
            return;
        }
        Err(e) => {
            sink.send(SnapshotEvent::Error(e.to_string())).await;
            return;
        }
    };

    let mut decoder = SseDecoder::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                sink.send(SnapshotEvent::Error(e.to_string())).await;
                return;
            }
        };

        for event in decoder.push(&chunk) {
            let delivery = match event.event.as_str() {
                "snapshot" => match serde_json::from_str::<Vec<ChoreDocument>>(&event.data) {
                    Ok(docs) => SnapshotEvent::Snapshot(docs),
                    Err(e) => SnapshotEvent::Error(format!("unreadable snapshot: {e}")),
                },
                "error" => SnapshotEvent::Error(event.data),
                other => {
                    tracing::debug!(event = other, "Ignoring unknown stream event");
                    continue;
                }
            };

            let failed = matches!(delivery, SnapshotEvent::Error(_));
            if !sink.send(delivery).await || failed {
                return;
            }
        }
    }

    sink.send(SnapshotEvent::Error("stream closed by server".to_string()))
        .await;
}

#[derive(Debug, PartialEq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` decoder. Chunks may split events, lines
/// or UTF-8 sequences anywhere.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block[..end])) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = "message".to_string();
    let mut data = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "event" => event = value.to_string(),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}
