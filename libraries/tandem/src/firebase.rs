//! Firebase Realtime Database over its REST API.
//!
//! Writes are plain `PUT`/`DELETE` requests. Subscriptions use the streaming endpoint
//! (`Accept: text/event-stream`): the server sends a `put` with the whole subtree, then a `put` or
//! `patch` for every change below it. We keep a mirror of the subtree and hand the whole thing to
//! the snapshot callback after each event.

use std::rc::Rc;

use futures::{
    FutureExt as _, StreamExt as _,
    future::{self, LocalBoxFuture},
};
use serde_json::{Map, Value};

use crate::{
    Spawner,
    backend::{ErrorCallback, RemoteError, SnapshotCallback, StorageBackend, Subscription},
    tree,
};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseConfig {
    /// e.g. `https://my-trip-default-rtdb.firebaseio.com`
    pub database_url: String,
    /// A database secret or ID token, sent as the `auth` query parameter.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl FirebaseConfig {
    pub fn url_for(&self, path: &str) -> String {
        let base = self.database_url.trim_end_matches('/');
        let path = tree::segments(path).join("/");
        match &self.auth_token {
            Some(token) => format!("{base}/{path}.json?auth={token}"),
            None => format!("{base}/{path}.json"),
        }
    }
}

pub struct FirebaseBackend {
    client: reqwest::Client,
    config: Rc<FirebaseConfig>,
    spawner: Spawner,
}

impl FirebaseBackend {
    /// `spawner` runs the long-lived streaming request behind each subscription.
    pub fn new(config: FirebaseConfig, spawner: Spawner) -> Self {
        log::info!("Using Firebase Realtime Database at {}", config.database_url);
        Self {
            client: reqwest::Client::new(),
            config: Rc::new(config),
            spawner,
        }
    }
}

impl StorageBackend for FirebaseBackend {
    fn is_available(&self) -> bool {
        true
    }

    fn subscribe(
        &self,
        path: &str,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Subscription {
        let url = self.config.url_for(path);
        let (task, handle) = future::abortable(watch(self.client.clone(), url, on_snapshot, on_error));
        (self.spawner)(Box::pin(task.map(|_| ())));
        Subscription::new(move || handle.abort())
    }

    fn write(
        &self,
        path: &str,
        value: Option<Value>,
    ) -> LocalBoxFuture<'static, Result<(), RemoteError>> {
        let url = self.config.url_for(path);
        let request = match &value {
            Some(value) => self.client.put(url).json(value),
            None => self.client.delete(url),
        };

        async move {
            let response = request.send().await.map_err(request_error)?;
            ensure_success(response).await?;
            Ok(())
        }
        .boxed_local()
    }
}

async fn watch(
    client: reqwest::Client,
    url: String,
    mut on_snapshot: SnapshotCallback,
    mut on_error: ErrorCallback,
) {
    if let Err(e) = stream_snapshots(&client, &url, &mut on_snapshot).await {
        on_error(e);
    }
}

async fn stream_snapshots(
    client: &reqwest::Client,
    url: &str,
    on_snapshot: &mut SnapshotCallback,
) -> Result<(), RemoteError> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(request_error)?;
    let response = ensure_success(response).await?;

    let mut body = response.bytes_stream();
    let mut decoder = EventStreamDecoder::default();
    let mut mirror = Mirror::default();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(request_error)?;
        for event in decoder.push(&chunk) {
            if mirror.apply(event?)? {
                on_snapshot(mirror.snapshot());
            }
        }
    }

    Err(RemoteError::Unreachable("event stream closed by the server".to_string()))
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => Err(RemoteError::PermissionDenied(body)),
        status => Err(RemoteError::Status { status, body }),
    }
}

fn request_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Unreachable(e.to_string())
}

/// One event from the streaming endpoint.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Replace whatever is at `path` (relative to the subscribed location) with `data`.
    Put { path: String, data: Value },
    /// Write each child of `data` below `path`.
    Patch { path: String, data: Value },
    KeepAlive,
    /// The server revoked our read access, for example after a rules change.
    Cancel(String),
    AuthRevoked,
}

/// Incremental `text/event-stream` parser. Feed it body chunks as they arrive.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

#[derive(serde::Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

impl EventStreamDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, RemoteError>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else if let Some(name) = field(line, "event") {
                self.event = Some(name.to_string());
            } else if let Some(data) = field(line, "data") {
                self.data.push(data.to_string());
            }
            // comments (`:`) and unknown fields are ignored
        }
        events
    }

    fn dispatch(&mut self) -> Option<Result<StreamEvent, RemoteError>> {
        let event = self.event.take()?;
        let data = std::mem::take(&mut self.data).join("\n");

        let parse = |data: &str| {
            serde_json::from_str::<PathData>(data)
                .map_err(|e| RemoteError::Decode(format!("{event} event: {e}")))
        };

        Some(match event.as_str() {
            "put" => parse(&data).map(|PathData { path, data }| StreamEvent::Put { path, data }),
            "patch" => parse(&data).map(|PathData { path, data }| StreamEvent::Patch { path, data }),
            "keep-alive" => Ok(StreamEvent::KeepAlive),
            "cancel" => Ok(StreamEvent::Cancel(data)),
            "auth_revoked" => Ok(StreamEvent::AuthRevoked),
            other => {
                log::warn!("Ignoring unknown event stream event {other:?}");
                return None;
            }
        })
    }
}

fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let value = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

/// The client's copy of the subscribed subtree.
#[derive(Debug, Default)]
struct Mirror {
    tree: Value,
}

impl Mirror {
    /// Returns whether the event changed anything worth announcing.
    fn apply(&mut self, event: StreamEvent) -> Result<bool, RemoteError> {
        match event {
            StreamEvent::Put { path, data } => {
                tree::set_at(&mut self.tree, &tree::segments(&path), data);
                Ok(true)
            }
            StreamEvent::Patch { path, data } => {
                let Value::Object(children) = data else {
                    return Err(RemoteError::Decode(format!(
                        "patch at {path} is not an object"
                    )));
                };
                self.patch(&path, children);
                Ok(true)
            }
            StreamEvent::KeepAlive => Ok(false),
            StreamEvent::Cancel(reason) => Err(RemoteError::Cancelled(reason)),
            StreamEvent::AuthRevoked => Err(RemoteError::PermissionDenied(
                "auth token revoked".to_string(),
            )),
        }
    }

    fn patch(&mut self, path: &str, children: Map<String, Value>) {
        tree::merge_at(&mut self.tree, &tree::segments(path), children);
    }

    fn snapshot(&self) -> Option<Value> {
        tree::get_at(&self.tree, &[]).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events(decoder: &mut EventStreamDecoder, chunk: &str) -> Vec<StreamEvent> {
        decoder
            .push(chunk.as_bytes())
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn urls_carry_the_auth_token() {
        let mut config = FirebaseConfig {
            database_url: "https://trip.firebaseio.com/".to_string(),
            auth_token: None,
        };
        assert_eq!(
            config.url_for("/itinerary"),
            "https://trip.firebaseio.com/itinerary.json"
        );

        config.auth_token = Some("s3cret".to_string());
        assert_eq!(
            config.url_for("packingChecklist"),
            "https://trip.firebaseio.com/packingChecklist.json?auth=s3cret"
        );
    }

    #[test]
    fn events_split_across_chunks_are_reassembled() {
        let mut decoder = EventStreamDecoder::default();
        assert!(events(&mut decoder, "event: put\r\ndata: {\"path\":\"/\",").is_empty());
        assert_eq!(
            events(&mut decoder, "\"data\":{\"version\":1}}\r\n\r\nevent: keep-alive\ndata: null\n\n"),
            vec![
                StreamEvent::Put {
                    path: "/".to_string(),
                    data: json!({"version": 1}),
                },
                StreamEvent::KeepAlive,
            ]
        );
    }

    #[test]
    fn malformed_data_is_a_decode_error() {
        let mut decoder = EventStreamDecoder::default();
        let results = decoder.push(b"event: put\ndata: not json\n\n");
        assert!(matches!(results.as_slice(), [Err(RemoteError::Decode(_))]));
    }

    #[test]
    fn mirror_applies_puts_and_patches() {
        let mut mirror = Mirror::default();
        let mut decoder = EventStreamDecoder::default();
        let stream = concat!(
            "event: put\n",
            "data: {\"path\":\"/\",\"data\":{\"version\":1,\"payload\":{\"d1-1\":{\"completed\":true}}}}\n\n",
            "event: patch\n",
            "data: {\"path\":\"/payload\",\"data\":{\"d1-2/completed\":true}}\n\n",
            "event: put\n",
            "data: {\"path\":\"/payload/d1-1\",\"data\":null}\n\n",
        );

        let mut snapshots = Vec::new();
        for event in events(&mut decoder, stream) {
            assert!(mirror.apply(event).unwrap());
            snapshots.push(mirror.snapshot());
        }

        assert_eq!(
            snapshots.last().cloned().flatten(),
            Some(json!({"version": 1, "payload": {"d1-2": {"completed": true}}}))
        );
    }

    #[test]
    fn whole_subtree_deleted_is_none() {
        let mut mirror = Mirror::default();
        mirror
            .apply(StreamEvent::Put {
                path: "/".to_string(),
                data: json!({"version": 3}),
            })
            .unwrap();
        mirror
            .apply(StreamEvent::Put {
                path: "/".to_string(),
                data: Value::Null,
            })
            .unwrap();
        assert_eq!(mirror.snapshot(), None);
    }

    #[test]
    fn cancel_and_revoke_end_the_subscription() {
        let mut mirror = Mirror::default();
        assert_eq!(
            mirror.apply(StreamEvent::Cancel("Permission denied".to_string())),
            Err(RemoteError::Cancelled("Permission denied".to_string()))
        );
        assert!(matches!(
            mirror.apply(StreamEvent::AuthRevoked),
            Err(RemoteError::PermissionDenied(_))
        ));
        assert_eq!(mirror.apply(StreamEvent::KeepAlive), Ok(false));
    }
}
