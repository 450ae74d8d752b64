//! Supabase Realtime channel.
//!
//! Speaks the Phoenix channel protocol (v1 JSON frames) over one websocket:
//! each entity type joins `realtime:public:{table}` with a `postgres_changes`
//! filter, and a heartbeat keeps the socket alive. The socket is opened on
//! the first subscription.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::config::SupabaseConfig;
use crate::model::{EntityType, Record};
use crate::sync::realtime::{ChangeEvent, ChangeSender, RealtimeChannel, RemoteChange};
use crate::sync::remote::RemoteError;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

type Topics = Arc<Mutex<HashMap<String, (EntityType, ChangeSender)>>>;

/// Phoenix v1 frame.
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

struct Socket {
    outgoing: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

/// Realtime channel backed by a Supabase websocket.
pub struct SupabaseRealtime {
    url: String,
    anon_key: String,
    next_ref: AtomicU64,
    topics: Topics,
    socket: tokio::sync::Mutex<Option<Socket>>,
}

impl SupabaseRealtime {
    #[must_use]
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            url: websocket_url(&config.url, &config.anon_key),
            anon_key: config.anon_key.clone(),
            next_ref: AtomicU64::new(1),
            topics: Arc::new(Mutex::new(HashMap::new())),
            socket: tokio::sync::Mutex::new(None),
        }
    }

    fn make_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::Relaxed).to_string()
    }

    async fn send(&self, frame: &Frame) -> Result<(), RemoteError> {
        let text = serde_json::to_string(frame).map_err(|e| RemoteError::Realtime(e.to_string()))?;
        let mut socket = self.socket.lock().await;

        let alive = socket.as_ref().is_some_and(|s| !s.task.is_finished());
        if !alive {
            *socket = Some(self.connect().await?);
        }

        socket
            .as_ref()
            .ok_or_else(|| RemoteError::Realtime("socket not connected".into()))?
            .outgoing
            .send(Message::Text(text.into()))
            .map_err(|_| RemoteError::Realtime("socket closed".into()))
    }

    async fn connect(&self) -> Result<Socket, RemoteError> {
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| RemoteError::Realtime(format!("connect failed: {e}")))?;
        info!("Realtime socket connected");

        let (mut sink, mut stream) = ws.split();
        let (outgoing, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let topics = Arc::clone(&self.topics);

        let task = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            let mut heartbeat_ref: u64 = 0;

            loop {
                tokio::select! {
                    Some(msg) = out_rx.recv() => {
                        if let Err(e) = sink.send(msg).await {
                            warn!(error = %e, "Realtime send failed");
                            break;
                        }
                    }
                    _ = heartbeat.tick() => {
                        heartbeat_ref += 1;
                        let beat = heartbeat_frame(heartbeat_ref);
                        if sink.send(Message::Text(beat.into())).await.is_err() {
                            break;
                        }
                    }
                    incoming = stream.next() => match incoming {
                        Some(Ok(Message::Text(text))) => dispatch(&topics, &text),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Realtime socket error");
                            break;
                        }
                    }
                }
            }

            // Dropping the senders ends every consumer stream
            topics.lock().unwrap_or_else(PoisonError::into_inner).clear();
            info!("Realtime socket closed");
        });

        Ok(Socket { outgoing, task })
    }

    /// Close the socket and end every subscription.
    pub async fn close(&self) {
        if let Some(socket) = self.socket.lock().await.take() {
            socket.task.abort();
        }
        self.topics.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl RealtimeChannel for SupabaseRealtime {
    async fn subscribe(&self, entity_type: EntityType, sender: ChangeSender) -> Result<(), RemoteError> {
        let topic = topic_for(entity_type);
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.clone(), (entity_type, sender));

        let frame = join_frame(entity_type, &self.anon_key, self.make_ref());
        if let Err(e) = self.send(&frame).await {
            self.topics.lock().unwrap_or_else(PoisonError::into_inner).remove(&topic);
            return Err(e);
        }
        debug!(topic = %topic, "Joined realtime topic");
        Ok(())
    }

    async fn unsubscribe(&self, entity_type: EntityType) -> Result<(), RemoteError> {
        let topic = topic_for(entity_type);
        let removed = self
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&topic);
        if removed.is_none() {
            return Ok(());
        }

        let frame = Frame {
            topic: topic.clone(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            reference: Some(self.make_ref()),
        };
        self.send(&frame).await?;
        debug!(topic = %topic, "Left realtime topic");
        Ok(())
    }
}

fn topic_for(entity_type: EntityType) -> String {
    format!("realtime:public:{}", entity_type.table())
}

/// `https://x.supabase.co` → `wss://x.supabase.co/realtime/v1/websocket?apikey=…&vsn=1.0.0`.
fn websocket_url(base: &str, anon_key: &str) -> String {
    let base = base.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws}/realtime/v1/websocket?apikey={anon_key}&vsn=1.0.0")
}

fn join_frame(entity_type: EntityType, anon_key: &str, reference: String) -> Frame {
    Frame {
        topic: topic_for(entity_type),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": "public", "table": entity_type.table() }
                ]
            },
            "access_token": anon_key
        }),
        reference: Some(reference),
    }
}

fn heartbeat_frame(reference: u64) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string()
    })
    .to_string()
}

/// Extract a change event from a frame, if it carries one.
///
/// Accepts both the `postgres_changes` envelope and the older per-event
/// frames (`INSERT`/`UPDATE`/`DELETE` as the event name).
fn parse_change(frame: &Frame) -> Option<ChangeEvent> {
    let data = match frame.event.as_str() {
        "postgres_changes" => frame.payload.get("data")?,
        "INSERT" | "UPDATE" | "DELETE" => &frame.payload,
        _ => return None,
    };

    let kind = data
        .get("type")
        .or_else(|| data.get("eventType"))
        .and_then(Value::as_str)
        .unwrap_or(frame.event.as_str());

    let record = |key: &str| -> Option<Record> {
        serde_json::from_value(data.get(key)?.clone()).ok()
    };

    match kind {
        "INSERT" => Some(ChangeEvent::Insert {
            record: record("record")?,
        }),
        "UPDATE" => Some(ChangeEvent::Update {
            record: record("record")?,
        }),
        "DELETE" => {
            let id = data
                .get("old_record")
                .and_then(|r| r.get("id"))
                .and_then(Value::as_str)?;
            Some(ChangeEvent::Delete { id: id.to_string() })
        }
        _ => None,
    }
}

fn dispatch(topics: &Topics, text: &str) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            trace!(error = %e, "Ignoring non-frame message");
            return;
        }
    };

    if frame.event == "phx_reply" || frame.event == "phx_error" {
        let status = frame.payload.get("status").and_then(Value::as_str).unwrap_or("");
        if frame.event == "phx_error" || status == "error" {
            warn!(topic = %frame.topic, payload = %frame.payload, "Realtime channel error");
        }
        return;
    }

    let Some(event) = parse_change(&frame) else {
        trace!(topic = %frame.topic, event = %frame.event, "Ignoring frame");
        return;
    };

    let topics = topics.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some((entity_type, tx)) = topics.get(&frame.topic) {
        let _ = tx.send(RemoteChange {
            entity_type: *entity_type,
            event,
        });
    }
}
