//! WebSocket Directory Event Stream
//!
//! `GET /directory/events` upgrades to a WebSocket that carries one JSON
//! text frame per [`DirectoryEvent`], in publication order. The stream opens
//! with a `Connected` notice and, when the subscriber falls too far behind
//! the feed, ends with a `Lagged` notice followed by a close frame. Clients
//! that reconnect must re-read the directory since events are not replayed.

use std::sync::Arc;

use agentmesh_directory::AgentDirectory;
use agentmesh_events::{DirectoryEvent, SubscriberId};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::telemetry::METRICS;

/// Control frames sent alongside directory events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum StreamNotice {
    /// First frame on every connection
    Connected { subscriber_id: SubscriberId },
    /// The subscriber's queue overflowed; no further events follow
    Lagged { message: String },
}

/// GET /directory/events - Upgrade to the directory event stream
pub async fn events_handler(
    ws: WebSocketUpgrade,
    State(directory): State<Arc<dyn AgentDirectory>>,
) -> Response {
    info!("Directory event stream requested");
    ws.on_upgrade(move |socket| handle_socket(socket, directory))
}

async fn handle_socket(socket: WebSocket, directory: Arc<dyn AgentDirectory>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before announcing so nothing published after `Connected` is missed.
    let mut subscription = directory.subscribe_to_events();
    let subscriber_id = subscription.id();
    info!(subscriber_id, "Event stream connected");

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.ws_connected();
    }

    let connected = StreamNotice::Connected { subscriber_id };
    if let Err(e) = send_json(&mut sender, &connected).await {
        error!(subscriber_id, error = %e, "Failed to send Connected notice");
    } else {
        let mut recv_task = tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Close(_)) => {
                        debug!(subscriber_id, "Client sent close frame");
                        break;
                    }
                    Ok(Message::Text(text)) => {
                        debug!(subscriber_id, text = %text, "Received text message (ignored)");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(subscriber_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        });

        loop {
            tokio::select! {
                event = subscription.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(e) = send_json(&mut sender, &event).await {
                                warn!(subscriber_id, error = %e, "Failed to send event, closing stream");
                                break;
                            }
                        }
                        None if subscription.was_overflowed() => {
                            warn!(subscriber_id, "Subscriber lagged, closing stream");
                            let notice = StreamNotice::Lagged {
                                message: "event queue overflowed; re-read the directory and reconnect"
                                    .to_string(),
                            };
                            let _ = send_json(&mut sender, &notice).await;
                            break;
                        }
                        None => {
                            info!(subscriber_id, "Event feed stopped");
                            break;
                        }
                    }
                }

                _ = &mut recv_task => {
                    debug!(subscriber_id, "Receiver task finished");
                    break;
                }
            }
        }

        recv_task.abort();
        let _ = sender.send(Message::Close(None)).await;
    }

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.ws_disconnected();
    }
    info!(subscriber_id, "Event stream disconnected");
}

async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    value: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(value).map_err(|e| {
        error!(error = %e, "Failed to serialize stream frame");
        axum::Error::new(e)
    })?;
    sender.send(Message::Text(json)).await
}

/// Decode one stream frame as either a notice or a directory event.
pub fn parse_frame(text: &str) -> Result<StreamFrame, serde_json::Error> {
    serde_json::from_str(text)
}

/// Client-side view of a stream frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StreamFrame {
    Notice(StreamNotice),
    Event(DirectoryEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_wire_shape() -> Result<(), serde_json::Error> {
        let json = serde_json::to_value(StreamNotice::Connected { subscriber_id: 7 })?;
        assert_eq!(json["type"], "Connected");
        assert_eq!(json["subscriberId"], 7);
        Ok(())
    }

    #[test]
    fn test_parse_frame_distinguishes_notices() -> Result<(), serde_json::Error> {
        let frame = parse_frame(r#"{"type":"Lagged","message":"overflow"}"#)?;
        assert!(matches!(frame, StreamFrame::Notice(StreamNotice::Lagged { .. })));
        Ok(())
    }
}
