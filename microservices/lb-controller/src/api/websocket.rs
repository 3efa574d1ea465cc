//! Observer WebSocket
//!
//! One connection attaches one observer session to one actor (the
//! well-known default instance unless a name is given). The actor pushes
//! the baseline health snapshot first, then live events; a failed send
//! or a closed socket detaches the session.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::debug;

use edgelb_core::EdgelbError;

use crate::actors::LbActorHandle;
use crate::config::DEFAULT_ACTOR;

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct ObserveParams {
    #[serde(default = "default_actor_name")]
    pub name: String,
}

fn default_actor_name() -> String {
    DEFAULT_ACTOR.to_string()
}

pub async fn observe_handler(
    State(state): State<AppState>,
    Query(params): Query<ObserveParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    // The default instance always exists; any other name must be backed
    // by durable state so bogus names cannot spawn actors.
    let handle = if params.name == DEFAULT_ACTOR {
        state.directory.default_instance()
    } else {
        state.directory.lookup(&params.name).await?.ok_or_else(|| {
            EdgelbError::NotFound(format!(
                "load balancer '{}' is not registered",
                params.name
            ))
        })?
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, handle)))
}

async fn handle_socket(socket: WebSocket, handle: LbActorHandle) {
    let Ok((session_id, mut events)) = handle.attach_session().await else {
        return;
    };
    debug!(load_balancer = %handle.name(), %session_id, "Observer attached");

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Ok(json) = serde_json::to_string(&event) else { continue };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Observers are read-only; other frames are ignored.
                    _ => {}
                }
            }
        }
    }

    handle.detach_session(session_id).await;
    debug!(load_balancer = %handle.name(), %session_id, "Observer detached");
}
