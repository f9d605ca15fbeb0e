//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic; we reply with a single JSON message per request.
//! Once a client addresses an attempt, its tick / expiry / submission notices
//! are pushed on the same socket.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, instrument, warn};

use crate::error::AppError;
use crate::logic::*;
use crate::protocol::{AttemptView, ClientWsMessage, ServerWsMessage, WsQuery};
use crate::session::AttemptNotice;
use crate::state::AppState;
use crate::util::normalize_user_id;

/// Notice subscription for the attempt this socket last addressed.
struct Watch {
  attempt_id: String,
  rx: broadcast::Receiver<AttemptNotice>,
}

#[instrument(level = "info", skip(ws, state), fields(user_id = %query.user_id))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  Query(query): Query<WsQuery>,
  State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
  let user_id = ws_user(&query)?;
  info!(target: "testprep_backend", "WebSocket upgrade requested");
  Ok(ws.on_upgrade(move |socket| handle_ws(socket, state, user_id)))
}

/// Same rules as the `x-user-id` header: trimmed, non-empty.
fn ws_user(query: &WsQuery) -> Result<String, AppError> {
  normalize_user_id(&query.user_id).ok_or_else(|| AppError::Unauthorized("missing userId query parameter".into()))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(socket: WebSocket, state: Arc<AppState>, user_id: String) {
  info!(target: "testprep_backend", "WebSocket connected");
  let (mut sender, mut receiver) = socket.split();
  let mut watch: Option<Watch> = None;

  loop {
    let reply = tokio::select! {
      incoming = receiver.next() => match incoming {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(msg) => {
            debug!(target: "testprep_backend", "WS received: {:?}", &msg);
            handle_client_ws(msg, &state, &user_id, &mut watch).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = sender.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Err(e)) => {
          warn!(target: "testprep_backend", error = %e, "WS receive error");
          break;
        }
        Some(Ok(_)) => continue,
      },
      notice = next_notice(&mut watch) => match notice {
        Ok((attempt_id, notice)) => ServerWsMessage::from_notice(&attempt_id, notice),
        Err(RecvError::Lagged(skipped)) => {
          warn!(target: "attempt", skipped, "WS watcher lagged behind notices");
          continue;
        }
        Err(RecvError::Closed) => {
          watch = None;
          continue;
        }
      },
    };

    let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
    });
    if let Err(e) = sender.send(Message::Text(out)).await {
      error!(target: "testprep_backend", error = %e, "WS send error");
      break;
    }
  }
  info!(target: "testprep_backend", "WebSocket disconnected");
}

/// Next notice of the watched attempt; never resolves while nothing is watched.
async fn next_notice(watch: &mut Option<Watch>) -> Result<(String, AttemptNotice), RecvError> {
  match watch {
    Some(w) => w.rx.recv().await.map(|n| (w.attempt_id.clone(), n)),
    None => std::future::pending().await,
  }
}

async fn watch_attempt(state: &AppState, user_id: &str, attempt_id: &str, watch: &mut Option<Watch>) -> Result<(), AppError> {
  if watch.as_ref().map(|w| w.attempt_id == attempt_id).unwrap_or(false) {
    return Ok(());
  }
  let session = state.session_for(user_id, attempt_id).await?;
  *watch = Some(Watch { attempt_id: attempt_id.to_string(), rx: session.subscribe() });
  debug!(target: "attempt", %attempt_id, "WS watching attempt");
  Ok(())
}

fn view_reply(result: Result<AttemptView, AppError>) -> ServerWsMessage {
  match result {
    Ok(attempt) => ServerWsMessage::Attempt { attempt },
    Err(e) => ServerWsMessage::Error { message: e.to_string() },
  }
}

#[instrument(level = "info", skip(state, watch))]
async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  user_id: &str,
  watch: &mut Option<Watch>,
) -> ServerWsMessage {
  let attempt_id = match &msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,
    ClientWsMessage::Watch { attempt_id }
    | ClientWsMessage::Sync { attempt_id }
    | ClientWsMessage::Begin { attempt_id }
    | ClientWsMessage::Event { attempt_id, .. }
    | ClientWsMessage::Submit { attempt_id } => attempt_id.clone(),
  };
  if let Err(e) = watch_attempt(state, user_id, &attempt_id, watch).await {
    return ServerWsMessage::Error { message: e.to_string() };
  }

  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,
    ClientWsMessage::Watch { .. } | ClientWsMessage::Sync { .. } => {
      view_reply(attempt_view(state, user_id, &attempt_id).await)
    }
    ClientWsMessage::Begin { .. } => {
      let reply = view_reply(begin_attempt(state, user_id, &attempt_id).await);
      info!(target: "attempt", %attempt_id, "WS begin served");
      reply
    }
    ClientWsMessage::Event { event, .. } => view_reply(apply_event(state, user_id, &attempt_id, &event).await),
    ClientWsMessage::Submit { .. } => match submit_attempt(state, user_id, &attempt_id).await {
      // The Submitted notice follows through the watch; reply with the settled view.
      Ok(_) => view_reply(attempt_view(state, user_id, &attempt_id).await),
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },
  }
}
