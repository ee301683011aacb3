pub mod engine;
pub mod event;
pub mod presence;
pub mod store;

use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::auth::USER_ID;
use crate::hub::Hub;
use crate::{AppResult, AppState};

use event::ChatClientEvent;
use presence::PresenceRegistry;

pub fn ws_router() -> Router<AppState> {
    Router::new().route("/chat", get(chat_ws))
}

pub fn api_router() -> Router<AppState> {
    Router::new().route("/chat/room", post(new_room))
}

#[debug_handler(state = crate::AppState)]
async fn chat_ws(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Arc<Hub>>,
    State(presence): State<Arc<PresenceRegistry>>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(user_id) = session.get::<i64>(USER_ID).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };

    Ok(ws
        .on_upgrade(move |stream| handle_socket(stream, db_pool, hub, presence, user_id))
        .into_response())
}

async fn handle_socket(
    stream: WebSocket,
    db_pool: SqlitePool,
    hub: Arc<Hub>,
    presence: Arc<PresenceRegistry>,
    user_id: i64,
) {
    let conn = Uuid::now_v7();
    let mut rx = hub.attach(conn);
    let (mut sender, mut receiver) = stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    if let Err(err) = engine::on_connect(&db_pool, &hub, &presence, conn, user_id).await {
        tracing::warn!(%conn, "chat connect failed: {}", err.0);
    }

    while let Some(Ok(frame)) = receiver.next().await {
        let Ok(event) = serde_json::from_slice::<ChatClientEvent>(&frame.into_data()) else {
            continue;
        };
        let result = match event {
            ChatClientEvent::Message { msg, room } => {
                engine::on_message(&db_pool, &hub, &presence, conn, room.room_id, &msg).await
            }
            ChatClientEvent::Read { room_id } => {
                engine::on_read(&db_pool, &presence, conn, room_id).await
            }
            ChatClientEvent::Join { room_id } => {
                engine::on_join(&db_pool, &hub, &presence, conn, room_id).await
            }
            ChatClientEvent::Leave { room_id } => {
                engine::on_leave(&hub, conn, room_id);
                Ok(())
            }
        };
        if let Err(err) = result {
            tracing::warn!(%conn, "chat event failed: {}", err.0);
        }
    }

    if let Err(err) = engine::on_disconnect(&db_pool, &hub, &presence, conn).await {
        tracing::warn!(%conn, "chat disconnect failed: {}", err.0);
    }
    send_task.abort();
}

#[derive(Debug, Deserialize)]
struct NewRoomQuery {
    name: Option<String>,
    is_group: bool,
    members: Vec<i64>,
}

#[debug_handler(state = crate::AppState)]
async fn new_room(
    State(db_pool): State<SqlitePool>,
    session: Session,

    Json(NewRoomQuery { name, is_group, mut members }): Json<NewRoomQuery>,
) -> AppResult<Response> {
    let Some(user_id) = session.get::<i64>(USER_ID).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };

    if !members.contains(&user_id) {
        members.insert(0, user_id);
    }
    if !is_group && members.len() != 2 {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "direct rooms need exactly two members"})),
        )
            .into_response());
    }
    if is_group && members.len() < 2 {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "group rooms need at least two members"})),
        )
            .into_response());
    }

    let room_id = store::create_room(&db_pool, name.as_deref(), is_group, &members).await?;
    Ok(Json(json!({"room_id": room_id})).into_response())
}
