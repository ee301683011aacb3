pub mod event;
pub mod group;
pub mod presence;

use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tower_sessions::Session;
use uuid::Uuid;

use crate::auth::USER_ID;
use crate::hub::{ConnId, Hub};
use crate::{db, AppResult, AppState};

use event::{CallClientEvent, CallServerEvent, GroupClientEvent, GroupServerEvent};
use group::GroupCalls;
use presence::CallRegistry;

pub fn ws_router() -> Router<AppState> {
    Router::new()
        .route("/call", get(call_ws))
        .route("/group", get(group_ws))
}

/// Call-namespace connect: evict any stale presence for the same user,
/// register fresh, then hand the joiner its id and roster and ping each
/// online friend individually.
pub fn on_call_connect(
    hub: &Hub,
    calls: &CallRegistry,
    conn: ConnId,
    user_id: i64,
    name: &str,
    friends: &[i64],
) {
    calls.connect(conn, user_id, name.to_owned());
    hub.send_to(conn, &CallServerEvent::SocketId(conn));
    let online = calls.friends_online(friends);
    hub.send_to(conn, &CallServerEvent::FriendsOnline(online.clone()));
    for friend in &online {
        hub.send_to(
            friend.sid,
            &CallServerEvent::FriendOnline {
                sid: conn,
                name: name.to_owned(),
            },
        );
    }
}

pub fn on_call_event(hub: &Hub, calls: &CallRegistry, conn: ConnId, event: CallClientEvent) {
    // events from an evicted presence entry are dropped as unauthorized
    let Some(me) = calls.resolve(conn) else {
        tracing::warn!(%conn, "call event from unknown connection dropped");
        return;
    };
    match event {
        CallClientEvent::CallUser { user_to_call, signal } => {
            calls.set_calling(conn);
            hub.send_to(
                user_to_call,
                &CallServerEvent::CallUser {
                    from: conn,
                    name: me.name,
                    signal,
                },
            );
        }
        CallClientEvent::AnswerCall { to, signal } => {
            calls.set_connected(conn, to);
            hub.send_to(to, &CallServerEvent::CallAccepted(signal));
        }
        CallClientEvent::LeaveCall { to } => {
            calls.clear_call(conn);
            hub.send_to(to, &CallServerEvent::LeaveCall);
        }
    }
}

/// Tells every online friend the connection went offline, then drops its
/// presence. Safe to call for an already-evicted connection.
pub fn on_call_disconnect(hub: &Hub, calls: &CallRegistry, conn: ConnId, friends: &[i64]) {
    for friend in calls.friends_online(friends) {
        hub.send_to(friend.sid, &CallServerEvent::FriendOffline(conn));
    }
    calls.remove(conn);
    hub.detach(conn);
}

pub fn on_group_event(hub: &Hub, groups: &GroupCalls, conn: ConnId, event: GroupClientEvent) {
    match event {
        GroupClientEvent::JoinRoom(name) => {
            let prior = groups.join(conn, &name);
            hub.send_to(conn, &GroupServerEvent::AllUsers(prior));
        }
        GroupClientEvent::LeaveRoom(name) => {
            for member in groups.leave(conn, &name) {
                hub.send_to(member, &GroupServerEvent::LeaveGroup(conn));
            }
        }
        GroupClientEvent::SendingSignal { user_to_signal, signal } => {
            hub.send_to(
                user_to_signal,
                &GroupServerEvent::UserJoined { signal, sid: conn },
            );
        }
        GroupClientEvent::ReturningSignal { caller_sid, signal } => {
            hub.send_to(
                caller_sid,
                &GroupServerEvent::ReceivingSignal { signal, sid: conn },
            );
        }
    }
}

/// Leaves every group the connection had joined, notifying whoever stays.
pub fn on_group_disconnect(hub: &Hub, groups: &GroupCalls, conn: ConnId) {
    for name in groups.groups_of(conn) {
        for member in groups.leave(conn, &name) {
            hub.send_to(member, &GroupServerEvent::LeaveGroup(conn));
        }
    }
    hub.detach(conn);
}

/// Splits the socket and spawns the writer task draining the hub channel.
fn writer_task(
    stream: WebSocket,
    mut rx: mpsc::UnboundedReceiver<String>,
) -> (
    tokio::task::JoinHandle<()>,
    futures_util::stream::SplitStream<WebSocket>,
) {
    let (mut sender, receiver) = stream.split();
    let task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });
    (task, receiver)
}

#[debug_handler(state = crate::AppState)]
async fn call_ws(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Arc<Hub>>,
    State(calls): State<Arc<CallRegistry>>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(user_id) = session.get::<i64>(USER_ID).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    let Some(user) = db::get_user(&db_pool, user_id).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    let friends = db::friends_of(&db_pool, user_id).await?;

    Ok(ws
        .on_upgrade(move |stream| handle_call_socket(stream, hub, calls, user, friends))
        .into_response())
}

async fn handle_call_socket(
    stream: WebSocket,
    hub: Arc<Hub>,
    calls: Arc<CallRegistry>,
    user: db::UserRow,
    friends: Vec<i64>,
) {
    let conn = Uuid::now_v7();
    let rx = hub.attach(conn);
    let (send_task, mut receiver) = writer_task(stream, rx);

    on_call_connect(&hub, &calls, conn, user.id, &user.name, &friends);

    while let Some(Ok(frame)) = receiver.next().await {
        let Ok(event) = serde_json::from_slice::<CallClientEvent>(&frame.into_data()) else {
            continue;
        };
        on_call_event(&hub, &calls, conn, event);
    }

    on_call_disconnect(&hub, &calls, conn, &friends);
    send_task.abort();
}

#[debug_handler(state = crate::AppState)]
async fn group_ws(
    State(hub): State<Arc<Hub>>,
    State(groups): State<Arc<GroupCalls>>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    if session.get::<i64>(USER_ID).await?.is_none() {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    }

    Ok(ws
        .on_upgrade(move |stream| handle_group_socket(stream, hub, groups))
        .into_response())
}

async fn handle_group_socket(stream: WebSocket, hub: Arc<Hub>, groups: Arc<GroupCalls>) {
    let conn = Uuid::now_v7();
    let rx = hub.attach(conn);
    let (send_task, mut receiver) = writer_task(stream, rx);

    while let Some(Ok(frame)) = receiver.next().await {
        let Ok(event) = serde_json::from_slice::<GroupClientEvent>(&frame.into_data()) else {
            continue;
        };
        on_group_event(&hub, &groups, conn, event);
    }

    on_group_disconnect(&hub, &groups, conn);
    send_task.abort();
}
