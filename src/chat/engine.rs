//! Chat broadcast engine: the per-event pipelines behind the chat socket.
//!
//! Failure policy: an event that can't be authorized or whose room/user
//! doesn't resolve is dropped and logged; nothing here tears down the
//! connection or disturbs other rooms.

use sqlx::SqlitePool;

use crate::db;
use crate::hub::{ConnId, Hub};
use crate::stamp;
use crate::AppResult;

use super::event::ChatServerEvent;
use super::presence::PresenceRegistry;
use super::store;

/// The lobby every visitor lands in; connect announcements go here.
pub const LOBBY_ROOM: i64 = 1;
/// Authors the lobby announcements.
pub const SYSTEM_USER: i64 = 2;
/// The site owner connects silently.
pub const OWNER_USER: i64 = 1;

pub async fn on_connect(
    pool: &SqlitePool,
    hub: &Hub,
    presence: &PresenceRegistry,
    conn: ConnId,
    user_id: i64,
) -> AppResult<()> {
    presence.register(conn, user_id);
    db::set_online(pool, user_id, true).await?;

    hub.send_to(conn, &ChatServerEvent::SocketId(conn));
    let rooms = store::list_rooms(pool, user_id).await?;
    hub.send_to(conn, &ChatServerEvent::Rooms(rooms));

    // everyone but the owner announces themselves to the lobby
    if user_id != OWNER_USER {
        if let Some(user) = db::get_user(pool, user_id).await? {
            let time = stamp::chat_stamp();
            let msg = format!("{} connected at {}", user.name, time);
            if store::get_room(pool, LOBBY_ROOM).await?.is_some() {
                let mut conn_db = pool.acquire().await?;
                store::append_chat(&mut *conn_db, LOBBY_ROOM, SYSTEM_USER, &msg, &time, false)
                    .await?;
                hub.broadcast(
                    LOBBY_ROOM,
                    &ChatServerEvent::Message {
                        username: "Server".to_owned(),
                        msg,
                        time,
                        id: conn,
                    },
                );
            }
        }
    }
    Ok(())
}

/// The send pipeline. Sanitize, persist + touch + flip unread as one
/// transaction, then fan out to subscribers and ping idle members.
pub async fn on_message(
    pool: &SqlitePool,
    hub: &Hub,
    presence: &PresenceRegistry,
    conn: ConnId,
    room_id: i64,
    msg: &str,
) -> AppResult<()> {
    let Some(sender) = presence.resolve(conn) else {
        tracing::warn!(%conn, "message from unregistered connection dropped");
        return Ok(());
    };
    let Some(user) = db::get_user(pool, sender).await? else {
        tracing::warn!(sender, "message from unknown user dropped");
        return Ok(());
    };
    if store::get_room(pool, room_id).await?.is_none() {
        tracing::warn!(room_id, "message to unknown room dropped");
        return Ok(());
    }

    let msg = stamp::sanitize(msg);
    let time = stamp::chat_stamp();

    let mut tx = pool.begin().await?;
    store::append_chat(&mut *tx, room_id, sender, &msg, &time, false).await?;
    store::touch(&mut *tx, room_id).await?;
    store::mark_unread(&mut *tx, room_id, sender).await?;
    tx.commit().await?;

    hub.broadcast(
        room_id,
        &ChatServerEvent::Message {
            username: user.name,
            msg,
            time,
            id: conn,
        },
    );

    // unread ping for members who are online but not looking at this room
    let members = store::member_ids(pool, room_id).await?;
    for (other_conn, other_user) in presence.snapshot() {
        if members.contains(&other_user) && !hub.is_subscribed(other_conn, room_id) {
            hub.send_to(other_conn, &ChatServerEvent::NotifyChat { room_id });
        }
    }
    Ok(())
}

pub async fn on_read(
    pool: &SqlitePool,
    presence: &PresenceRegistry,
    conn: ConnId,
    room_id: i64,
) -> AppResult<()> {
    let Some(user_id) = presence.resolve(conn) else {
        return Ok(());
    };
    store::mark_read(pool, user_id, room_id).await
}

pub async fn on_join(
    pool: &SqlitePool,
    hub: &Hub,
    presence: &PresenceRegistry,
    conn: ConnId,
    room_id: i64,
) -> AppResult<()> {
    let Some(user_id) = presence.resolve(conn) else {
        tracing::warn!(%conn, "join from unregistered connection dropped");
        return Ok(());
    };
    if store::get_room(pool, room_id).await?.is_none() {
        tracing::warn!(room_id, "join to unknown room dropped");
        return Ok(());
    }
    hub.subscribe(conn, room_id);
    store::mark_read(pool, user_id, room_id).await?;
    let chats = store::history(pool, room_id, user_id).await?;
    hub.send_to(conn, &ChatServerEvent::ShowHistory { chats });
    Ok(())
}

/// Unsubscribes only; read state is untouched.
pub fn on_leave(hub: &Hub, conn: ConnId, room_id: i64) {
    hub.unsubscribe(conn, room_id);
}

pub async fn on_disconnect(
    pool: &SqlitePool,
    hub: &Hub,
    presence: &PresenceRegistry,
    conn: ConnId,
) -> AppResult<()> {
    if let Some(user_id) = presence.resolve(conn) {
        db::set_online(pool, user_id, false).await?;
    }
    presence.unregister(conn);
    hub.detach(conn);
    Ok(())
}
