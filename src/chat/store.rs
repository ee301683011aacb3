//! Room membership store: persisted rooms, per-member read state, unread
//! counts, and message history. Everything here is plain SQL over the pool;
//! the send pipeline passes a transaction connection through so the
//! append + touch + unread flip commit as one unit.

use sqlx::{SqliteConnection, SqlitePool};

use crate::stamp::{self, Stamp};
use crate::AppResult;

use super::event::{HistoryEntry, RoomEntry};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomMeta {
    pub name: Option<String>,
    pub is_group: bool,
}

pub async fn get_room(pool: &SqlitePool, room_id: i64) -> AppResult<Option<RoomMeta>> {
    Ok(
        sqlx::query_as("SELECT name,is_group FROM chat_rooms WHERE id=?")
            .bind(room_id)
            .fetch_optional(pool)
            .await?,
    )
}

/// Creates a room and one membership row per member, all in one
/// transaction. Direct rooms are named after the *other* party for each
/// member, resolved here once and never recomputed; group rooms carry the
/// room's own name for everyone and get their creation announcement stored
/// as an ordinary first message (the join reply renders it as a "Server"
/// line).
pub async fn create_room(
    pool: &SqlitePool,
    name: Option<&str>,
    is_group: bool,
    members: &[i64],
) -> AppResult<i64> {
    let mut names = Vec::with_capacity(members.len());
    for member in members {
        let (member_name,): (String,) = sqlx::query_as("SELECT name FROM users WHERE id=?")
            .bind(member)
            .fetch_one(pool)
            .await?;
        names.push(member_name);
    }

    let modified = stamp::modified_stamp();
    let read = stamp::chat_stamp();

    let mut tx = pool.begin().await?;
    let room_id = sqlx::query("INSERT INTO chat_rooms (name,last_modified,is_group) VALUES (?,?,?)")
        .bind(name)
        .bind(&modified)
        .bind(is_group)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    for (i, member) in members.iter().enumerate() {
        let room_name = if is_group {
            name.unwrap_or_default().to_owned()
        } else {
            // the other participant's name, for exactly two members
            names[if i == 0 { 1 } else { 0 }].clone()
        };
        sqlx::query(
            "INSERT INTO room_read (user_id,room_id,is_read,last_read,last_modified,room_name) \
             VALUES (?,?,1,?,?,?)",
        )
        .bind(member)
        .bind(room_id)
        .bind(&read)
        .bind(&modified)
        .bind(&room_name)
        .execute(&mut *tx)
        .await?;
    }

    if is_group {
        let announcement = format!("{} created {}", names[0], name.unwrap_or_default());
        append_chat(&mut *tx, room_id, members[0], &announcement, &read, false).await?;
    }
    tx.commit().await?;
    Ok(room_id)
}

pub async fn member_ids(pool: &SqlitePool, room_id: i64) -> AppResult<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT user_id FROM room_read WHERE room_id=?")
        .bind(room_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Missing memberships update zero rows, which is fine — the event is
/// simply absorbed.
pub async fn mark_read(pool: &SqlitePool, user_id: i64, room_id: i64) -> AppResult<()> {
    sqlx::query("UPDATE room_read SET is_read=1, last_read=? WHERE user_id=? AND room_id=?")
        .bind(stamp::chat_stamp())
        .bind(user_id)
        .bind(room_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Flips every membership of the room except the sender's to unread. The
/// sender's own row is untouched.
pub async fn mark_unread(conn: &mut SqliteConnection, room_id: i64, sender: i64) -> AppResult<()> {
    sqlx::query("UPDATE room_read SET is_read=0 WHERE room_id=? AND user_id!=?")
        .bind(room_id)
        .bind(sender)
        .execute(conn)
        .await?;
    Ok(())
}

/// Bumps `last_modified` on the room and all its memberships; room lists
/// order on it.
pub async fn touch(conn: &mut SqliteConnection, room_id: i64) -> AppResult<()> {
    let modified = stamp::modified_stamp();
    sqlx::query("UPDATE chat_rooms SET last_modified=? WHERE id=?")
        .bind(&modified)
        .bind(room_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE room_read SET last_modified=? WHERE room_id=?")
        .bind(&modified)
        .bind(room_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Appends to room history. History is append-only; rowids are the only
/// ordering.
pub async fn append_chat(
    conn: &mut SqliteConnection,
    room_id: i64,
    user_id: i64,
    msg: &str,
    time: &str,
    is_image: bool,
) -> AppResult<i64> {
    let result =
        sqlx::query("INSERT INTO chats (message,time,is_image,user_id,room_id) VALUES (?,?,?,?,?)")
            .bind(msg)
            .bind(time)
            .bind(is_image)
            .bind(user_id)
            .bind(room_id)
            .execute(conn)
            .await?;
    Ok(result.last_insert_rowid())
}

/// Messages stamped strictly later than the membership's `last_read`.
/// Stamps that don't parse count as nothing to read.
pub async fn unread_count(pool: &SqlitePool, user_id: i64, room_id: i64) -> AppResult<i64> {
    let last_read: Option<(String,)> =
        sqlx::query_as("SELECT last_read FROM room_read WHERE user_id=? AND room_id=?")
            .bind(user_id)
            .bind(room_id)
            .fetch_optional(pool)
            .await?;
    let Some((last_read,)) = last_read else {
        return Ok(0);
    };
    count_unread(pool, room_id, &last_read).await
}

async fn count_unread(pool: &SqlitePool, room_id: i64, last_read: &str) -> AppResult<i64> {
    let Some(mark) = Stamp::parse(last_read) else {
        return Ok(0);
    };
    let times: Vec<(String,)> = sqlx::query_as("SELECT time FROM chats WHERE room_id=?")
        .bind(room_id)
        .fetch_all(pool)
        .await?;
    Ok(times
        .iter()
        .filter(|(t,)| Stamp::parse(t).is_some_and(|s| s > mark))
        .count() as i64)
}

/// The user's rooms, most recently active first, with computed unread
/// counts. A zero count forces `is_read` back to true, repairing any drift
/// between the flag and the derived number.
pub async fn list_rooms(pool: &SqlitePool, user_id: i64) -> AppResult<Vec<RoomEntry>> {
    let rows: Vec<(i64, String, bool, String)> = sqlx::query_as(
        "SELECT room_id,room_name,is_read,last_read FROM room_read WHERE user_id=? \
         ORDER BY last_modified DESC, room_id ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut rooms = Vec::with_capacity(rows.len());
    for (room_id, room_name, mut is_read, last_read) in rows {
        let num_unread = count_unread(pool, room_id, &last_read).await?;
        if num_unread == 0 && !is_read {
            sqlx::query("UPDATE room_read SET is_read=1 WHERE user_id=? AND room_id=?")
                .bind(user_id)
                .bind(room_id)
                .execute(pool)
                .await?;
            is_read = true;
        }
        rooms.push(RoomEntry {
            room_id,
            name: room_name,
            is_read,
            num_unread,
        });
    }
    Ok(rooms)
}

/// Full rendered history for a joining viewer. Group rooms get the quirky
/// trailing "Server" copy of their first stored message; clients key their
/// creation banner off it, so it stays.
pub async fn history(
    pool: &SqlitePool,
    room_id: i64,
    viewer: i64,
) -> AppResult<Vec<HistoryEntry>> {
    let Some(room) = get_room(pool, room_id).await? else {
        return Ok(Vec::new());
    };
    let rows: Vec<(String, String, bool, i64, Option<String>)> = sqlx::query_as(
        "SELECT c.message,c.time,c.is_image,c.user_id,u.name FROM chats c \
         LEFT JOIN users u ON u.id=c.user_id WHERE c.room_id=? ORDER BY c.id",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?;

    let mut chats: Vec<HistoryEntry> = rows
        .into_iter()
        .map(|(msg, time, is_image, user_id, username)| HistoryEntry {
            msg,
            time,
            is_user: user_id == viewer,
            username: username.unwrap_or_else(|| "Server".to_owned()),
            is_image,
        })
        .collect();

    if room.is_group && !chats.is_empty() {
        let first = &chats[0];
        let server_line = HistoryEntry {
            msg: first.msg.clone(),
            time: first.time.clone(),
            is_user: false,
            username: "Server".to_owned(),
            is_image: false,
        };
        chats.push(server_line);
    }
    Ok(chats)
}
