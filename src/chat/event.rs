//! Chat-namespace wire frames: `{"event": ..., "data": ...}` both ways.

use serde::{Deserialize, Serialize};

use crate::hub::ConnId;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ChatClientEvent {
    Message { msg: String, room: RoomRef },
    Read { room_id: i64 },
    Join { room_id: i64 },
    Leave { room_id: i64 },
}

#[derive(Debug, Deserialize)]
pub struct RoomRef {
    pub room_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ChatServerEvent {
    SocketId(ConnId),
    Rooms(Vec<RoomEntry>),
    Message {
        username: String,
        msg: String,
        time: String,
        id: ConnId,
    },
    ShowHistory {
        chats: Vec<HistoryEntry>,
    },
    NotifyChat {
        room_id: i64,
    },
}

#[derive(Debug, Serialize)]
pub struct RoomEntry {
    pub room_id: i64,
    pub name: String,
    pub is_read: bool,
    pub num_unread: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub msg: String,
    pub time: String,
    pub is_user: bool,
    pub username: String,
    pub is_image: bool,
}
