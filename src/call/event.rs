//! Call and group-call wire frames. Signal payloads are opaque blobs
//! (offers, answers, ICE candidates) relayed verbatim, never inspected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hub::ConnId;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum CallClientEvent {
    CallUser { user_to_call: ConnId, signal: Value },
    AnswerCall { to: ConnId, signal: Value },
    LeaveCall { to: ConnId },
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum CallServerEvent {
    SocketId(ConnId),
    FriendsOnline(Vec<FriendEntry>),
    FriendOnline { sid: ConnId, name: String },
    FriendOffline(ConnId),
    CallUser { from: ConnId, name: String, signal: Value },
    CallAccepted(Value),
    LeaveCall,
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendEntry {
    pub sid: ConnId,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum GroupClientEvent {
    JoinRoom(String),
    LeaveRoom(String),
    SendingSignal { user_to_signal: ConnId, signal: Value },
    ReturningSignal { caller_sid: ConnId, signal: Value },
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum GroupServerEvent {
    AllUsers(Vec<ConnId>),
    UserJoined { signal: Value, sid: ConnId },
    ReceivingSignal { signal: Value, sid: ConnId },
    LeaveGroup(ConnId),
}
