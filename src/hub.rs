//! Connection hub: one outbound channel per live websocket, plus the
//! room-subscription sets the chat broadcast fans out over.
//!
//! Fan-out is best effort. A receiver whose task died just gets skipped;
//! disconnect events are the only dead-connection detection.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Ephemeral connection id, minted at upgrade time.
pub type ConnId = Uuid;

#[derive(Default)]
pub struct Hub {
    inner: Mutex<HubInner>,
}

#[derive(Default)]
struct HubInner {
    conns: HashMap<ConnId, mpsc::UnboundedSender<String>>,
    rooms: HashMap<i64, HashSet<ConnId>>,
}

impl Hub {
    /// Registers a connection and hands back the receiving half its writer
    /// task drains.
    pub fn attach(&self, conn: ConnId) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().conns.insert(conn, tx);
        rx
    }

    /// Drops the connection and every room subscription it held. No-op if
    /// the connection is already gone.
    pub fn detach(&self, conn: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        inner.conns.remove(&conn);
        inner.rooms.retain(|_, subs| {
            subs.remove(&conn);
            !subs.is_empty()
        });
    }

    pub fn subscribe(&self, conn: ConnId, room_id: i64) {
        self.inner.lock().unwrap().rooms.entry(room_id).or_default().insert(conn);
    }

    pub fn unsubscribe(&self, conn: ConnId, room_id: i64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(subs) = inner.rooms.get_mut(&room_id) {
            subs.remove(&conn);
            if subs.is_empty() {
                inner.rooms.remove(&room_id);
            }
        }
    }

    pub fn is_subscribed(&self, conn: ConnId, room_id: i64) -> bool {
        self.inner
            .lock()
            .unwrap()
            .rooms
            .get(&room_id)
            .is_some_and(|subs| subs.contains(&conn))
    }

    /// Sends one event to one connection. Unknown or dead connections are
    /// silently skipped.
    pub fn send_to<T: Serialize>(&self, conn: ConnId, event: &T) {
        let Ok(text) = serde_json::to_string(event) else {
            return;
        };
        if let Some(tx) = self.inner.lock().unwrap().conns.get(&conn) {
            let _ = tx.send(text);
        }
    }

    /// Sends one event to every connection subscribed to the room.
    pub fn broadcast<T: Serialize>(&self, room_id: i64, event: &T) {
        let Ok(text) = serde_json::to_string(event) else {
            return;
        };
        let inner = self.inner.lock().unwrap();
        let Some(subs) = inner.rooms.get(&room_id) else {
            return;
        };
        for conn in subs {
            if let Some(tx) = inner.conns.get(conn) {
                let _ = tx.send(text.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Ping(&'static str);

    #[tokio::test]
    async fn broadcast_reaches_subscribers_only() {
        let hub = Hub::default();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut rx_a = hub.attach(a);
        let mut rx_b = hub.attach(b);

        hub.subscribe(a, 1);
        hub.broadcast(1, &Ping("hi"));
        assert_eq!(rx_a.recv().await.unwrap(), "\"hi\"");
        assert!(rx_b.try_recv().is_err());

        hub.unsubscribe(a, 1);
        hub.broadcast(1, &Ping("again"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn detach_clears_subscriptions() {
        let hub = Hub::default();
        let a = Uuid::now_v7();
        let _rx = hub.attach(a);
        hub.subscribe(a, 7);
        hub.detach(a);
        assert!(!hub.is_subscribed(a, 7));
        hub.send_to(a, &Ping("gone")); // must not panic
        hub.detach(a); // double detach is a no-op
    }
}
