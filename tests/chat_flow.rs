use softspoken::chat::{engine, presence::PresenceRegistry, store};
use softspoken::hub::Hub;
use softspoken::{db, stamp};
use sqlx::SqlitePool;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

async fn mem_pool() -> SqlitePool {
    // unique shared-cache name so every test gets its own database
    let url = format!(
        "sqlite:file:{}?mode=memory&cache=shared",
        Uuid::now_v7().simple()
    );
    db::connect(&url).await.unwrap()
}

async fn user(pool: &SqlitePool, name: &str) -> i64 {
    db::create_user(pool, name, &format!("{name}@test"), "x")
        .await
        .unwrap()
}

fn next_event(rx: &mut UnboundedReceiver<String>) -> serde_json::Value {
    serde_json::from_str(&rx.try_recv().expect("expected a pending event")).unwrap()
}

async fn is_read(pool: &SqlitePool, user_id: i64, room_id: i64) -> bool {
    let (flag,): (bool,) =
        sqlx::query_as("SELECT is_read FROM room_read WHERE user_id=? AND room_id=?")
            .bind(user_id)
            .bind(room_id)
            .fetch_one(pool)
            .await
            .unwrap();
    flag
}

#[tokio::test]
async fn memberships_match_participants_and_direct_naming() {
    let pool = mem_pool().await;
    let a = user(&pool, "alice").await;
    let b = user(&pool, "bob").await;
    let c = user(&pool, "carol").await;

    let direct = store::create_room(&pool, None, false, &[a, b]).await.unwrap();
    let group = store::create_room(&pool, Some("gang"), true, &[a, b, c])
        .await
        .unwrap();

    let count = |room: i64| {
        let pool = pool.clone();
        async move {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM room_read WHERE room_id=?")
                .bind(room)
                .fetch_one(&pool)
                .await
                .unwrap();
            n
        }
    };
    assert_eq!(count(direct).await, 2);
    assert_eq!(count(group).await, 3);

    // direct rooms show each member the other party's name
    let name_for = |u: i64, room: i64| {
        let pool = pool.clone();
        async move {
            let (name,): (String,) =
                sqlx::query_as("SELECT room_name FROM room_read WHERE user_id=? AND room_id=?")
                    .bind(u)
                    .bind(room)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            name
        }
    };
    assert_eq!(name_for(a, direct).await, "bob");
    assert_eq!(name_for(b, direct).await, "alice");
    // group rooms show everyone the room's own name
    assert_eq!(name_for(b, group).await, "gang");
}

#[tokio::test]
async fn send_flips_unread_for_everyone_but_the_sender() {
    let pool = mem_pool().await;
    let a = user(&pool, "alice").await;
    let b = user(&pool, "bob").await;
    let c = user(&pool, "carol").await;
    let room = store::create_room(&pool, Some("gang"), true, &[a, b, c])
        .await
        .unwrap();

    let hub = Hub::default();
    let presence = PresenceRegistry::default();
    let conn_a = Uuid::now_v7();
    presence.register(conn_a, a);

    engine::on_message(&pool, &hub, &presence, conn_a, room, "yo")
        .await
        .unwrap();

    assert!(is_read(&pool, a, room).await, "sender's read state untouched");
    assert!(!is_read(&pool, b, room).await);
    assert!(!is_read(&pool, c, room).await);
}

#[tokio::test]
async fn unread_count_grows_until_mark_read_resets_it() {
    let pool = mem_pool().await;
    let a = user(&pool, "alice").await;
    let b = user(&pool, "bob").await;
    let room = store::create_room(&pool, None, false, &[a, b]).await.unwrap();

    // rewind bob's read mark to the smallest possible stamp
    sqlx::query("UPDATE room_read SET last_read='Jan-01 12:00AM' WHERE user_id=? AND room_id=?")
        .bind(b)
        .bind(room)
        .execute(&pool)
        .await
        .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    store::append_chat(&mut *conn, room, a, "one", &stamp::chat_stamp(), false)
        .await
        .unwrap();
    let first = store::unread_count(&pool, b, room).await.unwrap();
    assert_eq!(first, 1);

    store::append_chat(&mut *conn, room, a, "two", &stamp::chat_stamp(), false)
        .await
        .unwrap();
    let second = store::unread_count(&pool, b, room).await.unwrap();
    assert!(second >= first, "count never decreases between reads");
    assert_eq!(second, 2);

    store::mark_read(&pool, b, room).await.unwrap();
    assert_eq!(store::unread_count(&pool, b, room).await.unwrap(), 0);
    assert!(is_read(&pool, b, room).await);
}

#[tokio::test]
async fn sending_moves_the_room_to_the_front() {
    let pool = mem_pool().await;
    let a = user(&pool, "alice").await;
    let b = user(&pool, "bob").await;
    let c = user(&pool, "carol").await;
    let r1 = store::create_room(&pool, None, false, &[a, b]).await.unwrap();
    let r2 = store::create_room(&pool, None, false, &[a, c]).await.unwrap();

    let hub = Hub::default();
    let presence = PresenceRegistry::default();
    let conn_a = Uuid::now_v7();
    presence.register(conn_a, a);

    engine::on_message(&pool, &hub, &presence, conn_a, r1, "first")
        .await
        .unwrap();
    let rooms = store::list_rooms(&pool, a).await.unwrap();
    assert_eq!(rooms[0].room_id, r1);

    engine::on_message(&pool, &hub, &presence, conn_a, r2, "second")
        .await
        .unwrap();
    let rooms = store::list_rooms(&pool, a).await.unwrap();
    assert_eq!(rooms[0].room_id, r2);
    assert_eq!(rooms[1].room_id, r1);
}

#[tokio::test]
async fn direct_room_scenario() {
    let pool = mem_pool().await;
    let a = user(&pool, "alice").await;
    let b = user(&pool, "bob").await;
    let room = store::create_room(&pool, None, false, &[a, b]).await.unwrap();

    let hub = Hub::default();
    let presence = PresenceRegistry::default();
    let conn_a = Uuid::now_v7();
    let conn_b = Uuid::now_v7();
    presence.register(conn_a, a);
    presence.register(conn_b, b);
    let mut rx_b = hub.attach(conn_b);

    // A sends "hello": B is online but idle, so B gets the unread ping
    engine::on_message(&pool, &hub, &presence, conn_a, room, "hello")
        .await
        .unwrap();
    assert!(!is_read(&pool, b, room).await);
    let ping = next_event(&mut rx_b);
    assert_eq!(ping["event"], "notify_chat");
    assert_eq!(ping["data"]["room_id"], room);

    // B joins: history shows "hello" from the other side, room reads back
    engine::on_join(&pool, &hub, &presence, conn_b, room)
        .await
        .unwrap();
    let history = next_event(&mut rx_b);
    assert_eq!(history["event"], "show_history");
    let chats = history["data"]["chats"].as_array().unwrap();
    let hello = chats.iter().find(|c| c["msg"] == "hello").unwrap();
    assert_eq!(hello["is_user"], false);
    assert_eq!(hello["username"], "alice");

    assert!(is_read(&pool, b, room).await);
    assert_eq!(store::unread_count(&pool, b, room).await.unwrap(), 0);
}

#[tokio::test]
async fn broadcast_carries_sanitized_text_and_group_history_gets_server_line() {
    let pool = mem_pool().await;
    let a = user(&pool, "alice").await;
    let b = user(&pool, "bob").await;
    let room = store::create_room(&pool, Some("gang"), true, &[a, b])
        .await
        .unwrap();

    let hub = Hub::default();
    let presence = PresenceRegistry::default();
    let conn_a = Uuid::now_v7();
    presence.register(conn_a, a);
    let mut rx_a = hub.attach(conn_a);
    hub.subscribe(conn_a, room);

    engine::on_message(&pool, &hub, &presence, conn_a, room, "h\u{0301}ello")
        .await
        .unwrap();
    let message = next_event(&mut rx_a);
    assert_eq!(message["event"], "message");
    assert_eq!(message["data"]["msg"], "hello");
    assert_eq!(message["data"]["username"], "alice");

    let (stored,): (String,) =
        sqlx::query_as("SELECT message FROM chats WHERE room_id=? ORDER BY id DESC LIMIT 1")
            .bind(room)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored, "hello");

    // joining a group room appends the "Server" copy of the first message
    let chats = store::history(&pool, room, b).await.unwrap();
    let last = chats.last().unwrap();
    assert_eq!(last.username, "Server");
    assert_eq!(last.msg, chats[0].msg);
    assert!(!last.is_user);
}

#[tokio::test]
async fn connect_replies_rooms_and_announces_to_the_lobby() {
    let pool = mem_pool().await;
    let owner = user(&pool, "arsa").await; // id 1, the site owner
    let system = user(&pool, "Server").await; // id 2, authors announcements
    let guest = user(&pool, "guest").await;
    let lobby = store::create_room(&pool, Some("lobby"), true, &[owner, system, guest])
        .await
        .unwrap();
    assert_eq!(lobby, engine::LOBBY_ROOM);

    let hub = Hub::default();
    let presence = PresenceRegistry::default();
    let conn_g = Uuid::now_v7();
    let mut rx_g = hub.attach(conn_g);

    engine::on_connect(&pool, &hub, &presence, conn_g, guest)
        .await
        .unwrap();

    let socket_id = next_event(&mut rx_g);
    assert_eq!(socket_id["event"], "socket_id");
    let rooms = next_event(&mut rx_g);
    assert_eq!(rooms["event"], "rooms");
    assert_eq!(rooms["data"][0]["room_id"], lobby);
    assert_eq!(rooms["data"][0]["name"], "lobby");

    let announcements = |pool: &SqlitePool| {
        let pool = pool.clone();
        async move {
            let (n,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM chats WHERE room_id=? AND message LIKE '%connected at%'",
            )
            .bind(engine::LOBBY_ROOM)
            .fetch_one(&pool)
            .await
            .unwrap();
            n
        }
    };
    assert_eq!(announcements(&pool).await, 1);

    // the owner connects silently
    let conn_o = Uuid::now_v7();
    engine::on_connect(&pool, &hub, &presence, conn_o, owner)
        .await
        .unwrap();
    assert_eq!(announcements(&pool).await, 1);

    // disconnect marks offline and is safe to repeat
    engine::on_disconnect(&pool, &hub, &presence, conn_g).await.unwrap();
    engine::on_disconnect(&pool, &hub, &presence, conn_g).await.unwrap();
    let guest_row = db::get_user(&pool, guest).await.unwrap().unwrap();
    assert!(!guest_row.is_online);
    assert_eq!(presence.resolve(conn_g), None);
}

#[tokio::test]
async fn bad_events_are_dropped_without_side_effects() {
    let pool = mem_pool().await;
    let a = user(&pool, "alice").await;
    let b = user(&pool, "bob").await;
    let room = store::create_room(&pool, None, false, &[a, b]).await.unwrap();

    let hub = Hub::default();
    let presence = PresenceRegistry::default();
    let stranger = Uuid::now_v7(); // never registered

    engine::on_message(&pool, &hub, &presence, stranger, room, "spoofed")
        .await
        .unwrap();
    engine::on_join(&pool, &hub, &presence, stranger, room)
        .await
        .unwrap();

    let conn_a = Uuid::now_v7();
    presence.register(conn_a, a);
    engine::on_message(&pool, &hub, &presence, conn_a, 999, "void")
        .await
        .unwrap();
    engine::on_read(&pool, &presence, conn_a, 999).await.unwrap();

    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chats")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(n, 0);
    assert!(is_read(&pool, b, room).await);
}
