use softspoken::{auth, blog, call, chat, db, AppState};

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let _ = dotenv::dotenv();

    let database_url =
        dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:softspoken.db?mode=rwc".to_owned());
    let db_pool = db::connect(&database_url).await.map_err(|err| err.0)?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(12)));

    let app_state = AppState::new(db_pool);
    let app = Router::new()
        .nest(
            "/api",
            auth::router().merge(blog::router()).merge(chat::api_router()),
        )
        .nest("/ws", chat::ws_router().merge(call::ws_router()))
        .with_state(app_state)
        .layer(session_layer)
        .layer(CorsLayer::permissive());

    let bind_addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    tracing::info!(%bind_addr, "listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
