pub mod appresult;
pub mod auth;
pub mod blog;
pub mod call;
pub mod chat;
pub mod db;
pub mod hub;
pub mod stamp;

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

pub use appresult::{AppError, AppResult};

use call::group::GroupCalls;
use call::presence::CallRegistry;
use chat::presence::PresenceRegistry;
use hub::Hub;

/// Everything a handler can ask for. The registries are process-wide and
/// start empty on every boot; only the pool outlives a restart.
#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub hub: Arc<Hub>,
    pub presence: Arc<PresenceRegistry>,
    pub calls: Arc<CallRegistry>,
    pub groups: Arc<GroupCalls>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self {
            db_pool,
            hub: Arc::default(),
            presence: Arc::default(),
            calls: Arc::default(),
            groups: Arc::default(),
        }
    }
}
