use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::AppResult;

/// Opens the pool and applies the embedded schema. Idempotent, so tests can
/// point it at `sqlite::memory:`.
pub async fn connect(url: &str) -> AppResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(url)
        .await?;
    sqlx::raw_sql(include_str!("../schema.sql"))
        .execute(&pool)
        .await?;
    Ok(pool)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub is_online: bool,
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> AppResult<Option<UserRow>> {
    Ok(
        sqlx::query_as("SELECT id,email,name,is_online FROM users WHERE id=?")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn create_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password_hash: &str,
) -> AppResult<i64> {
    let result = sqlx::query("INSERT INTO users (name,email,password) VALUES (?,?,?)")
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn set_online(pool: &SqlitePool, user_id: i64, online: bool) -> AppResult<()> {
    sqlx::query("UPDATE users SET is_online=? WHERE id=?")
        .bind(online)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// The friends relation is symmetric; both directions are stored.
pub async fn add_friend(pool: &SqlitePool, user_id: i64, friend_id: i64) -> AppResult<()> {
    sqlx::query("INSERT INTO friends (user_id,friend_id) VALUES (?,?),(?,?)")
        .bind(user_id)
        .bind(friend_id)
        .bind(friend_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn friends_of(pool: &SqlitePool, user_id: i64) -> AppResult<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as("SELECT friend_id FROM friends WHERE user_id=?")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
