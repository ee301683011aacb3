use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{
    debug_handler,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{db, AppResult, AppState};

/// Session key holding the logged-in user's id. The websocket upgrades
/// resolve it once; a connection's identity never changes after that.
pub const USER_ID: &str = "user_id";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/get-user", get(get_user))
        .route("/friend", post(add_friend))
}

#[derive(Debug, Deserialize)]
struct SignUpQuery {
    username: String,
    email: String,
    password: String,
}

#[debug_handler]
async fn sign_up(
    State(db_pool): State<SqlitePool>,
    session: Session,

    Json(SignUpQuery { username, email, password }): Json<SignUpQuery>,
) -> AppResult<Response> {
    let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE email=?")
        .bind(&email)
        .fetch_optional(&db_pool)
        .await?;
    if taken.is_some() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "email already registered"})),
        )
            .into_response());
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(anyhow::Error::msg)?
        .to_string();
    let user_id = db::create_user(&db_pool, &username, &email, &hash).await?;
    session.insert(USER_ID, user_id).await?;

    Ok(Json(json!({
        "success": "User created",
        "user": { "name": username, "email": email },
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    email: String,
    password: String,
}

#[debug_handler]
async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,

    Json(LoginQuery { email, password }): Json<LoginQuery>,
) -> AppResult<Response> {
    let row: Option<(i64, String, String)> =
        sqlx::query_as("SELECT id,password,name FROM users WHERE email=?")
            .bind(&email)
            .fetch_optional(&db_pool)
            .await?;
    let wrong = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Email or password is wrong."})),
        )
            .into_response()
    };
    let Some((user_id, hash, name)) = row else {
        return Ok(wrong());
    };
    let Ok(parsed) = PasswordHash::new(&hash) else {
        return Ok(wrong());
    };
    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_err()
    {
        return Ok(wrong());
    }

    session.insert(USER_ID, user_id).await?;
    Ok(Json(json!({
        "success": "login success",
        "user": { "name": name, "email": email },
    }))
    .into_response())
}

#[debug_handler]
async fn logout(session: Session) -> AppResult<Response> {
    session.flush().await?;
    Ok(Json(json!({"success": "logged out"})).into_response())
}

#[debug_handler]
async fn get_user(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let Some(user_id) = session.get::<i64>(USER_ID).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    let Some(user) = db::get_user(&db_pool, user_id).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    Ok(Json(json!({ "username": user.name, "email": user.email })).into_response())
}

#[derive(Debug, Deserialize)]
struct FriendQuery {
    friend_id: i64,
}

#[debug_handler]
async fn add_friend(
    State(db_pool): State<SqlitePool>,
    session: Session,

    Json(FriendQuery { friend_id }): Json<FriendQuery>,
) -> AppResult<Response> {
    let Some(user_id) = session.get::<i64>(USER_ID).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    if db::get_user(&db_pool, friend_id).await?.is_none() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "no such user"})),
        )
            .into_response());
    }
    db::add_friend(&db_pool, user_id, friend_id).await?;
    Ok(Json(json!({"success": "friend added"})).into_response())
}
