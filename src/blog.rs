//! The blog JSON API. Conventional CRUD; the interesting machinery lives
//! in `chat` and `call`.

use axum::{
    debug_handler,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use time::macros::format_description;
use tower_sessions::Session;

use crate::auth::USER_ID;
use crate::chat::engine::OWNER_USER;
use crate::{stamp, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/home/posts", get(all_posts))
        .route("/post", get(get_post).post(create_post).put(edit_post))
        .route("/post/comment", post(comment_post))
        .route("/contact", post(contact))
}

#[debug_handler]
async fn all_posts(State(db_pool): State<SqlitePool>) -> AppResult<Response> {
    let rows: Vec<(i64, String, String, String, i64, String)> = sqlx::query_as(
        "SELECT p.id,p.title,p.subtitle,p.date,p.views,u.name FROM blog_posts p \
         JOIN users u ON u.id=p.author_id WHERE p.hidden=0 ORDER BY p.id DESC",
    )
    .fetch_all(&db_pool)
    .await?;

    let posts: Vec<_> = rows
        .into_iter()
        .map(|(id, title, subtitle, date, views, author)| {
            json!({
                "id": id,
                "title": title,
                "subtitle": subtitle,
                "date": date,
                "views": views,
                "author": author,
            })
        })
        .collect();
    Ok(Json(json!({ "posts": posts })).into_response())
}

#[derive(Debug, Deserialize)]
struct PostQuery {
    id: i64,
}

#[debug_handler]
async fn get_post(
    State(db_pool): State<SqlitePool>,
    Query(PostQuery { id }): Query<PostQuery>,
) -> AppResult<Response> {
    let row: Option<(String, String, String, String, String, i64, bool)> = sqlx::query_as(
        "SELECT title,subtitle,date,body,img_url,views,hidden FROM blog_posts WHERE id=?",
    )
    .bind(id)
    .fetch_optional(&db_pool)
    .await?;
    let Some((title, subtitle, date, body, img_url, views, hidden)) = row else {
        return Ok((StatusCode::NOT_FOUND, Json(json!({"error": "id invalid"}))).into_response());
    };
    if hidden {
        return Ok((StatusCode::NOT_FOUND, Json(json!({"error": "id invalid"}))).into_response());
    }

    sqlx::query("UPDATE blog_posts SET views=views+1 WHERE id=?")
        .bind(id)
        .execute(&db_pool)
        .await?;

    let comment_rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT c.text,u.name FROM comments c JOIN users u ON u.id=c.author_id WHERE c.post_id=? \
         ORDER BY c.id",
    )
    .bind(id)
    .fetch_all(&db_pool)
    .await?;
    let comments: Vec<_> = comment_rows
        .into_iter()
        .map(|(text, author)| json!({ "text": text, "author": author }))
        .collect();

    Ok(Json(json!({
        "id": id,
        "title": title,
        "subtitle": subtitle,
        "date": date,
        "body": body,
        "img_url": img_url,
        "views": views + 1,
        "comments": comments,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
struct PostBody {
    id: Option<i64>,
    title: String,
    subtitle: String,
    img_url: String,
    body: String,
}

#[debug_handler]
async fn create_post(
    State(db_pool): State<SqlitePool>,
    session: Session,

    Json(post): Json<PostBody>,
) -> AppResult<Response> {
    // only the site owner writes posts
    let Some(user_id) = session.get::<i64>(USER_ID).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    if user_id != OWNER_USER {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    }

    let fmt = format_description!("[month repr:long] [day], [year]");
    let date = (time::OffsetDateTime::now_utc() + time::Duration::hours(7))
        .format(&fmt)
        .unwrap_or_default();
    let id = sqlx::query(
        "INSERT INTO blog_posts (author_id,title,subtitle,date,body,img_url) VALUES (?,?,?,?,?,?)",
    )
    .bind(user_id)
    .bind(&post.title)
    .bind(&post.subtitle)
    .bind(&date)
    .bind(&post.body)
    .bind(&post.img_url)
    .execute(&db_pool)
    .await?
    .last_insert_rowid();

    Ok(Json(json!({ "id": id })).into_response())
}

#[debug_handler]
async fn edit_post(
    State(db_pool): State<SqlitePool>,
    session: Session,

    Json(post): Json<PostBody>,
) -> AppResult<Response> {
    let Some(user_id) = session.get::<i64>(USER_ID).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    let Some(id) = post.id else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid request"})),
        )
            .into_response());
    };
    let author: Option<(i64,)> = sqlx::query_as("SELECT author_id FROM blog_posts WHERE id=?")
        .bind(id)
        .fetch_optional(&db_pool)
        .await?;
    if author.map(|(a,)| a) != Some(user_id) {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid request"})),
        )
            .into_response());
    }

    sqlx::query("UPDATE blog_posts SET title=?,subtitle=?,img_url=?,body=? WHERE id=?")
        .bind(&post.title)
        .bind(&post.subtitle)
        .bind(&post.img_url)
        .bind(&post.body)
        .bind(id)
        .execute(&db_pool)
        .await?;
    Ok(Json(json!({"success": "success"})).into_response())
}

#[derive(Debug, Deserialize)]
struct CommentQuery {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CommentBody {
    text: String,
}

#[debug_handler]
async fn comment_post(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Query(CommentQuery { id }): Query<CommentQuery>,

    Json(CommentBody { text }): Json<CommentBody>,
) -> AppResult<Response> {
    let Some(user_id) = session.get::<i64>(USER_ID).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    sqlx::query("INSERT INTO comments (author_id,post_id,text) VALUES (?,?,?)")
        .bind(user_id)
        .bind(id)
        .bind(&text)
        .execute(&db_pool)
        .await?;
    Ok(Json(json!({"success": "comment success"})).into_response())
}

#[derive(Debug, Deserialize)]
struct ContactBody {
    name: String,
    email: String,
    phone_number: Option<String>,
    message: String,
}

#[debug_handler]
async fn contact(
    State(db_pool): State<SqlitePool>,

    Json(body): Json<ContactBody>,
) -> AppResult<Response> {
    sqlx::query("INSERT INTO contacts (email,name,phone_number,message,time) VALUES (?,?,?,?,?)")
        .bind(&body.email)
        .bind(&body.name)
        .bind(&body.phone_number)
        .bind(&body.message)
        .bind(stamp::modified_stamp())
        .execute(&db_pool)
        .await?;
    Ok(Json(json!({"success": "Message sent successfully."})).into_response())
}
