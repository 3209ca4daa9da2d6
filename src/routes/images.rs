use askama::Template;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use rusqlite::params;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::gallery::{collections, comments, feed, likes};
use crate::routes::home::Html;
use crate::routes::parse_and_format_time;
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

// -- View structs --

pub struct ImageView {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub uploader: String,
    pub created_at: String,
    pub like_count: i64,
    pub liked_by_me: bool,
    pub tags: Vec<String>,
}

pub struct CommentRow {
    pub id: i64,
    pub author: String,
    pub content: String,
    pub created_at: String,
    pub indent_px: usize,
    pub can_edit: bool,
}

pub struct CollectionOption {
    pub id: i64,
    pub title: String,
}

// -- Templates --

#[derive(Template)]
#[template(path = "pages/image.html")]
pub struct ImagePageTemplate {
    pub image: ImageView,
    pub comments: Vec<CommentRow>,
    pub comment_count: usize,
    pub comment_error: String,
    pub username: String,
    pub logged_in: bool,
    pub collections: Vec<CollectionOption>,
}

#[derive(Template)]
#[template(path = "pages/create.html")]
pub struct CreateTemplate {
    pub username: String,
    pub known_tags: Vec<String>,
}

// -- Forms --

#[derive(Deserialize)]
pub struct AddCommentForm {
    pub content: String,
    pub reply_to_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct EditCommentForm {
    pub content: String,
}

// -- Router --

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/image/{id}", get(image_page))
        .route("/image/{id}/comments", post(add_comment))
        .route("/image/{id}/like", post(toggle_like))
        .route("/comments/{id}/edit", post(edit_comment))
        .route("/comments/{id}/delete", post(delete_comment))
        .route("/create", get(create_page).post(create_image))
        .route("/images/refresh-urls", post(refresh_urls))
        .route("/uploads/{file}", get(serve_upload))
}

// -- Handlers --

async fn image_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let user_id = user.as_ref().map(|u| u.id);
    let username = user.as_ref().map(|u| u.email.clone()).unwrap_or_default();

    let (detail, forest, collection_list) = {
        let conn = state.db.get()?;
        let detail = feed::get_image_detail(&conn, id)?.ok_or(AppError::NotFound)?;
        let forest = comments::fetch_comment_tree(&conn, id);
        let collection_list = match user_id {
            Some(uid) => collections::list_collections(&conn, uid)?,
            None => Vec::new(),
        };
        (detail, forest, collection_list)
    };

    // Stale public ids happen when the channel attachment URL rotated;
    // re-resolve on the fly when the chat backend is available.
    let mut image_url = detail.image_url.clone();
    if let (Some(discord), Some(public_id)) = (&state.discord, &detail.public_id) {
        match discord.attachment_url(public_id).await {
            Ok(url) => image_url = url,
            Err(e) => tracing::warn!("Could not refresh attachment URL for image {}: {}", id, e),
        }
    }

    let comment_rows = forest
        .walk()
        .into_iter()
        .map(|(depth, node)| CommentRow {
            id: node.comment.id,
            author: node
                .comment
                .author_name
                .clone()
                .unwrap_or_else(|| node.comment.author_email.clone()),
            content: node.comment.content.clone(),
            created_at: parse_and_format_time(&node.comment.created_at),
            indent_px: depth * 24,
            can_edit: user_id == Some(node.comment.user_id),
        })
        .collect::<Vec<_>>();

    let template = ImagePageTemplate {
        image: ImageView {
            id: detail.id,
            title: detail.title,
            description: detail.description.unwrap_or_default(),
            image_url,
            uploader: detail.uploader_name.unwrap_or(detail.uploader_email),
            created_at: parse_and_format_time(&detail.created_at),
            like_count: detail.like_count,
            liked_by_me: user_id.is_some_and(|uid| detail.liked_by.iter().any(|l| l.id == uid)),
            tags: detail.tags.into_iter().map(|t| t.name).collect(),
        },
        comment_count: comment_rows.len(),
        comments: comment_rows,
        comment_error: forest
            .fetch_error
            .map(|_| "Comments are temporarily unavailable".to_string())
            .unwrap_or_default(),
        username,
        logged_in: user_id.is_some(),
        collections: collection_list
            .into_iter()
            .map(|c| CollectionOption {
                id: c.id,
                title: c.title,
            })
            .collect(),
    };

    Ok(Html(template).into_response())
}

async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(image_id): Path<i64>,
    Form(form): Form<AddCommentForm>,
) -> AppResult<Response> {
    {
        let conn = state.db.get()?;
        comments::add_comment(&conn, image_id, &form.content, form.reply_to_id, user.id)?;
    }
    Ok(Redirect::to(&format!("/image/{}", image_id)).into_response())
}

async fn edit_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(comment_id): Path<i64>,
    Form(form): Form<EditCommentForm>,
) -> AppResult<Response> {
    let image_id = {
        let conn = state.db.get()?;
        let image_id: i64 = conn
            .query_row(
                "SELECT image_id FROM comments WHERE id = ?1",
                params![comment_id],
                |r| r.get(0),
            )
            .map_err(|_| AppError::NotFound)?;
        comments::edit_comment(&conn, comment_id, &form.content, user.id)?;
        image_id
    };
    Ok(Redirect::to(&format!("/image/{}", image_id)).into_response())
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(comment_id): Path<i64>,
) -> AppResult<Response> {
    let image_id = {
        let mut conn = state.db.get()?;
        let image_id: i64 = conn
            .query_row(
                "SELECT image_id FROM comments WHERE id = ?1",
                params![comment_id],
                |r| r.get(0),
            )
            .map_err(|_| AppError::NotFound)?;
        let removed = comments::delete_comment_subtree(&mut conn, comment_id, user.id)?;
        tracing::info!(
            "User {} deleted comment {} ({} comments removed)",
            user.id,
            comment_id,
            removed
        );
        image_id
    };
    Ok(Redirect::to(&format!("/image/{}", image_id)).into_response())
}

/// Toggle a like. Responds with the outcome as plain text ("liked" or
/// "disliked"); unauthenticated calls get 401 "Unauthorized" and change
/// nothing.
async fn toggle_like(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(image_id): Path<i64>,
) -> AppResult<Response> {
    let Some(user) = user else {
        return Ok((StatusCode::UNAUTHORIZED, "Unauthorized").into_response());
    };

    let outcome = {
        let conn = state.db.get()?;
        likes::toggle_like(&conn, image_id, user.id)?
    };

    Ok((StatusCode::OK, outcome.as_str()).into_response())
}

async fn create_page(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let known_tags = {
        let conn = state.db.get()?;
        feed::get_all_tags(&conn)?
            .into_iter()
            .map(|t| t.name)
            .collect()
    };
    Ok(Html(CreateTemplate {
        username: user.email,
        known_tags,
    })
    .into_response())
}

async fn create_image(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut title = String::new();
    let mut description = String::new();
    let mut tags = String::new();
    let mut filename = String::new();
    let mut bytes: Vec<u8> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        match field.name() {
            Some("title") => {
                title = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?
            }
            Some("description") => {
                description = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?
            }
            Some("tags") => {
                tags = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?
            }
            Some("file") => {
                filename = field.file_name().unwrap_or("upload").to_string();
                bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?
                    .to_vec();
            }
            _ => {}
        }
    }

    let title = title.trim().to_string();
    if title.is_empty() || title.len() > 255 {
        return Err(AppError::BadRequest("Title is required".into()));
    }
    if bytes.is_empty() {
        return Err(AppError::BadRequest("An image file is required".into()));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::BadRequest("Image is too large".into()));
    }

    // Always keep a local copy; the chat backend is best-effort.
    let stored_name = stored_filename(&filename);
    let local_path = state.config.uploads_path().join(&stored_name);
    tokio::fs::write(&local_path, &bytes)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

    let mut image_url = format!("/uploads/{}", stored_name);
    let mut public_id: Option<String> = None;

    if let Some(discord) = &state.discord {
        match discord.upload(&stored_name, bytes).await {
            Ok(stored) => {
                image_url = stored.url;
                public_id = Some(stored.message_id);
            }
            Err(e) => tracing::warn!("Channel upload failed, keeping local copy: {}", e),
        }
    }

    let image_id = {
        let conn = state.db.get()?;
        conn.execute(
            "INSERT INTO images (title, description, image_url, public_id, uploaded_by_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                title,
                if description.trim().is_empty() {
                    None
                } else {
                    Some(description.trim())
                },
                image_url,
                public_id,
                user.id
            ],
        )?;
        let image_id = conn.last_insert_rowid();

        for tag in tags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            feed::tag_image(&conn, image_id, tag)?;
        }
        image_id
    };

    Ok(Redirect::to(&format!("/image/{}", image_id)).into_response())
}

/// Re-resolve every channel-stored image URL and persist the ones that
/// changed. Returns a short text summary.
async fn refresh_urls(State(state): State<AppState>, _user: CurrentUser) -> AppResult<Response> {
    let Some(discord) = state.discord.clone() else {
        return Err(AppError::BadRequest(
            "No chat storage backend configured".into(),
        ));
    };

    let targets: Vec<(i64, String, String)> = {
        let conn = state.db.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, public_id, image_url FROM images WHERE public_id IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut refreshed = 0usize;
    for (id, public_id, old_url) in targets {
        match discord.attachment_url(&public_id).await {
            Ok(url) if url != old_url => {
                let conn = state.db.get()?;
                conn.execute(
                    "UPDATE images SET image_url = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![url, id],
                )?;
                refreshed += 1;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Could not refresh URL for image {}: {}", id, e),
        }
    }

    Ok((StatusCode::OK, format!("Refreshed {} image URLs", refreshed)).into_response())
}

async fn serve_upload(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> AppResult<Response> {
    // Uploads are flat uuid-named files; anything path-like is hostile.
    if file.contains("..") || file.contains('/') || file.contains('\\') {
        return Err(AppError::BadRequest("Invalid file name".into()));
    }

    let path = state.config.uploads_path().join(&file);
    match tokio::fs::read(&path).await {
        Ok(data) => {
            let mime = mime_guess::from_path(&file).first_or_octet_stream();
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                data,
            )
                .into_response())
        }
        Err(_) => Err(AppError::NotFound),
    }
}

fn stored_filename(original: &str) -> String {
    let ext = std::path::Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin");
    format!("{}.{}", uuid::Uuid::now_v7(), ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_filename_keeps_safe_extension() {
        let name = stored_filename("photo.PNG");
        assert!(name.ends_with(".PNG"));
        assert_eq!(name.matches('.').count(), 1);
    }

    #[test]
    fn stored_filename_rejects_odd_extensions() {
        assert!(stored_filename("weird.name/with.sla?sh").ends_with(".bin"));
        assert!(stored_filename("noext").ends_with(".bin"));
    }

    #[test]
    fn stored_filename_is_unique_per_call() {
        assert_ne!(stored_filename("a.png"), stored_filename("a.png"));
    }
}
