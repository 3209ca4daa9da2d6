use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::gallery::feed;
use crate::routes::parse_and_format_time;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 10;

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

// -- View structs --

pub struct ImageCard {
    pub id: i64,
    pub title: String,
    pub display_url: String,
    pub uploader: String,
    pub created_at: String,
    pub like_count: i64,
    pub liked_by_me: bool,
    pub tags: Vec<String>,
}

#[derive(Template)]
#[template(path = "pages/feed.html")]
pub struct FeedTemplate {
    pub cards: Vec<ImageCard>,
    pub username: String,
    pub query: String,
    pub page: u32,
    pub total_pages: i64,
    pub total_records: i64,
    pub has_prev: bool,
    pub has_next: bool,
    pub prev_page: u32,
    pub next_page: u32,
    pub error: String,
}

#[derive(Deserialize)]
pub struct FeedQuery {
    pub page: Option<u32>,
    pub q: Option<String>,
}

// -- Handlers --

pub async fn index(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(params): Query<FeedQuery>,
) -> AppResult<Response> {
    let page = params.page.unwrap_or(1).max(1);
    let query = params.q.unwrap_or_default();
    let user_id = user.as_ref().map(|u| u.id);
    let username = user.as_ref().map(|u| u.email.clone()).unwrap_or_default();

    let feed = {
        let conn = state.db.get()?;
        feed::fetch_image_feed(
            &conn,
            page,
            DEFAULT_PAGE_SIZE,
            if query.trim().is_empty() {
                None
            } else {
                Some(query.as_str())
            },
        )
    };

    let cards = feed
        .images
        .iter()
        .map(|img| ImageCard {
            id: img.id,
            title: img.title.clone(),
            display_url: img
                .thumbnail_url
                .clone()
                .unwrap_or_else(|| img.image_url.clone()),
            uploader: img
                .uploader_name
                .clone()
                .unwrap_or_else(|| img.uploader_email.clone()),
            created_at: parse_and_format_time(&img.created_at),
            like_count: img.like_count,
            liked_by_me: user_id.is_some_and(|uid| img.liked_by.contains(&uid)),
            tags: img.tags.clone(),
        })
        .collect();

    let template = FeedTemplate {
        cards,
        username,
        query,
        page: feed.page,
        total_pages: feed.total_pages,
        total_records: feed.total_records,
        has_prev: feed.page > 1,
        has_next: feed.has_more,
        prev_page: feed.page.saturating_sub(1).max(1),
        next_page: feed.page + 1,
        error: feed.error.unwrap_or_default(),
    };

    Ok(Html(template).into_response())
}
