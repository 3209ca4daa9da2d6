use askama::Template;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::gallery::collections;
use crate::routes::home::Html;
use crate::state::AppState;

// -- View structs --

pub struct CollectionCard {
    pub id: i64,
    pub title: String,
    pub item_count: i64,
}

pub struct CollectionImageCard {
    pub id: i64,
    pub title: String,
    pub display_url: String,
}

// -- Templates --

#[derive(Template)]
#[template(path = "pages/collections.html")]
pub struct CollectionsTemplate {
    pub collections: Vec<CollectionCard>,
    pub username: String,
}

#[derive(Template)]
#[template(path = "pages/collection.html")]
pub struct CollectionTemplate {
    pub id: i64,
    pub title: String,
    pub images: Vec<CollectionImageCard>,
    pub username: String,
}

// -- Forms --

#[derive(Deserialize)]
pub struct CreateCollectionForm {
    pub title: String,
}

#[derive(Deserialize)]
pub struct MembershipForm {
    pub image_id: i64,
}

// -- Router --

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/collections", get(collections_page).post(create_collection))
        .route("/collections/{id}", get(collection_page))
        .route("/collections/{id}/delete", post(delete_collection))
        .route("/collections/{id}/add", post(add_image))
        .route("/collections/{id}/remove", post(remove_image))
}

// -- Handlers --

async fn collections_page(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Response> {
    let list = {
        let conn = state.db.get()?;
        collections::list_collections(&conn, user.id)?
    };

    Ok(Html(CollectionsTemplate {
        collections: list
            .into_iter()
            .map(|c| CollectionCard {
                id: c.id,
                title: c.title,
                item_count: c.item_count,
            })
            .collect(),
        username: user.email,
    })
    .into_response())
}

async fn create_collection(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<CreateCollectionForm>,
) -> AppResult<Response> {
    {
        let conn = state.db.get()?;
        collections::create_collection(&conn, &form.title, user.id)?;
    }
    Ok(Redirect::to("/collections").into_response())
}

async fn collection_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let detail = {
        let conn = state.db.get()?;
        collections::get_collection_with_images(&conn, id, user.id)?
    };

    Ok(Html(CollectionTemplate {
        id: detail.id,
        title: detail.title,
        images: detail
            .images
            .into_iter()
            .map(|i| CollectionImageCard {
                id: i.id,
                display_url: i.thumbnail_url.unwrap_or_else(|| i.image_url.clone()),
                title: i.title,
            })
            .collect(),
        username: user.email,
    })
    .into_response())
}

async fn delete_collection(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    {
        let conn = state.db.get()?;
        collections::delete_collection(&conn, id, user.id)?;
    }
    Ok(Redirect::to("/collections").into_response())
}

async fn add_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<MembershipForm>,
) -> AppResult<Response> {
    {
        let conn = state.db.get()?;
        collections::add_image_to_collection(&conn, id, form.image_id, user.id)?;
    }
    Ok(Redirect::to(&format!("/image/{}", form.image_id)).into_response())
}

async fn remove_image(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<MembershipForm>,
) -> AppResult<Response> {
    {
        let conn = state.db.get()?;
        collections::remove_image_from_collection(&conn, id, form.image_id, user.id)?;
    }
    Ok(Redirect::to(&format!("/collections/{}", id)).into_response())
}
