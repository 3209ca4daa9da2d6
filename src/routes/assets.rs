//! Static assets compiled into the binary. The only thing under `assets/`
//! is the stylesheet `build.rs` produces, so misses are client typos, not
//! deployment problems.

use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "assets/"]
struct Assets;

// Same policy as /uploads: embedded content only changes on redeploy.
const CACHE_CONTROL: &str = "public, max-age=86400";

pub async fn serve(Path(path): Path<String>) -> Response {
    let key = path.trim_start_matches('/');
    match Assets::get(key) {
        Some(file) => {
            let mime = mime_guess::from_path(key).first_or_octet_stream();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
                ],
                file.data.to_vec(),
            )
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
