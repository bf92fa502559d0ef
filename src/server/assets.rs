//! Embedded static assets (stylesheet and progress script).

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;

/// Embedded web assets from the `web/` directory.
#[derive(RustEmbed)]
#[folder = "web/"]
pub struct WebAssets;

/// Fallback handler: serve an embedded file by path, or 404.
pub async fn serve_embedded(req: Request<Body>) -> Response {
    let path = req.uri().path().trim_start_matches('/');

    match WebAssets::get(path) {
        Some(content) => {
            let mime_type = mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime_type)],
                content.data.into_owned(),
            )
                .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain".to_string())],
            "Not Found",
        )
            .into_response(),
    }
}
