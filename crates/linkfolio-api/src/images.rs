use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// One year; stored images never change under the same name.
pub const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000";

/// GET /api/accounts/image/{image_value}: stream a stored image, honouring
/// `If-None-Match` against the mtime-based `ETag`.
pub async fn serve_image(
    State(state): State<AppState>,
    Path(image_value): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let image = state
        .images
        .stat(&image_value)
        .await
        .map_err(ApiError::backend("Error retrieving image"))?
        .ok_or_else(not_found)?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::ETAG,
        HeaderValue::from_str(&image.etag).map_err(ApiError::backend("Error retrieving image"))?,
    );
    response_headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(IMAGE_CACHE_CONTROL),
    );

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());
    if if_none_match == Some(image.etag.as_str()) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    let file = tokio::fs::File::open(&image.path).await.map_err(|e| {
        warn!("Image {} vanished before it could be opened: {}", image_value, e);
        not_found()
    })?;

    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(image.content_type),
    );
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(image.len));

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((StatusCode::OK, response_headers, body).into_response())
}

fn not_found() -> ApiError {
    ApiError::NotFound("Image not found".to_string())
}
