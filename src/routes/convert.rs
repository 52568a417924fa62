//! Conversion endpoints
//!
//! - `POST /convert` - raster and HEIF conversion
//! - `POST /convert-document` - office document conversion
//!
//! Both take a multipart form with a `file` part and a `convert_to` field and
//! answer with the converted file, or a JSON error.

use std::net::SocketAddr;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        ConnectInfo, DefaultBodyLimit, Multipart, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};

use crate::config::Config;
use crate::convert::{ConversionPipeline, ConversionRequest, Converted};
use crate::error::{ConvertError, ConvertResult};
use crate::formats::ConversionDomain;
use crate::state::AppState;

/// Room for multipart boundaries and the `convert_to` field
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Key used when the peer address is unavailable
const UNKNOWN_CLIENT: &str = "unknown";

/// Create the conversion router
pub fn router(config: &Config) -> Router<AppState> {
    Router::new()
        .route(
            "/convert",
            post(convert_image).layer(DefaultBodyLimit::max(body_limit(config.image.max_bytes))),
        )
        .route(
            "/convert-document",
            post(convert_document)
                .layer(DefaultBodyLimit::max(body_limit(config.document.max_bytes))),
        )
}

fn body_limit(max_bytes: u64) -> usize {
    usize::try_from(max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD)
}

/// Rate-limit key for a request
pub(crate) fn client_key(connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

async fn convert_image(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    let pipeline = state.pipeline(ConversionDomain::Image);
    handle(pipeline, &client_key(connect_info), &headers, multipart).await
}

async fn convert_document(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    let pipeline = state.pipeline(ConversionDomain::Document);
    handle(pipeline, &client_key(connect_info), &headers, multipart).await
}

async fn handle(
    pipeline: &ConversionPipeline,
    client: &str,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    tracing::debug!(domain = pipeline.domain().as_str(), client, "Conversion request received");

    let request = match read_request(multipart, pipeline.admission().max_payload(), headers).await {
        Ok(request) => request,
        // Failed before admission: still charged against the client's quota
        Err(e) => return Err(pipeline.admission().reject(client, e)),
    };

    let converted = pipeline.run(client, request).await?;
    respond(pipeline, converted).await
}

// ============================================================================
// Request parsing
// ============================================================================

async fn read_request(
    multipart: Result<Multipart, MultipartRejection>,
    max_payload: u64,
    headers: &HeaderMap,
) -> ConvertResult<ConversionRequest> {
    let mut multipart =
        multipart.map_err(|e| ConvertError::MalformedRequest(e.body_text()))?;

    let mut file = None;
    let mut target = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_payload, headers))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, max_payload, headers))?;

                tracing::debug!(filename = %filename, size = data.len(), "Received file part");
                file = Some((filename, data));
            }
            "convert_to" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, max_payload, headers))?;
                target = Some(value);
            }
            _ => tracing::debug!(field = %name, "Ignoring unknown form field"),
        }
    }

    let (filename, data) =
        file.ok_or_else(|| ConvertError::MalformedRequest("No file part".to_string()))?;
    if filename.is_empty() {
        return Err(ConvertError::MalformedRequest("No selected file".to_string()));
    }

    Ok(ConversionRequest::new(data, filename, target.unwrap_or_default()))
}

fn multipart_error(e: MultipartError, max_payload: u64, headers: &HeaderMap) -> ConvertError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let size = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(max_payload + 1);
        return ConvertError::PayloadTooLarge {
            size,
            max: max_payload,
        };
    }

    tracing::warn!(error = %e, "Failed to read multipart body");
    ConvertError::MalformedRequest(e.body_text())
}

// ============================================================================
// Response
// ============================================================================

async fn respond(pipeline: &ConversionPipeline, converted: Converted) -> Result<Response, ConvertError> {
    let Converted { artifact, format } = converted;

    let body = pipeline.store().read(&artifact).await.map_err(|e| {
        ConvertError::internal(format!("Failed to read {}: {}", artifact.file_name(), e))
    })?;

    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(artifact.file_name())
    );
    let disposition = HeaderValue::from_str(&disposition).map_err(ConvertError::internal)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(format.mime_type())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::routes;

    const BOUNDARY: &str = "reformat-test-boundary";

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 128]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn multipart_body(file: Option<(&str, &[u8])>, convert_to: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(target) = convert_to {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"convert_to\"\r\n\r\n{target}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((filename, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn form(filename: &str, data: &[u8], convert_to: &str) -> Vec<u8> {
        multipart_body(Some((filename, data)), Some(convert_to))
    }

    fn post(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn app_with(dir: &TempDir, configure: impl FnOnce(&mut Config)) -> (AppState, Router) {
        let mut config = Config::default();
        config.storage.image_dir = dir.path().join("images");
        config.storage.document_dir = dir.path().join("documents");
        configure(&mut config);

        let state = AppState::new(config).await.unwrap();
        (state.clone(), routes::app(state))
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn artifact_count(dir: &TempDir, sub: &str) -> usize {
        std::fs::read_dir(dir.path().join(sub)).unwrap().count()
    }

    #[tokio::test]
    async fn test_convert_png_to_jpeg() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app_with(&dir, |_| {}).await;

        let response = app
            .oneshot(post("/convert", form("cat.png", &png(9, 5), "jpg")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.starts_with("attachment; filename*=UTF-8''cat_"));
        assert!(disposition.ends_with(".jpeg"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (9, 5));
        assert_eq!(artifact_count(&dir, "images"), 1);
    }

    #[tokio::test]
    async fn test_invalid_format_is_400_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app_with(&dir, |_| {}).await;

        let response = app
            .oneshot(post("/convert", form("cat.png", &png(2, 2), "XYZ")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], "INVALID_FORMAT");
        assert_eq!(artifact_count(&dir, "images"), 0);
    }

    #[tokio::test]
    async fn test_document_token_on_image_endpoint_is_invalid() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app_with(&dir, |_| {}).await;

        let response = app
            .oneshot(post("/convert", form("cat.png", &png(2, 2), "PDF")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_file_part() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app_with(&dir, |_| {}).await;

        let response = app
            .oneshot(post("/convert", multipart_body(None, Some("PNG"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "MALFORMED_REQUEST");
    }

    #[tokio::test]
    async fn test_not_multipart() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app_with(&dir, |_| {}).await;

        let request = Request::builder()
            .method("POST")
            .uri("/convert")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_payload_size_boundary() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app_with(&dir, |c| c.image.max_bytes = 64).await;

        // Passes admission at exactly the limit, then fails to decode
        let at_limit = vec![0u8; 64];
        let response = app
            .clone()
            .oneshot(post("/convert", form("x.png", &at_limit, "PNG")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["code"], "UNREADABLE");

        let over = vec![0u8; 65];
        let response = app
            .oneshot(post("/convert", form("x.png", &over, "PNG")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_body_beyond_transport_limit_is_413() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app_with(&dir, |c| c.image.max_bytes = 16).await;

        let huge = vec![7u8; MULTIPART_OVERHEAD + 1024];
        let response = app
            .oneshot(post("/convert", form("x.png", &huge, "PNG")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_image_rate_limit() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app_with(&dir, |c| c.image.rate_limit = 2).await;

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post("/convert", form("a.png", &png(2, 2), "GIF")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(post("/convert", form("a.png", &png(2, 2), "GIF")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_document_endpoint() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app_with(&dir, |_| {}).await;
        let docx = crate::codecs::document::fixtures::docx(&["Hello", "World"]);

        let response = app
            .oneshot(post(
                "/convert-document",
                form("letter.docx", &docx, "txt"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Hello\nWorld\n");
        assert_eq!(artifact_count(&dir, "documents"), 1);
    }

    #[tokio::test]
    async fn test_unsupported_document_route_is_500() {
        let dir = TempDir::new().unwrap();
        let (_, app) = app_with(&dir, |_| {}).await;

        let response = app
            .oneshot(post(
                "/convert-document",
                form("notes.rtf", br"{\rtf1 hi}", "PDF"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["code"], "UNSUPPORTED_ROUTE");
        assert_eq!(artifact_count(&dir, "documents"), 0);
    }
}
