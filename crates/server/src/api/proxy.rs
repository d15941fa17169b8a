use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use reqwest::header::ACCEPT_ENCODING;
use std::sync::Arc;
use tracing::{debug, error};

/// Forwards the request path and query to the upstream API and streams the
/// answer back with the upstream status.
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, StatusCode> {
    if method == Method::OPTIONS {
        return Ok(StatusCode::OK.into_response());
    }

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let url = format!("{}{}", state.upstream, path);
    debug!("{method} {url}");

    let mut request = state
        .client
        .request(method, &url)
        .header(ACCEPT_ENCODING, "gzip, deflate");
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        request = request.header(header::CONTENT_TYPE, content_type);
    }
    if !body.is_empty() {
        request = request.body(body);
    }

    let response = request.send().await.map_err(|err| {
        error!("Failed to reach upstream {url}: {err}");
        StatusCode::BAD_GATEWAY
    })?;

    let mut builder = Response::builder().status(response.status());
    if let Some(content_type) = response.headers().get(header::CONTENT_TYPE) {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|err| {
            error!("Failed to build response: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

#[tokio::test]
async fn options_is_answered_locally() {
    // Nothing listens upstream; a forwarded request would fail with 502.
    let state = Arc::new(AppState::new("http://127.0.0.1:1"));
    let response = proxy(
        State(state),
        Method::OPTIONS,
        Uri::from_static("/api/stops"),
        HeaderMap::new(),
        Bytes::new(),
    )
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let state = Arc::new(AppState::new("http://127.0.0.1:1"));
    let result = proxy(
        State(state),
        Method::GET,
        Uri::from_static("/api/stops"),
        HeaderMap::new(),
        Bytes::new(),
    )
    .await;
    assert_eq!(result.err(), Some(StatusCode::BAD_GATEWAY));
}
