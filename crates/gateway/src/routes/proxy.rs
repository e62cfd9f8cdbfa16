//! HTTP reverse proxy to the editor.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Uri, header, request::Parts},
    response::Response,
};
use url::Url;

use padgate_core::SessionIdentity;

use crate::error::AppError;
use crate::state::AppState;

/// Largest request body forwarded upstream.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Header carrying the authenticated username to the editor.
pub const FORWARDED_USER: HeaderName = HeaderName::from_static("x-forwarded-user");

/// Connection-scoped headers that must not be forwarded.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::PROXY_AUTHENTICATE
        || name == header::PROXY_AUTHORIZATION
        || name == header::TE
        || name == header::TRAILER
        || name == header::TRANSFER_ENCODING
        || name == header::UPGRADE
        || name.as_str() == "keep-alive"
}

/// Map a request URI onto the upstream base URL, keeping any base path.
#[must_use]
pub fn upstream_url(base: &Url, uri: &Uri) -> Url {
    let mut url = base.clone();
    let prefix = base.path().trim_end_matches('/');
    url.set_path(&format!("{prefix}{}", uri.path()));
    url.set_query(uri.query());
    url
}

/// Headers to send upstream.
///
/// Credentials never leave the gateway; the username travels in
/// `X-Forwarded-User` instead, and a client-supplied value is dropped.
#[must_use]
pub fn request_headers(headers: &HeaderMap, identity: Option<&SessionIdentity>) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name)
            || name == header::HOST
            || name == header::AUTHORIZATION
            || name == header::CONTENT_LENGTH
            || name == FORWARDED_USER
        {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }

    if let Some(identity) = identity
        && let Ok(value) = HeaderValue::from_str(identity.username.as_str())
    {
        forwarded.insert(FORWARDED_USER, value);
    }
    forwarded
}

/// Buffer a request body up to [`MAX_BODY_BYTES`].
///
/// # Errors
///
/// Returns `AppError::PayloadTooLarge` if the declared length exceeds the
/// limit, or `AppError::BadRequest` if the body cannot be read within it.
pub async fn read_body(headers: &HeaderMap, body: Body) -> Result<Bytes, AppError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > MAX_BODY_BYTES) {
        return Err(AppError::PayloadTooLarge {
            limit: MAX_BODY_BYTES,
        });
    }

    axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::BadRequest(format!("failed to read request body: {e}")))
}

/// Send a request to the editor and stream its response back.
///
/// # Errors
///
/// Returns `AppError::Upstream` if the editor cannot be reached.
pub async fn send_upstream(
    state: &AppState,
    parts: &Parts,
    body: Bytes,
) -> Result<Response, AppError> {
    let identity = parts.extensions.get::<SessionIdentity>();
    let url = upstream_url(&state.config().upstream_url, &parts.uri);

    let upstream = state
        .upstream()
        .request(parts.method.clone(), url)
        .headers(request_headers(&parts.headers, identity))
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let mut headers = HeaderMap::with_capacity(upstream.headers().len());
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Fallback handler: forward everything the gateway doesn't handle itself.
///
/// # Errors
///
/// Returns `AppError` if the body is too large or the editor is unreachable.
pub async fn forward(State(state): State<AppState>, request: Request) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let body = read_body(&parts.headers, body).await?;
    send_upstream(&state, &parts, body).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use padgate_core::Username;

    use super::*;

    #[test]
    fn test_upstream_url_keeps_path_and_query() {
        let base = Url::parse("http://127.0.0.1:9001").unwrap();
        let uri: Uri = "/p/welcome?lang=en".parse().unwrap();
        assert_eq!(
            upstream_url(&base, &uri).as_str(),
            "http://127.0.0.1:9001/p/welcome?lang=en"
        );
    }

    #[test]
    fn test_upstream_url_with_base_path() {
        let base = Url::parse("http://editor.internal/pads/").unwrap();
        let uri: Uri = "/socket.io/?EIO=4&transport=polling".parse().unwrap();
        assert_eq!(
            upstream_url(&base, &uri).as_str(),
            "http://editor.internal/pads/socket.io/?EIO=4&transport=polling"
        );
    }

    #[test]
    fn test_request_headers_strip_credentials_and_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::HOST, HeaderValue::from_static("pads.corp.test"));
        headers.insert(header::COOKIE, HeaderValue::from_static("express_sid=1"));
        headers.insert(FORWARDED_USER, HeaderValue::from_static("mallory"));

        let forwarded = request_headers(&headers, None);
        assert!(forwarded.get(header::AUTHORIZATION).is_none());
        assert!(forwarded.get(header::CONNECTION).is_none());
        assert!(forwarded.get("keep-alive").is_none());
        assert!(forwarded.get(header::HOST).is_none());
        assert!(forwarded.get(FORWARDED_USER).is_none());
        assert_eq!(forwarded.get(header::COOKIE).unwrap(), "express_sid=1");
    }

    #[test]
    fn test_request_headers_forward_identity() {
        let identity = SessionIdentity::new(Username::parse("alice").unwrap());
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_USER, HeaderValue::from_static("mallory"));

        let forwarded = request_headers(&headers, Some(&identity));
        assert_eq!(forwarded.get(FORWARDED_USER).unwrap(), "alice");
    }

    #[tokio::test]
    async fn test_read_body_rejects_declared_oversize() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from_str(&(MAX_BODY_BYTES + 1).to_string()).unwrap(),
        );
        let err = read_body(&headers, Body::empty()).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge { .. }));
    }
}
