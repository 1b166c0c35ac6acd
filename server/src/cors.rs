//! Cross-origin handling for the browser frontend.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";

/// Origins allowed to call the API. `*` allows any origin.
#[derive(Debug, Clone)]
pub struct AllowedOrigins(Arc<Vec<String>>);

impl AllowedOrigins {
    pub fn new(origins: Vec<String>) -> Self {
        Self(Arc::new(origins))
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.0.iter().any(|allowed| allowed == "*") || self.lists(origin)
    }

    /// Whether `origin` is named in the list, not just matched by `*`.
    /// Only listed origins may send credentials.
    pub fn lists(&self, origin: &str) -> bool {
        self.0
            .iter()
            .any(|allowed| allowed.trim_end_matches('/') == origin)
    }
}

/// Answers preflight requests and tags responses for allowed origins.
pub async fn cors(State(origins): State<AllowedOrigins>, request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|o| origins.allows(o))
        .and_then(|o| {
            let credentials = origins.lists(o);
            HeaderValue::from_str(o).ok().map(|v| (v, credentials))
        });

    let is_preflight = request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

    if is_preflight {
        let requested_headers = request
            .headers()
            .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
            .cloned();

        let mut response = StatusCode::NO_CONTENT.into_response();
        if let Some((origin, credentials)) = origin {
            let headers = response.headers_mut();
            allow_origin(headers, origin, credentials);
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                requested_headers.unwrap_or_else(|| HeaderValue::from_static("*")),
            );
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
        }
        return response;
    }

    let mut response = next.run(request).await;
    if let Some((origin, credentials)) = origin {
        allow_origin(response.headers_mut(), origin, credentials);
    }
    response
}

fn allow_origin(headers: &mut HeaderMap, origin: HeaderValue, credentials: bool) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    if credentials {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
}
