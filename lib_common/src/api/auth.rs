use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose, Engine as _};
use tracing::warn;

/// The single user/password pair accepted by [`require_basic_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    user: String,
    password: String,
}

impl BasicCredentials {
    /// Accept exactly `user` / `password`.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Whether an `Authorization` header value carries these credentials.
    pub fn accepts(&self, header: &HeaderValue) -> bool {
        header
            .to_str()
            .ok()
            .and_then(decode_basic)
            .is_some_and(|(user, password)| user == self.user && password == self.password)
    }
}

/// Splits `Basic <base64(user:password)>` into its parts.
fn decode_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, password) = text.split_once(':')?;
    Some((user.to_owned(), password.to_owned()))
}

/// Rejects requests without matching HTTP Basic credentials with `401`.
pub async fn require_basic_auth(
    State(credentials): State<Arc<BasicCredentials>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .is_some_and(|value| credentials.accepts(value));

    if !authorized {
        warn!(path = %request.uri().path(), "rejected request without valid credentials");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"records\"")],
            "Unauthorized",
        )
            .into_response();
    }
    next.run(request).await
}
