use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};

use agora_types::api::{Claims, SESSION_COOKIE};

use crate::auth::AppState;

/// The caller's session, inserted into request extensions by
/// [`load_session`]. Anonymous callers get `Session(None)`.
#[derive(Debug, Clone, Default)]
pub struct Session(pub Option<Claims>);

impl Session {
    pub fn user(&self) -> Option<&Claims> {
        self.0.as_ref()
    }

    pub fn username(&self) -> Option<&str> {
        self.user().map(|c| c.username.as_str())
    }
}

/// Extract and validate the session token from the session cookie, falling
/// back to an `Authorization: Bearer` header. Never rejects: write handlers
/// decide what an anonymous caller gets.
pub async fn load_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let token = CookieJar::from_headers(req.headers())
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .or(bearer);

    let claims = token.and_then(|t| decode_token(&state.jwt_secret, &t).ok());

    req.extensions_mut().insert(Session(claims));
    next.run(req).await
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
