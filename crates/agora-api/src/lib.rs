pub mod auth;
pub mod convert;
pub mod error;
pub mod extract;
pub mod forum;
pub mod media;
pub mod middleware;
pub mod templates;
pub mod urls;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    middleware::from_fn_with_state,
    response::Response,
    routing::{get, post},
};
use tower_http::services::ServeDir;

use crate::auth::AppState;

/// Room for the text fields and multipart framing around an image.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// All pages, mounted under the configured language prefix, plus
/// `/media` for uploaded images.
pub fn router(state: AppState) -> Router {
    let pages = Router::new()
        .route("/forum/", get(forum::index))
        .route("/forum/{topic_name}/", get(forum::forum).post(forum::forum_post))
        .route("/accounts/login/", get(auth::login_page).post(auth::login))
        .route("/accounts/signup/", get(auth::signup_page).post(auth::signup))
        .route("/accounts/logout/", post(auth::logout));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest(&format!("/{}", state.language), pages)
        .nest_service("/media", ServeDir::new(state.media.root()))
        .layer(DefaultBodyLimit::max(
            state.max_upload_bytes + FORM_OVERHEAD_BYTES,
        ))
        .layer(from_fn_with_state(state.clone(), middleware::load_session))
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> Response {
    urls::found(&urls::forum_index(&state.language))
}

async fn health() -> &'static str {
    "ok"
}
