use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{
    Extension, Form,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use agora_db::Database;
use agora_types::api::{Claims, SESSION_COOKIE};
use agora_types::forms::{LoginForm, NewAccount, SignupForm};

use crate::convert;
use crate::error::{ApiError, run_blocking};
use crate::media::MediaStore;
use crate::middleware::Session;
use crate::templates::{FieldMessage, Layout, LoginPage, SignupPage, Templates};
use crate::urls::{self, found};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub media: MediaStore,
    pub templates: Templates,
    /// URL language prefix, e.g. `ja` for `/ja/forum/`.
    pub language: String,
    pub max_upload_bytes: usize,
}

const SESSION_DAYS: i64 = 30;
const BAD_CREDENTIALS: &str = "Please enter a correct username and password.";

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

pub async fn login_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, ApiError> {
    state.templates.render(&LoginPage {
        layout: Layout::new(&state.language, session.username()),
        error: String::new(),
        username: String::new(),
        next: query.next.unwrap_or_default(),
    })
}

pub async fn login(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    let retry = |error: &str| {
        state.templates.render(&LoginPage {
            layout: Layout::new(&state.language, session.username()),
            error: error.to_string(),
            username: form.username.clone().unwrap_or_default(),
            next: form.next.clone().unwrap_or_default(),
        })
    };

    let credentials = match form.validate() {
        Ok(c) => c,
        Err(errors) => {
            let message = errors.iter().next().map(|(field, e)| format!("{field}: {}", e[0]));
            return retry(message.as_deref().unwrap_or(BAD_CREDENTIALS));
        }
    };

    let db = state.clone();
    let user = run_blocking(move || {
        let Some(user) = db.db.get_user_by_username(&credentials.username)? else {
            return Ok(None);
        };
        if !verify_password(&credentials.password, &user.password) {
            return Ok(None);
        }
        Ok(Some(convert::user(user)))
    })
    .await?;

    let Some(user) = user else {
        warn!("Failed login attempt");
        return retry(BAD_CREDENTIALS);
    };

    let token = create_token(&state.jwt_secret, user.id, &user.username)?;
    info!("User {} logged in", user.username);

    let target = urls::safe_next(form.next.as_deref())
        .unwrap_or_else(|| urls::forum_index(&state.language));
    Ok((jar.add(session_cookie(token)), found(&target)).into_response())
}

pub async fn signup_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, ApiError> {
    state.templates.render(&SignupPage {
        layout: Layout::new(&state.language, session.username()),
        errors: vec![],
        username: String::new(),
        email: String::new(),
    })
}

pub async fn signup(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response, ApiError> {
    let retry = |errors: Vec<FieldMessage>| {
        state.templates.render(&SignupPage {
            layout: Layout::new(&state.language, session.username()),
            errors,
            username: form.username.clone().unwrap_or_default(),
            email: form.email.clone().unwrap_or_default(),
        })
    };

    let account = match form.validate() {
        Ok(account) => account,
        Err(errors) => {
            let errors = errors
                .iter()
                .flat_map(|(field, errs)| {
                    errs.iter().map(move |e| FieldMessage {
                        field: field.to_string(),
                        message: e.to_string(),
                    })
                })
                .collect();
            return retry(errors);
        }
    };

    let db = state.clone();
    let username = account.username.clone();
    let created = run_blocking(move || create_account(&db.db, &account)).await?;

    let Some(user_id) = created else {
        return retry(vec![FieldMessage {
            field: "username".into(),
            message: "A user with that username already exists.".into(),
        }]);
    };

    let token = create_token(&state.jwt_secret, user_id, &username)?;
    Ok((jar.add(session_cookie(token)), found(&urls::forum_index(&state.language))).into_response())
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, found(&urls::forum_index(&state.language))).into_response()
}

/// Stores a new account. Returns `None` if the username is taken.
pub fn create_account(db: &Database, account: &NewAccount) -> anyhow::Result<Option<Uuid>> {
    if db.get_user_by_username(&account.username)?.is_some() {
        return Ok(None);
    }

    let password_hash = hash_password(&account.password)?;
    let user_id = Uuid::new_v4();
    db.create_user(&user_id.to_string(), &account.username, &account.email, &password_hash)?;

    info!("Created user {}", account.username);
    Ok(Some(user_id))
}

/// Hash password with Argon2id
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_token;

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("thisistest").unwrap();
        assert!(verify_password("thisistest", &hash));
        assert!(!verify_password("wrong-password", &hash));
        assert!(!verify_password("thisistest", "not-a-hash"));
    }

    #[test]
    fn token_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = create_token("secret", user_id, "TestName").unwrap();

        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username, "TestName");
        assert!(decode_token("other-secret", &token).is_err());
    }

    #[test]
    fn duplicate_accounts_are_refused() {
        let db = Database::open_in_memory().unwrap();
        let account = NewAccount {
            username: "TestName".into(),
            email: "test@test.com".into(),
            password: "thisistest".into(),
        };
        assert!(create_account(&db, &account).unwrap().is_some());
        assert!(create_account(&db, &account).unwrap().is_none());
    }
}
