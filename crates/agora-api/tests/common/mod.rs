#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use agora_api::auth::{self, AppState, AppStateInner};
use agora_api::media::MediaStore;
use agora_api::templates::Templates;
use agora_db::Database;
use agora_db::models::NewMessage;
use agora_types::api::SESSION_COOKIE;

pub const SECRET: &str = "test-secret";
pub const USERNAME: &str = "TestName";
pub const PASSWORD: &str = "thisistest";
pub const FORUM_URL: &str = "/ja/forum/TestTopic/";
pub const BOUNDARY: &str = "agora-test-boundary";

/// A forum seeded with one user, topic `TestTopic`, tags `TestTag1` and
/// `TestTag2`, one tagged message (id 1) and one comment on it.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub user_id: Uuid,
    pub topic_id: i64,
    _media: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let media_dir = tempfile::tempdir().unwrap();
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: SECRET.to_string(),
            media: MediaStore::new(media_dir.path().to_path_buf()).await.unwrap(),
            templates: Templates::new().unwrap(),
            language: "ja".to_string(),
            max_upload_bytes: 1024 * 1024,
        });

        let user_id = Uuid::new_v4();
        let hash = auth::hash_password(PASSWORD).unwrap();
        state
            .db
            .create_user(&user_id.to_string(), USERNAME, "test@test.com", &hash)
            .unwrap();

        let topic_id = state.db.create_topic("TestTopic").unwrap();
        let tag1 = state.db.create_tag("TestTag1").unwrap();
        let tag2 = state.db.create_tag("TestTag2").unwrap();
        let message_id = state
            .db
            .create_message(&NewMessage {
                topic_id,
                user_id: &user_id.to_string(),
                content: "TestContent",
                image: None,
                tag_ids: &[tag1, tag2],
            })
            .unwrap();
        state
            .db
            .create_comment(message_id, &user_id.to_string(), "TestComment")
            .unwrap();

        Self {
            app: agora_api::router(state.clone()),
            state,
            user_id,
            topic_id,
            _media: media_dir,
        }
    }

    pub fn cookie(&self) -> String {
        let token = auth::create_token(SECRET, self.user_id, USERNAME).unwrap();
        format!("{SESSION_COOKIE}={token}")
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(req).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    /// POSTs a urlencoded body, logged in when `cookie` is given.
    pub async fn post_form(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response<Body> {
        let mut req = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        body: Vec<u8>,
        cookie: Option<&str>,
    ) -> Response<Body> {
        let mut req = Request::post(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::from(body)).unwrap()).await
    }

    pub fn message_count(&self) -> i64 {
        self.state.db.count_messages().unwrap()
    }

    pub fn comment_count(&self) -> i64 {
        self.state.db.count_comments().unwrap()
    }
}

/// Builds a multipart body from text fields and `(field, filename, bytes)`
/// files.
pub fn multipart(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, filename, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: image/gif\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn location(res: &Response<Body>) -> &str {
    res.headers()[header::LOCATION].to_str().unwrap()
}

pub async fn body_text(res: Response<Body>) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A 1x1 transparent GIF.
pub const GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3b,
];
