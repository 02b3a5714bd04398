use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;
use tera::{Context, Tera};

use agora_types::models::{Message, Tag, TopicSummary};

use crate::error::ApiError;
use crate::urls;

/// Page templates compiled into the binary, keyed by their path under
/// `templates/`.
const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("forum/index.html", include_str!("../templates/forum/index.html")),
    ("forum/forum.html", include_str!("../templates/forum/forum.html")),
    ("accounts/login.html", include_str!("../templates/accounts/login.html")),
    ("accounts/signup.html", include_str!("../templates/accounts/signup.html")),
];

/// The Tera engine with every page template loaded. HTML autoescaping is on
/// for all of them.
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        Ok(Self { tera })
    }

    pub fn render<P: Page>(&self, page: &P) -> Result<Response, ApiError> {
        let context = Context::from_serialize(page)?;
        let html = self.tera.render(P::TEMPLATE, &context)?;
        Ok(Html(html).into_response())
    }
}

/// A context struct rendered by one template.
pub trait Page: Serialize {
    const TEMPLATE: &'static str;
}

/// Navigation data every page needs.
#[derive(Serialize)]
pub struct Layout {
    pub lang: String,
    /// Empty for anonymous visitors.
    pub username: String,
    pub forum_index_url: String,
    pub login_url: String,
    pub signup_url: String,
    pub logout_url: String,
}

impl Layout {
    pub fn new(lang: &str, username: Option<&str>) -> Self {
        Self {
            lang: lang.to_string(),
            username: username.unwrap_or_default().to_string(),
            forum_index_url: urls::forum_index(lang),
            login_url: urls::login(lang, None),
            signup_url: urls::signup(lang),
            logout_url: urls::logout(lang),
        }
    }
}

#[derive(Serialize)]
pub struct TopicLink {
    pub name: String,
    pub url: String,
    pub message_count: i64,
}

#[derive(Serialize)]
pub struct TagOption {
    pub id: i64,
    pub name: String,
}

#[derive(Serialize)]
pub struct MessageView {
    pub id: i64,
    pub author: String,
    pub content: String,
    /// Empty when the message has no image.
    pub image_url: String,
    pub tags: Vec<String>,
    pub comments: Vec<CommentView>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct CommentView {
    pub author: String,
    pub content: String,
    pub created_at: String,
}

impl From<Message> for MessageView {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            author: m.author_username,
            content: m.content,
            image_url: m.image.as_deref().map(urls::media).unwrap_or_default(),
            tags: m.tags.into_iter().map(|t| t.name).collect(),
            comments: m
                .comments
                .into_iter()
                .map(|c| CommentView {
                    author: c.author_username,
                    content: c.content,
                    created_at: c.created_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect(),
            created_at: m.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct IndexPage {
    pub layout: Layout,
    pub topics: Vec<TopicLink>,
    pub tags: Vec<String>,
}

impl Page for IndexPage {
    const TEMPLATE: &'static str = "forum/index.html";
}

impl IndexPage {
    pub fn new(layout: Layout, topics: Vec<TopicSummary>, tags: Vec<Tag>) -> Self {
        let topics = topics
            .into_iter()
            .map(|s| TopicLink {
                url: urls::forum(&layout.lang, &s.topic.name),
                name: s.topic.name,
                message_count: s.message_count,
            })
            .collect();
        Self {
            layout,
            topics,
            tags: tags.into_iter().map(|t| t.name).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct ForumPage {
    pub layout: Layout,
    pub topic_name: String,
    pub forum_url: String,
    pub keyword: String,
    pub messages: Vec<MessageView>,
    pub tags: Vec<TagOption>,
    pub content_max_length: usize,
}

impl Page for ForumPage {
    const TEMPLATE: &'static str = "forum/forum.html";
}

#[derive(Serialize)]
pub struct LoginPage {
    pub layout: Layout,
    pub error: String,
    pub username: String,
    pub next: String,
}

impl Page for LoginPage {
    const TEMPLATE: &'static str = "accounts/login.html";
}

#[derive(Serialize)]
pub struct FieldMessage {
    pub field: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct SignupPage {
    pub layout: Layout,
    pub errors: Vec<FieldMessage>,
    pub username: String,
    pub email: String,
}

impl Page for SignupPage {
    const TEMPLATE: &'static str = "accounts/signup.html";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates() -> Templates {
        Templates::new().unwrap()
    }

    async fn html(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn user_content_is_escaped() {
        let page = LoginPage {
            layout: Layout::new("ja", None),
            error: "<script>alert(1)</script>".into(),
            username: String::new(),
            next: String::new(),
        };
        let body = html(templates().render(&page).unwrap()).await;
        assert!(!body.contains("<script>"));
        assert!(body.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn layout_switches_on_login() {
        let page = IndexPage::new(Layout::new("ja", Some("TestName")), vec![], vec![]);
        let body = html(templates().render(&page).unwrap()).await;
        assert!(body.contains("TestName"));
        assert!(body.contains("Log out"));
        assert!(body.contains("No topics yet."));

        let page = IndexPage::new(Layout::new("ja", None), vec![], vec![]);
        let body = html(templates().render(&page).unwrap()).await;
        assert!(!body.contains("Log out"));
        assert!(body.contains("Sign up"));
    }
}
