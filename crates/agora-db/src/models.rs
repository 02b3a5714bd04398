//! Rows as stored in SQLite. The api crate converts them into the
//! shared `agora_types` models.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRow {
    pub id: i64,
    pub name: String,
}

pub struct TopicSummaryRow {
    pub id: i64,
    pub name: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: i64,
    pub topic_id: i64,
    pub user_id: String,
    pub author_username: String,
    pub content: String,
    pub image: Option<String>,
    pub created_at: String,
}

/// One (message, tag) link joined with the tag's name.
pub struct MessageTagRow {
    pub message_id: i64,
    pub tag_id: i64,
    pub tag_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRow {
    pub id: i64,
    pub message_id: i64,
    pub user_id: String,
    pub author_username: String,
    pub content: String,
    pub created_at: String,
}

/// Everything needed to insert a message and link its tags.
pub struct NewMessage<'a> {
    pub topic_id: i64,
    pub user_id: &'a str,
    pub content: &'a str,
    pub image: Option<&'a str>,
    pub tag_ids: &'a [i64],
}

/// Result of [`Database::post_message`](crate::Database::post_message).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Created(i64),
    /// The author was deleted; nothing was stored.
    UnknownUser,
    /// A selected tag no longer exists; nothing was stored.
    UnknownTag(i64),
}
