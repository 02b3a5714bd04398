//! Conversion of database rows into the shared model types.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use agora_db::models::{
    CommentRow, MessageRow, MessageTagRow, TagRow, TopicRow, TopicSummaryRow, UserRow,
};
use agora_types::models::{Comment, Message, Tag, Topic, TopicSummary, User};

/// Drops the password hash.
pub fn user(row: UserRow) -> User {
    let context = format!("user {}", row.username);
    User {
        id: parse_uuid(&row.id, &context),
        created_at: parse_timestamp(&row.created_at, &context),
        username: row.username,
        email: row.email,
    }
}

pub fn topic(row: TopicRow) -> Topic {
    Topic {
        id: row.id,
        name: row.name,
    }
}

pub fn tag(row: TagRow) -> Tag {
    Tag {
        id: row.id,
        name: row.name,
    }
}

pub fn topic_summaries(rows: Vec<TopicSummaryRow>) -> Vec<TopicSummary> {
    rows.into_iter()
        .map(|row| TopicSummary {
            topic: Topic {
                id: row.id,
                name: row.name,
            },
            message_count: row.message_count,
        })
        .collect()
}

/// Builds messages in row order, attaching their tags and comments.
pub fn messages(
    rows: Vec<MessageRow>,
    tag_rows: Vec<MessageTagRow>,
    comment_rows: Vec<CommentRow>,
) -> Vec<Message> {
    let mut tags: HashMap<i64, Vec<Tag>> = HashMap::new();
    for t in tag_rows {
        tags.entry(t.message_id).or_default().push(Tag {
            id: t.tag_id,
            name: t.tag_name,
        });
    }

    let mut comments: HashMap<i64, Vec<Comment>> = HashMap::new();
    for c in comment_rows {
        let context = format!("comment {}", c.id);
        comments.entry(c.message_id).or_default().push(Comment {
            id: c.id,
            message_id: c.message_id,
            user_id: parse_uuid(&c.user_id, &context),
            author_username: c.author_username,
            content: c.content,
            created_at: parse_timestamp(&c.created_at, &context),
        });
    }

    rows.into_iter()
        .map(|row| {
            let context = format!("message {}", row.id);
            Message {
                id: row.id,
                topic_id: row.topic_id,
                user_id: parse_uuid(&row.user_id, &context),
                author_username: row.author_username,
                content: row.content,
                image: row.image,
                tags: tags.remove(&row.id).unwrap_or_default(),
                comments: comments.remove(&row.id).unwrap_or_default(),
                created_at: parse_timestamp(&row.created_at, &context),
            }
        })
        .collect()
}

fn parse_uuid(raw: &str, context: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt user id '{}' on {}: {}", raw, context, e);
        Uuid::default()
    })
}

fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            // Parse as naive UTC and convert.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on {}: {}", raw, context, e);
            DateTime::default()
        })
}
