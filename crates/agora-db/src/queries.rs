use std::collections::HashSet;

use crate::Database;
use crate::models::{
    CommentRow, MessageRow, MessageTagRow, NewMessage, PostOutcome, TagRow, TopicRow,
    TopicSummaryRow, UserRow,
};
use anyhow::Result;
use rusqlite::{Connection, Row, ToSql};

const MESSAGE_SELECT: &str = "SELECT m.id, m.topic_id, m.user_id, u.username, m.content, m.image, m.created_at
     FROM messages m
     LEFT JOIN users u ON m.user_id = u.id";

const COMMENT_SELECT: &str = "SELECT c.id, c.message_id, c.user_id, u.username, c.content, c.created_at
     FROM comments c
     LEFT JOIN users u ON c.user_id = u.id";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password) VALUES (?1, ?2, ?3, ?4)",
                (id, username, email, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Deletes a user together with every message and comment they wrote.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    // -- Topics --

    pub fn create_topic(&self, name: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO topics (name) VALUES (?1)", [name])?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_topic(&self, id: i64) -> Result<Option<TopicRow>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id, name FROM topics WHERE id = ?1", [id], topic_from_row)
                .optional()
        })
    }

    pub fn get_topic_by_name(&self, name: &str) -> Result<Option<TopicRow>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id, name FROM topics WHERE name = ?1", [name], topic_from_row)
                .optional()
        })
    }

    /// All topics ordered by name, with the number of messages in each.
    pub fn list_topics(&self) -> Result<Vec<TopicSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.name, COUNT(m.id)
                 FROM topics t
                 LEFT JOIN messages m ON m.topic_id = t.id
                 GROUP BY t.id
                 ORDER BY t.name",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(TopicSummaryRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        message_count: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_topic(&self, topic: &TopicRow) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE topics SET name = ?2 WHERE id = ?1",
                rusqlite::params![topic.id, topic.name],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_topic(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM topics WHERE id = ?1", [id])? > 0))
    }

    // -- Tags --

    pub fn create_tag(&self, name: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO tags (name) VALUES (?1)", [name])?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_tag(&self, id: i64) -> Result<Option<TagRow>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id, name FROM tags WHERE id = ?1", [id], tag_from_row)
                .optional()
        })
    }

    pub fn find_tags_by_name(&self, name: &str) -> Result<Vec<TagRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM tags WHERE name = ?1 ORDER BY id")?;
            let rows = stmt
                .query_map([name], tag_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_tags(&self) -> Result<Vec<TagRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY id")?;
            let rows = stmt
                .query_map([], tag_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Ids of every existing tag, for validating tag choices.
    pub fn tag_ids(&self) -> Result<HashSet<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM tags")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn update_tag(&self, tag: &TagRow) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tags SET name = ?2 WHERE id = ?1",
                rusqlite::params![tag.id, tag.name],
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes a tag and its links; tagged messages are kept.
    pub fn delete_tag(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM tags WHERE id = ?1", [id])? > 0))
    }

    /// Links a tag to a message. Linking twice is a no-op.
    pub fn add_tag_to_message(&self, tag_id: i64, message_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO message_tags (message_id, tag_id) VALUES (?1, ?2)",
                [message_id, tag_id],
            )?;
            Ok(())
        })
    }

    pub fn remove_tag_from_message(&self, tag_id: i64, message_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM message_tags WHERE message_id = ?1 AND tag_id = ?2",
                [message_id, tag_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Ids of the messages carrying a tag.
    pub fn messages_for_tag(&self, tag_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id FROM message_tags WHERE tag_id = ?1 ORDER BY message_id",
            )?;
            let ids = stmt
                .query_map([tag_id], |row| row.get::<_, i64>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Messages --

    /// Inserts a message and its tag links in one transaction.
    pub fn create_message(&self, new: &NewMessage<'_>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = insert_message(&tx, new)?;
            tx.commit()?;
            Ok(id)
        })
    }

    /// Like [`Database::create_message`], but first re-checks inside the
    /// same transaction that the author and every tag still exist, so a
    /// concurrent delete turns into an outcome instead of a constraint error.
    pub fn post_message(&self, new: &NewMessage<'_>) -> Result<PostOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !exists(&tx, "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)", new.user_id)? {
                return Ok(PostOutcome::UnknownUser);
            }
            for tag_id in new.tag_ids {
                if !exists(&tx, "SELECT EXISTS(SELECT 1 FROM tags WHERE id = ?1)", tag_id)? {
                    return Ok(PostOutcome::UnknownTag(*tag_id));
                }
            }
            let id = insert_message(&tx, new)?;
            tx.commit()?;
            Ok(PostOutcome::Created(id))
        })
    }

    /// Whether any message still points at a stored image.
    pub fn image_in_use(&self, image: &str) -> Result<bool> {
        self.with_conn(|conn| {
            exists(conn, "SELECT EXISTS(SELECT 1 FROM messages WHERE image = ?1)", image)
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{MESSAGE_SELECT} WHERE m.id = ?1"),
                [id],
                message_from_row,
            )
            .optional()
        })
    }

    /// Messages of a topic, newest first. With a keyword, only messages
    /// whose content contains it (ASCII case-insensitive) are returned.
    pub fn list_messages(&self, topic_id: i64, keyword: Option<&str>) -> Result<Vec<MessageRow>> {
        let pattern = keyword.map(like_pattern);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT}
                 WHERE m.topic_id = ?1
                   AND (?2 IS NULL OR m.content LIKE ?2 ESCAPE '\\')
                 ORDER BY m.created_at DESC, m.id DESC"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![topic_id, pattern], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Messages whose content is exactly `content`.
    pub fn find_messages_by_content(&self, content: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{MESSAGE_SELECT} WHERE m.content = ?1 ORDER BY m.id"))?;
            let rows = stmt
                .query_map([content], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_messages(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?))
    }

    /// Rewrites the mutable columns of a message.
    pub fn update_message(&self, id: i64, content: &str, image: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET content = ?2, image = ?3 WHERE id = ?1",
                rusqlite::params![id, content, image],
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes a message together with its comments and tag links.
    pub fn delete_message(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM messages WHERE id = ?1", [id])? > 0))
    }

    /// Batch-fetch the tags of a set of messages.
    pub fn get_tags_for_messages(&self, message_ids: &[i64]) -> Result<Vec<MessageTagRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT mt.message_id, t.id, t.name
                 FROM message_tags mt
                 JOIN tags t ON t.id = mt.tag_id
                 WHERE mt.message_id IN ({})
                 ORDER BY t.id",
                placeholders(message_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(id_params(message_ids).as_slice(), |row| {
                    Ok(MessageTagRow {
                        message_id: row.get(0)?,
                        tag_id: row.get(1)?,
                        tag_name: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Comments --

    pub fn create_comment(&self, message_id: i64, user_id: &str, content: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (message_id, user_id, content) VALUES (?1, ?2, ?3)",
                rusqlite::params![message_id, user_id, content],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{COMMENT_SELECT} WHERE c.id = ?1"),
                [id],
                comment_from_row,
            )
            .optional()
        })
    }

    /// Comments whose content is exactly `content`.
    pub fn find_comments_by_content(&self, content: &str) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{COMMENT_SELECT} WHERE c.content = ?1 ORDER BY c.id"))?;
            let rows = stmt
                .query_map([content], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_comments(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM comments", [], |r| r.get(0))?))
    }

    pub fn update_comment(&self, id: i64, content: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE comments SET content = ?2 WHERE id = ?1",
                rusqlite::params![id, content],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM comments WHERE id = ?1", [id])? > 0))
    }

    /// Batch-fetch the comments of a set of messages, oldest first.
    pub fn get_comments_for_messages(&self, message_ids: &[i64]) -> Result<Vec<CommentRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "{COMMENT_SELECT}
                 WHERE c.message_id IN ({})
                 ORDER BY c.created_at ASC, c.id ASC",
                placeholders(message_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(id_params(message_ids).as_slice(), comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, email, password, created_at FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn topic_from_row(row: &Row<'_>) -> rusqlite::Result<TopicRow> {
    Ok(TopicRow {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn insert_message(conn: &Connection, new: &NewMessage<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages (topic_id, user_id, content, image) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![new.topic_id, new.user_id, new.content, new.image],
    )?;
    let id = conn.last_insert_rowid();
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO message_tags (message_id, tag_id) VALUES (?1, ?2)")?;
    for tag_id in new.tag_ids {
        stmt.execute([id, *tag_id])?;
    }
    Ok(id)
}

fn exists(conn: &Connection, sql: &str, param: impl ToSql) -> Result<bool> {
    Ok(conn.query_row(sql, [param], |r| r.get(0))?)
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<TagRow> {
    Ok(TagRow {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        topic_id: row.get(1)?,
        user_id: row.get(2)?,
        author_username: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
        content: row.get(4)?,
        image: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        user_id: row.get(2)?,
        author_username: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn placeholders(count: usize) -> String {
    (1..=count).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

fn id_params(ids: &[i64]) -> Vec<&dyn ToSql> {
    ids.iter().map(|id| id as &dyn ToSql).collect()
}

/// LIKE pattern matching `keyword` anywhere, with wildcards taken literally.
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
