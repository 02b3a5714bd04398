use axum::{
    Extension,
    extract::{Path, Query, State},
    response::Response,
};
use tracing::{info, warn};

use agora_db::models::{NewMessage, PostOutcome, TopicRow};
use agora_types::forms::{CONTENT_MAX_LENGTH, CommentForm, MessageForm, MessageSearchForm};

use crate::auth::AppState;
use crate::convert;
use crate::error::{ApiError, run_blocking};
use crate::extract::Submission;
use crate::middleware::Session;
use crate::templates::{ForumPage, IndexPage, Layout, MessageView, TagOption};
use crate::urls::{self, found};

/// GET /{lang}/forum/: every topic and tag.
pub async fn index(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, ApiError> {
    let db = state.clone();
    let (topics, tags) = run_blocking(move || {
        let topics = db.db.list_topics()?;
        let tags = db.db.list_tags()?;
        Ok((topics, tags))
    })
    .await?;

    state.templates.render(&IndexPage::new(
        Layout::new(&state.language, session.username()),
        convert::topic_summaries(topics),
        tags.into_iter().map(convert::tag).collect(),
    ))
}

/// GET /{lang}/forum/{topic_name}/: the topic's messages, newest first,
/// optionally filtered by `?keyword=`.
pub async fn forum(
    State(state): State<AppState>,
    Path(topic_name): Path<String>,
    Query(search): Query<MessageSearchForm>,
    Extension(session): Extension<Session>,
) -> Result<Response, ApiError> {
    // A missing or blank keyword just means "no filter".
    let keyword = search.validate().ok();

    let db = state.clone();
    let filter = keyword.clone();
    let page = run_blocking(move || {
        let Some(topic) = db.db.get_topic_by_name(&topic_name)? else {
            return Ok(None);
        };
        let rows = db.db.list_messages(topic.id, filter.as_deref())?;
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let tag_rows = db.db.get_tags_for_messages(&ids)?;
        let comment_rows = db.db.get_comments_for_messages(&ids)?;
        let tags = db.db.list_tags()?;
        Ok(Some((topic, rows, tag_rows, comment_rows, tags)))
    })
    .await?;

    let (topic, rows, tag_rows, comment_rows, tags) = page.ok_or(ApiError::NotFound)?;
    let topic = convert::topic(topic);
    let messages = convert::messages(rows, tag_rows, comment_rows);

    state.templates.render(&ForumPage {
        layout: Layout::new(&state.language, session.username()),
        forum_url: urls::forum(&state.language, &topic.name),
        topic_name: topic.name,
        keyword: keyword.unwrap_or_default(),
        messages: messages.into_iter().map(MessageView::from).collect(),
        tags: tags
            .into_iter()
            .map(|t| TagOption {
                id: t.id,
                name: t.name,
            })
            .collect(),
        content_max_length: CONTENT_MAX_LENGTH,
    })
}

/// POST /{lang}/forum/{topic_name}/: creates a message (`message` field
/// present) or a comment (`comment=<message id>`).
///
/// Every outcome except an unknown topic or comment target is a 302:
/// anonymous callers go to the login page, rejected or completed
/// submissions come back to the topic page.
pub async fn forum_post(
    State(state): State<AppState>,
    Path(topic_name): Path<String>,
    Extension(session): Extension<Session>,
    submission: Submission,
) -> Result<Response, ApiError> {
    let db = state.clone();
    let topic = run_blocking(move || db.db.get_topic_by_name(&topic_name))
        .await?
        .ok_or(ApiError::NotFound)?;

    let here = urls::forum(&state.language, &topic.name);

    if submission.has("message") {
        create_message(&state, &session, topic, &here, &submission).await
    } else if let Some(target) = submission.get("comment") {
        create_comment(&state, &session, topic, &here, target, &submission).await
    } else {
        Ok(found(&here))
    }
}

async fn create_message(
    state: &AppState,
    session: &Session,
    topic: TopicRow,
    here: &str,
    submission: &Submission,
) -> Result<Response, ApiError> {
    let Some(claims) = session.user() else {
        warn!("Anonymous message post to topic {} rejected", topic.name);
        return Ok(found(&urls::login(&state.language, Some(here))));
    };

    let form = MessageForm {
        content: submission.get("content").map(str::to_string),
        tag: submission.get_all("tag"),
        image: submission.file("image").cloned(),
    };

    let db = state.clone();
    let user_id = claims.sub.to_string();
    let (known_user, available_tags) = run_blocking(move || {
        // The session may outlive its account.
        let known = db.db.get_user_by_id(&user_id)?.is_some();
        Ok((known, db.db.tag_ids()?))
    })
    .await?;
    if !known_user {
        warn!("Session user {} no longer exists", claims.sub);
        return Ok(found(&urls::login(&state.language, Some(here))));
    }

    let clean = match form.validate(&available_tags, state.max_upload_bytes) {
        Ok(clean) => clean,
        Err(errors) => {
            warn!("Message from {} rejected: {}", claims.username, errors);
            return Ok(found(here));
        }
    };

    let image = match &clean.image {
        Some(upload) => Some(state.media.save_image(upload).await?),
        None => None,
    };

    // The account or a tag can vanish between validation and insert, so
    // the insert re-checks both in its own transaction.
    let db = state.clone();
    let user_id = claims.sub.to_string();
    let topic_id = topic.id;
    let stored = image.clone();
    let outcome = run_blocking(move || {
        db.db.post_message(&NewMessage {
            topic_id,
            user_id: &user_id,
            content: &clean.content,
            image: stored.as_deref(),
            tag_ids: &clean.tag_ids,
        })
    })
    .await?;

    match outcome {
        PostOutcome::Created(id) => {
            info!("Message {} posted to {} by {}", id, topic.name, claims.username);
            Ok(found(here))
        }
        PostOutcome::UnknownUser => {
            warn!("Session user {} no longer exists", claims.sub);
            discard_image(state, image).await?;
            Ok(found(&urls::login(&state.language, Some(here))))
        }
        PostOutcome::UnknownTag(tag_id) => {
            warn!("Message from {} rejected: tag {} was deleted", claims.username, tag_id);
            discard_image(state, image).await?;
            Ok(found(here))
        }
    }
}

/// Removes an image saved for a message that was never stored, unless an
/// earlier message shares the same content-addressed file.
async fn discard_image(state: &AppState, image: Option<String>) -> Result<(), ApiError> {
    let Some(image) = image else {
        return Ok(());
    };
    let db = state.clone();
    let lookup = image.clone();
    if !run_blocking(move || db.db.image_in_use(&lookup)).await? {
        state.media.remove(&image).await?;
    }
    Ok(())
}

enum CommentOutcome {
    Created(i64),
    UnknownMessage,
    UnknownUser,
}

async fn create_comment(
    state: &AppState,
    session: &Session,
    topic: TopicRow,
    here: &str,
    target: &str,
    submission: &Submission,
) -> Result<Response, ApiError> {
    let Some(claims) = session.user() else {
        warn!("Anonymous comment post to topic {} rejected", topic.name);
        return Ok(found(&urls::login(&state.language, Some(here))));
    };

    let form = CommentForm {
        content: submission.get("content").map(str::to_string),
    };
    let clean = match form.validate() {
        Ok(clean) => clean,
        Err(errors) => {
            warn!("Comment from {} rejected: {}", claims.username, errors);
            return Ok(found(here));
        }
    };

    let Ok(message_id) = target.trim().parse::<i64>() else {
        return Err(ApiError::NotFound);
    };

    let db = state.clone();
    let user_id = claims.sub.to_string();
    let topic_id = topic.id;
    let outcome = run_blocking(move || {
        // Comments may only target messages of the topic being viewed.
        match db.db.get_message(message_id)? {
            Some(message) if message.topic_id == topic_id => {}
            _ => return Ok(CommentOutcome::UnknownMessage),
        }
        if db.db.get_user_by_id(&user_id)?.is_none() {
            return Ok(CommentOutcome::UnknownUser);
        }
        let id = db.db.create_comment(message_id, &user_id, &clean.content)?;
        Ok(CommentOutcome::Created(id))
    })
    .await?;

    match outcome {
        CommentOutcome::Created(id) => {
            info!("Comment {} on message {} by {}", id, message_id, claims.username);
            Ok(found(here))
        }
        CommentOutcome::UnknownMessage => {
            warn!("Comment targets unknown message {} in {}", message_id, topic.name);
            Err(ApiError::NotFound)
        }
        CommentOutcome::UnknownUser => {
            warn!("Session user {} no longer exists", claims.sub);
            Ok(found(&urls::login(&state.language, Some(here))))
        }
    }
}
