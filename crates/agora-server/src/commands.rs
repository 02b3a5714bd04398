//! Management subcommands. These run against the database directly,
//! without starting the server.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use tracing::info;

use agora_api::auth;
use agora_db::Database;
use agora_types::forms::SignupForm;

#[derive(Subcommand)]
pub enum TopicCommand {
    /// Create a topic
    Add {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// List topics with their message counts
    List,
}

#[derive(Subcommand)]
pub enum TagCommand {
    /// Create a tag
    Add {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// List tags
    List,
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Create a user account
    Create {
        #[arg(value_name = "USERNAME")]
        username: String,

        #[arg(value_name = "EMAIL")]
        email: String,

        /// Falls back to AGORA_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete a user together with their messages and comments
    Delete {
        #[arg(value_name = "USERNAME")]
        username: String,
    },
}

pub fn topic(db: &Database, cmd: TopicCommand) -> Result<()> {
    match cmd {
        TopicCommand::Add { name } => {
            let name = name.trim();
            if name.is_empty() {
                bail!("topic name must not be empty");
            }
            if db.get_topic_by_name(name)?.is_some() {
                bail!("topic {name:?} already exists");
            }
            let id = db.create_topic(name)?;
            info!("Created topic {} ({})", name, id);
        }
        TopicCommand::List => {
            for topic in db.list_topics()? {
                println!("{}\t{}\t{} messages", topic.id, topic.name, topic.message_count);
            }
        }
    }
    Ok(())
}

pub fn tag(db: &Database, cmd: TagCommand) -> Result<()> {
    match cmd {
        TagCommand::Add { name } => {
            let name = name.trim();
            if name.is_empty() {
                bail!("tag name must not be empty");
            }
            let id = db.create_tag(name)?;
            info!("Created tag {} ({})", name, id);
        }
        TagCommand::List => {
            for tag in db.list_tags()? {
                println!("{}\t{}", tag.id, tag.name);
            }
        }
    }
    Ok(())
}

pub fn user(db: &Database, cmd: UserCommand) -> Result<()> {
    match cmd {
        UserCommand::Create {
            username,
            email,
            password,
        } => {
            let password = password
                .or_else(|| std::env::var("AGORA_PASSWORD").ok())
                .context("pass --password or set AGORA_PASSWORD")?;
            let form = SignupForm {
                username: Some(username),
                email: Some(email),
                password: Some(password.clone()),
                password_confirm: Some(password),
            };
            let account = form
                .validate()
                .map_err(|errors| anyhow::anyhow!("invalid account: {}", errors))?;

            if auth::create_account(db, &account)?.is_none() {
                bail!("user {:?} already exists", account.username);
            }
        }
        UserCommand::Delete { username } => {
            let user = db
                .get_user_by_username(&username)?
                .with_context(|| format!("no user named {username:?}"))?;
            db.delete_user(&user.id)?;
            info!("Deleted user {}", username);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_unique() {
        let db = Database::open_in_memory().unwrap();
        topic(&db, TopicCommand::Add { name: "TestTopic".into() }).unwrap();
        assert!(topic(&db, TopicCommand::Add { name: "TestTopic".into() }).is_err());
        assert!(topic(&db, TopicCommand::Add { name: "  ".into() }).is_err());
        assert_eq!(db.list_topics().unwrap().len(), 1);
    }

    #[test]
    fn user_create_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let create = || UserCommand::Create {
            username: "TestName".into(),
            email: "test@test.com".into(),
            password: Some("thisistest".into()),
        };
        user(&db, create()).unwrap();
        assert!(user(&db, create()).is_err());

        user(&db, UserCommand::Delete { username: "TestName".into() }).unwrap();
        assert!(db.get_user_by_username("TestName").unwrap().is_none());
        assert!(user(&db, UserCommand::Delete { username: "TestName".into() }).is_err());
    }

    #[test]
    fn user_create_validates() {
        let db = Database::open_in_memory().unwrap();
        let short = UserCommand::Create {
            username: "TestName".into(),
            email: "test@test.com".into(),
            password: Some("short".into()),
        };
        assert!(user(&db, short).is_err());
    }
}
