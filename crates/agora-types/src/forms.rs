//! Validation of submitted forum and account forms.
//!
//! Forms hold the raw submitted values (`None` when a field was not sent at
//! all) and turn them into cleaned values or a [`FormErrors`] map keyed by
//! field name. Text fields are trimmed before they are checked, so a value
//! made only of whitespace counts as missing.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use bytes::Bytes;
use serde::Deserialize;

/// Upper bound on message and comment content, in characters.
pub const CONTENT_MAX_LENGTH: usize = 200;

pub const USERNAME_MIN_LENGTH: usize = 3;
pub const USERNAME_MAX_LENGTH: usize = 32;
pub const PASSWORD_MIN_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    Required,
    MaxLength { max: usize, actual: usize },
    MinLength { min: usize, actual: usize },
    InvalidChoice { value: String },
    InvalidEmail,
    Mismatch,
    FileTooLarge { max: usize, actual: usize },
}

impl FieldError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::MaxLength { .. } => "max_length",
            Self::MinLength { .. } => "min_length",
            Self::InvalidChoice { .. } => "invalid_choice",
            Self::InvalidEmail => "invalid",
            Self::Mismatch => "mismatch",
            Self::FileTooLarge { .. } => "file_too_large",
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "This field is required."),
            Self::MaxLength { max, actual } => write!(
                f,
                "Ensure this value has at most {max} characters (it has {actual})."
            ),
            Self::MinLength { min, actual } => write!(
                f,
                "Ensure this value has at least {min} characters (it has {actual})."
            ),
            Self::InvalidChoice { value } => write!(
                f,
                "Select a valid choice. {value} is not one of the available choices."
            ),
            Self::InvalidEmail => write!(f, "Enter a valid email address."),
            Self::Mismatch => write!(f, "The two password fields didn't match."),
            Self::FileTooLarge { max, actual } => write!(
                f,
                "Ensure this file is at most {max} bytes (it is {actual})."
            ),
        }
    }
}

/// Errors of one form submission, grouped by field.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormErrors {
    fields: BTreeMap<&'static str, Vec<FieldError>>,
}

impl FormErrors {
    pub fn add(&mut self, field: &'static str, error: FieldError) {
        self.fields.entry(field).or_default().push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> &[FieldError] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Human message of the first error on `field`, if any.
    pub fn first_message(&self, field: &str) -> Option<String> {
        self.get(field).first().map(ToString::to_string)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[FieldError])> {
        self.fields.iter().map(|(name, errors)| (*name, errors.as_slice()))
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value()) } else { Err(self) }
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, errors) in self.iter() {
            for error in errors {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {error}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Trims `raw` and checks it is present and within `max` characters.
fn clean_text(raw: Option<&str>, max: Option<usize>) -> Result<String, FieldError> {
    let value = raw.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(FieldError::Required);
    }
    let actual = value.chars().count();
    if let Some(max) = max {
        if actual > max {
            return Err(FieldError::MaxLength { max, actual });
        }
    }
    Ok(value.to_string())
}

fn clean_content(raw: Option<&str>) -> Result<String, FieldError> {
    clean_text(raw, Some(CONTENT_MAX_LENGTH))
}

// -- Comments --

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CommentForm {
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanComment {
    pub content: String,
}

impl CommentForm {
    pub const FIELDS: &'static [&'static str] = &["content"];

    pub fn validate(&self) -> Result<CleanComment, FormErrors> {
        let mut errors = FormErrors::default();
        let content = clean_content(self.content.as_deref())
            .map_err(|e| errors.add("content", e))
            .ok();
        errors.into_result(|| CleanComment {
            content: content.unwrap_or_default(),
        })
    }
}

// -- Messages --

/// An uploaded file as received from a multipart body.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl ImageUpload {
    /// Browsers send an empty part when the file input was left blank.
    pub fn is_empty(&self) -> bool {
        self.filename.is_empty() || self.data.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct MessageForm {
    pub content: Option<String>,
    /// Raw `tag` values, one per selected option.
    pub tag: Vec<String>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone)]
pub struct CleanMessage {
    pub content: String,
    /// Selected tag ids, deduplicated in submission order.
    pub tag_ids: Vec<i64>,
    pub image: Option<ImageUpload>,
}

impl MessageForm {
    pub const FIELDS: &'static [&'static str] = &["content", "image", "tag"];

    /// Validates the form against the ids of the tags that currently exist.
    pub fn validate(
        &self,
        available_tags: &HashSet<i64>,
        max_image_bytes: usize,
    ) -> Result<CleanMessage, FormErrors> {
        let mut errors = FormErrors::default();

        let content = clean_content(self.content.as_deref())
            .map_err(|e| errors.add("content", e))
            .ok();

        let mut tag_ids = Vec::with_capacity(self.tag.len());
        for raw in &self.tag {
            let raw = raw.trim();
            match raw.parse::<i64>() {
                Ok(id) if available_tags.contains(&id) => {
                    if !tag_ids.contains(&id) {
                        tag_ids.push(id);
                    }
                }
                _ => {
                    errors.add(
                        "tag",
                        FieldError::InvalidChoice {
                            value: raw.to_string(),
                        },
                    );
                    break;
                }
            }
        }

        let image = self.image.clone().filter(|upload| !upload.is_empty());
        if let Some(upload) = &image {
            if upload.data.len() > max_image_bytes {
                errors.add(
                    "image",
                    FieldError::FileTooLarge {
                        max: max_image_bytes,
                        actual: upload.data.len(),
                    },
                );
            }
        }

        errors.into_result(|| CleanMessage {
            content: content.unwrap_or_default(),
            tag_ids,
            image,
        })
    }
}

// -- Search --

#[derive(Debug, Default, Clone, Deserialize)]
pub struct MessageSearchForm {
    pub keyword: Option<String>,
}

impl MessageSearchForm {
    pub const FIELDS: &'static [&'static str] = &["keyword"];

    /// Returns the trimmed keyword.
    pub fn validate(&self) -> Result<String, FormErrors> {
        let mut errors = FormErrors::default();
        let keyword = clean_text(self.keyword.as_deref(), None)
            .map_err(|e| errors.add("keyword", e))
            .ok();
        errors.into_result(|| keyword.unwrap_or_default())
    }
}

// -- Accounts --

#[derive(Debug, Default, Clone, Deserialize)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<Credentials, FormErrors> {
        let mut errors = FormErrors::default();
        let username = clean_text(self.username.as_deref(), None)
            .map_err(|e| errors.add("username", e))
            .ok();
        // Passwords are not trimmed.
        let password = self.password.clone().filter(|p| !p.is_empty());
        if password.is_none() {
            errors.add("password", FieldError::Required);
        }
        errors.into_result(|| Credentials {
            username: username.unwrap_or_default(),
            password: password.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SignupForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl SignupForm {
    pub fn validate(&self) -> Result<NewAccount, FormErrors> {
        let mut errors = FormErrors::default();

        let username = match clean_text(self.username.as_deref(), Some(USERNAME_MAX_LENGTH)) {
            Ok(name) if name.chars().count() < USERNAME_MIN_LENGTH => {
                errors.add(
                    "username",
                    FieldError::MinLength {
                        min: USERNAME_MIN_LENGTH,
                        actual: name.chars().count(),
                    },
                );
                None
            }
            Ok(name) => Some(name),
            Err(e) => {
                errors.add("username", e);
                None
            }
        };

        let email = match clean_text(self.email.as_deref(), None) {
            Ok(email) if is_plausible_email(&email) => Some(email),
            Ok(_) => {
                errors.add("email", FieldError::InvalidEmail);
                None
            }
            Err(e) => {
                errors.add("email", e);
                None
            }
        };

        let password = self.password.clone().unwrap_or_default();
        if password.is_empty() {
            errors.add("password", FieldError::Required);
        } else if password.chars().count() < PASSWORD_MIN_LENGTH {
            errors.add(
                "password",
                FieldError::MinLength {
                    min: PASSWORD_MIN_LENGTH,
                    actual: password.chars().count(),
                },
            );
        } else if self.password_confirm.as_deref() != Some(password.as_str()) {
            errors.add("password_confirm", FieldError::Mismatch);
        }

        errors.into_result(|| NewAccount {
            username: username.unwrap_or_default(),
            email: email.unwrap_or_default(),
            password,
        })
    }
}

fn is_plausible_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
