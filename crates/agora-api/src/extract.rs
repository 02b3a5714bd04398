use axum::{
    Form,
    extract::{FromRequest, Multipart, Request},
    http::{StatusCode, header},
};
use tracing::warn;

use agora_types::forms::ImageUpload;

use crate::error::ApiError;

/// A submitted HTML form, either `multipart/form-data` or urlencoded.
///
/// Repeated fields (such as several `tag` values) are all kept, in order.
#[derive(Debug, Default)]
pub struct Submission {
    fields: Vec<(String, String)>,
    files: Vec<(String, ImageUpload)>,
}

impl Submission {
    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name) || self.files.iter().any(|(n, _)| n == name)
    }

    /// First value of a text field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn file(&self, name: &str) -> Option<&ImageUpload> {
        self.files.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }
}

impl<S> FromRequest<S> for Submission
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(fields) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(form_error)?;
            return Ok(Self {
                fields,
                files: Vec::new(),
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        let mut submission = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field.content_type().map(str::to_string);
                    let data = field.bytes().await.map_err(multipart_error)?;
                    submission.files.push((
                        name,
                        ImageUpload {
                            filename,
                            content_type,
                            data,
                        },
                    ));
                }
                None => {
                    let value = field.text().await.map_err(multipart_error)?;
                    submission.fields.push((name, value));
                }
            }
        }

        Ok(submission)
    }
}

fn form_error(e: axum::extract::rejection::FormRejection) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        warn!("Rejected form body: {}", e);
        ApiError::BadRequest(e.body_text())
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        warn!("Rejected multipart body: {}", e);
        ApiError::BadRequest(e.body_text())
    }
}
