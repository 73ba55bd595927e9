//! Input validation for posts and comments, shared by both HTTP surfaces.

use std::collections::BTreeMap;

use actix_multipart::{Multipart, MultipartError};
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};

use crate::models::{Id, NewGroup};
use crate::repo::{Repo, RepoError};
use crate::storage::image_name;

pub const IMAGE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const IMAGE_TOO_LARGE: &str = "The image is larger than 10 MB.";
pub const FIELD_TOO_LARGE: &str = "This value is larger than 10 MB.";
pub const INVALID_GROUP: &str = "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_SLUG: &str = "Enter a valid slug consisting of letters, numbers, underscores or hyphens.";
pub const INVALID_USERNAME: &str =
    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const PASSWORD_TOO_SHORT: &str = "This password is too short. It must contain at least 8 characters.";

pub const USERNAME_RESERVED: &str = "This username is reserved.";

pub const USERNAME_MAX_LEN: usize = 150;
/// First path segments taken by fixed pages; profiles live at `/<username>/`.
pub const RESERVED_USERNAMES: &[&str] = &["api", "auth", "docs", "follow", "group", "media", "new"];
pub const PASSWORD_MIN_LEN: usize = 8;

/// Field name -> messages, rendered next to the inputs or returned as a 400 body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

impl std::fmt::Display for FormErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {}", v.join(" "))).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Trims and checks a required text field.
pub fn required_text(errors: &mut FormErrors, field: &str, value: Option<&str>) -> Option<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            errors.add(field, REQUIRED);
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Set when the upload went past `IMAGE_SIZE_LIMIT`; `bytes` is then truncated.
    pub oversized: bool,
}

/// An image that sniffed as a real image type.
#[derive(Debug, Clone)]
pub struct ValidImage {
    /// Storage name, e.g. `posts/<sha256>.png`.
    pub name: String,
    pub bytes: Vec<u8>,
}

pub fn validate_image(errors: &mut FormErrors, upload: UploadedImage) -> Option<ValidImage> {
    if upload.oversized {
        errors.add("image", IMAGE_TOO_LARGE);
        return None;
    }
    match infer::get(&upload.bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => Some(ValidImage {
            name: image_name(&upload.bytes, kind.extension()),
            bytes: upload.bytes,
        }),
        _ => {
            errors.add("image", INVALID_IMAGE);
            None
        }
    }
}

/// Raw post submission (`text`, `group`, `image`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostForm {
    pub text: String,
    pub group: Option<String>,
    #[serde(skip)]
    pub image: Option<UploadedImage>,
    /// Text fields that went past `IMAGE_SIZE_LIMIT` and were dropped.
    #[serde(skip)]
    pub oversized: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct CleanPost {
    pub text: String,
    pub group_id: Option<Id>,
    pub image: Option<ValidImage>,
}

impl PostForm {
    /// Collects the known fields of a `multipart/form-data` body.
    pub async fn from_multipart(mut payload: Multipart) -> Result<Self, MultipartError> {
        let mut form = PostForm::default();
        while let Some(mut field) = payload.try_next().await? {
            let name = field.content_disposition().get_name().unwrap_or_default().to_string();
            let filename = field.content_disposition().get_filename().map(str::to_string);
            let mut bytes: Vec<u8> = Vec::new();
            let mut oversized = false;
            while let Some(chunk) = field.try_next().await? {
                if oversized || bytes.len() + chunk.len() > IMAGE_SIZE_LIMIT {
                    // keep draining so the next field can be read
                    oversized = true;
                    continue;
                }
                bytes.extend_from_slice(&chunk);
            }
            match name.as_str() {
                "text" if oversized => form.oversized.push("text"),
                "group" if oversized => form.oversized.push("group"),
                "text" => form.text = String::from_utf8_lossy(&bytes).into_owned(),
                "group" => form.group = Some(String::from_utf8_lossy(&bytes).trim().to_string()),
                "image" => {
                    // an empty file input still sends a part with no filename/bytes
                    let filename = filename.unwrap_or_default();
                    if !(filename.is_empty() && bytes.is_empty()) {
                        form.image = Some(UploadedImage { filename, bytes, oversized });
                    }
                }
                _ => {}
            }
        }
        Ok(form)
    }

    /// Checks every field; a group id must name an existing group.
    pub async fn validate(self, repo: &dyn Repo) -> Result<CleanPost, FormErrors> {
        let mut errors = FormErrors::new();
        for field in &self.oversized {
            errors.add(field, FIELD_TOO_LARGE);
        }
        let text = if self.oversized.contains(&"text") {
            None
        } else {
            required_text(&mut errors, "text", Some(&self.text))
        };
        let group_id = match self.group.as_deref().filter(|g| !g.is_empty()) {
            None => None,
            Some(raw) => match raw.parse::<Id>() {
                Ok(id) => match repo.get_group(id).await {
                    Ok(g) => Some(g.id),
                    Err(RepoError::NotFound) => {
                        errors.add("group", INVALID_GROUP);
                        None
                    }
                    Err(e) => {
                        errors.add("__all__", e.to_string());
                        None
                    }
                },
                Err(_) => {
                    errors.add("group", INVALID_GROUP);
                    None
                }
            },
        };
        let image = self.image.and_then(|upload| validate_image(&mut errors, upload));
        match text {
            Some(text) if errors.is_empty() => Ok(CleanPost { text, group_id, image }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn validate(&self) -> Result<String, FormErrors> {
        let mut errors = FormErrors::new();
        required_text(&mut errors, "text", Some(&self.text)).ok_or(errors)
    }
}

pub fn valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Trims a new group; title and slug are required and the slug must be URL-safe.
pub fn validate_group(new: NewGroup) -> Result<NewGroup, FormErrors> {
    let mut errors = FormErrors::new();
    let title = required_text(&mut errors, "title", Some(&new.title));
    let slug = required_text(&mut errors, "slug", Some(&new.slug));
    if slug.as_deref().is_some_and(|s| !valid_slug(s)) {
        errors.add("slug", INVALID_SLUG);
    }
    match (title, slug) {
        (Some(title), Some(slug)) if errors.is_empty() => {
            Ok(NewGroup { title, slug, description: new.description.trim().to_string() })
        }
        _ => Err(errors),
    }
}

/// Registration form of the HTML surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl SignupForm {
    /// Returns `(username, email)`; the password is checked but left in place.
    pub fn validate(&self) -> Result<(String, String), FormErrors> {
        let mut errors = FormErrors::new();
        let username = required_text(&mut errors, "username", Some(&self.username));
        if let Some(name) = &username {
            let allowed = |c: char| c.is_alphanumeric() || "@.+-_".contains(c);
            if name.chars().count() > USERNAME_MAX_LEN || !name.chars().all(allowed) {
                errors.add("username", INVALID_USERNAME);
            } else if RESERVED_USERNAMES.contains(&name.to_lowercase().as_str()) {
                errors.add("username", USERNAME_RESERVED);
            }
        }
        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        } else if self.password.chars().count() < PASSWORD_MIN_LEN {
            errors.add("password", PASSWORD_TOO_SHORT);
        }
        match username {
            Some(username) if errors.is_empty() => Ok((username, self.email.trim().to_string())),
            _ => Err(errors),
        }
    }
}

#[cfg(all(test, feature = "inmem-store"))]
mod tests {
    use super::*;
    use crate::repo::inmem::InMemRepo;

    fn png() -> Vec<u8> {
        vec![
            0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R',
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
            0x89,
        ]
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let repo = InMemRepo::new();
        let form = PostForm { text: "   ".into(), ..Default::default() };
        let errors = form.validate(&repo).await.unwrap_err();
        assert_eq!(errors.field("text"), Some(&[REQUIRED.to_string()][..]));
    }

    #[tokio::test]
    async fn non_image_upload_is_rejected() {
        let repo = InMemRepo::new();
        let form = PostForm {
            text: "hello".into(),
            group: None,
            image: Some(UploadedImage { filename: "notes.txt".into(), bytes: b"plain text".to_vec(), oversized: false }),
            ..Default::default()
        };
        let errors = form.validate(&repo).await.unwrap_err();
        assert_eq!(errors.field("image"), Some(&[INVALID_IMAGE.to_string()][..]));
        assert!(errors.field("text").is_none());
    }

    #[tokio::test]
    async fn image_and_unknown_group() {
        let repo = InMemRepo::new();
        let ok = PostForm {
            text: " hi ".into(),
            group: Some(String::new()),
            image: Some(UploadedImage { filename: "a.png".into(), bytes: png(), oversized: false }),
            ..Default::default()
        }
        .validate(&repo)
        .await
        .unwrap();
        assert_eq!(ok.text, "hi");
        assert!(ok.image.unwrap().name.ends_with(".png"));

        let bad = PostForm { text: "hi".into(), group: Some("42".into()), ..Default::default() };
        let errors = bad.validate(&repo).await.unwrap_err();
        assert_eq!(errors.field("group"), Some(&[INVALID_GROUP.to_string()][..]));
    }

    #[tokio::test]
    async fn oversized_text_is_an_error_not_a_truncation() {
        let repo = InMemRepo::new();
        let form = PostForm { oversized: vec!["text"], ..Default::default() };
        let errors = form.validate(&repo).await.unwrap_err();
        assert_eq!(errors.field("text"), Some(&[FIELD_TOO_LARGE.to_string()][..]));
    }

    #[test]
    fn group_slug_must_be_url_safe() {
        let bad = NewGroup { title: "Cats".into(), slug: "cats and dogs".into(), description: String::new() };
        let errors = validate_group(bad).unwrap_err();
        assert_eq!(errors.field("slug"), Some(&[INVALID_SLUG.to_string()][..]));
        let ok = NewGroup { title: " Cats ".into(), slug: "cats_1".into(), description: String::new() };
        assert_eq!(validate_group(ok).unwrap().title, "Cats");
    }

    #[test]
    fn signup_checks_username_and_password() {
        let form = SignupForm { username: "bad name".into(), email: String::new(), password: "short".into() };
        let errors = form.validate().unwrap_err();
        assert!(errors.field("username").is_some());
        assert_eq!(errors.field("password"), Some(&[PASSWORD_TOO_SHORT.to_string()][..]));
        let form = SignupForm { username: "leo.t".into(), email: "leo@example.com".into(), password: "long-enough".into() };
        assert_eq!(form.validate().unwrap(), ("leo.t".to_string(), "leo@example.com".to_string()));
    }

    #[test]
    fn comment_requires_text() {
        assert!(CommentForm { text: "\n".into() }.validate().is_err());
        assert_eq!(CommentForm { text: " nice ".into() }.validate().unwrap(), "nice");
    }
}
