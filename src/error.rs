use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use tracing::error;

use crate::forms::FormErrors;
use crate::posts::PostError;
use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// Errors of the JSON API.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")] NotFound,
    #[error("authentication credentials were not provided or are invalid")] Unauthorized,
    #[error("you do not have permission to perform this action")] Forbidden,
    #[error("conflict")] Conflict,
    #[error("bad request: {0}")] BadRequest(String),
    /// Per-field messages, returned as the body itself.
    #[error("invalid input: {0}")] Validation(FormErrors),
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(FormErrors::single(field, message))
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::SelfFollow => ApiError::field("author", "You cannot follow yourself."),
            RepoError::Internal(msg) => {
                error!("repository failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<PostError> for ApiError {
    fn from(e: PostError) -> Self {
        match e {
            PostError::Repo(e) => e.into(),
            PostError::Invalid(errors) => ApiError::Validation(errors),
            PostError::NotAuthor => ApiError::Forbidden,
            PostError::Image(e) => {
                error!("image store failure: {e}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut res = HttpResponse::build(self.status_code());
        if matches!(self, ApiError::Unauthorized) {
            res.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
        }
        match self {
            ApiError::Validation(errors) => res.json(errors),
            _ => res.json(ApiErrorBody { error: self.to_string() }),
        }
    }
}

const NOT_FOUND_PAGE: &str = include_str!("../templates/misc/404.html");
const SERVER_ERROR_PAGE: &str = include_str!("../templates/misc/500.html");

/// Errors of the HTML views; rendered as standalone error pages.
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("page not found")] NotFound,
    #[error("bad request")] BadRequest,
    #[error("forbidden")] Forbidden,
    #[error("internal error")] Internal,
}

impl From<RepoError> for WebError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => WebError::NotFound,
            other => {
                error!("repository failure: {other}");
                WebError::Internal
            }
        }
    }
}

impl From<PostError> for WebError {
    fn from(e: PostError) -> Self {
        match e {
            PostError::Repo(e) => e.into(),
            PostError::Invalid(_) => WebError::BadRequest,
            // views redirect non-authors themselves; anything else reaching here is refused
            PostError::NotAuthor => WebError::Forbidden,
            PostError::Image(e) => {
                error!("image store failure: {e}");
                WebError::Internal
            }
        }
    }
}

impl From<tera::Error> for WebError {
    fn from(e: tera::Error) -> Self {
        error!("template rendering failed: {e:?}");
        WebError::Internal
    }
}

impl From<actix_multipart::MultipartError> for WebError {
    fn from(_: actix_multipart::MultipartError) -> Self {
        WebError::BadRequest
    }
}

impl ResponseError for WebError {
    fn status_code(&self) -> StatusCode {
        match self {
            WebError::NotFound => StatusCode::NOT_FOUND,
            WebError::BadRequest => StatusCode::BAD_REQUEST,
            WebError::Forbidden => StatusCode::FORBIDDEN,
            WebError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            WebError::NotFound => NOT_FOUND_PAGE.to_string(),
            WebError::BadRequest => "<!doctype html><title>400</title><h1>Bad request</h1>".to_string(),
            WebError::Forbidden => "<!doctype html><title>403</title><h1>Forbidden</h1>".to_string(),
            WebError::Internal => SERVER_ERROR_PAGE.to_string(),
        };
        HttpResponse::build(self.status_code())
            .content_type("text/html; charset=utf-8")
            .body(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_errors_map_to_distinct_pages() {
        assert_eq!(WebError::from(PostError::NotAuthor).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(WebError::from(PostError::Repo(RepoError::NotFound)).status_code(), StatusCode::NOT_FOUND);
        let invalid = PostError::Invalid(FormErrors::single("text", "x"));
        assert_eq!(WebError::from(invalid).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(PostError::NotAuthor).status_code(), StatusCode::FORBIDDEN);
    }
}
