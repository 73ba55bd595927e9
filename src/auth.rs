use actix_web::http::header::Header as _;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::time::Duration;

use crate::config::Settings;
use crate::error::ApiError;
use crate::models::{Id, User};
use crate::routes::AppState;

/// Cookie carrying the access token for the HTML views.
pub const AUTH_COOKIE: &str = "yatube_token";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // username
    pub uid: Id,
    pub exp: usize,
    pub kind: TokenKind,
}

/// Signing material plus token lifetimes.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.jwt_secret, settings.access_token_ttl, settings.refresh_token_ttl)
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Create a token of the given kind for a user.
    pub fn issue(&self, user: &User, kind: TokenKind) -> Result<String, jsonwebtoken::errors::Error> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = (chrono::Utc::now().timestamp() as u64).saturating_add(ttl.as_secs()) as usize;
        let claims = Claims { sub: user.username.clone(), uid: user.id, exp, kind };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Validate a token and check it is of the expected kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        if data.claims.kind != kind {
            return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
        }
        Ok(data.claims)
    }
}

/// Extractor yielding validated access-token `Claims`.
///
/// Looks at `Authorization: Bearer` first and falls back to the session
/// cookie, so the same extractor serves the API and the HTML views.
#[derive(Debug, Clone)]
pub struct Auth(pub Claims);

impl Auth {
    pub fn user_id(&self) -> Id {
        self.0.uid
    }

    pub fn username(&self) -> &str {
        &self.0.sub
    }
}

fn token_from(req: &HttpRequest) -> Option<String> {
    if let Ok(header) = Authorization::<Bearer>::parse(req) {
        return Some(header.into_scheme().token().to_string());
    }
    req.cookie(AUTH_COOKIE).map(|c| c.value().to_string())
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            return ready(Err(ApiError::Internal));
        };
        let result = match token_from(req) {
            Some(token) => state.keys.verify(&token, TokenKind::Access).map(Auth).map_err(|_| ApiError::Unauthorized),
            None => Err(ApiError::Unauthorized),
        };
        ready(result)
    }
}

#[derive(thiserror::Error, Debug)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(String);

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PasswordError(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new("test-secret-must-be-32-bytes-long!!", Duration::from_secs(60), Duration::from_secs(120))
    }

    fn user() -> User {
        User { id: 7, username: "leo".into(), email: String::new(), password_hash: String::new() }
    }

    #[test]
    fn access_token_roundtrip() {
        let k = keys();
        let token = k.issue(&user(), TokenKind::Access).unwrap();
        let claims = k.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, "leo");
        assert_eq!(claims.uid, 7);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let k = keys();
        let token = k.issue(&user(), TokenKind::Refresh).unwrap();
        assert!(k.verify(&token, TokenKind::Access).is_err());
        assert!(k.verify(&token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(verify_password("s3cret-pass", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret-pass", "not-a-hash"));
    }
}
