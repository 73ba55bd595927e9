//! Runtime settings, read from the environment once at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const MIN_SECRET_LEN: usize = 32;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("JWT_SECRET must be at least {MIN_SECRET_LEN} characters long")]
    WeakSecret,
    #[error("invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub media_root: PathBuf,
    /// Zero disables the index page cache.
    pub index_cache_ttl: Duration,
    pub api_page_size: usize,
    pub allowed_origins: Vec<String>,
    pub enable_hsts: bool,
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

fn flag(name: &str) -> bool {
    env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        let mut settings = Self::with_secret(jwt_secret)?;
        settings.host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        settings.port = parsed("PORT", 8080)?;
        settings.database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        settings.access_token_ttl = Duration::from_secs(60 * parsed("ACCESS_TOKEN_MINUTES", 24 * 60u64)?);
        settings.refresh_token_ttl = Duration::from_secs(24 * 3600 * parsed("REFRESH_TOKEN_DAYS", 30u64)?);
        settings.media_root = env::var("MEDIA_ROOT").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("media"));
        settings.index_cache_ttl = Duration::from_secs(parsed("INDEX_CACHE_SECONDS", 20u64)?);
        settings.api_page_size = parsed("API_PAGE_SIZE", 10usize)?.max(1);
        settings.allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        settings.enable_hsts = flag("ENABLE_HSTS");
        Ok(settings)
    }

    /// Defaults around a given secret; what tests start from.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Result<Self, ConfigError> {
        let jwt_secret = jwt_secret.into();
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        Ok(Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: None,
            jwt_secret,
            access_token_ttl: Duration::from_secs(24 * 3600),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 3600),
            media_root: PathBuf::from("media"),
            index_cache_ttl: Duration::from_secs(20),
            api_page_size: 10,
            allowed_origins: Vec::new(),
            enable_hsts: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secret_is_rejected() {
        assert!(matches!(Settings::with_secret("short"), Err(ConfigError::WeakSecret)));
        let s = Settings::with_secret("x".repeat(MIN_SECRET_LEN)).unwrap();
        assert_eq!(s.api_page_size, 10);
        assert_eq!(s.index_cache_ttl, Duration::from_secs(20));
    }
}
