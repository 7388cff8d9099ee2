use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Session cookie written on every successful auth operation.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub name: String,
    pub expires_days: i64,
    pub secure: bool,
    pub http_only: bool,
}

/// Middleware settings handed to `build_app`.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub rate_limit_enabled: bool,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
    pub body_limit_bytes: usize,
    pub cors_origins: Vec<String>,
    pub security_headers_enabled: bool,
}

impl SecurityConfig {
    /// Time to replenish a single request slot so that `rate_limit_max`
    /// requests fit in one window.
    pub fn replenish_period(&self) -> Duration {
        let max = u64::from(self.rate_limit_max.max(1));
        Duration::from_millis((self.rate_limit_window_secs * 1000 / max).max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub cookie: CookieConfig,
    pub security: SecurityConfig,
    pub reset_url_base: String,
    pub reset_token_ttl_minutes: i64,
    pub public_dir: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "authd".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authd-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24 * 90),
        };
        let cookie = CookieConfig {
            name: std::env::var("JWT_COOKIE_NAME").unwrap_or_else(|_| "jwt".into()),
            expires_days: env_or("JWT_COOKIE_EXPIRES_IN", 90),
            secure: env_or("COOKIE_SECURE", true),
            http_only: env_or("COOKIE_HTTP_ONLY", true),
        };
        let security = SecurityConfig {
            rate_limit_enabled: env_or("RATE_LIMIT_ENABLED", true),
            rate_limit_max: env_or("RATE_LIMIT_MAX", 100),
            rate_limit_window_secs: env_or("RATE_LIMIT_WINDOW_SECS", 60 * 60),
            body_limit_bytes: env_or("BODY_LIMIT_BYTES", 10 * 1024),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            security_headers_enabled: env_or("SECURITY_HEADERS_ENABLED", true),
        };
        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080),
            database_url,
            jwt,
            cookie,
            security,
            reset_url_base: std::env::var("RESET_URL_BASE")
                .unwrap_or_else(|_| "http://localhost:5173/resetPassword".into()),
            reset_token_ttl_minutes: env_or("RESET_TOKEN_TTL_MINUTES", 10),
            public_dir: std::env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".into()),
        })
    }
}
