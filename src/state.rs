use std::sync::Arc;

use crate::auth::repo::{MemoryUserStore, PgUserStore, UserStore};
use crate::config::AppConfig;
use crate::mailer::{LogMailer, Mailer};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let users = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await?;

                if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                    tracing::warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>
            }
            None => {
                tracing::warn!("DATABASE_URL not set; users are kept in memory");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
        };

        let mailer = Arc::new(LogMailer) as Arc<dyn Mailer>;

        Ok(Self {
            config,
            users,
            mailer,
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            users,
            mailer,
        }
    }
}

#[cfg(test)]
impl AppState {
    /// Memory store plus a recording mailer; rate limiting off because
    /// `oneshot` requests carry no peer address.
    pub fn fake() -> (Self, Arc<crate::mailer::fake::FakeMailer>) {
        use crate::config::{CookieConfig, JwtConfig, SecurityConfig};
        use crate::mailer::fake::FakeMailer;

        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 60,
            },
            cookie: CookieConfig {
                name: "jwt".into(),
                expires_days: 90,
                secure: true,
                http_only: true,
            },
            security: SecurityConfig {
                rate_limit_enabled: false,
                rate_limit_max: 100,
                rate_limit_window_secs: 3600,
                body_limit_bytes: 10 * 1024,
                cors_origins: vec![],
                security_headers_enabled: true,
            },
            reset_url_base: "http://localhost:5173/resetPassword".into(),
            reset_token_ttl_minutes: 10,
            public_dir: "public".into(),
        });

        let mailer = Arc::new(FakeMailer::default());
        let state = Self::from_parts(
            config,
            Arc::new(MemoryUserStore::new()),
            mailer.clone() as Arc<dyn Mailer>,
        );
        (state, mailer)
    }
}
