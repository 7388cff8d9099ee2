use async_trait::async_trait;
use tracing::info;

use crate::auth::repo_types::User;

/// Rendered notification ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    fn greeting(user: &User) -> String {
        let first = user
            .name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or("there");
        format!("Hi {first},")
    }

    pub fn welcome(user: &User, url: &str) -> Self {
        Self {
            to: user.email.clone(),
            subject: "Welcome aboard!".into(),
            body: format!(
                "{}\n\nYour account is ready. Get started at {url}\n",
                Self::greeting(user)
            ),
        }
    }

    pub fn password_reset(user: &User, url: &str, valid_minutes: i64) -> Self {
        Self {
            to: user.email.clone(),
            subject: format!("Your password reset token (valid for {valid_minutes} minutes)"),
            body: format!(
                "{}\n\nForgot your password? Submit a PATCH request with your new password \
                 and passwordConfirm to: {url}\nIf you didn't forget your password, \
                 please ignore this email.\n",
                Self::greeting(user)
            ),
        }
    }
}

/// Outbound notification channel.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        info!(to = %email.to, subject = %email.subject, body = %email.body, "email dispatched");
        Ok(())
    }
}

#[cfg(test)]
pub mod fake {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    };

    use super::*;

    /// Records every message; fails on demand.
    #[derive(Default)]
    pub struct FakeMailer {
        pub sent: Mutex<Vec<Email>>,
        pub fail: AtomicBool,
    }

    impl FakeMailer {
        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<Email> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for FakeMailer {
        async fn send(&self, email: Email) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("smtp unavailable");
            }
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }
}
