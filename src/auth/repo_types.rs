use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::reset::ResetCredential;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(StoreError::Corrupt(format!("unknown role {other:?}"))),
        }
    }
}

/// User record. Credential, activation flag and reset fields never leave
/// the server.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub active: bool,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub reset: Option<ResetCredential>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn new(name: Option<String>, email: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash,
            role: Role::User,
            active: true,
            password_changed_at: None,
            reset: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Replaces the credential. Back-dated by one second so a token minted
    /// right after the change is still fresh.
    pub fn set_password(&mut self, password_hash: String, now: OffsetDateTime) {
        self.password_hash = password_hash;
        self.password_changed_at = Some(now - Duration::seconds(1));
        self.reset = None;
    }

    /// True when the password changed after a token issued at `iat`
    /// (unix seconds).
    ///
    /// Both sides are whole seconds and the change is back-dated by one, so
    /// tokens issued in the second of the change or the second before it
    /// still pass. Anything older is stale.
    pub fn changed_password_after(&self, iat: i64) -> bool {
        self.password_changed_at
            .map(|changed| changed.unix_timestamp() > iat)
            .unwrap_or(false)
    }
}

/// Row layout of the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub active: bool,
    pub password_changed_at: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            role: r.role.parse()?,
            active: r.active,
            password_changed_at: r.password_changed_at,
            reset: ResetCredential::from_parts(r.password_reset_token, r.password_reset_expires),
            created_at: r.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_hides_secrets() {
        let mut user = User::new(Some("Ann".into()), "a@b.com".into(), "$argon2id$hash".into());
        let (_, cred) = ResetCredential::issue(Duration::minutes(10), OffsetDateTime::now_utc());
        user.reset = Some(cred);

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["email"], "a@b.com");
        assert_eq!(json["role"], "user");
        assert!(json.get("password_hash").is_none());
        assert!(json.get("password").is_none());
        assert!(json.get("reset").is_none());
        assert!(json.get("active").is_none());
    }

    #[test]
    fn set_password_clears_reset_and_backdates_change() {
        let now = OffsetDateTime::now_utc();
        let mut user = User::new(None, "a@b.com".into(), "old".into());
        let (_, cred) = ResetCredential::issue(Duration::minutes(10), now);
        user.reset = Some(cred);

        user.set_password("new".into(), now);
        assert_eq!(user.password_hash, "new");
        assert!(user.reset.is_none());
        assert_eq!(user.password_changed_at, Some(now - Duration::seconds(1)));
        assert!(!user.changed_password_after(now.unix_timestamp()));
        assert!(user.changed_password_after(now.unix_timestamp() - 60));
    }

    #[test]
    fn freshness_window_is_the_current_and_previous_second() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
            + Duration::milliseconds(500);
        let mut user = User::new(None, "a@b.com".into(), "old".into());
        user.set_password("new".into(), now);

        assert!(!user.changed_password_after(1_700_000_000));
        assert!(!user.changed_password_after(1_699_999_999));
        assert!(user.changed_password_after(1_699_999_998));
    }

    #[test]
    fn never_changed_is_always_fresh() {
        let user = User::new(None, "a@b.com".into(), "h".into());
        assert!(!user.changed_password_after(0));
    }

    #[test]
    fn role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::User.to_string(), "user");
        assert!("root".parse::<Role>().is_err());
    }
}
