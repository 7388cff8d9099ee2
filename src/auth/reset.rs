use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

/// One-way transform applied to a raw reset secret, both when it is stored
/// and when an inbound token is checked.
pub fn hash_reset_secret(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// Stored half of a password reset: the hash of the secret mailed to the
/// user and the instant it stops being accepted. Hash and expiry only ever
/// exist together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetCredential {
    pub hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl ResetCredential {
    /// Generates a fresh secret. Returns the raw value for the user and the
    /// credential to persist.
    pub fn issue(ttl: Duration, now: OffsetDateTime) -> (String, Self) {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let raw: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        let credential = Self {
            hash: hash_reset_secret(&raw),
            expires_at: now + ttl,
        };
        (raw, credential)
    }

    /// Rebuilds a credential from the two nullable columns it is stored in.
    pub fn from_parts(hash: Option<String>, expires_at: Option<OffsetDateTime>) -> Option<Self> {
        match (hash, expires_at) {
            (Some(hash), Some(expires_at)) => Some(Self { hash, expires_at }),
            _ => None,
        }
    }

    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }

    pub fn accepts(&self, hash: &str, now: OffsetDateTime) -> bool {
        self.hash == hash && self.is_live_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_hex_sha256() {
        let a = hash_reset_secret("abc");
        assert_eq!(a, hash_reset_secret("abc"));
        assert_eq!(
            a,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(a, hash_reset_secret("abd"));
    }

    #[test]
    fn issue_stores_only_the_hash() {
        let now = OffsetDateTime::now_utc();
        let (raw, cred) = ResetCredential::issue(Duration::minutes(10), now);
        assert_eq!(raw.len(), 64);
        assert_ne!(cred.hash, raw);
        assert_eq!(cred.hash, hash_reset_secret(&raw));
        assert_eq!(cred.expires_at, now + Duration::minutes(10));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = OffsetDateTime::now_utc();
        let (raw, cred) = ResetCredential::issue(Duration::minutes(10), now);
        let hash = hash_reset_secret(&raw);
        assert!(cred.accepts(&hash, now));
        assert!(!cred.accepts(&hash, cred.expires_at));
        assert!(!cred.accepts(&hash, cred.expires_at + Duration::seconds(1)));
        assert!(!cred.accepts("other", now));
    }

    #[test]
    fn from_parts_requires_both_columns() {
        let now = OffsetDateTime::now_utc();
        assert!(ResetCredential::from_parts(Some("h".into()), None).is_none());
        assert!(ResetCredential::from_parts(None, Some(now)).is_none());
        assert!(ResetCredential::from_parts(Some("h".into()), Some(now)).is_some());
    }
}
