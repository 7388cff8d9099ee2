use axum::extract::FromRef;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, ResetPasswordRequest, SignupRequest, UpdatePasswordRequest},
    jwt::JwtKeys,
    password::{hash_password, is_valid_email, normalize_email, validate_new_password, verify_password},
    repo_types::User,
    reset::{hash_reset_secret, ResetCredential},
};
use crate::{
    error::{AuthError, StoreError},
    mailer::Email,
    state::AppState,
};

fn keys(st: &AppState) -> JwtKeys {
    JwtKeys::from_ref(st)
}

/// Pulls the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn signup(
    st: &AppState,
    req: SignupRequest,
    site_url: &str,
) -> Result<(User, String), AuthError> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AuthError::Validation("Please provide a valid email".into()));
    }
    validate_new_password(&req.password, &req.password_confirm)?;

    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let hash = hash_password(&req.password)?;

    let user = match st.users.insert(User::new(name, email, hash)).await {
        Ok(u) => u,
        Err(StoreError::DuplicateEmail) => {
            warn!(email = %req.email, "email already registered");
            return Err(AuthError::EmailTaken);
        }
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = st.mailer.send(Email::welcome(&user, site_url)).await {
        warn!(error = %e, user_id = %user.id, "welcome email failed");
    }

    let token = keys(st).issue(user.id)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((user, token))
}

pub async fn login(st: &AppState, req: LoginRequest) -> Result<(User, String), AuthError> {
    let email = req.email.as_deref().map(normalize_email).unwrap_or_default();
    let password = req.password.unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    let user = st
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| {
            warn!(email = %email, "login unknown email");
            AuthError::UserNotFound
        })?;

    if !verify_password(&password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AuthError::InvalidPassword);
    }

    if !user.active {
        warn!(user_id = %user.id, "login on deactivated account");
        return Err(AuthError::AccountDeactivated);
    }

    let token = keys(st).issue(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, token))
}

/// Resolves the user behind a bearer token, rejecting tokens minted before
/// the user's last password change.
pub async fn protect(st: &AppState, authorization: Option<&str>) -> Result<User, AuthError> {
    let token = bearer_token(authorization).ok_or(AuthError::Unauthenticated)?;

    let claims = keys(st).verify(token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        AuthError::InvalidToken
    })?;

    let user = st
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AuthError::UserGone)?;

    if user.changed_password_after(claims.iat) {
        warn!(user_id = %user.id, "token predates password change");
        return Err(AuthError::StalePassword);
    }

    Ok(user)
}

pub async fn forgot_password(st: &AppState, email: &str) -> Result<(), AuthError> {
    let email = normalize_email(email);
    let mut user = st
        .users
        .find_by_email(&email)
        .await?
        .ok_or(AuthError::EmailNotRegistered)?;

    let ttl_minutes = st.config.reset_token_ttl_minutes;
    let (raw, credential) =
        ResetCredential::issue(Duration::minutes(ttl_minutes), OffsetDateTime::now_utc());
    user.reset = Some(credential);
    st.users.save(&user).await?;

    let url = format!("{}/{}", st.config.reset_url_base.trim_end_matches('/'), raw);
    if let Err(e) = st
        .mailer
        .send(Email::password_reset(&user, &url, ttl_minutes))
        .await
    {
        error!(error = %e, user_id = %user.id, "password reset email failed; revoking token");
        user.reset = None;
        if let Err(e) = st.users.save(&user).await {
            error!(error = %e, user_id = %user.id, "failed to revoke reset token");
        }
        return Err(AuthError::NotificationDeliveryFailed);
    }

    info!(user_id = %user.id, "password reset token sent");
    Ok(())
}

pub async fn reset_password(
    st: &AppState,
    raw_token: &str,
    req: ResetPasswordRequest,
) -> Result<(User, String), AuthError> {
    let now = OffsetDateTime::now_utc();
    let mut user = st
        .users
        .find_by_reset_token(&hash_reset_secret(raw_token), now)
        .await?
        .ok_or(AuthError::TokenInvalidOrExpired)?;

    validate_new_password(&req.password, &req.password_confirm)?;
    user.set_password(hash_password(&req.password)?, now);
    st.users.save(&user).await?;

    let token = keys(st).issue(user.id)?;
    info!(user_id = %user.id, "password reset");
    Ok((user, token))
}

pub async fn update_password(
    st: &AppState,
    user_id: Uuid,
    req: UpdatePasswordRequest,
) -> Result<(User, String), AuthError> {
    let mut user = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AuthError::UserGone)?;

    if !verify_password(&req.password_current, &user.password_hash)? {
        warn!(user_id = %user.id, "incorrect current password");
        return Err(AuthError::IncorrectCurrentPassword);
    }

    validate_new_password(&req.password, &req.password_confirm)?;
    user.set_password(hash_password(&req.password)?, OffsetDateTime::now_utc());
    st.users.save(&user).await?;

    let token = keys(st).issue(user.id)?;
    info!(user_id = %user.id, "password updated");
    Ok((user, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::Role;

    fn signup_req(email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            name: Some("Ann".into()),
            email: email.into(),
            password: password.into(),
            password_confirm: password.into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[tokio::test]
    async fn signup_token_resolves_to_created_user() {
        let (st, mailer) = AppState::fake();
        let (user, token) = signup(&st, signup_req("A@B.com", "secret123"), "http://h/")
            .await
            .unwrap();
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "secret123");

        let claims = keys(&st).verify(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.sent()[0].to, "a@b.com");
    }

    #[tokio::test]
    async fn signup_survives_welcome_failure() {
        let (st, mailer) = AppState::fake();
        mailer.set_failing(true);
        let (user, _) = signup(&st, signup_req("a@b.com", "secret123"), "http://h/")
            .await
            .unwrap();
        assert!(st.users.find_by_id(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn signup_validation() {
        let (st, _) = AppState::fake();
        let err = signup(&st, signup_req("nope", "secret123"), "u").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let mut req = signup_req("a@b.com", "secret123");
        req.password_confirm = "different1".into();
        let err = signup(&st, req, "u").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        signup(&st, signup_req("a@b.com", "secret123"), "u").await.unwrap();
        let err = signup(&st, signup_req("a@b.com", "secret123"), "u").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn login_failures_are_distinguishable() {
        let (st, _) = AppState::fake();
        signup(&st, signup_req("a@b.com", "secret123"), "u").await.unwrap();

        let err = login(&st, login_req("a@b.com", "wrong-pass")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidPassword));

        let err = login(&st, login_req("x@y.com", "secret123")).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));

        let err = login(
            &st,
            LoginRequest {
                email: Some("a@b.com".into()),
                password: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));

        let (user, token) = login(&st, login_req(" A@b.com", "secret123")).await.unwrap();
        assert_eq!(keys(&st).verify(&token).unwrap().sub, user.id);
    }

    #[tokio::test]
    async fn login_rejects_deactivated_account() {
        let (st, _) = AppState::fake();
        let (mut user, _) = signup(&st, signup_req("a@b.com", "secret123"), "u").await.unwrap();
        user.active = false;
        st.users.save(&user).await.unwrap();

        let err = login(&st, login_req("a@b.com", "secret123")).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountDeactivated));
    }

    #[tokio::test]
    async fn protect_guards() {
        let (st, _) = AppState::fake();
        let (user, token) = signup(&st, signup_req("a@b.com", "secret123"), "u").await.unwrap();

        let found = protect(&st, Some(&bearer(&token))).await.unwrap();
        assert_eq!(found.id, user.id);

        assert!(matches!(
            protect(&st, None).await.unwrap_err(),
            AuthError::Unauthenticated
        ));
        assert!(matches!(
            protect(&st, Some("Bearer garbage")).await.unwrap_err(),
            AuthError::InvalidToken
        ));

        let ghost = keys(&st).issue(Uuid::new_v4()).unwrap();
        assert!(matches!(
            protect(&st, Some(&bearer(&ghost))).await.unwrap_err(),
            AuthError::UserGone
        ));
    }

    #[tokio::test]
    async fn token_issued_before_password_change_is_stale() {
        let (st, _) = AppState::fake();
        let (user, _) = signup(&st, signup_req("a@b.com", "secret123"), "u").await.unwrap();
        let old = keys(&st)
            .sign_at(user.id, OffsetDateTime::now_utc() - Duration::minutes(5))
            .unwrap();
        assert!(protect(&st, Some(&bearer(&old))).await.is_ok());

        let (_, fresh) = update_password(
            &st,
            user.id,
            UpdatePasswordRequest {
                password_current: "secret123".into(),
                password: "newsecret1".into(),
                password_confirm: "newsecret1".into(),
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            protect(&st, Some(&bearer(&old))).await.unwrap_err(),
            AuthError::StalePassword
        ));
        assert!(protect(&st, Some(&bearer(&fresh))).await.is_ok());
        assert!(login(&st, login_req("a@b.com", "newsecret1")).await.is_ok());
    }

    #[tokio::test]
    async fn update_password_requires_current() {
        let (st, _) = AppState::fake();
        let (user, _) = signup(&st, signup_req("a@b.com", "secret123"), "u").await.unwrap();
        let err = update_password(
            &st,
            user.id,
            UpdatePasswordRequest {
                password_current: "wrong-one".into(),
                password: "newsecret1".into(),
                password_confirm: "newsecret1".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::IncorrectCurrentPassword));
    }

    #[tokio::test]
    async fn forgot_then_reset_password() {
        let (st, mailer) = AppState::fake();
        signup(&st, signup_req("a@b.com", "secret123"), "u").await.unwrap();

        forgot_password(&st, "a@b.com").await.unwrap();
        let stored = st.users.find_by_email("a@b.com").await.unwrap().unwrap();
        let cred = stored.reset.clone().expect("reset credential stored");

        let mail = mailer.sent().pop().unwrap();
        let raw = mail
            .body
            .split("/resetPassword/")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap()
            .to_string();
        assert_ne!(raw, cred.hash);
        assert_eq!(hash_reset_secret(&raw), cred.hash);

        let (user, token) = reset_password(
            &st,
            &raw,
            ResetPasswordRequest {
                password: "brandnew1".into(),
                password_confirm: "brandnew1".into(),
            },
        )
        .await
        .unwrap();
        assert!(user.reset.is_none());
        assert!(protect(&st, Some(&bearer(&token))).await.is_ok());
        assert!(login(&st, login_req("a@b.com", "brandnew1")).await.is_ok());

        let again = reset_password(
            &st,
            &raw,
            ResetPasswordRequest {
                password: "another12".into(),
                password_confirm: "another12".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(again, AuthError::TokenInvalidOrExpired));
    }

    #[tokio::test]
    async fn forgot_password_unknown_email() {
        let (st, _) = AppState::fake();
        let err = forgot_password(&st, "x@y.com").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailNotRegistered));
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_reset_email_revokes_token() {
        let (st, mailer) = AppState::fake();
        signup(&st, signup_req("a@b.com", "secret123"), "u").await.unwrap();
        mailer.set_failing(true);

        let err = forgot_password(&st, "a@b.com").await.unwrap_err();
        assert!(matches!(err, AuthError::NotificationDeliveryFailed));

        let stored = st.users.find_by_email("a@b.com").await.unwrap().unwrap();
        assert!(stored.reset.is_none());
    }

    #[tokio::test]
    async fn expired_reset_secret_is_rejected() {
        let (st, _) = AppState::fake();
        let (mut user, _) = signup(&st, signup_req("a@b.com", "secret123"), "u").await.unwrap();
        let (raw, cred) = ResetCredential::issue(
            Duration::minutes(10),
            OffsetDateTime::now_utc() - Duration::minutes(11),
        );
        user.reset = Some(cred);
        st.users.save(&user).await.unwrap();

        let err = reset_password(
            &st,
            &raw,
            ResetPasswordRequest {
                password: "brandnew1".into(),
                password_confirm: "brandnew1".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalidOrExpired));
    }
}
