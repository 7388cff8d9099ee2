//! Route guards: `require_auth` resolves the caller from the bearer token,
//! `RestrictTo` then limits a route to a fixed set of roles.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::{extractors::CurrentUser, repo_types::Role, repo_types::User, services};
use crate::{error::AuthError, state::AppState};

/// Middleware run before protected handlers. Attaches the resolved user to
/// the request extensions.
pub async fn require_auth(
    State(st): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned);
    let user = services::protect(&st, header.as_deref()).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Declarative role restriction, composed after `require_auth`.
#[derive(Debug, Clone, Copy)]
pub struct RestrictTo {
    allowed: &'static [Role],
}

impl RestrictTo {
    pub const fn roles(allowed: &'static [Role]) -> Self {
        Self { allowed }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }

    pub fn check(&self, user: &User) -> Result<(), AuthError> {
        if self.permits(user.role) {
            Ok(())
        } else {
            warn!(user_id = %user.id, role = %user.role, "role not permitted");
            Err(AuthError::Forbidden)
        }
    }
}

pub const ADMIN_ONLY: RestrictTo = RestrictTo::roles(&[Role::Admin]);

pub async fn restrict_to(
    guard: RestrictTo,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let CurrentUser(user) = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or(AuthError::Unauthenticated)?;
    guard.check(user)?;
    Ok(next.run(req).await)
}
