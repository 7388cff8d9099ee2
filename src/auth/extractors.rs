use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::repo_types::User;
use crate::error::AuthError;

/// User attached to the request by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Handler-side access to the authenticated user.
pub struct AuthUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .map(|CurrentUser(user)| AuthUser(user.clone()))
            .ok_or(AuthError::Unauthenticated)
    }
}

/// `Json<T>` whose rejections use the `{status, message}` error body.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => {
                let message = rejection.body_text();
                debug!(status = %rejection.status(), %message, "json body rejected");
                Err(AuthError::Validation(message))
            }
        }
    }
}
