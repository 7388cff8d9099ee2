use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failures of the user store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("corrupt user record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Every failure an auth operation can surface to a client.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Please provide both email and password")]
    MissingCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("There is no user with that email")]
    EmailNotRegistered,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Your account has been deactivated, please contact an administrator")]
    AccountDeactivated,

    #[error("You are not logged in, please log in to get access")]
    Unauthenticated,

    #[error("Invalid or expired token, please log in again")]
    InvalidToken,

    #[error("The user belonging to this token no longer exists")]
    UserGone,

    #[error("User recently changed password, please log in again")]
    StalePassword,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("Token is invalid or has expired")]
    TokenInvalidOrExpired,

    #[error("Your current password is incorrect")]
    IncorrectCurrentPassword,

    #[error("There was an error sending the email, try again later")]
    NotificationDeliveryFailed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_)
            | AuthError::MissingCredentials
            | AuthError::TokenInvalidOrExpired => StatusCode::BAD_REQUEST,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::UserNotFound
            | AuthError::InvalidPassword
            | AuthError::AccountDeactivated
            | AuthError::Unauthenticated
            | AuthError::InvalidToken
            | AuthError::UserGone
            | AuthError::StalePassword
            | AuthError::IncorrectCurrentPassword => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::EmailNotRegistered => StatusCode::NOT_FOUND,
            AuthError::Store(StoreError::DuplicateEmail) => StatusCode::CONFLICT,
            AuthError::NotificationDeliveryFailed
            | AuthError::Store(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (label, message) = if status.is_server_error() {
            error!(error = %self, "request failed");
            let message = match &self {
                AuthError::NotificationDeliveryFailed => self.to_string(),
                _ => "Something went wrong".to_string(),
            };
            ("error", message)
        } else {
            ("fail", self.to_string())
        };
        (status, Json(json!({ "status": label, "message": message }))).into_response()
    }
}
