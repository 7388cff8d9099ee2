use axum::{
    extract::{Path, Request, State},
    http::{
        header::{HOST, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{
        DataResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, ResetPasswordRequest,
        SignupRequest, TokenResponse, UpdatePasswordRequest, UserData, UsersData,
    },
    extractors::{AuthUser, JsonBody},
    guard::{require_auth, restrict_to, ADMIN_ONLY},
    services,
};
use crate::{config::CookieConfig, error::AuthError, state::AppState};

pub fn auth_routes(state: AppState) -> Router<AppState> {
    let protected: Router<AppState> = Router::new()
        .route("/updateMyPassword", patch(update_password))
        .route("/me", get(get_me));

    let admin: Router<AppState> = Router::new()
        .route("/", get(list_users))
        .route_layer(middleware::from_fn(|req: Request, next: Next| {
            restrict_to(ADMIN_ONLY, req, next)
        }));

    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/forgotPassword", post(forgot_password))
        .route("/resetPassword/:token", patch(reset_password))
        .merge(
            protected
                .merge(admin)
                .route_layer(middleware::from_fn_with_state(state, require_auth)),
        )
}

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(cfg: &CookieConfig, token: &str) -> Result<HeaderValue, AuthError> {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; SameSite=Lax",
        cfg.name,
        token,
        cfg.expires_days * 24 * 60 * 60
    );
    if cfg.secure {
        cookie.push_str("; Secure");
    }
    if cfg.http_only {
        cookie.push_str("; HttpOnly");
    }
    HeaderValue::from_str(&cookie).map_err(|e| AuthError::Internal(e.into()))
}

/// `Set-Cookie` value that expires the session cookie immediately.
pub fn cleared_cookie(cfg: &CookieConfig) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(&format!("{}=loggedout; Path=/; Max-Age=0", cfg.name))
        .map_err(|e| AuthError::Internal(e.into()))
}

/// Base URL of this server as seen by the client.
fn site_url(state: &AppState, headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    match headers.get(HOST).and_then(|v| v.to_str().ok()) {
        Some(host) => format!("{scheme}://{host}/"),
        None => format!("{scheme}://{}:{}/", state.config.host, state.config.port),
    }
}

fn with_token(
    state: &AppState,
    status: StatusCode,
    body: TokenResponse,
) -> Result<Response, AuthError> {
    let cookie = session_cookie(&state.config.cookie, &body.token)?;
    Ok((status, [(SET_COOKIE, cookie)], Json(body)).into_response())
}

#[instrument(skip(state, headers, payload))]
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<Response, AuthError> {
    let url = site_url(&state, &headers);
    let (user, token) = services::signup(&state, payload, &url).await?;
    with_token(
        &state,
        StatusCode::CREATED,
        TokenResponse {
            status: "success",
            message: Some("New user created"),
            token,
            data: Some(UserData { user }),
        },
    )
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Response, AuthError> {
    let (_, token) = services::login(&state, payload).await?;
    with_token(
        &state,
        StatusCode::OK,
        TokenResponse {
            status: "success",
            message: Some("Logged in successfully"),
            token,
            data: None,
        },
    )
}

#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> Result<Response, AuthError> {
    let cookie = cleared_cookie(&state.config.cookie)?;
    info!("session cookie cleared");
    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(MessageResponse {
            status: "success",
            message: "Logged out successfully",
        }),
    )
        .into_response())
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    services::forgot_password(&state, &payload.email).await?;
    Ok(Json(MessageResponse {
        status: "success",
        message: "Reset link has been sent to your email",
    }))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> Result<Response, AuthError> {
    let (_, token) = services::reset_password(&state, &token, payload).await?;
    with_token(
        &state,
        StatusCode::OK,
        TokenResponse {
            status: "success",
            message: None,
            token,
            data: None,
        },
    )
}

#[instrument(skip_all)]
pub async fn update_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(payload): JsonBody<UpdatePasswordRequest>,
) -> Result<Response, AuthError> {
    let (_, token) = services::update_password(&state, user.id, payload).await?;
    with_token(
        &state,
        StatusCode::OK,
        TokenResponse {
            status: "success",
            message: None,
            token,
            data: None,
        },
    )
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<DataResponse<UserData>> {
    Json(DataResponse {
        status: "success",
        results: None,
        data: UserData { user },
    })
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<UsersData>>, AuthError> {
    let users = state.users.list().await?;
    Ok(Json(DataResponse {
        status: "success",
        results: Some(users.len()),
        data: UsersData { users },
    }))
}
