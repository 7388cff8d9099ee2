use std::net::SocketAddr;

use axum::{
    http::{StatusCode, Uri},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::auth;
use crate::middleware::{with_rate_limit, with_request_filters, with_response_layers};
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    let security = state.config.security.clone();

    let api = Router::new()
        .nest("/users", auth::router(state.clone()))
        .route("/health", get(|| async { "ok" }));
    let api = with_rate_limit(api, &security);

    let app = Router::new()
        .nest("/api/v1", api)
        .nest_service("/public", ServeDir::new(&state.config.public_dir))
        .fallback(not_found)
        .with_state(state);

    let app = with_request_filters(app, &security);
    let app = with_response_layers(app, &security);

    app.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
            })
            .on_response(
                |res: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 span: &tracing::Span| {
                    let status = res.status();
                    span.record("status", tracing::field::display(status));
                    if status.is_server_error() {
                        tracing::error!(%status, ?latency, "response");
                    } else {
                        tracing::info!(%status, ?latency, "response");
                    }
                },
            ),
    )
}

async fn not_found(uri: Uri) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "status": "fail",
            "message": format!("Can't find {uri} on this server!"),
        })),
    )
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
