//! Stream Gateway endpoint
//!
//! `GET /relay?url=<upstream>&mode=<vod|live>&raw=<bool>`. HEAD is served by
//! the same handler and answered without a body.

use axum::{
    extract::{Query, State},
    http::{header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use relaytv_core::logging::generate_request_id;
use relaytv_proxy::RelayQuery;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::Instrument;

use crate::http::error::{AppError, AppResult};
use crate::http::AppState;

/// GET|HEAD /relay
pub async fn relay_stream(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<RelayQuery>,
) -> AppResult<Response> {
    let request = query.into_request()?;

    let span = tracing::info_span!(
        "relay",
        request_id = %generate_request_id(),
        host = request.target_url.host_str().unwrap_or_default(),
        %method,
    );

    async move {
        tracing::debug!(target_url = %request.target_url, raw = request.want_raw, "Relaying");
        let response = state.gateway.relay(method, &request, &headers).await?;
        tracing::debug!(status = %response.status(), "Upstream answered");
        Ok::<_, AppError>(response)
    }
    .instrument(span)
    .await
}

/// OPTIONS /relay - CORS preflight
pub async fn relay_options() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            ("Access-Control-Allow-Origin", "*"),
            ("Access-Control-Allow-Methods", "GET, HEAD, OPTIONS"),
            ("Access-Control-Allow-Headers", "*"),
            ("Access-Control-Max-Age", "86400"),
        ],
    )
}

/// Mount the gateway at `path`. Every answer is readable cross-origin,
/// error responses included.
pub fn create_relay_router(path: &str) -> Router<AppState> {
    Router::new()
        .route(path, get(relay_stream).options(relay_options))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
}
