use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use metrics::counter;

use crate::application::relay::{FALLBACK_CONTENT_TYPE, RELAY_CACHE_CONTROL, RelayedImage};
use crate::domain::profile::ProfileRecord;
use crate::domain::role::RoleTier;

use super::error::ApiError;
use super::models::{RelayQuery, RoleListResponse, RoleResponse};
use super::state::ApiState;

const METRIC_RELAY_REQUESTS_TOTAL: &str = "ritual_relay_requests_total";

pub async fn relay_image(
    State(state): State<ApiState>,
    Query(query): Query<RelayQuery>,
) -> Result<Response, ApiError> {
    let relayed = state.relay.relay(query.url.as_deref()).await;

    let outcome = match &relayed {
        Ok(_) => "ok",
        Err(err) => err.outcome(),
    };
    counter!(METRIC_RELAY_REQUESTS_TOTAL, "outcome" => outcome).increment(1);

    Ok(relay_response(relayed?))
}

fn relay_response(image: RelayedImage) -> Response {
    let RelayedImage { content_type, body } = image;
    let content_type = HeaderValue::from_str(&content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(RELAY_CACHE_CONTROL));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

pub async fn get_profile(
    State(state): State<ApiState>,
    Path(handle): Path<String>,
) -> Result<Json<ProfileRecord>, ApiError> {
    let record = state.resolver.resolve(&handle).await?;
    Ok(Json(record))
}

pub async fn list_roles() -> Json<RoleListResponse> {
    Json(RoleListResponse {
        roles: RoleTier::ALL.into_iter().map(RoleResponse::from).collect(),
    })
}

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
