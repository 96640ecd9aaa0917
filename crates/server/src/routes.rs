//! HTTP routes.
//!
//! The target URL is the request path: `GET /example.com/page` or
//! `GET /https%3A%2F%2Fexample.com%2Fpage`. The request's own query string is
//! reserved for options (`?debug`).

use axum::Router;
use axum::extract::{Query, State};
use axum::extract::rejection::QueryRejection;
use axum::http::{HeaderMap, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;

use ogproxy_client::{FetchRequest, assemble, cache_key, normalize, target_from_path};
use ogproxy_core::AppConfig;

use crate::error::ApiError;
use crate::state::AppState;

/// Inbound header whose suffix names the serving edge location.
const RAY_HEADER: &str = "cf-ray";

#[derive(Debug, Default)]
pub struct OgQuery {
    debug: Option<String>,
}

impl OgQuery {
    /// Options from raw query pairs. Unknown keys are ignored; for repeated
    /// keys the last occurrence wins.
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let debug = pairs
            .into_iter()
            .filter(|(key, _)| key == "debug")
            .map(|(_, value)| value)
            .next_back();
        Self { debug }
    }

    /// `?debug`, `?debug=1` and `?debug=true` all count; `false` and `0` do not.
    fn debug_requested(&self) -> bool {
        self.debug
            .as_deref()
            .is_some_and(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0"))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(open_graph))
        .route("/{*target}", get(open_graph))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Fetch the target page and return its Open Graph record.
async fn open_graph(
    State(state): State<AppState>, query: Result<Query<Vec<(String, String)>>, QueryRejection>, headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ApiError> {
    let Query(pairs) = query.map_err(|e| ApiError::InvalidUrl(format!("Invalid query string: {}", e.body_text())))?;
    let query = OgQuery::from_pairs(pairs);
    let target = target_from_path(uri.path())?;
    let url = normalize(&target)?;
    let request_url = url.to_string();

    let accept_language = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let key = cache_key(&url, accept_language.as_deref());

    let config = &state.config;
    let resolved = state
        .cacher
        .resolve(
            &key,
            || {
                let request = FetchRequest::get(url).header(header::USER_AGENT, &config.user_agent);
                match &accept_language {
                    Some(lang) => request.header(header::ACCEPT_LANGUAGE, lang),
                    None => request,
                }
            },
            config.cache_ttl_secs,
            config.use_upstream_cache,
        )
        .await?;

    let data = assemble(resolved, &request_url, colo(&headers, config), query.debug_requested()).await?;
    let body = serde_json::to_string_pretty(&data).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        body,
    )
        .into_response())
}

/// Edge location serving this request: the `cf-ray` suffix when present,
/// otherwise the configured one.
fn colo(headers: &HeaderMap, config: &AppConfig) -> Option<String> {
    headers
        .get(RAY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|ray| ray.rsplit_once('-'))
        .map(|(_, colo)| colo.trim())
        .filter(|colo| !colo.is_empty())
        .map(str::to_string)
        .or_else(|| config.colo.clone())
}
