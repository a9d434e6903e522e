//! HTTP transport: the axum router, handlers, and error-to-response mapping
//! for the query service (spec §4.J).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::cache::{CacheKey, SampleCache};
use crate::catalog::Dataset;
use crate::error::Error;
use crate::params::QueryParameters;
use crate::time::{Clock, SystemClock};

/// Shared state handed to every handler: the dataset connection/catalog,
/// the sample-value cache, and the clock queries resolve `start`/`end`
/// against.
pub struct AppState {
    pub dataset: Dataset,
    pub cache: SampleCache,
    pub clock: Box<dyn Clock>,
}

impl AppState {
    #[must_use]
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            cache: SampleCache::new(),
            clock: Box::new(SystemClock),
        }
    }
}

/// Build the application router, serving the static asset directory at
/// `static_dir` (if given) alongside the JSON API (spec §4.J).
pub fn app(state: Arc<AppState>, static_dir: Option<&std::path::Path>) -> Router {
    let api = Router::new()
        .route("/api/query", post(query))
        .route("/api/tables", get(tables))
        .route("/api/columns", get(columns))
        .route("/api/samples", get(samples))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };

    router.layer(TraceLayer::new_for_http())
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({
            "error": self.to_string(),
            "sql": self.sql(),
        });
        (status, Json(body)).into_response()
    }
}

async fn query(
    State(state): State<Arc<AppState>>,
    Json(params): Json<QueryParameters>,
) -> Result<Json<crate::executor::QueryResponse>, Error> {
    let response =
        tokio::task::spawn_blocking(move || state.dataset.run_query(&params, state.clock.as_ref()))
            .await
            .expect("query task panicked")?;
    Ok(Json(response))
}

async fn tables(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.dataset.catalog.table_names())
}

#[derive(Debug, Deserialize)]
struct ColumnsQuery {
    table: String,
}

#[derive(Debug, serde::Serialize)]
struct ColumnOut {
    name: String,
    #[serde(rename = "type")]
    sql_type: String,
}

async fn columns(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ColumnsQuery>,
) -> Result<Json<Vec<ColumnOut>>, Error> {
    let columns = state
        .dataset
        .catalog
        .columns(&q.table)
        .ok_or_else(|| Error::Schema(format!("Unknown table: {}", q.table)))?;
    Ok(Json(
        columns
            .iter()
            .map(|c| ColumnOut {
                name: c.name.clone(),
                sql_type: c.sql_type.clone(),
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
struct SamplesQuery {
    table: String,
    column: String,
    #[serde(default, rename = "q")]
    substring: String,
}

async fn samples(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SamplesQuery>,
) -> Result<Json<Vec<String>>, Error> {
    state
        .dataset
        .catalog
        .column(&q.table, &q.column)
        .ok_or_else(|| Error::Schema(format!("Unknown column: {}", q.column)))?;

    let key = CacheKey {
        table: q.table.clone(),
        column: q.column.clone(),
        substring: q.substring.clone(),
    };
    if let Some(cached) = state.cache.get(&key) {
        return Ok(Json(cached));
    }

    let values = tokio::task::spawn_blocking(move || {
        state
            .dataset
            .sample_values(&q.table, &q.column, &q.substring)
    })
    .await
    .expect("sample task panicked")?;

    state.cache.put(key, values.clone());
    Ok(Json(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let dataset = Dataset::open(Some(std::path::Path::new("TEST"))).unwrap();
        Arc::new(AppState {
            dataset,
            cache: SampleCache::new(),
            clock: Box::new(crate::time::FixedClock(
                chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_opt(4, 0, 0)
                    .unwrap(),
            )),
        })
    }

    #[tokio::test]
    async fn tables_lists_known_tables() {
        let app = app(test_state(), None);
        let response = app
            .oneshot(Request::get("/api/tables").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let names: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert!(names.contains(&"events".to_string()));
    }

    #[tokio::test]
    async fn query_unknown_table_maps_to_400() {
        let app = app(test_state(), None);
        let body = serde_json::json!({ "table": "nope" }).to_string();
        let response = app
            .oneshot(
                Request::post("/api/query")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn query_samples_round_trips() {
        let app = app(test_state(), None);
        let body = serde_json::json!({ "table": "events" }).to_string();
        let response = app
            .oneshot(
                Request::post("/api/query")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
