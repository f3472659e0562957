// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Read-only JSON API over the scan store

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::db::{DiscoveredPanorama, ScanStore, StoreStats};
use crate::geo::BoundingBox;
use crate::regions::RegionIndex;
use crate::PanoscopeError;

/// Shared application state
pub struct AppState {
    pub store: ScanStore,
    pub regions: RegionIndex,
}

/// Error body returned by API handlers
pub struct ApiError(PanoscopeError);

impl From<PanoscopeError> for ApiError {
    fn from(err: PanoscopeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            PanoscopeError::InvalidBoundingBox(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("API request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/stats", get(api_get_stats))
        .route("/api/panoramas", get(api_get_panoramas))
        .route("/api/regions", get(api_get_regions))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn api_get_stats(State(state): State<Arc<AppState>>) -> Result<Json<StoreStats>, ApiError> {
    Ok(Json(state.store.stats()?))
}

#[derive(Debug, Deserialize)]
struct BboxQuery {
    north: f64,
    south: f64,
    east: f64,
    west: f64,
}

async fn api_get_panoramas(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BboxQuery>,
) -> Result<Json<Vec<DiscoveredPanorama>>, ApiError> {
    let bbox = BoundingBox::new(query.north, query.south, query.east, query.west)?;
    Ok(Json(state.store.coordinates_in_bbox(&bbox)?))
}

async fn api_get_regions(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, BoundingBox>> {
    Json(state.regions.entries().clone())
}

/// Start the API server with config and store
pub async fn start_server(config: AppConfig, store: ScanStore) -> crate::Result<()> {
    let regions = RegionIndex::load(config.regions.path.clone().into())?;
    let state = Arc::new(AppState { store, regions });

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API available at http://{}", addr);

    let router = create_router(state);
    axum::serve(listener, router)
        .await
        .map_err(|e| PanoscopeError::Server(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ProbeRecord;
    use crate::geo::Stage;

    fn state() -> Arc<AppState> {
        let store = ScanStore::in_memory().unwrap();
        store
            .insert_coordinates(&[(23.70, 92.70), (23.72, 92.75), (30.0, 80.0)], Stage::Coarse)
            .unwrap();
        for coord in store.pending(10).unwrap() {
            let hit = coord.lat < 25.0;
            store
                .record_probe(&ProbeRecord {
                    coord_id: coord.id,
                    raw_status: if hit { "OK" } else { "ZERO_RESULTS" }.to_string(),
                    pano_id: hit.then(|| format!("p{}", coord.id)),
                    children: Vec::new(),
                })
                .unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let regions = RegionIndex::load(dir.path().join("index_map.json")).unwrap();
        Arc::new(AppState { store, regions })
    }

    #[tokio::test]
    async fn test_panoramas_in_bbox() {
        let query = BboxQuery { north: 23.76, south: 23.65, east: 92.80, west: 92.65 };
        let Json(found) = api_get_panoramas(State(state()), Query(query)).await.ok().unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.pano_id.starts_with('p')));
    }

    #[tokio::test]
    async fn test_inverted_bbox_is_bad_request() {
        let query = BboxQuery { north: 23.0, south: 24.0, east: 92.80, west: 92.65 };
        let err = api_get_panoramas(State(state()), Query(query)).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stats_and_regions() {
        let state = state();
        let Json(stats) = api_get_stats(State(state.clone())).await.ok().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.hits, 2);

        let Json(regions) = api_get_regions(State(state)).await;
        assert!(regions.contains_key("aizawl"));
    }
}
