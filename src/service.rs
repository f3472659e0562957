// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Entry points for collaborators: start a scan, query what was found,
//! fetch panoramas

use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::config::AppConfig;
use crate::db::{DiscoveredPanorama, ScanStore, StoreStats};
use crate::geo::BoundingBox;
use crate::http::{HttpTransport, ReqwestTransport, RetryPolicy, RetryingClient};
use crate::panorama::{CubeFaces, PanoramaFetcher};
use crate::ratelimit::RateLimiter;
use crate::retrieval::{RetrievalPipeline, RetrievalReport};
use crate::scanner::{GridScanner, ScanReport};
use crate::streetview::StreetViewClient;
use crate::Result;

/// Scan and retrieval core sharing one store and one rate budget
pub struct Panoscope {
    config: AppConfig,
    store: ScanStore,
    client: Arc<StreetViewClient>,
}

impl Panoscope {
    /// Build from configuration: opens the store and a real HTTP transport
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let key = config.require_api_key()?;
        let store = ScanStore::open(&config.database.path)?;
        info!("Scan store: {}", config.database.path);
        let transport = Arc::new(ReqwestTransport::new(config.api.timeout())?);
        Ok(Self::with_transport(config, store, transport, key))
    }

    /// Build around an existing store and transport
    pub fn with_transport(
        config: AppConfig,
        store: ScanStore,
        transport: Arc<dyn HttpTransport>,
        key: String,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.scan.rate_limit_per_min));
        let http = Arc::new(RetryingClient::new(
            transport,
            limiter,
            RetryPolicy::from_config(&config.api),
        ));
        let client = Arc::new(StreetViewClient::new(http, &config.api, key));
        Self { config, store, client }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &ScanStore {
        &self.store
    }

    pub fn scanner(&self) -> GridScanner {
        GridScanner::new(self.store.clone(), self.client.clone(), self.config.scan.clone())
    }

    /// Scan a bounding box to completion, or until `stop` turns true
    pub async fn start_scan(&self, bbox: &BoundingBox, stop: Option<watch::Receiver<bool>>) -> Result<ScanReport> {
        let scanner = match stop {
            Some(rx) => self.scanner().with_stop_signal(rx),
            None => self.scanner(),
        };
        scanner.run(bbox).await
    }

    /// Discovered panoramas inside a bounding box
    pub fn discovered(&self, bbox: &BoundingBox) -> Result<Vec<DiscoveredPanorama>> {
        bbox.validate()?;
        self.store.coordinates_in_bbox(bbox)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    pub fn fetcher(&self) -> PanoramaFetcher {
        PanoramaFetcher::new(self.client.clone(), self.config.download.face_size)
    }

    /// Fetch the six faces of one panorama
    pub async fn fetch_panorama(&self, pano_id: &str) -> Result<CubeFaces> {
        self.fetcher().fetch(pano_id).await
    }

    pub fn pipeline(&self) -> RetrievalPipeline {
        RetrievalPipeline::new(Arc::new(self.fetcher()), self.config.download.region.clone())
            .with_max_images(self.config.download.max_images)
    }

    /// Download every discovered panorama inside a bounding box
    pub async fn download(&self, bbox: &BoundingBox, out_dir: &Path) -> Result<RetrievalReport> {
        let pairs = self.discovered(bbox)?;
        info!("{} panoramas found in {}", pairs.len(), bbox);
        self.pipeline().retrieve(&pairs, out_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::*;
    use crate::http::HttpResponse;
    use crate::panorama::testing::{encoded_face, face_for_query};

    /// Metadata hit at (10.0, 20.0) only; static tiles always succeed
    fn transport() -> Arc<FakeTransport> {
        Arc::new(FakeTransport::new(|url, q| {
            if url.ends_with("/metadata") {
                let body = if query_value(q, "location") == Some("10,20") {
                    r#"{"status":"OK","pano_id":"P1"}"#
                } else {
                    r#"{"status":"ZERO_RESULTS"}"#
                };
                Ok(HttpResponse { status: 200, body: body.as_bytes().to_vec() })
            } else {
                Ok(HttpResponse { status: 200, body: encoded_face(face_for_query(q), 4) })
            }
        }))
    }

    fn core() -> Panoscope {
        let mut config = AppConfig::default();
        config.download.face_size = 4;
        config.scan.coarse_spacing = 0.5;
        config.api.backoff_base_ms = 1;
        config.api.backoff_max_ms = 2;
        Panoscope::with_transport(config, ScanStore::in_memory().unwrap(), transport(), "k".to_string())
    }

    #[tokio::test]
    async fn test_scan_query_download() {
        let core = core();
        let bbox = BoundingBox::new(10.0, 9.0, 21.0, 20.0).unwrap();

        let report = core.start_scan(&bbox, None).await.unwrap();
        assert_eq!(report.hits, 1);
        // 3×3 coarse lattice plus 8 fine neighbours of the hit
        assert_eq!(core.stats().unwrap().total, 17);

        let found = core.discovered(&bbox).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pano_id, "P1");

        // a sub-rectangle that excludes the hit
        let elsewhere = BoundingBox::new(9.5, 9.0, 21.0, 20.5).unwrap();
        assert!(core.discovered(&elsewhere).unwrap().is_empty());

        let dir = tempfile::tempdir().unwrap();
        let retrieved = core.download(&bbox, dir.path()).await.unwrap();
        assert_eq!(retrieved.saved, 1);
        assert!(dir.path().join("aizawl_P1_10.0_20.0_360.jpg").exists());
    }

    #[tokio::test]
    async fn test_fetch_panorama_by_id() {
        let faces = core().fetch_panorama("P1").await.unwrap();
        assert_eq!(faces.size(), 4);
    }
}
