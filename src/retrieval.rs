// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Batch retrieval: fetch, reproject and persist discovered panoramas

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::db::DiscoveredPanorama;
use crate::panorama::PanoramaFetcher;
use crate::reproject::reproject;
use crate::{PanoscopeError, Result};

/// A pair that could not be saved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalFailure {
    pub panorama: DiscoveredPanorama,
    pub error: String,
}

/// Outcome of a retrieval batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalReport {
    pub saved: usize,
    pub failures: Vec<RetrievalFailure>,
    /// Pairs left untouched because `max_images` was reached
    pub skipped: usize,
    pub files: Vec<PathBuf>,
}

/// `{region}_{panoId}_{lat}_{lon}_360.jpg`
pub fn output_filename(region: &str, panorama: &DiscoveredPanorama) -> String {
    let pano_id: String = panorama
        .pano_id
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!(
        "{}_{}_{}_{}_360.jpg",
        region,
        pano_id,
        coordinate_label(panorama.lat),
        coordinate_label(panorama.lon)
    )
}

/// Shortest round-trip form, keeping `.0` on whole degrees (`10.0`, not `10`)
fn coordinate_label(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// Fetches, reprojects and writes panoramas one pair at a time
pub struct RetrievalPipeline {
    fetcher: Arc<PanoramaFetcher>,
    region: String,
    max_images: Option<usize>,
}

impl RetrievalPipeline {
    pub fn new(fetcher: Arc<PanoramaFetcher>, region: impl Into<String>) -> Self {
        Self {
            fetcher,
            region: region.into(),
            max_images: None,
        }
    }

    /// Stop after this many panoramas have been saved
    pub fn with_max_images(mut self, max_images: Option<usize>) -> Self {
        self.max_images = max_images;
        self
    }

    /// Retrieve every pair in order; one pair failing never stops the rest
    pub async fn retrieve(&self, pairs: &[DiscoveredPanorama], out_dir: &Path) -> Result<RetrievalReport> {
        std::fs::create_dir_all(out_dir)?;
        let mut report = RetrievalReport::default();

        for (i, panorama) in pairs.iter().enumerate() {
            if self.max_images.is_some_and(|max| report.saved >= max) {
                report.skipped = pairs.len() - i;
                info!("Reached max_images limit ({}), skipping {} remaining", report.saved, report.skipped);
                break;
            }

            info!(
                "Retrieving {} at ({}, {}) [{}/{}]",
                panorama.pano_id, panorama.lat, panorama.lon, i + 1, pairs.len()
            );
            match self.retrieve_one(panorama, out_dir).await {
                Ok(path) => {
                    info!("Saved {:?}", path);
                    report.saved += 1;
                    report.files.push(path);
                }
                Err(e) => {
                    error!("Failed to retrieve {} at ({}, {}): {}", panorama.pano_id, panorama.lat, panorama.lon, e);
                    report.failures.push(RetrievalFailure {
                        panorama: panorama.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!("Retrieval finished: {} saved, {} failed", report.saved, report.failures.len());
        Ok(report)
    }

    /// Fetch, reproject and write a single panorama
    pub async fn retrieve_one(&self, panorama: &DiscoveredPanorama, out_dir: &Path) -> Result<PathBuf> {
        let faces = self.fetcher.fetch(&panorama.pano_id).await?;
        let name = output_filename(&self.region, panorama);
        let path = out_dir.join(&name);
        let partial = out_dir.join(format!(".{}.part", name));

        tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            let equirect = reproject(&faces);

            let mut buffer = Vec::new();
            let mut cursor = std::io::Cursor::new(&mut buffer);
            DynamicImage::ImageRgb8(equirect).write_to(&mut cursor, ImageFormat::Jpeg)?;

            // Only complete files ever appear under the final name
            let written = std::fs::write(&partial, &buffer).and_then(|_| std::fs::rename(&partial, &path));
            if let Err(e) = written {
                let _ = std::fs::remove_file(&partial);
                return Err(e.into());
            }
            Ok(path)
        })
        .await
        .map_err(|e| PanoscopeError::Task(format!("reprojection task failed: {}", e)))?
    }
}
