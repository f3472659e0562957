// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Street-level imagery API client (metadata lookup and static tiles)

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::ApiConfig;
use crate::http::{Query, RetryingClient};
use crate::{PanoscopeError, Result};

/// Status field of a metadata response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataStatus {
    Ok,
    ZeroResults,
    NotFound,
    OverQueryLimit,
    RequestDenied,
    InvalidRequest,
    UnknownError,
    #[serde(other)]
    Unrecognized,
}

impl MetadataStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataStatus::Ok => "OK",
            MetadataStatus::ZeroResults => "ZERO_RESULTS",
            MetadataStatus::NotFound => "NOT_FOUND",
            MetadataStatus::OverQueryLimit => "OVER_QUERY_LIMIT",
            MetadataStatus::RequestDenied => "REQUEST_DENIED",
            MetadataStatus::InvalidRequest => "INVALID_REQUEST",
            MetadataStatus::UnknownError => "UNKNOWN_ERROR",
            MetadataStatus::Unrecognized => "UNRECOGNIZED",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataLocation {
    pub lat: f64,
    pub lng: f64,
}

/// Metadata lookup response
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataResponse {
    pub status: MetadataStatus,
    #[serde(default)]
    pub pano_id: Option<String>,
    #[serde(default)]
    pub location: Option<MetadataLocation>,
    #[serde(default)]
    pub date: Option<String>,
}

impl MetadataResponse {
    /// Panorama id of a successful lookup
    pub fn hit(&self) -> Option<&str> {
        match self.status {
            MetadataStatus::Ok => self.pano_id.as_deref().filter(|id| !id.is_empty()),
            _ => None,
        }
    }
}

/// Client for the metadata and static imagery endpoints
pub struct StreetViewClient {
    http: Arc<RetryingClient>,
    metadata_url: String,
    static_url: String,
    key: String,
}

impl StreetViewClient {
    pub fn new(http: Arc<RetryingClient>, api: &ApiConfig, key: String) -> Self {
        Self {
            http,
            metadata_url: api.metadata_url.clone(),
            static_url: api.static_url.clone(),
            key,
        }
    }

    /// Look up imagery metadata at a location
    pub async fn metadata(&self, lat: f64, lon: f64) -> Result<MetadataResponse> {
        let query: Query = vec![
            ("location", format!("{},{}", lat, lon)),
            ("key", self.key.clone()),
        ];

        let body = self.http.get(&self.metadata_url, &query).await?;
        let parsed: MetadataResponse = serde_json::from_slice(&body)
            .map_err(|e| PanoscopeError::Metadata(format!("({}, {}): {}", lat, lon, e)))?;

        debug!("Metadata ({}, {}): {}", lat, lon, parsed.status.as_str());
        Ok(parsed)
    }

    /// Fetch one square static view of a panorama
    pub async fn static_view(&self, pano_id: &str, size: u32, heading: u32, pitch: i32) -> Result<Vec<u8>> {
        let query: Query = vec![
            ("pano", pano_id.to_string()),
            ("size", format!("{}x{}", size, size)),
            ("fov", "90".to_string()),
            ("heading", heading.to_string()),
            ("pitch", pitch.to_string()),
            ("key", self.key.clone()),
        ];

        self.http.get(&self.static_url, &query).await
    }
}
