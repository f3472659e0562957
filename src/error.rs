// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Panoscope

use thiserror::Error;

use crate::http::TransportError;
use crate::panorama::CubeFace;

/// Result type alias for Panoscope operations
pub type Result<T> = std::result::Result<T, PanoscopeError>;

/// Panoscope error types
#[derive(Error, Debug)]
pub enum PanoscopeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 4xx response; never retried
    #[error("Client error {status} from {url}")]
    Client { status: u16, url: String },

    /// Non-success status outside 4xx and 5xx; never retried
    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Retries exhausted on 5xx, timeout or connection failures
    #[error("Request to {url} failed after {attempts} attempts: {source}")]
    Transient {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// One cube face could not be retrieved, so the whole panorama is lost
    #[error("Panorama {pano_id}: {face} face failed: {source}")]
    Face {
        pano_id: String,
        face: CubeFace,
        #[source]
        source: Box<PanoscopeError>,
    },

    #[error("Malformed metadata response: {0}")]
    Metadata(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl PanoscopeError {
    /// True for failures that are local to a single probe or panorama
    /// and must not abort the surrounding scan or batch.
    pub fn is_isolated(&self) -> bool {
        matches!(
            self,
            PanoscopeError::Client { .. }
                | PanoscopeError::UnexpectedStatus { .. }
                | PanoscopeError::Transient { .. }
                | PanoscopeError::Face { .. }
                | PanoscopeError::Metadata(_)
                | PanoscopeError::Image(_)
                | PanoscopeError::Task(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_not_isolated() {
        let err = PanoscopeError::Database(rusqlite::Error::InvalidQuery);
        assert!(!err.is_isolated());
    }

    #[test]
    fn test_face_error_names_face() {
        let err = PanoscopeError::Face {
            pano_id: "abc".to_string(),
            face: CubeFace::Up,
            source: Box::new(PanoscopeError::Client {
                status: 404,
                url: "https://example.test/streetview".to_string(),
            }),
        };
        assert!(err.is_isolated());
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("up"));
    }
}
