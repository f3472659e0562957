// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Panoscope: Street-level panorama discovery and 360° retrieval
//!
//! Sweeps a geographic bounding box with a coarse-to-fine lattice of
//! imagery metadata probes, records every hit in a resumable SQLite store,
//! then downloads each discovered panorama as six cube faces and stitches
//! them into an equirectangular JPEG.

pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod http;
pub mod panorama;
pub mod ratelimit;
pub mod regions;
pub mod reproject;
pub mod retrieval;
pub mod scanner;
pub mod service;
pub mod streetview;
pub mod web;

pub use config::AppConfig;
pub use error::{PanoscopeError, Result};
pub use service::Panoscope;
