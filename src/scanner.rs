// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Coarse-to-fine grid scan over a bounding box
//!
//! The store doubles as the work queue: each batch pulls up to twice the
//! worker count of unscanned coordinates, probes them concurrently, and only
//! then pulls again, so children inserted by one batch are visible to the next.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::db::{Coordinate, ProbeRecord, ScanStore, StoreStats};
use crate::geo::{fine_neighbors, BoundingBox, Stage};
use crate::streetview::StreetViewClient;
use crate::{PanoscopeError, Result};

/// Result of probing one coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Imagery found; `children` fine coordinates were enqueued
    Hit { children: usize },
    Miss,
    /// The lookup failed terminally; the coordinate still counts as scanned
    Failed,
    /// Another worker got there first
    AlreadyScanned,
}

/// Snapshot published after every batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanProgress {
    pub batches: u64,
    pub probed: u64,
    pub hits: u64,
    pub failures: u64,
    pub store: StoreStats,
}

/// Summary of one `run`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub bbox: BoundingBox,
    pub seeded: usize,
    pub batches: u64,
    pub probed: u64,
    pub hits: u64,
    pub failures: u64,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Adaptive grid scanner
pub struct GridScanner {
    store: ScanStore,
    client: Arc<StreetViewClient>,
    settings: ScanConfig,
    progress: watch::Sender<ScanProgress>,
    stop: Option<watch::Receiver<bool>>,
}

impl GridScanner {
    pub fn new(store: ScanStore, client: Arc<StreetViewClient>, settings: ScanConfig) -> Self {
        let (progress, _) = watch::channel(ScanProgress::default());
        Self {
            store,
            client,
            settings,
            progress,
            stop: None,
        }
    }

    /// Stop pulling new batches once the flag turns true
    pub fn with_stop_signal(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Progress snapshots, updated after each batch
    pub fn subscribe(&self) -> watch::Receiver<ScanProgress> {
        self.progress.subscribe()
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    fn batch_size(&self) -> usize {
        self.settings.max_workers.max(1) * 2
    }

    /// Insert the coarse lattice unless the box already has coordinates
    pub fn seed(&self, bbox: &BoundingBox) -> Result<usize> {
        bbox.validate()?;
        let existing = self.store.count_in_bbox(bbox)?;
        if existing > 0 {
            info!("Resuming scan of {}: {} coordinates already stored", bbox, existing);
            return Ok(0);
        }

        let lattice = bbox.lattice_points(self.settings.coarse_spacing);
        let inserted = self.store.insert_coordinate_stream(lattice, Stage::Coarse)?;
        info!(
            "Seeded {} coarse coordinates over {} at spacing {}",
            inserted, bbox, self.settings.coarse_spacing
        );
        Ok(inserted)
    }

    /// Seed if needed, then drain every unscanned coordinate
    pub async fn run(&self, bbox: &BoundingBox) -> Result<ScanReport> {
        let started_at = Utc::now();
        let seeded = self.seed(bbox)?;
        let progress = self.drain().await?;
        let cancelled = self.stop_requested();

        if cancelled {
            info!("Scan stopped after {} batches", progress.batches);
        } else {
            info!(
                "Scan complete: {} probed, {} hits, {} failures",
                progress.probed, progress.hits, progress.failures
            );
        }

        Ok(ScanReport {
            bbox: *bbox,
            seeded,
            batches: progress.batches,
            probed: progress.probed,
            hits: progress.hits,
            failures: progress.failures,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Probe batches until the store has nothing left or a stop is requested
    pub async fn drain(&self) -> Result<ScanProgress> {
        let workers = self.settings.max_workers.max(1);
        let mut progress = ScanProgress {
            store: self.store.stats()?,
            ..ScanProgress::default()
        };

        loop {
            if self.stop_requested() {
                break;
            }

            let batch = self.store.pending(self.batch_size())?;
            if batch.is_empty() {
                break;
            }
            debug!("Dispatching batch of {} coordinates", batch.len());

            let outcomes: Vec<Result<ProbeOutcome>> = stream::iter(batch)
                .map(|coord| async move { self.probe(&coord).await })
                .buffer_unordered(workers)
                .collect()
                .await;

            // All workers have returned; a store failure now aborts the scan
            for outcome in outcomes {
                match outcome? {
                    ProbeOutcome::Hit { .. } => {
                        progress.probed += 1;
                        progress.hits += 1;
                    }
                    ProbeOutcome::Miss => progress.probed += 1,
                    ProbeOutcome::Failed => {
                        progress.probed += 1;
                        progress.failures += 1;
                    }
                    ProbeOutcome::AlreadyScanned => {}
                }
            }

            progress.batches += 1;
            progress.store = self.store.stats()?;
            info!(
                "Scanned {}/{} ({} hits)",
                progress.store.scanned, progress.store.total, progress.store.hits
            );
            self.progress.send_replace(progress.clone());
        }

        Ok(progress)
    }

    /// Probe one coordinate and persist the outcome.
    ///
    /// Only store failures are returned as errors; lookup failures are
    /// recorded as scanned-without-result.
    pub async fn probe(&self, coord: &Coordinate) -> Result<ProbeOutcome> {
        let (raw_status, pano_id) = match self.client.metadata(coord.lat, coord.lon).await {
            Ok(resp) => (resp.status.as_str().to_string(), resp.hit().map(str::to_string)),
            Err(e) if e.is_isolated() => {
                warn!("Probe at ({}, {}) failed: {}", coord.lat, coord.lon, e);
                (failure_tag(&e), None)
            }
            Err(e) => return Err(e),
        };

        let children = match (&pano_id, coord.stage) {
            (Some(_), Stage::Coarse) => fine_neighbors(coord.lat, coord.lon, self.settings.fine_spacing),
            _ => Vec::new(),
        };

        let outcome = match (&pano_id, raw_status.as_str()) {
            (Some(_), _) => ProbeOutcome::Hit { children: children.len() },
            (None, tag) if is_failure_tag(tag) => ProbeOutcome::Failed,
            (None, _) => ProbeOutcome::Miss,
        };

        let record = ProbeRecord {
            coord_id: coord.id,
            raw_status,
            pano_id,
            children,
        };
        if !self.store.record_probe(&record)? {
            return Ok(ProbeOutcome::AlreadyScanned);
        }

        if let ProbeOutcome::Hit { children } = outcome {
            debug!(
                "Hit at ({}, {}) [{}], {} fine neighbours queued",
                coord.lat, coord.lon, coord.stage, children
            );
        }
        Ok(outcome)
    }
}

const FAILURE_PREFIX: &str = "FAILED:";

/// Probe-log entry for a lookup that never produced a status
fn failure_tag(e: &PanoscopeError) -> String {
    match e {
        PanoscopeError::Client { status, .. } => format!("{}CLIENT_{}", FAILURE_PREFIX, status),
        PanoscopeError::UnexpectedStatus { status, .. } => format!("{}STATUS_{}", FAILURE_PREFIX, status),
        PanoscopeError::Transient { .. } => format!("{}TRANSIENT", FAILURE_PREFIX),
        PanoscopeError::Metadata(_) => format!("{}MALFORMED", FAILURE_PREFIX),
        _ => format!("{}OTHER", FAILURE_PREFIX),
    }
}

fn is_failure_tag(tag: &str) -> bool {
    tag.starts_with(FAILURE_PREFIX)
}
