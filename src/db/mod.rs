// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Durable scan state: coordinates, results and the probe log

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::geo::{BoundingBox, Stage};
use crate::{PanoscopeError, Result};

/// Scan store (thread-safe wrapper)
#[derive(Clone)]
pub struct ScanStore {
    conn: Arc<Mutex<Connection>>,
}

/// A lattice point queued for probing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub stage: Stage,
    pub scanned: bool,
}

/// A coordinate with imagery, as returned to collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredPanorama {
    pub lat: f64,
    pub lon: f64,
    pub pano_id: String,
}

/// Everything one probe writes, applied atomically
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub coord_id: i64,
    /// Raw API status (`OK`, `ZERO_RESULTS`, ...) or a failure tag
    pub raw_status: String,
    pub pano_id: Option<String>,
    /// Fine-stage points to enqueue
    pub children: Vec<(f64, f64)>,
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: i64,
    pub scanned: i64,
    pub hits: i64,
    pub coarse: i64,
    pub fine: i64,
}

impl StoreStats {
    pub fn pending(&self) -> i64 {
        self.total - self.scanned
    }
}

impl ScanStore {
    /// Open or create the store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize()?;
        Ok(store)
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| PanoscopeError::Config("Database lock poisoned".to_string()))
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS coords (
                id INTEGER PRIMARY KEY,
                lat REAL,
                lon REAL,
                stage TEXT,
                scanned INTEGER DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS results (
                coord_id INTEGER,
                pano_id TEXT,
                FOREIGN KEY(coord_id) REFERENCES coords(id)
            );

            CREATE TABLE IF NOT EXISTS responses (
                coord_id INTEGER,
                response TEXT,
                FOREIGN KEY(coord_id) REFERENCES coords(id)
            );

            CREATE INDEX IF NOT EXISTS idx_coords_pending ON coords(scanned, stage);
            CREATE INDEX IF NOT EXISTS idx_coords_latlon ON coords(lat, lon);
            CREATE INDEX IF NOT EXISTS idx_results_coord ON results(coord_id);
        "#)?;
        Ok(())
    }

    /// Count coordinates inside a bounding box
    pub fn count_in_bbox(&self, bbox: &BoundingBox) -> Result<i64> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM coords WHERE lat <= ?1 AND lat >= ?2 AND lon <= ?3 AND lon >= ?4",
            params![bbox.north, bbox.south, bbox.east, bbox.west],
            |row| row.get(0),
        )
        .map_err(Into::into)
    }

    /// Insert unscanned coordinates in one transaction, returning how many were added
    pub fn insert_coordinates(&self, points: &[(f64, f64)], stage: Stage) -> Result<usize> {
        self.insert_coordinate_stream(points.iter().copied(), stage)
    }

    /// Insert coordinates as they are produced, all in one transaction
    /// (an interrupted seed leaves nothing behind)
    pub fn insert_coordinate_stream<I>(&self, points: I, stage: Stage) -> Result<usize>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare("INSERT INTO coords (lat, lon, stage) VALUES (?1, ?2, ?3)")?;
            for (lat, lon) in points {
                stmt.execute(params![lat, lon, stage.as_str()])?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Next unscanned coordinates, coarse first
    pub fn pending(&self, limit: usize) -> Result<Vec<Coordinate>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, lat, lon, stage, scanned FROM coords
               WHERE scanned = 0
               ORDER BY CASE stage WHEN 'coarse' THEN 0 ELSE 1 END, id
               LIMIT ?1"#,
        )?;
        let coords = stmt
            .query_map(params![limit as i64], row_to_coordinate)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(coords)
    }

    /// Look up one coordinate
    pub fn coordinate(&self, id: i64) -> Result<Option<Coordinate>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT id, lat, lon, stage, scanned FROM coords WHERE id = ?1",
            params![id],
            row_to_coordinate,
        )
        .optional()
        .map_err(Into::into)
    }

    /// All coordinates of a stage, in insertion order
    pub fn coordinates_by_stage(&self, stage: Stage) -> Result<Vec<Coordinate>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, lat, lon, stage, scanned FROM coords WHERE stage = ?1 ORDER BY id",
        )?;
        let coords = stmt
            .query_map(params![stage.as_str()], row_to_coordinate)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(coords)
    }

    /// Apply one probe outcome.
    ///
    /// Returns `false` without writing anything if the coordinate was
    /// already scanned, so `scanned` flips at most once.
    pub fn record_probe(&self, record: &ProbeRecord) -> Result<bool> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE coords SET scanned = 1 WHERE id = ?1 AND scanned = 0",
            params![record.coord_id],
        )?;
        if updated == 0 {
            return Ok(false);
        }

        if let Some(ref pano_id) = record.pano_id {
            tx.execute(
                "INSERT INTO results (coord_id, pano_id) VALUES (?1, ?2)",
                params![record.coord_id, pano_id],
            )?;
        }

        {
            let mut stmt = tx.prepare("INSERT INTO coords (lat, lon, stage) VALUES (?1, ?2, ?3)")?;
            for (lat, lon) in &record.children {
                stmt.execute(params![lat, lon, Stage::Fine.as_str()])?;
            }
        }

        tx.execute(
            "INSERT INTO responses (coord_id, response) VALUES (?1, ?2)",
            params![record.coord_id, record.raw_status],
        )?;

        tx.commit()?;
        Ok(true)
    }

    /// Discovered panoramas whose coordinate lies in the box
    pub fn coordinates_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<DiscoveredPanorama>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT c.lat, c.lon, r.pano_id
               FROM coords c
               JOIN results r ON c.id = r.coord_id
               WHERE c.lat <= ?1 AND c.lat >= ?2 AND c.lon <= ?3 AND c.lon >= ?4
               ORDER BY c.id"#,
        )?;
        let found = stmt
            .query_map(params![bbox.north, bbox.south, bbox.east, bbox.west], |row| {
                Ok(DiscoveredPanorama {
                    lat: row.get(0)?,
                    lon: row.get(1)?,
                    pano_id: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(found)
    }

    /// Probe log for a coordinate, oldest first
    pub fn probe_log(&self, coord_id: i64) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT response FROM responses WHERE coord_id = ?1 ORDER BY rowid")?;
        let rows = stmt
            .query_map(params![coord_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock_conn()?;
        let (total, scanned, coarse, fine) = conn.query_row(
            r#"SELECT COUNT(*),
                      COALESCE(SUM(scanned), 0),
                      COALESCE(SUM(CASE stage WHEN 'coarse' THEN 1 ELSE 0 END), 0),
                      COALESCE(SUM(CASE stage WHEN 'fine' THEN 1 ELSE 0 END), 0)
               FROM coords"#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        let hits: i64 = conn.query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?;
        Ok(StoreStats { total, scanned, hits, coarse, fine })
    }

    /// Vacuum database
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("VACUUM", [])?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.lock_conn()?.execute_batch(sql)?;
        Ok(())
    }
}

fn row_to_coordinate(row: &rusqlite::Row<'_>) -> rusqlite::Result<Coordinate> {
    let stage: String = row.get(3)?;
    let stage = stage.parse::<Stage>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Coordinate {
        id: row.get(0)?,
        lat: row.get(1)?,
        lon: row.get(2)?,
        stage,
        scanned: row.get::<_, i64>(4)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(coord_id: i64, pano: &str, children: Vec<(f64, f64)>) -> ProbeRecord {
        ProbeRecord {
            coord_id,
            raw_status: "OK".to_string(),
            pano_id: Some(pano.to_string()),
            children,
        }
    }

    #[test]
    fn test_pending_orders_coarse_first() {
        let store = ScanStore::in_memory().unwrap();
        store.insert_coordinates(&[(1.0, 1.0)], Stage::Fine).unwrap();
        store.insert_coordinates(&[(2.0, 2.0), (3.0, 3.0)], Stage::Coarse).unwrap();

        let pending = store.pending(10).unwrap();
        let stages: Vec<Stage> = pending.iter().map(|c| c.stage).collect();
        assert_eq!(stages, vec![Stage::Coarse, Stage::Coarse, Stage::Fine]);
        assert_eq!(store.pending(2).unwrap().len(), 2);
    }

    #[test]
    fn test_stream_insert_counts_points() {
        let store = ScanStore::in_memory().unwrap();
        let points = (0..2_500).map(|i| (f64::from(i) * 0.001, 0.0));
        assert_eq!(store.insert_coordinate_stream(points, Stage::Coarse).unwrap(), 2_500);
        assert_eq!(store.stats().unwrap().coarse, 2_500);
        assert_eq!(store.pending(1).unwrap()[0].lat, 0.0);
    }

    #[test]
    fn test_record_probe_is_applied_once() {
        let store = ScanStore::in_memory().unwrap();
        store.insert_coordinates(&[(23.70, 92.70)], Stage::Coarse).unwrap();
        let id = store.pending(1).unwrap()[0].id;

        assert!(store.record_probe(&hit(id, "abc", vec![(23.701, 92.70)])).unwrap());
        assert!(!store.record_probe(&hit(id, "abc", vec![(23.701, 92.70)])).unwrap());

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.fine, 1);
        assert_eq!(store.probe_log(id).unwrap(), vec!["OK".to_string()]);
        assert!(store.coordinate(id).unwrap().unwrap().scanned);
    }

    #[test]
    fn test_miss_records_log_without_result() {
        let store = ScanStore::in_memory().unwrap();
        store.insert_coordinates(&[(10.0, 10.0)], Stage::Coarse).unwrap();
        let id = store.pending(1).unwrap()[0].id;

        store
            .record_probe(&ProbeRecord {
                coord_id: id,
                raw_status: "ZERO_RESULTS".to_string(),
                pano_id: None,
                children: Vec::new(),
            })
            .unwrap();

        assert_eq!(store.stats().unwrap().hits, 0);
        assert_eq!(store.probe_log(id).unwrap(), vec!["ZERO_RESULTS".to_string()]);
        assert!(store.pending(10).unwrap().is_empty());
    }

    #[test]
    fn test_bbox_query_filters_results() {
        let store = ScanStore::in_memory().unwrap();
        store
            .insert_coordinates(&[(23.70, 92.70), (23.80, 92.90), (23.66, 92.66)], Stage::Coarse)
            .unwrap();
        for c in store.pending(10).unwrap() {
            store.record_probe(&hit(c.id, &format!("p{}", c.id), Vec::new())).unwrap();
        }

        let bbox = BoundingBox::new(23.76, 23.65, 92.80, 92.65).unwrap();
        let found = store.coordinates_in_bbox(&bbox).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| bbox.contains(p.lat, p.lon)));
        assert_eq!(store.count_in_bbox(&bbox).unwrap(), 2);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.db");
        {
            let store = ScanStore::open(&path).unwrap();
            store.insert_coordinates(&[(1.0, 2.0), (3.0, 4.0)], Stage::Coarse).unwrap();
            let id = store.pending(1).unwrap()[0].id;
            store.record_probe(&hit(id, "x", Vec::new())).unwrap();
        }
        let store = ScanStore::open(&path).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.pending(), 1);
    }
}
