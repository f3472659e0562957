// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Named region index (region name → bounding box)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::geo::BoundingBox;
use crate::Result;

/// JSON-backed index of named bounding boxes
pub struct RegionIndex {
    path: PathBuf,
    regions: BTreeMap<String, BoundingBox>,
}

fn default_regions() -> BTreeMap<String, BoundingBox> {
    let mut regions = BTreeMap::new();
    regions.insert(
        "aizawl".to_string(),
        BoundingBox { north: 23.76, south: 23.65, east: 92.80, west: 92.65 },
    );
    regions.insert(
        "india".to_string(),
        BoundingBox { north: 37.1, south: 6.5, east: 97.5, west: 68.0 },
    );
    regions
}

impl RegionIndex {
    /// Load the index, falling back to the built-in regions if the file is missing
    pub fn load(path: PathBuf) -> Result<Self> {
        let regions = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let parsed: BTreeMap<String, BoundingBox> = serde_json::from_str(&content)?;
            parsed
                .into_iter()
                .map(|(name, bbox)| (name.to_lowercase(), bbox))
                .collect()
        } else {
            tracing::debug!("Region index not found at {:?}, using built-in regions", path);
            default_regions()
        };

        Ok(Self { path, regions })
    }

    /// Write the index back to disk
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.regions)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Look up a region, ignoring case
    pub fn get(&self, name: &str) -> Option<BoundingBox> {
        self.regions.get(&name.to_lowercase()).copied()
    }

    /// Add or replace a region after validating its bounds
    pub fn insert(&mut self, name: &str, bbox: BoundingBox) -> Result<()> {
        bbox.validate()?;
        self.regions.insert(name.to_lowercase(), bbox);
        tracing::info!("Region {} set to {}", name, bbox);
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.regions.keys().map(String::as_str).collect()
    }

    pub fn entries(&self) -> &BTreeMap<String, BoundingBox> {
        &self.regions
    }

    /// Get index file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
