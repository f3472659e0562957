// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Geographic primitives: bounding boxes, scan stages and lattices

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{PanoscopeError, Result};

/// Sampling density a coordinate was created at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Coarse,
    Fine,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Coarse => "coarse",
            Stage::Fine => "fine",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PanoscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "coarse" => Ok(Stage::Coarse),
            "fine" => Ok(Stage::Fine),
            other => Err(PanoscopeError::Config(format!("Unknown stage: {}", other))),
        }
    }
}

/// A lat/lon rectangle, edges inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Build and validate a bounding box
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Result<Self> {
        let bbox = Self { north, south, east, west };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<()> {
        let edges = [self.north, self.south, self.east, self.west];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(PanoscopeError::InvalidBoundingBox(format!(
                "edges must be finite: {:?}",
                self
            )));
        }
        if !(-90.0..=90.0).contains(&self.north) || !(-90.0..=90.0).contains(&self.south) {
            return Err(PanoscopeError::InvalidBoundingBox(
                "latitude out of range [-90, 90]".to_string(),
            ));
        }
        if !(-180.0..=180.0).contains(&self.east) || !(-180.0..=180.0).contains(&self.west) {
            return Err(PanoscopeError::InvalidBoundingBox(
                "longitude out of range [-180, 180]".to_string(),
            ));
        }
        if self.north < self.south {
            return Err(PanoscopeError::InvalidBoundingBox(format!(
                "north ({}) is below south ({})",
                self.north, self.south
            )));
        }
        if self.east < self.west {
            return Err(PanoscopeError::InvalidBoundingBox(format!(
                "east ({}) is west of west ({})",
                self.east, self.west
            )));
        }
        Ok(())
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat <= self.north && lat >= self.south && lon <= self.east && lon >= self.west
    }

    /// Number of lattice rows (north to south) at `spacing`
    pub fn lattice_rows(&self, spacing: f64) -> usize {
        ((self.north - self.south) / spacing + 1.0).ceil() as usize
    }

    /// Number of lattice columns (west to east) at `spacing`
    pub fn lattice_cols(&self, spacing: f64) -> usize {
        ((self.east - self.west) / spacing + 1.0).ceil() as usize
    }

    /// Row-major lattice from north to south, each row west to east.
    ///
    /// The last row and column are clamped onto the south and east edges so
    /// every point stays inside the box while still covering it. Points are
    /// generated lazily.
    pub fn lattice_points(&self, spacing: f64) -> impl Iterator<Item = (f64, f64)> {
        let bbox = *self;
        let cols = self.lattice_cols(spacing);
        (0..self.lattice_rows(spacing)).flat_map(move |i| {
            let lat = (bbox.north - i as f64 * spacing).max(bbox.south);
            (0..cols).map(move |j| (lat, (bbox.west + j as f64 * spacing).min(bbox.east)))
        })
    }

    /// The whole lattice collected; only for boxes known to be small
    pub fn lattice(&self, spacing: f64) -> Vec<(f64, f64)> {
        self.lattice_points(spacing).collect()
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "N{} S{} E{} W{}",
            self.north, self.south, self.east, self.west
        )
    }
}

/// The eight compass neighbours of `(lat, lon)` at `spacing`, zero offset skipped
pub fn fine_neighbors(lat: f64, lon: f64, spacing: f64) -> Vec<(f64, f64)> {
    let offsets = [-spacing, 0.0, spacing];
    let mut out = Vec::with_capacity(8);
    for dlat in offsets {
        for dlon in offsets {
            if dlat == 0.0 && dlon == 0.0 {
                continue;
            }
            out.push((lat + dlat, lon + dlon));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aizawl() -> BoundingBox {
        BoundingBox::new(23.76, 23.65, 92.80, 92.65).unwrap()
    }

    #[test]
    fn test_lattice_count_matches_span() {
        let bbox = aizawl();
        let expected = ((23.76f64 - 23.65) / 0.003 + 1.0).ceil() as usize
            * ((92.80f64 - 92.65) / 0.003 + 1.0).ceil() as usize;
        assert_eq!(bbox.lattice(0.003).len(), expected);
    }

    #[test]
    fn test_lattice_order_and_containment() {
        let bbox = aizawl();
        let points = bbox.lattice(0.003);
        let cols = bbox.lattice_cols(0.003);

        assert_eq!(points[0], (23.76, 92.65));
        assert!(points[1].1 > points[0].1);
        assert!(points[cols].0 < points[0].0);
        assert!(points.iter().all(|(lat, lon)| bbox.contains(*lat, *lon)));
        assert_eq!(points.last().copied(), Some((23.65, 92.80)));
    }

    #[test]
    fn test_continental_lattice_is_lazy() {
        let india = BoundingBox::new(37.1, 6.5, 97.5, 68.0).unwrap();
        let first: Vec<(f64, f64)> = india.lattice_points(0.003).take(2).collect();
        assert_eq!(first[0], (37.1, 68.0));
        assert!((first[1].1 - 68.003).abs() < 1e-9);
        assert!(india.lattice_rows(0.003) * india.lattice_cols(0.003) > 90_000_000);
    }

    #[test]
    fn test_degenerate_box_is_single_point() {
        let bbox = BoundingBox::new(10.0, 10.0, 20.0, 20.0).unwrap();
        assert_eq!(bbox.lattice(0.5), vec![(10.0, 20.0)]);
    }

    #[test]
    fn test_rejects_inverted_box() {
        assert!(BoundingBox::new(23.65, 23.76, 92.80, 92.65).is_err());
        assert!(BoundingBox::new(23.76, 23.65, 92.65, 92.80).is_err());
        assert!(BoundingBox::new(f64::NAN, 0.0, 1.0, 0.0).is_err());
        assert!(BoundingBox::new(91.0, 0.0, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_fine_neighbors() {
        let n = fine_neighbors(23.70, 92.70, 0.001);
        assert_eq!(n.len(), 8);
        assert!(!n.contains(&(23.70, 92.70)));
        assert!(n.contains(&(23.70 + 0.001, 92.70 - 0.001)));
        assert!(n.contains(&(23.70, 92.70 + 0.001)));
    }

    #[test]
    fn test_stage_round_trip() {
        assert_eq!("coarse".parse::<Stage>().unwrap(), Stage::Coarse);
        assert_eq!(Stage::Fine.to_string(), "fine");
        assert!("medium".parse::<Stage>().is_err());
    }
}
