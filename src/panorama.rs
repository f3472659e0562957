// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Cube face retrieval for a single panorama

use futures_util::future::try_join_all;
use image::{imageops::FilterType, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::streetview::StreetViewClient;
use crate::{PanoscopeError, Result};

/// One of the six faces of the view cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CubeFace {
    Front,
    Right,
    Back,
    Left,
    Up,
    Down,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::Front,
        CubeFace::Right,
        CubeFace::Back,
        CubeFace::Left,
        CubeFace::Up,
        CubeFace::Down,
    ];

    /// Camera heading in degrees
    pub fn heading(&self) -> u32 {
        match self {
            CubeFace::Front => 0,
            CubeFace::Right => 90,
            CubeFace::Back => 180,
            CubeFace::Left => 270,
            CubeFace::Up | CubeFace::Down => 0,
        }
    }

    /// Camera pitch in degrees
    pub fn pitch(&self) -> i32 {
        match self {
            CubeFace::Up => 90,
            CubeFace::Down => -90,
            _ => 0,
        }
    }

    pub fn is_equatorial(&self) -> bool {
        !matches!(self, CubeFace::Up | CubeFace::Down)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CubeFace::Front => "front",
            CubeFace::Right => "right",
            CubeFace::Back => "back",
            CubeFace::Left => "left",
            CubeFace::Up => "up",
            CubeFace::Down => "down",
        }
    }
}

impl fmt::Display for CubeFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete set of square faces, all `size × size`.
///
/// Fields are private so the shared-size invariant holds for every value.
#[derive(Debug, Clone)]
pub struct CubeFaces {
    front: RgbImage,
    right: RgbImage,
    back: RgbImage,
    left: RgbImage,
    up: RgbImage,
    down: RgbImage,
}

impl CubeFaces {
    /// Assemble from images in [`CubeFace::ALL`] order.
    ///
    /// Every face must be square and the same size as the others.
    pub fn from_ordered(mut images: Vec<RgbImage>) -> Result<Self> {
        if images.len() != 6 {
            return Err(PanoscopeError::Config(format!(
                "expected 6 cube faces, got {}",
                images.len()
            )));
        }

        let size = images[0].width();
        if size == 0 {
            return Err(PanoscopeError::Config("cube faces must not be empty".to_string()));
        }
        for (face, img) in CubeFace::ALL.iter().zip(&images) {
            if img.dimensions() != (size, size) {
                return Err(PanoscopeError::Config(format!(
                    "{} face is {}x{}, expected {}x{}",
                    face,
                    img.width(),
                    img.height(),
                    size,
                    size
                )));
            }
        }

        let down = images.remove(5);
        let up = images.remove(4);
        let left = images.remove(3);
        let back = images.remove(2);
        let right = images.remove(1);
        let front = images.remove(0);
        Ok(Self { front, right, back, left, up, down })
    }

    pub fn get(&self, face: CubeFace) -> &RgbImage {
        match face {
            CubeFace::Front => &self.front,
            CubeFace::Right => &self.right,
            CubeFace::Back => &self.back,
            CubeFace::Left => &self.left,
            CubeFace::Up => &self.up,
            CubeFace::Down => &self.down,
        }
    }

    #[cfg(test)]
    pub(crate) fn get_mut(&mut self, face: CubeFace) -> &mut RgbImage {
        match face {
            CubeFace::Front => &mut self.front,
            CubeFace::Right => &mut self.right,
            CubeFace::Back => &mut self.back,
            CubeFace::Left => &mut self.left,
            CubeFace::Up => &mut self.up,
            CubeFace::Down => &mut self.down,
        }
    }

    /// Apply a size-preserving transform to every face
    pub(crate) fn map_preserving_size<F>(&self, f: F) -> Self
    where
        F: Fn(CubeFace, &RgbImage) -> RgbImage,
    {
        let apply = |face: CubeFace, img: &RgbImage| {
            let out = f(face, img);
            debug_assert_eq!(out.dimensions(), img.dimensions());
            out
        };
        Self {
            front: apply(CubeFace::Front, &self.front),
            right: apply(CubeFace::Right, &self.right),
            back: apply(CubeFace::Back, &self.back),
            left: apply(CubeFace::Left, &self.left),
            up: apply(CubeFace::Up, &self.up),
            down: apply(CubeFace::Down, &self.down),
        }
    }

    /// Edge length shared by every face
    pub fn size(&self) -> u32 {
        self.front.width()
    }
}

/// Retrieves the six faces of a panorama, all or nothing
pub struct PanoramaFetcher {
    client: Arc<StreetViewClient>,
    face_size: u32,
}

impl PanoramaFetcher {
    pub fn new(client: Arc<StreetViewClient>, face_size: u32) -> Self {
        Self { client, face_size }
    }

    pub fn face_size(&self) -> u32 {
        self.face_size
    }

    /// Fetch all six faces; the first unrecoverable face error aborts the panorama
    pub async fn fetch(&self, pano_id: &str) -> Result<CubeFaces> {
        debug!("Fetching cube faces for {}", pano_id);
        let faces = try_join_all(CubeFace::ALL.iter().map(|&face| self.fetch_face(pano_id, face))).await?;
        CubeFaces::from_ordered(faces)
    }

    async fn fetch_face(&self, pano_id: &str, face: CubeFace) -> Result<RgbImage> {
        let wrap = |source: PanoscopeError| PanoscopeError::Face {
            pano_id: pano_id.to_string(),
            face,
            source: Box::new(source),
        };

        let bytes = self
            .client
            .static_view(pano_id, self.face_size, face.heading(), face.pitch())
            .await
            .map_err(wrap)?;

        let img = image::load_from_memory(&bytes)
            .map_err(|e| wrap(e.into()))?
            .to_rgb8();

        if img.width() != self.face_size || img.height() != self.face_size {
            warn!(
                "{} face of {} is {}x{}, resizing to {}",
                face, pano_id, img.width(), img.height(), self.face_size
            );
            return Ok(image::imageops::resize(&img, self.face_size, self.face_size, FilterType::Triangle));
        }

        Ok(img)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use image::Rgb;

    /// Distinct flat colour per face
    pub fn face_color(face: CubeFace) -> Rgb<u8> {
        match face {
            CubeFace::Front => Rgb([255, 0, 0]),
            CubeFace::Right => Rgb([0, 255, 0]),
            CubeFace::Back => Rgb([0, 0, 255]),
            CubeFace::Left => Rgb([255, 255, 0]),
            CubeFace::Up => Rgb([0, 255, 255]),
            CubeFace::Down => Rgb([255, 0, 255]),
        }
    }

    pub fn flat_faces(size: u32) -> CubeFaces {
        CubeFaces::from_ordered(
            CubeFace::ALL
                .iter()
                .map(|&f| RgbImage::from_pixel(size, size, face_color(f)))
                .collect(),
        )
        .unwrap()
    }

    /// PNG-encoded flat face, as the static endpoint would return it
    pub fn encoded_face(face: CubeFace, size: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(size, size, face_color(face));
        let mut buffer = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    pub fn face_for_query(query: &crate::http::Query) -> CubeFace {
        use crate::http::testing::query_value;
        let heading = query_value(query, "heading").unwrap_or("0");
        let pitch = query_value(query, "pitch").unwrap_or("0");
        match (heading, pitch) {
            (_, "90") => CubeFace::Up,
            (_, "-90") => CubeFace::Down,
            ("90", _) => CubeFace::Right,
            ("180", _) => CubeFace::Back,
            ("270", _) => CubeFace::Left,
            _ => CubeFace::Front,
        }
    }
}
