// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Cube map to equirectangular reprojection

use image::{imageops, RgbImage};
use std::f64::consts::{FRAC_PI_2, PI};

use crate::panorama::{CubeFace, CubeFaces};

/// Face hit by a view direction, with face-plane coordinates in `[-1, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceSample {
    pub face: CubeFace,
    pub u: f64,
    pub v: f64,
}

/// Spherical `(longitude, latitude)` in radians for an output pixel
pub fn pixel_to_spherical(x: u32, y: u32, width: u32, height: u32) -> (f64, f64) {
    let lon = (f64::from(x) / f64::from(width)) * 2.0 * PI - PI;
    let lat = FRAC_PI_2 - (f64::from(y) / f64::from(height)) * PI;
    (lon, lat)
}

/// Unit direction for a spherical coordinate
pub fn spherical_to_direction(lon: f64, lat: f64) -> (f64, f64, f64) {
    (lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

/// Pick the dominant axis; ties go to X, then Y, then Z
pub fn select_face(x: f64, y: f64, z: f64) -> FaceSample {
    let (ax, ay, az) = (x.abs(), y.abs(), z.abs());

    if ax >= ay && ax >= az {
        if x > 0.0 {
            FaceSample { face: CubeFace::Front, u: -y / ax, v: z / ax }
        } else {
            FaceSample { face: CubeFace::Back, u: y / ax, v: z / ax }
        }
    } else if ay >= az {
        if y > 0.0 {
            FaceSample { face: CubeFace::Right, u: x / ay, v: z / ay }
        } else {
            FaceSample { face: CubeFace::Left, u: -x / ay, v: z / ay }
        }
    } else if z > 0.0 {
        FaceSample { face: CubeFace::Up, u: y / az, v: x / az }
    } else {
        FaceSample { face: CubeFace::Down, u: y / az, v: -x / az }
    }
}

/// Nearest-neighbour pixel index for a face-plane coordinate
pub fn plane_to_pixel(c: f64, size: u32) -> u32 {
    let max = size.saturating_sub(1);
    let p = ((c + 1.0) / 2.0 * f64::from(max)).round();
    p.clamp(0.0, f64::from(max)) as u32
}

/// Equatorial faces come back upside down relative to the sampling math
fn oriented(faces: &CubeFaces) -> CubeFaces {
    faces.map_preserving_size(|face, img| {
        if face.is_equatorial() {
            imageops::rotate180(img)
        } else {
            img.clone()
        }
    })
}

/// Reproject six faces of size `F` into a `4F × 2F` equirectangular image.
///
/// Pure and deterministic: identical faces give a byte-identical raster.
pub fn reproject(faces: &CubeFaces) -> RgbImage {
    let size = faces.size();
    let width = 4 * size;
    let height = 2 * size;
    let faces = oriented(faces);

    RgbImage::from_fn(width, height, |px, py| {
        let (lon, lat) = pixel_to_spherical(px, py, width, height);
        let (x, y, z) = spherical_to_direction(lon, lat);
        let sample = select_face(x, y, z);
        let u = plane_to_pixel(sample.u, size);
        let v = plane_to_pixel(sample.v, size);
        *faces.get(sample.face).get_pixel(u, v)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panorama::testing::{face_color, flat_faces};
    use image::Rgb;

    #[test]
    fn test_output_dimensions() {
        let eq = reproject(&flat_faces(8));
        assert_eq!(eq.dimensions(), (32, 16));
    }

    #[test]
    fn test_center_pixel_is_front_center() {
        let size = 8;
        let (lon, lat) = pixel_to_spherical(2 * size, size, 4 * size, 2 * size);
        assert_eq!((lon, lat), (0.0, 0.0));

        let (x, y, z) = spherical_to_direction(lon, lat);
        assert_eq!((x, y, z), (1.0, 0.0, 0.0));

        let sample = select_face(x, y, z);
        assert_eq!(sample.face, CubeFace::Front);
        assert_eq!(plane_to_pixel(sample.u, size), plane_to_pixel(0.0, size));
        assert_eq!(plane_to_pixel(sample.v, size), plane_to_pixel(0.0, size));

        let eq = reproject(&flat_faces(size));
        assert_eq!(*eq.get_pixel(2 * size, size), face_color(CubeFace::Front));
    }

    #[test]
    fn test_poles_and_seam() {
        let size = 8;
        let eq = reproject(&flat_faces(size));
        assert_eq!(*eq.get_pixel(2 * size, 0), face_color(CubeFace::Up));
        assert_eq!(*eq.get_pixel(2 * size, 2 * size - 1), face_color(CubeFace::Down));
        // x = 0 is longitude -π, straight behind
        assert_eq!(*eq.get_pixel(0, size), face_color(CubeFace::Back));
        // a quarter turn either way from the centre
        assert_eq!(*eq.get_pixel(3 * size, size), face_color(CubeFace::Right));
        assert_eq!(*eq.get_pixel(size, size), face_color(CubeFace::Left));
    }

    #[test]
    fn test_tie_breaks_prefer_x_then_y() {
        assert_eq!(select_face(1.0, 1.0, 1.0).face, CubeFace::Front);
        assert_eq!(select_face(0.5, -1.0, 1.0).face, CubeFace::Left);
        assert_eq!(select_face(0.5, 0.5, -1.0).face, CubeFace::Down);
    }

    #[test]
    fn test_plane_to_pixel_clamps() {
        assert_eq!(plane_to_pixel(-1.0, 8), 0);
        assert_eq!(plane_to_pixel(1.0, 8), 7);
        assert_eq!(plane_to_pixel(1.5, 8), 7);
        assert_eq!(plane_to_pixel(-3.0, 8), 0);
    }

    #[test]
    fn test_equatorial_faces_are_rotated() {
        let size = 8;
        let mut faces = flat_faces(size);
        // mark the top-left pixel of the front face
        faces.get_mut(CubeFace::Front).put_pixel(0, 0, Rgb([1, 2, 3]));

        let eq = reproject(&faces);
        let marked: Vec<(u32, u32)> = eq
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == Rgb([1, 2, 3]))
            .map(|(x, y, _)| (x, y))
            .collect();

        // after the 180° turn it lands at face pixel (7, 7): u = 1, v = 1,
        // i.e. -y = 1 and z = 1, the upper-left of the front face
        assert!(!marked.is_empty());
        assert!(marked.iter().all(|&(x, y)| x < 2 * size && y < size));
    }

    #[test]
    fn test_mixed_face_sizes_never_reach_reprojection() {
        let mut images: Vec<RgbImage> = (0..6).map(|_| RgbImage::new(8, 8)).collect();
        images[4] = RgbImage::new(4, 4);
        assert!(CubeFaces::from_ordered(images).is_err());

        // a valid set of the smaller size reprojects cleanly
        let eq = reproject(&flat_faces(4));
        assert_eq!(eq.dimensions(), (16, 8));
    }

    #[test]
    fn test_deterministic() {
        let mut faces = flat_faces(16);
        for (i, p) in faces.get_mut(CubeFace::Front).pixels_mut().enumerate() {
            *p = Rgb([(i % 251) as u8, (i * 7 % 253) as u8, (i * 13 % 255) as u8]);
        }
        let a = reproject(&faces);
        let b = reproject(&faces);
        assert_eq!(a.as_raw(), b.as_raw());
    }
}
