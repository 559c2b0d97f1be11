//! Perspective transformation for projector calibration
//!
//! This module implements the perspective (homography) transformation that
//! maps the rasterized pattern onto the operator-picked quad on the
//! projector canvas.

use image::{Rgba, RgbaImage};
use nalgebra::{Matrix3, Vector3};

use crate::config::{Corner, Point, Quad};

/// Value written where the inverse mapping lands outside the source image
pub const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Collinearity tolerance, relative to the squared extent of the quad
const COLLINEAR_EPSILON: f64 = 1e-9;

/// Pivot magnitude below which the DLT system is treated as singular
const PIVOT_EPSILON: f64 = 1e-10;

/// A homography cannot be built from the given corners
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum TransformError {
    #[error("{quad} corners {} are collinear or coincident", corner_list(.corners))]
    Degenerate {
        quad: &'static str,
        corners: [Corner; 3],
    },
    #[error("perspective matrix is singular")]
    Singular,
}

fn corner_list(corners: &[Corner; 3]) -> String {
    corners.iter().map(|c| c.label()).collect::<Vec<_>>().join(", ")
}

/// Perspective transformation matrix (3x3 homography)
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveTransform {
    /// Maps source points to destination points, `h[(2, 2)] == 1`
    matrix: Matrix3<f64>,
    /// Inverse matrix for reverse mapping (used for warping)
    inverse: Matrix3<f64>,
}

impl PerspectiveTransform {
    /// Compute the perspective transform taking `src` onto `dst`.
    ///
    /// Corners are paired in [`Corner::CANONICAL`] order and solved with the
    /// Direct Linear Transform for an exact four point correspondence.
    /// Fails when either quad has three collinear (or coincident) corners.
    pub fn compute(src: &Quad, dst: &Quad) -> Result<Self, TransformError> {
        check_quad(src, "source")?;
        check_quad(dst, "destination")?;

        let matrix = compute_homography(src.canonical_points(), dst.canonical_points())
            .ok_or(TransformError::Singular)?;
        let inverse = matrix.try_inverse().ok_or(TransformError::Singular)?;

        Ok(Self { matrix, inverse })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Transform a point from destination to source coordinates (inverse)
    #[inline]
    pub fn inverse_transform_point(&self, p: Point) -> Option<Point> {
        apply_homography(&self.inverse, p)
    }

    /// Warp `src` into a new canvas of `width` x `height`.
    ///
    /// Every output pixel is mapped back through the inverse homography and
    /// sampled with bilinear interpolation. Pixels that map outside the
    /// source are left as [`BACKGROUND`].
    pub fn warp_image(&self, src: &RgbaImage, width: u32, height: u32) -> RgbaImage {
        let mut dst = RgbaImage::from_pixel(width, height, BACKGROUND);

        for (dst_x, dst_y, pixel) in dst.enumerate_pixels_mut() {
            let target = Point::new(dst_x as f64, dst_y as f64);
            if let Some(p) = self.inverse_transform_point(target) {
                *pixel = bilinear_sample(src, p.x, p.y);
            }
        }

        dst
    }
}

/// Reject quads where any three corners are collinear
fn check_quad(quad: &Quad, role: &'static str) -> Result<(), TransformError> {
    let corners = Corner::CANONICAL;
    let points = quad.canonical_points();

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in &points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let extent_sq = (max_x - min_x).powi(2) + (max_y - min_y).powi(2);
    let tolerance = COLLINEAR_EPSILON * extent_sq;

    for skip in 0..4 {
        let idx: Vec<usize> = (0..4).filter(|&i| i != skip).collect();
        let (a, b, c) = (points[idx[0]], points[idx[1]], points[idx[2]]);
        let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);

        if extent_sq == 0.0 || cross.abs() <= tolerance {
            return Err(TransformError::Degenerate {
                quad: role,
                corners: [corners[idx[0]], corners[idx[1]], corners[idx[2]]],
            });
        }
    }

    Ok(())
}

/// Compute a 3x3 homography matrix from 4 point correspondences
/// using the Direct Linear Transform (DLT) algorithm
fn compute_homography(src: [Point; 4], dst: [Point; 4]) -> Option<Matrix3<f64>> {
    // For each correspondence (x,y) -> (x',y'), with h9 fixed to 1:
    //   x*h1 + y*h2 + h3 - x'*x*h7 - x'*y*h8 = x'
    //   x*h4 + y*h5 + h6 - y'*x*h7 - y'*y*h8 = y'
    let mut a = [[0.0f64; 8]; 8];
    let mut b = [0.0f64; 8];

    for i in 0..4 {
        let Point { x, y } = src[i];
        let Point { x: xp, y: yp } = dst[i];

        a[i * 2] = [x, y, 1.0, 0.0, 0.0, 0.0, -xp * x, -xp * y];
        b[i * 2] = xp;

        a[i * 2 + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -yp * x, -yp * y];
        b[i * 2 + 1] = yp;
    }

    let h = solve_linear_system(&mut a, &mut b)?;

    Some(Matrix3::new(
        h[0], h[1], h[2], //
        h[3], h[4], h[5], //
        h[6], h[7], 1.0,
    ))
}

/// Solve an 8x8 linear system using Gaussian elimination with partial pivoting
fn solve_linear_system(a: &mut [[f64; 8]; 8], b: &mut [f64; 8]) -> Option<[f64; 8]> {
    let n = 8;

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            if a[row][col].abs() > max_val {
                max_val = a[row][col].abs();
                max_row = row;
            }
        }

        if max_row != col {
            a.swap(col, max_row);
            b.swap(col, max_row);
        }

        let pivot = a[col][col];
        if pivot.abs() < PIVOT_EPSILON {
            return None;
        }

        for row in (col + 1)..n {
            let factor = a[row][col] / pivot;
            for j in col..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    // Back substitution
    let mut x = [0.0f64; 8];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }

    Some(x)
}

/// Apply a homography matrix to a point. `None` on the line at infinity.
#[inline]
fn apply_homography(h: &Matrix3<f64>, p: Point) -> Option<Point> {
    let v = h * Vector3::new(p.x, p.y, 1.0);
    if v[2].abs() < 1e-12 {
        return None;
    }
    Some(Point::new(v[0] / v[2], v[1] / v[2]))
}

/// Bilinear interpolation sampling.
///
/// Pixel centres sit on integer coordinates. Neighbours outside the image
/// contribute [`BACKGROUND`], so edges fade out over one pixel.
#[inline]
fn bilinear_sample(src: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (width, height) = src.dimensions();
    if !(x > -1.0 && y > -1.0 && x < width as f64 && y < height as f64) {
        return BACKGROUND;
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let fetch = |px: i64, py: i64| -> [f64; 4] {
        if px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
            return BACKGROUND.0.map(f64::from);
        }
        src.get_pixel(px as u32, py as u32).0.map(f64::from)
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1, y0);
    let p01 = fetch(x0, y0 + 1);
    let p11 = fetch(x0 + 1, y0 + 1);

    let mut result = [0u8; 4];
    for c in 0..4 {
        let value = p00[c] * (1.0 - fx) * (1.0 - fy)
            + p10[c] * fx * (1.0 - fy)
            + p01[c] * (1.0 - fx) * fy
            + p11[c] * fx * fy;

        result[c] = value.round().clamp(0.0, 255.0) as u8;
    }

    Rgba(result)
}
