use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::analysis::Bgr;

/// One dominant-color cluster with its share of the region's pixels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColorShare {
    pub bgr: Bgr,
    pub percentage: f64,
}

fn bgr_at(image: &RgbaImage, x: u32, y: u32) -> Bgr {
    let p = image.get_pixel(x, y);
    [p[2], p[1], p[0]]
}

pub fn within_tolerance(actual: Bgr, expected: [i64; 3], tolerance: i64) -> bool {
    actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| (i64::from(*a) - e).abs() <= tolerance)
}

/// Checks the color of a single pixel at a region-relative offset.
///
/// Matches iff every channel's absolute difference from the expected value is
/// within the tolerance. Tolerance is clamped to [0, 255]; out-of-bounds
/// coordinates and invalid expected channels are a non-match, never an error.
pub fn pixel_color(
    image: &RgbaImage,
    x: i64,
    y: i64,
    expected_bgr: [i64; 3],
    tolerance: i64,
    context: &str,
) -> bool {
    if expected_bgr.iter().any(|c| !(0..=255).contains(c)) {
        tracing::warn!(ctx = %context, expected = ?expected_bgr, "expected_bgr channels must be 0-255");
        return false;
    }
    let tolerance = tolerance.clamp(0, 255);

    let (w, h) = image.dimensions();
    if x < 0 || y < 0 || x >= i64::from(w) || y >= i64::from(h) {
        tracing::warn!(
            ctx = %context,
            x, y,
            width = w,
            height = h,
            "pixel coordinates out of region bounds"
        );
        return false;
    }

    let actual = bgr_at(image, x as u32, y as u32);
    let matched = within_tolerance(actual, expected_bgr, tolerance);
    tracing::debug!(
        ctx = %context,
        actual = ?actual,
        expected = ?expected_bgr,
        tolerance,
        matched,
        "pixel color check"
    );
    matched
}

/// Mean BGR color of the whole buffer, rounded per channel.
pub fn average_color(image: &RgbaImage) -> Option<Bgr> {
    let (w, h) = image.dimensions();
    let count = u64::from(w) * u64::from(h);
    if count == 0 {
        return None;
    }
    let mut sums = [0u64; 3];
    for p in image.pixels() {
        sums[0] += u64::from(p[2]);
        sums[1] += u64::from(p[1]);
        sums[2] += u64::from(p[0]);
    }
    Some([
        ((sums[0] as f64 / count as f64).round()) as u8,
        ((sums[1] as f64 / count as f64).round()) as u8,
        ((sums[2] as f64 / count as f64).round()) as u8,
    ])
}

const KMEANS_MAX_ITERATIONS: usize = 20;

/// K-means clustering over the buffer's pixels, returning up to `k` clusters
/// sorted by occurrence percentage (descending).
///
/// Initial centers are evenly spaced samples, so repeated runs over the same
/// buffer converge to the same clusters. `k` is clamped to the pixel count;
/// an empty buffer yields an empty vec.
pub fn dominant_colors(image: &RgbaImage, k: usize, context: &str) -> Vec<ColorShare> {
    let (w, h) = image.dimensions();
    let total = (w as usize) * (h as usize);
    if total == 0 {
        tracing::warn!(ctx = %context, "zero-pixel buffer, no dominant colors");
        return Vec::new();
    }
    let k = k.max(1).min(total);

    let pixels: Vec<[f64; 3]> = image
        .pixels()
        .map(|p| [f64::from(p[2]), f64::from(p[1]), f64::from(p[0])])
        .collect();

    // Deterministic seeding: evenly spaced pixels across the buffer.
    let mut centers: Vec<[f64; 3]> = (0..k).map(|i| pixels[i * total / k]).collect();
    let mut assignment = vec![0usize; total];

    for _ in 0..KMEANS_MAX_ITERATIONS {
        let mut changed = false;
        for (pi, px) in pixels.iter().enumerate() {
            let mut best = 0usize;
            let mut best_dist = f64::MAX;
            for (ci, c) in centers.iter().enumerate() {
                let d = (px[0] - c[0]).powi(2) + (px[1] - c[1]).powi(2) + (px[2] - c[2]).powi(2);
                if d < best_dist {
                    best_dist = d;
                    best = ci;
                }
            }
            if assignment[pi] != best {
                assignment[pi] = best;
                changed = true;
            }
        }

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (pi, px) in pixels.iter().enumerate() {
            let c = assignment[pi];
            counts[c] += 1;
            for ch in 0..3 {
                sums[c][ch] += px[ch];
            }
        }
        for ci in 0..k {
            if counts[ci] > 0 {
                for ch in 0..3 {
                    centers[ci][ch] = sums[ci][ch] / counts[ci] as f64;
                }
            }
        }

        if !changed {
            break;
        }
    }

    let mut counts = vec![0usize; k];
    for &c in &assignment {
        counts[c] += 1;
    }

    let mut result: Vec<ColorShare> = centers
        .iter()
        .zip(counts.iter())
        .filter(|(_, &count)| count > 0)
        .map(|(c, &count)| ColorShare {
            bgr: [
                c[0].round().clamp(0.0, 255.0) as u8,
                c[1].round().clamp(0.0, 255.0) as u8,
                c[2].round().clamp(0.0, 255.0) as u8,
            ],
            percentage: count as f64 / total as f64 * 100.0,
        })
        .collect();
    result.sort_by(|a, b| b.percentage.partial_cmp(&a.percentage).unwrap_or(std::cmp::Ordering::Equal));

    tracing::debug!(ctx = %context, clusters = result.len(), "dominant color analysis complete");
    result
}
