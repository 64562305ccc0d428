use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Geometry of a template hit, relative to the searched buffer's top-left.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateMatch {
    pub location_x: u32,
    pub location_y: u32,
    pub confidence: f64,
    pub width: u32,
    pub height: u32,
}

fn to_gray(image: &RgbaImage) -> Vec<f64> {
    image
        .pixels()
        .map(|p| 0.299 * f64::from(p[0]) + 0.587 * f64::from(p[1]) + 0.114 * f64::from(p[2]))
        .collect()
}

/// Zero-mean normalized cross-correlation search for `template` inside
/// `image`. Returns the best-scoring location iff its score reaches the
/// threshold; a template larger than the image cannot match.
pub fn match_template(
    image: &RgbaImage,
    template: &RgbaImage,
    threshold: f64,
    context: &str,
) -> Option<TemplateMatch> {
    let threshold = if (0.0..=1.0).contains(&threshold) {
        threshold
    } else {
        tracing::warn!(ctx = %context, threshold, "invalid confidence threshold, using 0.8");
        0.8
    };

    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || iw == 0 || ih == 0 {
        tracing::warn!(ctx = %context, "empty image or template");
        return None;
    }
    if tw > iw || th > ih {
        tracing::warn!(
            ctx = %context,
            image = %format!("{iw}x{ih}"),
            template = %format!("{tw}x{th}"),
            "template larger than searched buffer"
        );
        return None;
    }

    let img_gray = to_gray(image);
    let tpl_gray = to_gray(template);

    let tpl_len = tpl_gray.len() as f64;
    let tpl_mean = tpl_gray.iter().sum::<f64>() / tpl_len;
    let tpl_dev: Vec<f64> = tpl_gray.iter().map(|v| v - tpl_mean).collect();
    let tpl_norm: f64 = tpl_dev.iter().map(|v| v * v).sum();

    let mut best_score = f64::MIN;
    let mut best_xy = (0u32, 0u32);

    for oy in 0..=(ih - th) {
        for ox in 0..=(iw - tw) {
            let mut win_sum = 0.0;
            for ty in 0..th {
                let row = ((oy + ty) * iw + ox) as usize;
                for tx in 0..tw {
                    win_sum += img_gray[row + tx as usize];
                }
            }
            let win_mean = win_sum / tpl_len;

            let mut cross = 0.0;
            let mut win_norm = 0.0;
            for ty in 0..th {
                let row = ((oy + ty) * iw + ox) as usize;
                let trow = (ty * tw) as usize;
                for tx in 0..tw {
                    let iv = img_gray[row + tx as usize] - win_mean;
                    cross += iv * tpl_dev[trow + tx as usize];
                    win_norm += iv * iv;
                }
            }

            let denom = (win_norm * tpl_norm).sqrt();
            let score = if denom > f64::EPSILON { cross / denom } else { 0.0 };
            if score > best_score {
                best_score = score;
                best_xy = (ox, oy);
            }
        }
    }

    if best_score >= threshold {
        tracing::debug!(
            ctx = %context,
            x = best_xy.0,
            y = best_xy.1,
            confidence = best_score,
            "template matched"
        );
        Some(TemplateMatch {
            location_x: best_xy.0,
            location_y: best_xy.1,
            confidence: best_score,
            width: tw,
            height: th,
        })
    } else {
        tracing::debug!(ctx = %context, best = best_score, threshold, "template not matched");
        None
    }
}

/// Template images loaded once per `(profile dir, filename)` and never
/// invalidated within a run. Load failures are cached too, so a missing file
/// is reported once instead of every cycle.
#[derive(Default)]
pub struct TemplateCache {
    cache: HashMap<(PathBuf, String), Option<Arc<RgbaImage>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, templates_dir: &Path, filename: &str, context: &str) -> Option<Arc<RgbaImage>> {
        let key = (templates_dir.to_path_buf(), filename.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let path = templates_dir.join(filename);
        let loaded = match image::open(&path) {
            Ok(img) => {
                let img = img.to_rgba8();
                tracing::info!(
                    ctx = %context,
                    path = %path.display(),
                    size = %format!("{}x{}", img.width(), img.height()),
                    "template loaded"
                );
                Some(Arc::new(img))
            }
            Err(e) => {
                tracing::error!(ctx = %context, path = %path.display(), error = %e, "template load failed");
                None
            }
        };
        self.cache.insert(key, loaded.clone());
        loaded
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    #[test]
    fn finds_exact_subimage() {
        let mut img = RgbaImage::from_pixel(30, 30, Rgba([40, 40, 40, 255]));
        let pattern = checker(6, 6);
        image::imageops::overlay(&mut img, &pattern, 12, 8);

        let found = match_template(&img, &pattern, 0.8, "t").expect("match");
        assert_eq!((found.location_x, found.location_y), (12, 8));
        assert_eq!((found.width, found.height), (6, 6));
        assert!(found.confidence > 0.95);
    }

    #[test]
    fn below_threshold_is_none() {
        let img = RgbaImage::from_pixel(20, 20, Rgba([10, 10, 10, 255]));
        let pattern = checker(5, 5);
        assert!(match_template(&img, &pattern, 0.8, "t").is_none());
    }

    #[test]
    fn oversized_template_is_none() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let pattern = checker(8, 8);
        assert!(match_template(&img, &pattern, 0.5, "t").is_none());
    }

    #[test]
    fn cache_remembers_load_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = TemplateCache::new();
        assert!(cache.load(dir.path(), "missing.png", "t").is_none());
        assert!(cache.load(dir.path(), "missing.png", "t").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_returns_same_image_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tpl.png");
        checker(4, 4).save(&path).unwrap();

        let mut cache = TemplateCache::new();
        let a = cache.load(dir.path(), "tpl.png", "t").unwrap();
        let b = cache.load(dir.path(), "tpl.png", "t").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
