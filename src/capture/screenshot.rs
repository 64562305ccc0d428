use image::RgbaImage;
use xcap::Monitor;

use crate::profile::RegionRect;

/// Capture a named screen region as an RGBA buffer.
///
/// The monitor containing the region origin is captured and cropped to the
/// region rectangle, clamped to monitor bounds. Any failure (no display,
/// off-screen origin, capture denied) logs and returns `None` so dependent
/// conditions fail closed this cycle.
pub fn capture_region(region: &RegionRect) -> Option<RgbaImage> {
    let monitors = match Monitor::all() {
        Ok(m) if !m.is_empty() => m,
        Ok(_) => {
            tracing::error!(region = %region.name, "no monitors available");
            return None;
        }
        Err(e) => {
            tracing::error!(region = %region.name, error = %e, "monitor enumeration failed");
            return None;
        }
    };

    let monitor = monitors
        .iter()
        .find(|m| {
            let (mx, my) = (m.x(), m.y());
            let (mw, mh) = (m.width() as i32, m.height() as i32);
            region.x >= mx && region.x < mx + mw && region.y >= my && region.y < my + mh
        })
        .unwrap_or(&monitors[0]);

    let full = match monitor.capture_image() {
        Ok(img) => img,
        Err(e) => {
            tracing::error!(region = %region.name, error = %e, "screen capture failed");
            return None;
        }
    };

    // Region coordinates are global; convert to monitor-local and clamp.
    let local_x = (region.x - monitor.x()).max(0) as u32;
    let local_y = (region.y - monitor.y()).max(0) as u32;
    if local_x >= full.width() || local_y >= full.height() {
        tracing::warn!(region = %region.name, "region origin outside captured monitor");
        return None;
    }
    let w = region.width.min(full.width() - local_x);
    let h = region.height.min(full.height() - local_y);
    if w == 0 || h == 0 {
        tracing::warn!(region = %region.name, "region has no visible area on monitor");
        return None;
    }
    if w != region.width || h != region.height {
        tracing::debug!(
            region = %region.name,
            requested = %format!("{}x{}", region.width, region.height),
            clamped = %format!("{w}x{h}"),
            "region clamped to monitor bounds"
        );
    }

    Some(image::imageops::crop_imm(&full, local_x, local_y, w, h).to_image())
}

/// Encode a buffer as PNG bytes, e.g. for shipping to the vision provider.
pub fn encode_png(image: &RgbaImage) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    match image::DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
    {
        Ok(()) => Some(out),
        Err(e) => {
            tracing::error!(error = %e, "PNG encode failed");
            None
        }
    }
}
