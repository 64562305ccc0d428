use std::collections::HashSet;

use image::RgbaImage;

use crate::analysis::color::{average_color, dominant_colors, ColorShare};
use crate::analysis::ocr::{OcrEngine, OcrResult};
use crate::analysis::Bgr;

/// Expensive local analyses a region may require, determined once per
/// profile load by statically inspecting every rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    AverageColor,
    Ocr,
    DominantColor,
}

/// Per-region, per-cycle data bundle. Created fresh each cycle; analyses are
/// populated only when some rule requires them, at most once per region per
/// cycle; discarded at cycle end.
#[derive(Debug, Default)]
pub struct RegionData {
    pub image: Option<RgbaImage>,
    pub average_color: Option<Bgr>,
    pub ocr: Option<OcrResult>,
    pub dominant_colors: Option<Vec<ColorShare>>,
}

impl RegionData {
    pub fn with_image(image: Option<RgbaImage>) -> Self {
        Self {
            image,
            ..Self::default()
        }
    }
}

/// Run the required analyses for one region's freshly captured buffer. A
/// failed capture leaves every analysis empty so dependent conditions fail
/// closed.
pub fn build_packet(
    region_name: &str,
    image: Option<RgbaImage>,
    required: &HashSet<AnalysisKind>,
    ocr: &dyn OcrEngine,
    dominant_k: usize,
) -> RegionData {
    let mut packet = RegionData::with_image(image);
    let Some(image) = packet.image.as_ref() else {
        tracing::warn!(region = %region_name, "capture failed, analyses skipped this cycle");
        return packet;
    };

    if required.contains(&AnalysisKind::AverageColor) {
        packet.average_color = average_color(image);
    }
    if required.contains(&AnalysisKind::Ocr) {
        packet.ocr = ocr.recognize(image);
        if packet.ocr.is_none() {
            tracing::warn!(region = %region_name, "OCR analysis failed");
        }
    }
    if required.contains(&AnalysisKind::DominantColor) {
        packet.dominant_colors = Some(dominant_colors(image, dominant_k, region_name));
    }
    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::evaluators::test_support::FixedOcr;
    use image::Rgba;

    #[test]
    fn only_required_analyses_run() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        let ocr = FixedOcr::with_text("hi", 90.0);
        let required: HashSet<AnalysisKind> = [AnalysisKind::AverageColor].into_iter().collect();

        let packet = build_packet("r1", Some(img), &required, &ocr, 3);
        assert!(packet.average_color.is_some());
        assert!(packet.ocr.is_none());
        assert!(packet.dominant_colors.is_none());
        assert_eq!(ocr.call_count(), 0);
    }

    #[test]
    fn ocr_runs_once_when_required() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        let ocr = FixedOcr::with_text("Login", 80.0);
        let required: HashSet<AnalysisKind> = [AnalysisKind::Ocr].into_iter().collect();

        let packet = build_packet("r1", Some(img), &required, &ocr, 3);
        assert_eq!(packet.ocr.as_ref().unwrap().text, "Login");
        assert_eq!(ocr.call_count(), 1);
    }

    #[test]
    fn failed_capture_skips_all_analyses() {
        let ocr = FixedOcr::with_text("x", 1.0);
        let required: HashSet<AnalysisKind> =
            [AnalysisKind::Ocr, AnalysisKind::DominantColor].into_iter().collect();

        let packet = build_packet("r1", None, &required, &ocr, 3);
        assert!(packet.image.is_none());
        assert!(packet.ocr.is_none());
        assert!(packet.dominant_colors.is_none());
        assert_eq!(ocr.call_count(), 0);
    }
}
