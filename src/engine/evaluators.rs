use std::path::Path;

use serde_json::Value;

use crate::analysis::color::{self, within_tolerance};
use crate::analysis::ocr::OcrEngine;
use crate::analysis::template::{match_template, TemplateCache};
use crate::capture::screenshot::encode_png;
use crate::engine::packet::RegionData;
use crate::engine::spec::{ConditionKind, SimpleCondition};
use crate::engine::subst::value_to_string;
use crate::engine::vars::MatchInfo;
use crate::vision::provider::VisionProvider;
use crate::vision::types::VisionStatus;

/// Verdict of one condition evaluation: the boolean outcome, an optional
/// value to capture (raw, wrapped by the orchestrator), and — for template
/// matches — the match geometry.
#[derive(Debug, Default)]
pub struct ConditionOutcome {
    pub met: bool,
    pub captured: Option<Value>,
    pub match_info: Option<MatchInfo>,
}

impl ConditionOutcome {
    fn no_match() -> Self {
        Self::default()
    }

    fn met() -> Self {
        Self {
            met: true,
            ..Self::default()
        }
    }
}

/// Collaborators an evaluation may consult, owned by the orchestrator and
/// borrowed per call so engines stay independently instantiable.
pub struct EvalDeps<'a> {
    pub ocr: &'a dyn OcrEngine,
    pub vision: Option<&'a dyn VisionProvider>,
    pub templates: &'a mut TemplateCache,
    pub templates_dir: &'a Path,
    pub dominant_k: usize,
}

/// Evaluate one simple condition against a region's data packet.
///
/// Never errors: a malformed or unsatisfiable spec logs a diagnostic and
/// yields `met = false`.
pub async fn evaluate(
    cond: &SimpleCondition,
    region_name: &str,
    packet: &RegionData,
    rule: &str,
    deps: &mut EvalDeps<'_>,
) -> ConditionOutcome {
    let ctx = format!("R '{rule}', Rgn '{region_name}'");
    match &cond.kind {
        ConditionKind::PixelColor {
            relative_x,
            relative_y,
            expected_bgr,
            tolerance,
        } => {
            let Some(image) = packet.image.as_ref() else {
                tracing::warn!(ctx = %ctx, "pixel_color: no image for region");
                return ConditionOutcome::no_match();
            };
            if color::pixel_color(image, *relative_x, *relative_y, *expected_bgr, *tolerance, &ctx)
            {
                ConditionOutcome::met()
            } else {
                ConditionOutcome::no_match()
            }
        }

        ConditionKind::AverageColorIs {
            expected_bgr,
            tolerance,
        } => {
            let actual = packet
                .average_color
                .or_else(|| packet.image.as_ref().and_then(color::average_color));
            let Some(actual) = actual else {
                tracing::warn!(ctx = %ctx, "average_color_is: no pre-computed value and no image");
                return ConditionOutcome::no_match();
            };
            let met = within_tolerance(actual, *expected_bgr, (*tolerance).clamp(0, 255));
            tracing::debug!(ctx = %ctx, actual = ?actual, expected = ?expected_bgr, met, "average color check");
            if met {
                ConditionOutcome::met()
            } else {
                ConditionOutcome::no_match()
            }
        }

        ConditionKind::TemplateMatchFound {
            template_filename,
            min_confidence,
        } => {
            // Match info is reported even on a miss so the rule's
            // "last match" state reflects this evaluation.
            let mut outcome = ConditionOutcome {
                match_info: Some(MatchInfo::default()),
                ..ConditionOutcome::default()
            };
            let Some(image) = packet.image.as_ref() else {
                tracing::warn!(ctx = %ctx, "template_match_found: no image for region");
                return outcome;
            };
            let Some(template) = deps.templates.load(deps.templates_dir, template_filename, &ctx)
            else {
                return outcome;
            };
            if let Some(hit) = match_template(image, &template, *min_confidence, &ctx) {
                outcome.met = true;
                outcome.match_info = Some(MatchInfo {
                    found: true,
                    location_x: i64::from(hit.location_x),
                    location_y: i64::from(hit.location_y),
                    confidence: hit.confidence,
                    width: i64::from(hit.width),
                    height: i64::from(hit.height),
                    matched_region_name: region_name.to_string(),
                });
                outcome.captured = serde_json::to_value(&hit).ok();
            }
            outcome
        }

        ConditionKind::OcrContainsText {
            text_to_find,
            case_sensitive,
            min_ocr_confidence,
        } => {
            let ocr = packet
                .ocr
                .clone()
                .or_else(|| packet.image.as_ref().and_then(|img| deps.ocr.recognize(img)));
            let Some(ocr) = ocr else {
                tracing::warn!(ctx = %ctx, "ocr_contains_text: no OCR result available");
                return ConditionOutcome::no_match();
            };

            let candidates = text_to_find.items();
            if candidates.is_empty() {
                tracing::warn!(ctx = %ctx, "ocr_contains_text: empty candidate list, condition fails");
                return ConditionOutcome::no_match();
            }

            let haystack = if *case_sensitive {
                ocr.text.clone()
            } else {
                ocr.text.to_lowercase()
            };
            let text_found = candidates.iter().any(|c| {
                let needle = if *case_sensitive { c.clone() } else { c.to_lowercase() };
                haystack.contains(&needle)
            });
            if !text_found {
                tracing::debug!(ctx = %ctx, candidates = ?candidates, "keywords not found in OCR text");
                return ConditionOutcome::no_match();
            }

            let min_conf = min_ocr_confidence.as_ref().and_then(|v| {
                let parsed = v.as_f64();
                if parsed.is_none() {
                    tracing::warn!(ctx = %ctx, value = ?v, "invalid min_ocr_confidence, check skipped");
                }
                parsed
            });
            if let Some(threshold) = min_conf {
                if ocr.avg_confidence < threshold {
                    tracing::debug!(
                        ctx = %ctx,
                        confidence = ocr.avg_confidence,
                        threshold,
                        "text found but confidence below threshold"
                    );
                    return ConditionOutcome::no_match();
                }
            }

            ConditionOutcome {
                met: true,
                captured: Some(Value::String(ocr.text)),
                match_info: None,
            }
        }

        ConditionKind::DominantColorMatches {
            expected_bgr,
            tolerance,
            check_top_n_dominant,
            min_percentage,
        } => {
            let shares = packet.dominant_colors.clone().or_else(|| {
                packet
                    .image
                    .as_ref()
                    .map(|img| color::dominant_colors(img, deps.dominant_k, &ctx))
            });
            let Some(shares) = shares else {
                tracing::warn!(ctx = %ctx, "dominant_color_matches: no clustering result and no image");
                return ConditionOutcome::no_match();
            };

            let tolerance = (*tolerance).clamp(0, 255);
            // Each candidate within the top N is checked independently
            // against both the color tolerance and the percentage minimum.
            for share in shares.iter().take(*check_top_n_dominant) {
                if within_tolerance(share.bgr, *expected_bgr, tolerance)
                    && share.percentage >= *min_percentage
                {
                    tracing::debug!(
                        ctx = %ctx,
                        bgr = ?share.bgr,
                        percentage = share.percentage,
                        "dominant color matched"
                    );
                    return ConditionOutcome::met();
                }
            }
            ConditionOutcome::no_match()
        }

        ConditionKind::GeminiVisionQuery {
            prompt,
            model_name,
            expected_response_contains,
            case_sensitive_response_check,
            expected_response_json_path,
            expected_json_value,
        } => {
            let Some(vision) = deps.vision else {
                tracing::error!(ctx = %ctx, "gemini_vision_query: no vision provider configured");
                return ConditionOutcome::no_match();
            };
            let Some(image) = packet.image.as_ref() else {
                tracing::warn!(ctx = %ctx, "gemini_vision_query: no image for region");
                return ConditionOutcome::no_match();
            };
            let Some(png) = encode_png(image) else {
                return ConditionOutcome::no_match();
            };

            let response = match vision.query(prompt, Some(&png), model_name.as_deref()).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(ctx = %ctx, error = %e, "vision query transport failure");
                    return ConditionOutcome::no_match();
                }
            };
            if response.status != VisionStatus::Success {
                tracing::warn!(
                    ctx = %ctx,
                    status = ?response.status,
                    error = response.error.as_deref().unwrap_or(""),
                    "vision query did not succeed"
                );
                return ConditionOutcome::no_match();
            }

            let text = response.text.unwrap_or_default();
            let structured = response.structured;

            // Text check is vacuously true when no substrings are given.
            let substrings = expected_response_contains
                .as_ref()
                .map(|s| s.items())
                .unwrap_or_default();
            let text_ok = substrings.is_empty() || {
                let haystack = if *case_sensitive_response_check {
                    text.clone()
                } else {
                    text.to_lowercase()
                };
                substrings.iter().any(|s| {
                    let needle = if *case_sensitive_response_check {
                        s.clone()
                    } else {
                        s.to_lowercase()
                    };
                    haystack.contains(&needle)
                })
            };

            let mut value_at_path: Option<Value> = None;
            let json_ok = match expected_response_json_path.as_deref().filter(|p| !p.is_empty()) {
                None => true,
                Some(path) => match structured.as_ref().and_then(|s| walk_path(s, path)) {
                    None => {
                        tracing::debug!(ctx = %ctx, path = %path, "JSON path not resolvable in response");
                        false
                    }
                    Some(found) => {
                        value_at_path = Some(found.clone());
                        match expected_json_value {
                            Some(expected) => value_to_string(found) == value_to_string(expected),
                            None => true,
                        }
                    }
                },
            };

            if !(text_ok && json_ok) {
                tracing::debug!(ctx = %ctx, text_ok, json_ok, "vision query conditions not met");
                return ConditionOutcome::no_match();
            }

            // Capture precedence: value at path, else whole structured
            // response, else free text.
            let captured = value_at_path
                .or(structured)
                .unwrap_or(Value::String(text));
            ConditionOutcome {
                met: true,
                captured: Some(captured),
                match_info: None,
            }
        }

        ConditionKind::AlwaysTrue => ConditionOutcome::met(),
    }
}

fn walk_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.trim_matches('.').split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
