use std::time::Instant;

use async_trait::async_trait;
use base64::Engine as _;

use crate::errors::{VigilError, VigilResult};
use crate::vision::provider::VisionProvider;
use crate::vision::types::{parse_structured, VisionResponse, VisionStatus};

pub struct GeminiProvider {
    api_base: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_base: String, api_key: String, default_model: String) -> Self {
        Self {
            api_base,
            api_key,
            default_model,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn query(
        &self,
        prompt: &str,
        image_png: Option<&[u8]>,
        model_override: Option<&str>,
    ) -> VigilResult<VisionResponse> {
        let model = model_override.unwrap_or(&self.default_model);
        let started = Instant::now();

        if prompt.trim().is_empty() {
            return Ok(VisionResponse::error(model, "prompt is empty"));
        }

        let mut parts = vec![serde_json::json!({ "text": prompt })];
        if let Some(png) = image_png {
            parts.push(serde_json::json!({
                "inline_data": {
                    "mime_type": "image/png",
                    "data": base64::engine::general_purpose::STANDARD.encode(png),
                }
            }));
        }
        let body = serde_json::json!({ "contents": [{ "parts": parts }] });

        tracing::debug!(
            model = %model,
            prompt_len = prompt.len(),
            has_image = image_png.is_some(),
            "sending vision query"
        );

        let response = self
            .client
            .post(self.endpoint(model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let latency_ms = started.elapsed().as_millis() as u64;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            tracing::warn!(model = %model, status = %status, "vision API returned failure");
            let mut out = VisionResponse::error(model, format!("{status}: {err_body}"));
            out.latency_ms = latency_ms;
            return Ok(out);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VigilError::Vision(format!("malformed vision response: {e}")))?;

        let mut out = process_response(&json, model);
        out.latency_ms = latency_ms;
        tracing::info!(
            model = %model,
            status = ?out.status,
            latency_ms = out.latency_ms,
            structured = out.structured.is_some(),
            "vision query finished"
        );
        Ok(out)
    }
}

/// Map a raw generateContent response to the engine-facing shape: prompt
/// feedback block reasons and abnormal finish reasons are `Blocked`, a normal
/// stop with candidate text is `Success` (with best-effort JSON parsing).
fn process_response(json: &serde_json::Value, model: &str) -> VisionResponse {
    if let Some(reason) = json
        .pointer("/promptFeedback/blockReason")
        .and_then(|v| v.as_str())
    {
        return VisionResponse {
            status: VisionStatus::Blocked,
            text: None,
            structured: None,
            error: Some(format!("prompt blocked: {reason}")),
            model_used: model.to_string(),
            latency_ms: 0,
        };
    }

    let Some(candidate) = json.pointer("/candidates/0") else {
        return VisionResponse::error(model, "no candidates in response");
    };

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let finish = candidate["finishReason"].as_str().unwrap_or("STOP");
    if !finish.eq_ignore_ascii_case("stop") {
        return VisionResponse {
            status: VisionStatus::Blocked,
            text: if text.is_empty() { None } else { Some(text) },
            structured: None,
            error: Some(format!("generation stopped: {finish}")),
            model_used: model.to_string(),
            latency_ms: 0,
        };
    }

    let structured = parse_structured(&text);
    VisionResponse {
        status: VisionStatus::Success,
        text: Some(text),
        structured,
        error: None,
        model_used: model.to_string(),
        latency_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_with_structured_payload() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "```json\n{\"found\": true, \"box\": [1,2,3,4]}\n```" }] },
                "finishReason": "STOP"
            }]
        });
        let resp = process_response(&raw, "m");
        assert_eq!(resp.status, VisionStatus::Success);
        assert_eq!(resp.structured.as_ref().unwrap()["box"][2], json!(3));
    }

    #[test]
    fn prompt_block_maps_to_blocked() {
        let raw = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let resp = process_response(&raw, "m");
        assert_eq!(resp.status, VisionStatus::Blocked);
        assert!(resp.error.unwrap().contains("SAFETY"));
    }

    #[test]
    fn abnormal_finish_maps_to_blocked_with_partial_text() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "partial" }] },
                "finishReason": "SAFETY"
            }]
        });
        let resp = process_response(&raw, "m");
        assert_eq!(resp.status, VisionStatus::Blocked);
        assert_eq!(resp.text.as_deref(), Some("partial"));
    }

    #[test]
    fn empty_candidates_is_error() {
        let resp = process_response(&json!({}), "m");
        assert_eq!(resp.status, VisionStatus::Error);
    }
}
