use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A captured value paired with the region it originated from. The region is
/// required later when the action resolver turns captured geometry back into
/// absolute screen coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapturedValue {
    pub value: serde_json::Value,
    pub source_region: String,
}

impl CapturedValue {
    pub fn new(value: serde_json::Value, source_region: impl Into<String>) -> Self {
        Self {
            value,
            source_region: source_region.into(),
        }
    }

    /// The wrapped shape substitution paths walk: `{name.value.box.0}`
    /// addresses into this object.
    pub fn as_json(&self) -> serde_json::Value {
        serde_json::json!({
            "value": self.value,
            "source_region": self.source_region,
        })
    }
}

/// Rule-scoped capture store. Created empty per rule evaluation and discarded
/// when the rule's evaluation ends; captures never cross rules.
pub type VariableContext = HashMap<String, CapturedValue>;

/// Geometry of the most recent template match within a rule's condition
/// tree. Reset to not-found at the start of each rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchInfo {
    pub found: bool,
    pub location_x: i64,
    pub location_y: i64,
    pub confidence: f64,
    pub width: i64,
    pub height: i64,
    pub matched_region_name: String,
}

impl Default for MatchInfo {
    fn default() -> Self {
        Self {
            found: false,
            location_x: 0,
            location_y: 0,
            confidence: 0.0,
            width: 0,
            height: 0,
            matched_region_name: String::new(),
        }
    }
}

/// An AI-located element as captured by a vision query: a bounding box
/// relative to the source region's top-left. Malformed payloads fail to
/// parse and the addressing mode fails closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeminiElement {
    pub found: bool,
    #[serde(rename = "box")]
    pub bbox: [i64; 4],
    #[serde(default, alias = "element_label")]
    pub label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn captured_value_wraps_for_path_lookup() {
        let cv = CapturedValue::new(json!({"box": [120, 80, 30, 20]}), "panel");
        let wrapped = cv.as_json();
        assert_eq!(wrapped["value"]["box"][0], json!(120));
        assert_eq!(wrapped["source_region"], json!("panel"));
    }

    #[test]
    fn gemini_element_parses_with_label_alias() {
        let el: GeminiElement = serde_json::from_value(json!({
            "found": true,
            "box": [5, 6, 7, 8],
            "element_label": "Login Button"
        }))
        .unwrap();
        assert!(el.found);
        assert_eq!(el.bbox, [5, 6, 7, 8]);
        assert_eq!(el.label.as_deref(), Some("Login Button"));
    }

    #[test]
    fn gemini_element_without_box_fails_to_parse() {
        let res: Result<GeminiElement, _> =
            serde_json::from_value(json!({"found": false, "box": null}));
        assert!(res.is_err());
    }

    #[test]
    fn match_info_defaults_to_not_found() {
        assert!(!MatchInfo::default().found);
    }
}
