use serde::{Deserialize, Serialize};

/// A monitoring rule: a trigger condition evaluated against a default region
/// and an action dispatched when the condition holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
    pub condition: ConditionSpec,
    pub action: ActionSpec,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogicalOp {
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// Trigger definition: a single condition, or an ordered AND/OR set of
/// simple conditions. Sub-conditions are simple by construction; a compound
/// nested inside a compound fails profile parsing and skips the rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    Compound {
        logical_operator: LogicalOp,
        sub_conditions: Vec<SimpleCondition>,
    },
    Simple(SimpleCondition),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleCondition {
    /// Overrides the owning rule's default region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Name this condition's output for reuse within the same rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_as: Option<String>,
    #[serde(flatten)]
    pub kind: ConditionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionKind {
    PixelColor {
        #[serde(default)]
        relative_x: i64,
        #[serde(default)]
        relative_y: i64,
        expected_bgr: [i64; 3],
        #[serde(default)]
        tolerance: i64,
    },
    AverageColorIs {
        expected_bgr: [i64; 3],
        #[serde(default = "default_color_tolerance")]
        tolerance: i64,
    },
    TemplateMatchFound {
        template_filename: String,
        #[serde(default = "default_min_confidence")]
        min_confidence: f64,
    },
    OcrContainsText {
        text_to_find: StringOrList,
        #[serde(default)]
        case_sensitive: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_ocr_confidence: Option<NumValue>,
    },
    DominantColorMatches {
        expected_bgr: [i64; 3],
        #[serde(default = "default_color_tolerance")]
        tolerance: i64,
        #[serde(default = "default_top_n")]
        check_top_n_dominant: usize,
        #[serde(default)]
        min_percentage: f64,
    },
    GeminiVisionQuery {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_response_contains: Option<StringOrList>,
        #[serde(default)]
        case_sensitive_response_check: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_response_json_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_json_value: Option<serde_json::Value>,
    },
    AlwaysTrue,
}

fn default_color_tolerance() -> i64 {
    10
}

fn default_min_confidence() -> f64 {
    0.8
}

fn default_top_n() -> usize {
    1
}

/// Addressing mode converting a logical click target into screen coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetRelation {
    Absolute,
    CenterOfRegion,
    RelativeToRegion,
    CenterOfLastMatch,
    CenterOfGeminiElement,
    TopLeftOfGeminiElement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    Click {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_relation: Option<TargetRelation>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<NumValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<NumValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_region: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gemini_element_variable: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clicks: Option<NumValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval: Option<NumValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pause_before: Option<NumValue>,
    },
    TypeText {
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval: Option<NumValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pause_before: Option<NumValue>,
    },
    PressKey {
        key: KeyParam,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pause_before: Option<NumValue>,
    },
    LogMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<String>,
    },
    /// AI-composed multi-step task, forwarded to the external task runner.
    GeminiPerformTask {
        #[serde(alias = "goal_prompt")]
        natural_language_command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context_region_names: Option<StringOrList>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        allowed_actions_override: Option<StringOrList>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        require_confirmation_per_step: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_steps: Option<NumValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pause_before: Option<NumValue>,
    },
}

impl ActionSpec {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ActionSpec::Click { .. } => "click",
            ActionSpec::TypeText { .. } => "type_text",
            ActionSpec::PressKey { .. } => "press_key",
            ActionSpec::LogMessage { .. } => "log_message",
            ActionSpec::GeminiPerformTask { .. } => "gemini_perform_task",
        }
    }
}

/// Candidate-string parameter: either a comma-separated string or a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    /// Trimmed, non-empty candidates; a comma-separated string splits.
    pub fn items(&self) -> Vec<String> {
        match self {
            StringOrList::One(s) => s
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            StringOrList::Many(list) => list
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

/// Key parameter: a single key name, or an ordered hotkey combination.
/// Unlike `StringOrList`, a single string is one key and never splits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyParam {
    One(String),
    Combo(Vec<String>),
}

/// Numeric parameter that may arrive as a native number or, after variable
/// substitution, as a numeric string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NumValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl NumValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NumValue::Int(i) => Some(*i as f64),
            NumValue::Float(f) => Some(*f),
            NumValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Integer coercion; numeric strings like "10.0" truncate the way a
    /// float-then-int parse would.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NumValue::Int(i) => Some(*i),
            NumValue::Float(f) => Some(*f as i64),
            NumValue::Text(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        }
    }
}
