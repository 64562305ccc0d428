use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::spec::Rule;
use crate::errors::{VigilError, VigilResult};

pub const TEMPLATES_SUBDIR: &str = "templates";

/// Named rectangular screen area captured each monitoring cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionRect {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSettings {
    #[serde(default = "default_interval")]
    pub monitoring_interval_seconds: f64,
    #[serde(default = "default_dominant_k")]
    pub analysis_dominant_colors_k: usize,
    /// Path to the tesseract binary; falls back to `tesseract` in PATH.
    #[serde(default)]
    pub tesseract_cmd: Option<String>,
    #[serde(default)]
    pub gemini_default_model_name: Option<String>,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            monitoring_interval_seconds: default_interval(),
            analysis_dominant_colors_k: default_dominant_k(),
            tesseract_cmd: None,
            gemini_default_model_name: None,
        }
    }
}

fn default_interval() -> f64 {
    1.0
}

fn default_dominant_k() -> usize {
    3
}

/// Parsed profile document: the regions to monitor, the rule list, and
/// engine settings. Rules that fail to parse are skipped, not fatal.
#[derive(Debug, Clone)]
pub struct Profile {
    pub regions: Vec<RegionRect>,
    pub rules: Vec<Rule>,
    pub settings: ProfileSettings,
    /// Directory containing the profile file; templates resolve against it.
    pub base_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    #[serde(default)]
    regions: Vec<RegionRect>,
    #[serde(default)]
    rules: Vec<serde_json::Value>,
    #[serde(default)]
    settings: ProfileSettings,
}

impl Profile {
    pub fn templates_dir(&self) -> PathBuf {
        self.base_dir.join(TEMPLATES_SUBDIR)
    }

    pub fn region(&self, name: &str) -> Option<&RegionRect> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn region_map(&self) -> HashMap<String, RegionRect> {
        self.regions
            .iter()
            .map(|r| (r.name.clone(), r.clone()))
            .collect()
    }
}

/// Resolve a profile argument to a file path: absolute or relative paths are
/// used as-is, a bare name is looked up under the user profile directory.
fn resolve_profile_path(name_or_path: &str) -> PathBuf {
    let direct = PathBuf::from(name_or_path);
    if direct.exists() || direct.components().count() > 1 {
        return direct;
    }
    let file_name = if name_or_path.ends_with(".json") {
        name_or_path.to_string()
    } else {
        format!("{name_or_path}.json")
    };
    profiles_dir().join(file_name)
}

/// `~/.config/vigil/profiles`, falling back to the working directory.
pub fn profiles_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("vigil").join("profiles"))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_profile(name_or_path: &str) -> VigilResult<Profile> {
    let path = resolve_profile_path(name_or_path);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        VigilError::Profile(format!("cannot read profile '{}': {e}", path.display()))
    })?;
    let raw: RawProfile = serde_json::from_str(&content)
        .map_err(|e| VigilError::Profile(format!("malformed profile '{}': {e}", path.display())))?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let profile = build_profile(raw, base_dir);
    tracing::info!(
        path = %path.display(),
        regions = profile.regions.len(),
        rules = profile.rules.len(),
        interval = profile.settings.monitoring_interval_seconds,
        "profile loaded"
    );
    Ok(profile)
}

fn build_profile(raw: RawProfile, base_dir: PathBuf) -> Profile {
    let mut settings = raw.settings;
    if !settings.monitoring_interval_seconds.is_finite() || settings.monitoring_interval_seconds <= 0.0
    {
        tracing::warn!(
            value = settings.monitoring_interval_seconds,
            "invalid monitoring_interval_seconds, defaulting to 1.0"
        );
        settings.monitoring_interval_seconds = default_interval();
    }
    if settings.analysis_dominant_colors_k == 0 {
        tracing::warn!("invalid analysis_dominant_colors_k (0), defaulting to 3");
        settings.analysis_dominant_colors_k = default_dominant_k();
    }

    let mut seen = std::collections::HashSet::new();
    for region in &raw.regions {
        if !seen.insert(region.name.clone()) {
            tracing::warn!(region = %region.name, "duplicate region name, later definition shadows earlier");
        }
        if region.width == 0 || region.height == 0 {
            tracing::warn!(region = %region.name, "region has zero width or height");
        }
    }

    // Rules parse one by one so a single malformed rule cannot take the
    // whole profile down with it.
    let mut rules = Vec::new();
    for (idx, value) in raw.rules.into_iter().enumerate() {
        match serde_json::from_value::<Rule>(value) {
            Ok(rule) => rules.push(rule),
            Err(e) => {
                tracing::warn!(index = idx, error = %e, "skipping malformed rule");
            }
        }
    }

    Profile {
        regions: raw.regions,
        rules,
        settings,
        base_dir,
    }
}
