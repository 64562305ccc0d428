use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;

use crate::analysis::ocr::OcrEngine;
use crate::analysis::template::TemplateCache;
use crate::engine::evaluators::{self, EvalDeps};
use crate::engine::history::RuleEventLog;
use crate::engine::packet::{self, AnalysisKind, RegionData};
use crate::engine::spec::{
    ActionSpec, ConditionKind, ConditionSpec, LogicalOp, NumValue, Rule, SimpleCondition,
    StringOrList,
};
use crate::engine::subst::substitute_value;
use crate::engine::tasks::{TaskParams, TaskRunner};
use crate::engine::vars::{CapturedValue, MatchInfo, VariableContext};
use crate::errors::VigilResult;
use crate::executor::actions::ActionExecutor;
use crate::executor::resolver::DispatchContext;
use crate::profile::{Profile, ProfileSettings, RegionRect};
use crate::vision::provider::VisionProvider;

/// Collaborators handed to the engine at construction. Everything is behind
/// a trait so engines are instantiable multiple times without
/// cross-contamination.
pub struct EngineDeps {
    pub ocr: Arc<dyn OcrEngine>,
    pub vision: Option<Arc<dyn VisionProvider>>,
    pub tasks: Option<Arc<dyn TaskRunner>>,
}

/// Owns the rule list and drives one evaluation pass per monitoring cycle:
/// per-region analysis planning, condition-tree evaluation with rule-scoped
/// variable capture, substitution, and action dispatch.
pub struct RuleEngine {
    rules: Arc<Vec<Rule>>,
    regions: HashMap<String, RegionRect>,
    settings: ProfileSettings,
    templates_dir: PathBuf,
    requirements: HashMap<String, HashSet<AnalysisKind>>,
    templates: TemplateCache,
    deps: EngineDeps,
    executor: ActionExecutor,
    last_match: MatchInfo,
    event_log: Option<RuleEventLog>,
}

impl RuleEngine {
    pub fn new(profile: &Profile, deps: EngineDeps, executor: ActionExecutor) -> Self {
        let requirements = scan_requirements(&profile.rules);
        if profile.rules.is_empty() {
            tracing::warn!("no rules in loaded profile");
        } else {
            tracing::info!(
                rules = profile.rules.len(),
                regions_with_requirements = requirements.len(),
                "rule engine initialized"
            );
        }
        if deps.vision.is_none() {
            tracing::warn!("no vision provider configured; gemini_vision_query conditions will fail");
        }
        if deps.tasks.is_none() {
            tracing::warn!("no task runner configured; gemini_perform_task actions will be skipped");
        }

        Self {
            rules: Arc::new(profile.rules.clone()),
            regions: profile.region_map(),
            settings: profile.settings.clone(),
            templates_dir: profile.templates_dir(),
            requirements,
            templates: TemplateCache::new(),
            deps,
            executor,
            last_match: MatchInfo::default(),
            event_log: None,
        }
    }

    /// Attach a session event log; each dispatched action appends a record.
    pub fn with_event_log(mut self, log: RuleEventLog) -> Self {
        self.event_log = Some(log);
        self
    }

    /// Analyses the capture stage must run for this region, per the
    /// profile-load pre-scan.
    pub fn requirements_for(&self, region: &str) -> HashSet<AnalysisKind> {
        self.requirements.get(region).cloned().unwrap_or_default()
    }

    /// Populate one region's per-cycle packet: each required expensive
    /// analysis runs at most once per region per cycle, shared by every rule
    /// that needs it.
    pub fn build_packet(&self, region_name: &str, image: Option<RgbaImage>) -> RegionData {
        let required = self.requirements_for(region_name);
        packet::build_packet(
            region_name,
            image,
            &required,
            &*self.deps.ocr,
            self.settings.analysis_dominant_colors_k,
        )
    }

    /// Evaluate every rule, in list order, against this cycle's region data.
    /// Returns the number of standard actions dispatched; the only `Err` is
    /// the fail-safe abort, which the caller uses to stop the loop.
    pub async fn evaluate_cycle(
        &mut self,
        region_data: &HashMap<String, RegionData>,
    ) -> VigilResult<usize> {
        let rules = Arc::clone(&self.rules);
        let mut dispatched = 0usize;

        for rule in rules.iter() {
            self.last_match = MatchInfo::default();
            let mut vars: VariableContext = HashMap::new();

            let met = self.check_condition(rule, region_data, &mut vars).await;
            if !met {
                continue;
            }
            tracing::info!(rule = %rule.name, action = %rule.action.kind_name(), "condition met");

            let action = substituted_action(&rule.action, &vars, &rule.name);
            match &action {
                ActionSpec::GeminiPerformTask {
                    natural_language_command,
                    context_region_names,
                    allowed_actions_override,
                    require_confirmation_per_step,
                    max_steps,
                    pause_before,
                    ..
                } => {
                    self.forward_task(
                        rule,
                        natural_language_command,
                        context_region_names.as_ref(),
                        allowed_actions_override.as_ref(),
                        *require_confirmation_per_step,
                        max_steps.as_ref(),
                        pause_before.as_ref(),
                        region_data,
                    )
                    .await;
                }
                standard => {
                    let ctx = DispatchContext {
                        rule_name: &rule.name,
                        condition_region: rule.region.as_deref(),
                        last_match: &self.last_match,
                        variables: &vars,
                        regions: &self.regions,
                    };
                    dispatched += 1;
                    let performed = self.executor.execute(standard, &ctx).await?;
                    if let Some(log) = self.event_log.as_mut() {
                        log.push(
                            &rule.name,
                            standard.kind_name(),
                            Some(format!("performed: {performed}")),
                        );
                    }
                }
            }
        }

        tracing::debug!(dispatched, "rule evaluation cycle finished");
        Ok(dispatched)
    }

    async fn check_condition(
        &mut self,
        rule: &Rule,
        region_data: &HashMap<String, RegionData>,
        vars: &mut VariableContext,
    ) -> bool {
        match &rule.condition {
            ConditionSpec::Compound {
                logical_operator,
                sub_conditions,
            } => {
                if sub_conditions.is_empty() {
                    tracing::warn!(rule = %rule.name, "compound condition with no sub-conditions");
                    return false;
                }
                for (i, sub) in sub_conditions.iter().enumerate() {
                    let label = format!("{}/sub#{}", rule.name, i + 1);
                    let met = self
                        .eval_sub(sub, rule.region.as_deref(), &label, region_data, vars)
                        .await;
                    match logical_operator {
                        LogicalOp::And if !met => {
                            tracing::debug!(rule = %rule.name, sub = i + 1, "AND short-circuited false");
                            return false;
                        }
                        LogicalOp::Or if met => {
                            tracing::debug!(rule = %rule.name, sub = i + 1, "OR short-circuited true");
                            return true;
                        }
                        _ => {}
                    }
                }
                matches!(logical_operator, LogicalOp::And)
            }
            ConditionSpec::Simple(simple) => {
                self.eval_sub(simple, rule.region.as_deref(), &rule.name, region_data, vars)
                    .await
            }
        }
    }

    async fn eval_sub(
        &mut self,
        cond: &SimpleCondition,
        default_region: Option<&str>,
        label: &str,
        region_data: &HashMap<String, RegionData>,
        vars: &mut VariableContext,
    ) -> bool {
        // Substitution runs before region resolution so earlier captures can
        // steer later sub-conditions.
        let cond = substituted_condition(cond, vars, label);

        let Some(region) = cond.region.as_deref().or(default_region) else {
            tracing::error!(cond = %label, "no target region and no rule default, condition fails");
            return false;
        };
        let Some(packet) = region_data.get(region) else {
            tracing::error!(cond = %label, region = %region, "no data packet for region, condition fails");
            return false;
        };

        let mut deps = EvalDeps {
            ocr: &*self.deps.ocr,
            vision: self.deps.vision.as_deref(),
            templates: &mut self.templates,
            templates_dir: &self.templates_dir,
            dominant_k: self.settings.analysis_dominant_colors_k,
        };
        let outcome = evaluators::evaluate(&cond, region, packet, label, &mut deps).await;

        if let Some(info) = outcome.match_info {
            self.last_match = info;
        }
        if outcome.met {
            if let Some(name) = cond.capture_as.as_deref() {
                match outcome.captured {
                    Some(value) => {
                        tracing::info!(cond = %label, capture = %name, "value captured");
                        vars.insert(name.to_string(), CapturedValue::new(value, region));
                    }
                    None => {
                        tracing::warn!(
                            cond = %label,
                            capture = %name,
                            "capture_as set but condition kind produces no value"
                        );
                    }
                }
            }
        }
        outcome.met
    }

    #[allow(clippy::too_many_arguments)]
    async fn forward_task(
        &mut self,
        rule: &Rule,
        command: &str,
        context_region_names: Option<&StringOrList>,
        allowed_actions: Option<&StringOrList>,
        require_confirmation: Option<bool>,
        max_steps: Option<&NumValue>,
        pause_before: Option<&NumValue>,
        region_data: &HashMap<String, RegionData>,
    ) {
        let Some(runner) = self.deps.tasks.as_ref() else {
            tracing::error!(rule = %rule.name, "task runner unavailable, gemini_perform_task skipped");
            return;
        };
        if command.trim().is_empty() {
            tracing::error!(rule = %rule.name, "empty natural_language_command, task skipped");
            return;
        }

        let mut names: Vec<String> = context_region_names.map(|n| n.items()).unwrap_or_default();
        if names.is_empty() {
            if let Some(default) = rule.region.as_deref() {
                tracing::info!(rule = %rule.name, region = %default, "no context regions named, using rule default");
                names.push(default.to_string());
            }
        }
        if names.is_empty() {
            tracing::error!(rule = %rule.name, "no context regions available, task skipped");
            return;
        }

        let mut images: HashMap<String, RgbaImage> = HashMap::new();
        for name in &names {
            match region_data.get(name).and_then(|p| p.image.clone()) {
                Some(img) => {
                    images.insert(name.clone(), img);
                }
                None => {
                    tracing::error!(
                        rule = %rule.name,
                        region = %name,
                        "context region has no image this cycle, task skipped"
                    );
                    return;
                }
            }
        }

        let params = TaskParams {
            allowed_actions: allowed_actions.map(|a| a.items()).unwrap_or_default(),
            require_confirmation: require_confirmation.unwrap_or(true),
            max_steps: max_steps
                .and_then(NumValue::as_i64)
                .filter(|n| *n > 0)
                .map(|n| n as u32)
                .unwrap_or(5),
            pause_before: pause_before.and_then(NumValue::as_f64).unwrap_or(0.1),
        };

        tracing::info!(
            rule = %rule.name,
            command = %command.chars().take(70).collect::<String>(),
            regions = ?names,
            "forwarding task to decomposer"
        );
        let outcome = runner.execute(&rule.name, command, images, params).await;
        tracing::info!(rule = %rule.name, status = ?outcome.status, message = %outcome.message, "task outcome");
    }
}

/// Which `(region, analysis)` pairs the capture stage must pre-compute,
/// derived once per profile load by walking every rule's condition tree.
/// Vision queries are on-demand and add no local requirement.
fn scan_requirements(rules: &[Rule]) -> HashMap<String, HashSet<AnalysisKind>> {
    let mut requirements: HashMap<String, HashSet<AnalysisKind>> = HashMap::new();

    for rule in rules {
        let conds: Vec<&SimpleCondition> = match &rule.condition {
            ConditionSpec::Compound { sub_conditions, .. } => sub_conditions.iter().collect(),
            ConditionSpec::Simple(simple) => vec![simple],
        };
        for cond in conds {
            let kind = match &cond.kind {
                ConditionKind::OcrContainsText { .. } => AnalysisKind::Ocr,
                ConditionKind::DominantColorMatches { .. } => AnalysisKind::DominantColor,
                ConditionKind::AverageColorIs { .. } => AnalysisKind::AverageColor,
                _ => continue,
            };
            let Some(region) = cond.region.as_deref().or(rule.region.as_deref()) else {
                continue;
            };
            requirements.entry(region.to_string()).or_default().insert(kind);
        }
    }

    if !requirements.is_empty() {
        tracing::debug!(?requirements, "analysis requirements per region");
    }
    requirements
}

/// Substitute captured variables into a condition spec by walking it as a
/// JSON document. If the substituted document no longer parses as a
/// condition, the original spec is kept and a warning logged.
fn substituted_condition(
    cond: &SimpleCondition,
    vars: &VariableContext,
    label: &str,
) -> SimpleCondition {
    if vars.is_empty() {
        return cond.clone();
    }
    let Ok(raw) = serde_json::to_value(cond) else {
        return cond.clone();
    };
    let replaced = substitute_value(&raw, vars, label);
    match serde_json::from_value(replaced) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(cond = %label, error = %e, "substituted condition no longer parses, using original");
            cond.clone()
        }
    }
}

fn substituted_action(action: &ActionSpec, vars: &VariableContext, rule: &str) -> ActionSpec {
    if vars.is_empty() {
        return action.clone();
    }
    let Ok(raw) = serde_json::to_value(action) else {
        return action.clone();
    };
    let replaced = substitute_value(&raw, vars, rule);
    match serde_json::from_value(replaced) {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(rule = %rule, error = %e, "substituted action no longer parses, using original");
            action.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::evaluators::test_support::{FixedOcr, ScriptedVision};
    use crate::engine::packet::RegionData;
    use crate::executor::input::test_support::RecordingDriver;
    use image::{Rgba, RgbaImage};
    use serde_json::json;

    fn profile_with(rules_json: serde_json::Value) -> Profile {
        let raw = json!({
            "regions": [
                {"name": "panel", "x": 100, "y": 50, "width": 200, "height": 100},
                {"name": "status", "x": 0, "y": 0, "width": 80, "height": 20}
            ],
            "rules": rules_json
        });
        let rules: Vec<Rule> = raw["rules"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| serde_json::from_value(v.clone()).unwrap())
            .collect();
        Profile {
            regions: serde_json::from_value(raw["regions"].clone()).unwrap(),
            rules,
            settings: ProfileSettings::default(),
            base_dir: std::env::temp_dir(),
        }
    }

    struct Harness {
        engine: RuleEngine,
        events: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
        ocr: Arc<FixedOcr>,
        vision: Option<Arc<ScriptedVision>>,
    }

    fn harness(profile: &Profile, ocr: FixedOcr, vision: Option<ScriptedVision>) -> Harness {
        let (driver, events) = RecordingDriver::new();
        let ocr = Arc::new(ocr);
        let vision = vision.map(Arc::new);
        let deps = EngineDeps {
            ocr: ocr.clone(),
            vision: vision.clone().map(|v| v as Arc<dyn VisionProvider>),
            tasks: None,
        };
        let engine = RuleEngine::new(profile, deps, ActionExecutor::new(Box::new(driver), 0.0));
        Harness {
            engine,
            events,
            ocr,
            vision,
        }
    }

    fn packet_with_image(rgb: [u8; 3]) -> RegionData {
        RegionData::with_image(Some(RgbaImage::from_pixel(20, 20, Rgba([rgb[0], rgb[1], rgb[2], 255]))))
    }

    #[tokio::test]
    async fn and_short_circuit_skips_vision_query() {
        let profile = profile_with(json!([{
            "name": "r1",
            "region": "panel",
            "condition": {
                "logical_operator": "AND",
                "sub_conditions": [
                    {"type": "pixel_color", "relative_x": 0, "relative_y": 0,
                     "expected_bgr": [255, 255, 255], "tolerance": 0},
                    {"type": "gemini_vision_query", "prompt": "never reached"}
                ]
            },
            "action": {"type": "log_message", "message": "hit"}
        }]));
        let mut h = harness(&profile, FixedOcr::failing(), Some(ScriptedVision::succeeding("ok", None)));

        let mut data = HashMap::new();
        data.insert("panel".to_string(), packet_with_image([0, 0, 0]));
        let dispatched = h.engine.evaluate_cycle(&data).await.unwrap();

        assert_eq!(dispatched, 0);
        assert_eq!(h.vision.as_ref().unwrap().call_count(), 0);
    }

    #[tokio::test]
    async fn or_short_circuit_skips_vision_query() {
        let profile = profile_with(json!([{
            "name": "r1",
            "region": "panel",
            "condition": {
                "logical_operator": "OR",
                "sub_conditions": [
                    {"type": "always_true"},
                    {"type": "gemini_vision_query", "prompt": "never reached"}
                ]
            },
            "action": {"type": "log_message", "message": "hit"}
        }]));
        let mut h = harness(&profile, FixedOcr::failing(), Some(ScriptedVision::succeeding("ok", None)));

        let mut data = HashMap::new();
        data.insert("panel".to_string(), packet_with_image([0, 0, 0]));
        let dispatched = h.engine.evaluate_cycle(&data).await.unwrap();

        assert_eq!(dispatched, 1);
        assert_eq!(h.vision.as_ref().unwrap().call_count(), 0);
    }

    #[tokio::test]
    async fn or_with_every_sub_condition_missing_is_false() {
        let profile = profile_with(json!([{
            "name": "r1",
            "region": "panel",
            "condition": {
                "logical_operator": "OR",
                "sub_conditions": [
                    {"type": "pixel_color", "relative_x": 0, "relative_y": 0,
                     "expected_bgr": [255, 255, 255], "tolerance": 0},
                    {"type": "ocr_contains_text", "text_to_find": "absent"}
                ]
            },
            "action": {"type": "log_message", "message": "hit"}
        }]));
        let mut h = harness(&profile, FixedOcr::with_text("nothing here", 90.0), None);

        let mut data = HashMap::new();
        data.insert("panel".to_string(), packet_with_image([0, 0, 0]));
        assert_eq!(h.engine.evaluate_cycle(&data).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn capture_flows_into_action_substitution() {
        let profile = profile_with(json!([{
            "name": "r1",
            "region": "status",
            "condition": {
                "type": "ocr_contains_text",
                "text_to_find": "Failed",
                "capture_as": "msg"
            },
            "action": {"type": "type_text", "text": "Saw: {msg.value} in {msg.source_region}"}
        }]));
        let mut h = harness(&profile, FixedOcr::with_text("Login Failed", 88.0), None);

        let mut data = HashMap::new();
        data.insert("status".to_string(), packet_with_image([0, 0, 0]));
        let dispatched = h.engine.evaluate_cycle(&data).await.unwrap();

        assert_eq!(dispatched, 1);
        let events = h.events.lock().unwrap();
        assert_eq!(events[0], "type 'Saw: Login Failed in status' @0");
    }

    #[tokio::test]
    async fn prescan_computes_ocr_once_for_two_rules() {
        let profile = profile_with(json!([
            {
                "name": "r1", "region": "status",
                "condition": {"type": "ocr_contains_text", "text_to_find": "alpha"},
                "action": {"type": "log_message", "message": "a"}
            },
            {
                "name": "r2", "region": "status",
                "condition": {"type": "ocr_contains_text", "text_to_find": "beta"},
                "action": {"type": "log_message", "message": "b"}
            }
        ]));
        let mut h = harness(&profile, FixedOcr::with_text("alpha beta", 90.0), None);

        let reqs = h.engine.requirements_for("status");
        assert_eq!(reqs.len(), 1);
        assert!(reqs.contains(&AnalysisKind::Ocr));

        // One OCR call during packet build, reused by both rules.
        let img = RgbaImage::from_pixel(10, 10, Rgba([1, 1, 1, 255]));
        let packet = h.engine.build_packet("status", Some(img));
        assert_eq!(h.ocr.call_count(), 1);

        let mut data = HashMap::new();
        data.insert("status".to_string(), packet);
        let dispatched = h.engine.evaluate_cycle(&data).await.unwrap();
        assert_eq!(dispatched, 2);
        assert_eq!(h.ocr.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_region_packet_fails_rule_but_not_cycle() {
        let profile = profile_with(json!([
            {
                "name": "broken", "region": "nowhere",
                "condition": {"type": "always_true"},
                "action": {"type": "type_text", "text": "no"}
            },
            {
                "name": "works", "region": "panel",
                "condition": {"type": "always_true"},
                "action": {"type": "type_text", "text": "yes"}
            }
        ]));
        let mut h = harness(&profile, FixedOcr::failing(), None);

        let mut data = HashMap::new();
        data.insert("panel".to_string(), packet_with_image([0, 0, 0]));
        let dispatched = h.engine.evaluate_cycle(&data).await.unwrap();

        assert_eq!(dispatched, 1);
        assert_eq!(h.events.lock().unwrap()[0], "type 'yes' @0");
    }

    #[tokio::test]
    async fn vision_capture_drives_element_click() {
        let structured = json!({"found": true, "box": [20, 10, 30, 20], "label": "Go"});
        let profile = profile_with(json!([{
            "name": "click-go",
            "region": "panel",
            "condition": {
                "type": "gemini_vision_query",
                "prompt": "find the Go button",
                "capture_as": "go_btn"
            },
            "action": {
                "type": "click",
                "target_relation": "center_of_gemini_element",
                "gemini_element_variable": "go_btn"
            }
        }]));
        let vision = ScriptedVision::succeeding("{\"found\": true}", Some(structured));
        let mut h = harness(&profile, FixedOcr::failing(), Some(vision));

        let mut data = HashMap::new();
        data.insert("panel".to_string(), packet_with_image([9, 9, 9]));
        let dispatched = h.engine.evaluate_cycle(&data).await.unwrap();

        assert_eq!(dispatched, 1);
        // panel at (100,50); box [20,10,30,20] => center (100+20+15, 50+10+10).
        assert!(h.events.lock().unwrap()[0].starts_with("click 135,70"));
    }

    #[tokio::test]
    async fn template_match_feeds_center_of_last_match() {
        let pattern = RgbaImage::from_fn(6, 4, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        pattern.save(dir.path().join("templates/ok.png")).unwrap();

        let mut region_img = RgbaImage::from_pixel(60, 40, Rgba([40, 40, 40, 255]));
        image::imageops::overlay(&mut region_img, &pattern, 14, 6);

        let mut profile = profile_with(json!([{
            "name": "click-match",
            "region": "panel",
            "condition": {"type": "template_match_found", "template_filename": "ok.png"},
            "action": {"type": "click", "target_relation": "center_of_last_match"}
        }]));
        profile.base_dir = dir.path().to_path_buf();

        let mut h = harness(&profile, FixedOcr::failing(), None);
        let mut data = HashMap::new();
        data.insert(
            "panel".to_string(),
            RegionData::with_image(Some(region_img)),
        );
        let dispatched = h.engine.evaluate_cycle(&data).await.unwrap();

        assert_eq!(dispatched, 1);
        // panel at (100,50); match at (14,6) size 6x4 => (100+14+3, 50+6+2).
        assert!(h.events.lock().unwrap()[0].starts_with("click 117,58"));
    }

    #[tokio::test]
    async fn failsafe_aborts_the_cycle() {
        let profile = profile_with(json!([{
            "name": "r1",
            "region": "panel",
            "condition": {"type": "always_true"},
            "action": {"type": "click", "target_relation": "absolute", "x": 1, "y": 1}
        }]));
        let ocr = Arc::new(FixedOcr::failing());
        let deps = EngineDeps {
            ocr: ocr.clone(),
            vision: None,
            tasks: None,
        };
        let executor = ActionExecutor::new(Box::new(RecordingDriver::tripping()), 0.0);
        let mut engine = RuleEngine::new(&profile, deps, executor);

        let mut data = HashMap::new();
        data.insert("panel".to_string(), packet_with_image([0, 0, 0]));
        let err = engine.evaluate_cycle(&data).await.unwrap_err();
        assert!(matches!(err, crate::errors::VigilError::FailSafe(_)));
    }

    #[tokio::test]
    async fn earlier_capture_substitutes_into_later_sub_condition() {
        // First sub-condition captures OCR text; the second embeds it into a
        // vision prompt via substitution before evaluation.
        let profile = profile_with(json!([{
            "name": "chained",
            "region": "status",
            "condition": {
                "logical_operator": "AND",
                "sub_conditions": [
                    {"type": "ocr_contains_text", "text_to_find": "Error", "capture_as": "err"},
                    {"type": "gemini_vision_query", "region": "panel",
                     "prompt": "does the dialog mention {err.value}?"}
                ]
            },
            "action": {"type": "log_message", "message": "confirmed"}
        }]));
        let vision = ScriptedVision::succeeding("yes", None);
        let mut h = harness(&profile, FixedOcr::with_text("Error 42", 95.0), Some(vision));

        let mut data = HashMap::new();
        data.insert("status".to_string(), packet_with_image([1, 1, 1]));
        data.insert("panel".to_string(), packet_with_image([2, 2, 2]));
        let dispatched = h.engine.evaluate_cycle(&data).await.unwrap();
        assert_eq!(dispatched, 1);

        let prompts = h.vision.as_ref().unwrap().prompts.lock().unwrap().clone();
        assert_eq!(prompts, vec!["does the dialog mention Error 42?".to_string()]);
    }

    #[tokio::test]
    async fn center_of_last_match_without_match_fails_closed() {
        // Match info starts each rule as not-found, so the click resolves to
        // nothing and is skipped.
        let profile = profile_with(json!([
            {
                "name": "r2-no-match-state",
                "region": "panel",
                "condition": {"type": "always_true"},
                "action": {"type": "click", "target_relation": "center_of_last_match"}
            }
        ]));
        let mut h = harness(&profile, FixedOcr::failing(), None);
        let mut data = HashMap::new();
        data.insert("panel".to_string(), packet_with_image([0, 0, 0]));

        let dispatched = h.engine.evaluate_cycle(&data).await.unwrap();
        // Dispatch attempted but the click itself resolved to nothing.
        assert_eq!(dispatched, 1);
        assert!(h.events.lock().unwrap().is_empty());
    }
}
