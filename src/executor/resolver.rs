use std::collections::HashMap;

use crate::engine::spec::{NumValue, TargetRelation};
use crate::engine::vars::{GeminiElement, MatchInfo, VariableContext};
use crate::profile::RegionRect;

/// Everything the resolver may consult besides the action spec itself,
/// attached by the orchestrator immediately before dispatch.
pub struct DispatchContext<'a> {
    pub rule_name: &'a str,
    pub condition_region: Option<&'a str>,
    pub last_match: &'a MatchInfo,
    pub variables: &'a VariableContext,
    pub regions: &'a HashMap<String, RegionRect>,
}

fn coerce_coord(value: Option<&NumValue>, name: &str, rule: &str) -> Option<i64> {
    match value {
        Some(v) => {
            let parsed = v.as_i64();
            if parsed.is_none() {
                tracing::error!(rule = %rule, param = %name, value = ?v, "invalid numeric coordinate");
            }
            parsed
        }
        None => {
            tracing::error!(rule = %rule, param = %name, "missing coordinate");
            None
        }
    }
}

/// Convert a logical click target into absolute screen coordinates.
///
/// Any unresolved mode, unknown region, or conversion failure yields `None`
/// with a logged error; the caller skips the action without aborting the
/// cycle.
pub fn resolve_target(
    relation: Option<TargetRelation>,
    x: Option<&NumValue>,
    y: Option<&NumValue>,
    target_region: Option<&str>,
    gemini_var: Option<&str>,
    ctx: &DispatchContext<'_>,
) -> Option<(i32, i32)> {
    let rule = ctx.rule_name;
    let Some(relation) = relation else {
        tracing::error!(rule = %rule, "click has no target_relation");
        return None;
    };

    match relation {
        TargetRelation::Absolute => {
            let xv = coerce_coord(x, "x", rule)?;
            let yv = coerce_coord(y, "y", rule)?;
            Some((xv as i32, yv as i32))
        }

        TargetRelation::CenterOfRegion | TargetRelation::RelativeToRegion => {
            let name = target_region.or(ctx.condition_region);
            let Some(name) = name else {
                tracing::error!(rule = %rule, "no target region and no condition region");
                return None;
            };
            let Some(rect) = ctx.regions.get(name) else {
                tracing::error!(rule = %rule, region = %name, "target region not configured");
                return None;
            };
            if relation == TargetRelation::CenterOfRegion {
                Some((
                    rect.x + rect.width as i32 / 2,
                    rect.y + rect.height as i32 / 2,
                ))
            } else {
                let xv = coerce_coord(x, "x", rule)?;
                let yv = coerce_coord(y, "y", rule)?;
                Some((rect.x + xv as i32, rect.y + yv as i32))
            }
        }

        TargetRelation::CenterOfLastMatch => {
            let lm = ctx.last_match;
            if !lm.found {
                tracing::warn!(rule = %rule, "center_of_last_match requested but no match this rule");
                return None;
            }
            let Some(rect) = ctx.regions.get(&lm.matched_region_name) else {
                tracing::error!(
                    rule = %rule,
                    region = %lm.matched_region_name,
                    "matched region not configured"
                );
                return None;
            };
            Some((
                rect.x + (lm.location_x + lm.width / 2) as i32,
                rect.y + (lm.location_y + lm.height / 2) as i32,
            ))
        }

        TargetRelation::CenterOfGeminiElement | TargetRelation::TopLeftOfGeminiElement => {
            let Some(var_name) = gemini_var else {
                tracing::error!(rule = %rule, "no gemini_element_variable named");
                return None;
            };
            let Some(captured) = ctx.variables.get(var_name) else {
                tracing::error!(rule = %rule, variable = %var_name, "element variable not captured");
                return None;
            };
            let element: GeminiElement = match serde_json::from_value(captured.value.clone()) {
                Ok(el) => el,
                Err(e) => {
                    tracing::error!(
                        rule = %rule,
                        variable = %var_name,
                        error = %e,
                        "captured value is not an element payload"
                    );
                    return None;
                }
            };
            if !element.found {
                tracing::warn!(rule = %rule, variable = %var_name, "element marked not found");
                return None;
            }
            let Some(rect) = ctx.regions.get(&captured.source_region) else {
                tracing::error!(
                    rule = %rule,
                    region = %captured.source_region,
                    "element source region not configured"
                );
                return None;
            };
            let [bx, by, bw, bh] = element.bbox;
            if relation == TargetRelation::CenterOfGeminiElement {
                Some((
                    rect.x + (bx + bw / 2) as i32,
                    rect.y + (by + bh / 2) as i32,
                ))
            } else {
                Some((rect.x + bx as i32, rect.y + by as i32))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::vars::CapturedValue;
    use serde_json::json;

    fn regions() -> HashMap<String, RegionRect> {
        [(
            "panel".to_string(),
            RegionRect {
                name: "panel".into(),
                x: 100,
                y: 50,
                width: 200,
                height: 100,
            },
        )]
        .into_iter()
        .collect()
    }

    fn ctx<'a>(
        regions: &'a HashMap<String, RegionRect>,
        last_match: &'a MatchInfo,
        variables: &'a VariableContext,
    ) -> DispatchContext<'a> {
        DispatchContext {
            rule_name: "test",
            condition_region: Some("panel"),
            last_match,
            variables,
            regions,
        }
    }

    #[test]
    fn absolute_coerces_numeric_strings() {
        let regions = regions();
        let lm = MatchInfo::default();
        let vars = VariableContext::new();
        let c = ctx(&regions, &lm, &vars);

        let got = resolve_target(
            Some(TargetRelation::Absolute),
            Some(&NumValue::Text("120".into())),
            Some(&NumValue::Text("50".into())),
            None,
            None,
            &c,
        );
        assert_eq!(got, Some((120, 50)));
    }

    #[test]
    fn absolute_with_garbage_coordinate_fails() {
        let regions = regions();
        let lm = MatchInfo::default();
        let vars = VariableContext::new();
        let c = ctx(&regions, &lm, &vars);

        let got = resolve_target(
            Some(TargetRelation::Absolute),
            Some(&NumValue::Text("{unresolved.value}".into())),
            Some(&NumValue::Int(50)),
            None,
            None,
            &c,
        );
        assert_eq!(got, None);
    }

    #[test]
    fn center_of_region_falls_back_to_condition_region() {
        let regions = regions();
        let lm = MatchInfo::default();
        let vars = VariableContext::new();
        let c = ctx(&regions, &lm, &vars);

        let got = resolve_target(Some(TargetRelation::CenterOfRegion), None, None, None, None, &c);
        assert_eq!(got, Some((200, 100)));
    }

    #[test]
    fn relative_to_region_adds_offset_to_top_left() {
        let regions = regions();
        let lm = MatchInfo::default();
        let vars = VariableContext::new();
        let c = ctx(&regions, &lm, &vars);

        let got = resolve_target(
            Some(TargetRelation::RelativeToRegion),
            Some(&NumValue::Int(10)),
            Some(&NumValue::Int(-5)),
            Some("panel"),
            None,
            &c,
        );
        assert_eq!(got, Some((110, 45)));
    }

    #[test]
    fn center_of_last_match_requires_found() {
        let regions = regions();
        let vars = VariableContext::new();

        let miss = MatchInfo::default();
        let c = ctx(&regions, &miss, &vars);
        assert_eq!(
            resolve_target(Some(TargetRelation::CenterOfLastMatch), None, None, None, None, &c),
            None
        );

        let hit = MatchInfo {
            found: true,
            location_x: 10,
            location_y: 20,
            confidence: 0.9,
            width: 30,
            height: 20,
            matched_region_name: "panel".into(),
        };
        let c = ctx(&regions, &hit, &vars);
        assert_eq!(
            resolve_target(Some(TargetRelation::CenterOfLastMatch), None, None, None, None, &c),
            Some((100 + 10 + 15, 50 + 20 + 10))
        );
    }

    #[test]
    fn element_geometry_round_trip() {
        // A captured template hit re-expressed as an element box resolves to
        // region.x + location_x + width/2 (same math, different capture path).
        let regions = regions();
        let lm = MatchInfo::default();
        let mut vars = VariableContext::new();
        vars.insert(
            "el".into(),
            CapturedValue::new(
                json!({"found": true, "box": [9, 7, 6, 4], "label": "ok"}),
                "panel",
            ),
        );
        let c = ctx(&regions, &lm, &vars);

        let center = resolve_target(
            Some(TargetRelation::CenterOfGeminiElement),
            None,
            None,
            None,
            Some("el"),
            &c,
        );
        assert_eq!(center, Some((100 + 9 + 3, 50 + 7 + 2)));

        let top_left = resolve_target(
            Some(TargetRelation::TopLeftOfGeminiElement),
            None,
            None,
            None,
            Some("el"),
            &c,
        );
        assert_eq!(top_left, Some((109, 57)));
    }

    #[test]
    fn element_not_found_fails_closed() {
        let regions = regions();
        let lm = MatchInfo::default();
        let mut vars = VariableContext::new();
        vars.insert(
            "el".into(),
            CapturedValue::new(json!({"found": false, "box": [0, 0, 1, 1]}), "panel"),
        );
        let c = ctx(&regions, &lm, &vars);
        assert_eq!(
            resolve_target(
                Some(TargetRelation::CenterOfGeminiElement),
                None,
                None,
                None,
                Some("el"),
                &c
            ),
            None
        );
    }

    #[test]
    fn malformed_element_payload_fails_closed() {
        let regions = regions();
        let lm = MatchInfo::default();
        let mut vars = VariableContext::new();
        vars.insert(
            "el".into(),
            CapturedValue::new(json!({"found": true, "box": null}), "panel"),
        );
        let c = ctx(&regions, &lm, &vars);
        assert_eq!(
            resolve_target(
                Some(TargetRelation::CenterOfGeminiElement),
                None,
                None,
                None,
                Some("el"),
                &c
            ),
            None
        );
    }

    #[test]
    fn missing_relation_fails() {
        let regions = regions();
        let lm = MatchInfo::default();
        let vars = VariableContext::new();
        let c = ctx(&regions, &lm, &vars);
        assert_eq!(resolve_target(None, None, None, None, None, &c), None);
    }
}
