use std::time::Duration;

use crate::engine::spec::{ActionSpec, KeyParam, NumValue};
use crate::errors::{VigilError, VigilResult};
use crate::executor::input::{is_known_key, InputDriver, PointerButton};
use crate::executor::resolver::{resolve_target, DispatchContext};

/// Validates parameters and drives the input simulation for primitive
/// actions. All numeric/time parameters accept native numbers or numeric
/// strings (post-substitution values) and fall back to safe defaults with a
/// logged warning.
pub struct ActionExecutor {
    input: Box<dyn InputDriver>,
    default_pause: f64,
}

impl ActionExecutor {
    pub fn new(input: Box<dyn InputDriver>, default_pause: f64) -> Self {
        Self {
            input,
            default_pause: default_pause.max(0.0),
        }
    }

    /// Execute one primitive action. Returns `Ok(true)` when the action was
    /// performed, `Ok(false)` when it was skipped (bad parameters, target
    /// unresolvable, input error). Only the fail-safe abort is an `Err`.
    pub async fn execute(
        &mut self,
        action: &ActionSpec,
        ctx: &DispatchContext<'_>,
    ) -> VigilResult<bool> {
        let rule = ctx.rule_name;
        let pause = coerce_f64(pause_of(action), "pause_before", self.default_pause, rule);
        if pause > 0.0 {
            tracing::debug!(rule = %rule, pause, "pausing before action");
            tokio::time::sleep(Duration::from_secs_f64(pause)).await;
        }

        tracing::info!(rule = %rule, action = %action.kind_name(), "executing action");

        match action {
            ActionSpec::Click {
                target_relation,
                x,
                y,
                target_region,
                gemini_element_variable,
                button,
                clicks,
                interval,
                ..
            } => {
                let Some((cx, cy)) = resolve_target(
                    *target_relation,
                    x.as_ref(),
                    y.as_ref(),
                    target_region.as_deref(),
                    gemini_element_variable.as_deref(),
                    ctx,
                ) else {
                    tracing::error!(rule = %rule, "click target unresolvable, action skipped");
                    return Ok(false);
                };

                let button = parse_button(button.as_deref(), rule);
                let count = match clicks.as_ref().and_then(NumValue::as_i64) {
                    Some(n) if n > 0 => n as u32,
                    Some(_) | None if clicks.is_some() => {
                        tracing::warn!(rule = %rule, "invalid clicks value, defaulting to 1");
                        1
                    }
                    _ => 1,
                };
                let interval = coerce_f64(interval.as_ref(), "interval", 0.0, rule);

                tracing::info!(
                    rule = %rule,
                    x = cx,
                    y = cy,
                    ?button,
                    clicks = count,
                    "simulating click"
                );
                let res = self.input.click(cx, cy, button, count, interval).await;
                finish(rule, "click", res)
            }

            ActionSpec::TypeText { text, interval, .. } => {
                if text.is_empty() {
                    tracing::info!(rule = %rule, "type_text with empty text, nothing to do");
                    return Ok(false);
                }
                let interval = coerce_f64(interval.as_ref(), "interval", 0.0, rule);
                tracing::info!(rule = %rule, len = text.len(), "typing text");
                let res = self.input.type_text(text, interval).await;
                finish(rule, "type_text", res)
            }

            ActionSpec::PressKey { key, .. } => match key {
                KeyParam::One(name) => {
                    let name = name.trim();
                    if name.is_empty() {
                        tracing::warn!(rule = %rule, "press_key with empty key, action skipped");
                        return Ok(false);
                    }
                    if !is_known_key(name) {
                        tracing::warn!(rule = %rule, key = %name, "unknown key dropped, action skipped");
                        return Ok(false);
                    }
                    tracing::info!(rule = %rule, key = %name, "pressing key");
                    let res = self.input.press_key(name).await;
                    finish(rule, "press_key", res)
                }
                KeyParam::Combo(names) => {
                    let valid: Vec<String> = names
                        .iter()
                        .map(|k| k.trim().to_string())
                        .filter(|k| {
                            if k.is_empty() {
                                return false;
                            }
                            let known = is_known_key(k);
                            if !known {
                                tracing::warn!(rule = %rule, key = %k, "unknown key dropped from combination");
                            }
                            known
                        })
                        .collect();
                    if valid.is_empty() {
                        tracing::warn!(rule = %rule, "no valid keys in combination, action skipped");
                        return Ok(false);
                    }
                    tracing::info!(rule = %rule, keys = ?valid, "pressing hotkey combination");
                    let res = self.input.hotkey(&valid).await;
                    finish(rule, "press_key", res)
                }
            },

            ActionSpec::LogMessage { message, level } => {
                let message = message.as_deref().unwrap_or("rule log message");
                emit_rule_event(level.as_deref().unwrap_or("info"), rule, message);
                Ok(true)
            }

            ActionSpec::GeminiPerformTask { .. } => {
                // Routed to the task runner by the orchestrator; reaching the
                // primitive executor means a wiring bug upstream.
                tracing::warn!(rule = %rule, "gemini_perform_task reached primitive executor, skipped");
                Ok(false)
            }
        }
    }
}

/// Fold an input-driver result into the skip-or-abort policy: fail-safe
/// propagates, everything else logs and skips.
fn finish(rule: &str, action: &str, result: VigilResult<()>) -> VigilResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e @ VigilError::FailSafe(_)) => {
            tracing::error!(rule = %rule, action = %action, "fail-safe triggered during dispatch");
            Err(e)
        }
        Err(e) => {
            tracing::error!(rule = %rule, action = %action, error = %e, "action failed, skipped");
            Ok(false)
        }
    }
}

fn pause_of(action: &ActionSpec) -> Option<&NumValue> {
    match action {
        ActionSpec::Click { pause_before, .. }
        | ActionSpec::TypeText { pause_before, .. }
        | ActionSpec::PressKey { pause_before, .. }
        | ActionSpec::GeminiPerformTask { pause_before, .. } => pause_before.as_ref(),
        ActionSpec::LogMessage { .. } => None,
    }
}

fn coerce_f64(value: Option<&NumValue>, name: &str, default: f64, rule: &str) -> f64 {
    match value {
        None => default,
        Some(v) => match v.as_f64() {
            Some(f) if f >= 0.0 && f.is_finite() => f,
            _ => {
                tracing::warn!(rule = %rule, param = %name, value = ?v, default, "invalid value, using default");
                default
            }
        },
    }
}

fn parse_button(name: Option<&str>, rule: &str) -> PointerButton {
    match name.map(|n| n.trim().to_lowercase()).as_deref() {
        None | Some("left") => PointerButton::Left,
        Some("right") => PointerButton::Right,
        Some("middle") => PointerButton::Middle,
        Some(other) => {
            tracing::warn!(rule = %rule, button = %other, "unknown button, defaulting to left");
            PointerButton::Left
        }
    }
}

/// Rule-authored log lines go to a dedicated sink target so they are
/// distinguishable from engine diagnostics.
fn emit_rule_event(level: &str, rule: &str, message: &str) {
    match level.trim().to_lowercase().as_str() {
        "error" => tracing::error!(target: "rule_events", rule = %rule, "{message}"),
        "warn" | "warning" => tracing::warn!(target: "rule_events", rule = %rule, "{message}"),
        "debug" => tracing::debug!(target: "rule_events", rule = %rule, "{message}"),
        "trace" => tracing::trace!(target: "rule_events", rule = %rule, "{message}"),
        "info" => tracing::info!(target: "rule_events", rule = %rule, "{message}"),
        other => {
            tracing::warn!(rule = %rule, level = %other, "unknown log level, using info");
            tracing::info!(target: "rule_events", rule = %rule, "{message}");
        }
    }
}
