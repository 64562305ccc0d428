use async_trait::async_trait;
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::config::InputConfig;
use crate::errors::{VigilError, VigilResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

/// OS input simulation. The engine drives this trait only, so tests run
/// against a recording driver and real runs use `EnigoDriver`.
#[async_trait]
pub trait InputDriver: Send {
    async fn click(
        &mut self,
        x: i32,
        y: i32,
        button: PointerButton,
        clicks: u32,
        interval_s: f64,
    ) -> VigilResult<()>;

    async fn type_text(&mut self, text: &str, interval_s: f64) -> VigilResult<()>;

    async fn press_key(&mut self, key: &str) -> VigilResult<()>;

    /// Ordered combination: modifiers held, final key tapped, released in
    /// reverse order.
    async fn hotkey(&mut self, keys: &[String]) -> VigilResult<()>;
}

/// Map a key name onto the simulated keyboard. Returning `None` marks the
/// name unknown; callers drop unknown keys with a warning rather than guess.
pub fn parse_key(name: &str) -> Option<Key> {
    let lower = name.trim().to_lowercase();
    let key = match lower.as_str() {
        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "shift" => Key::Shift,
        "super" | "win" | "meta" | "cmd" | "command" => Key::Meta,

        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,

        "up" | "uparrow" => Key::UpArrow,
        "down" | "downarrow" => Key::DownArrow,
        "left" | "leftarrow" => Key::LeftArrow,
        "right" | "rightarrow" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "pgup" => Key::PageUp,
        "pagedown" | "pgdn" => Key::PageDown,

        "backspace" | "back" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "escape" | "esc" => Key::Escape,
        "space" => Key::Space,

        _ => {
            let mut chars = name.trim().chars();
            let (first, rest) = (chars.next()?, chars.next());
            if rest.is_some() {
                return None;
            }
            Key::Unicode(first)
        }
    };
    Some(key)
}

pub fn is_known_key(name: &str) -> bool {
    parse_key(name).is_some()
}

/// Corner zone (inclusive) that triggers the operator abort.
const FAILSAFE_ZONE: i32 = 2;

pub struct EnigoDriver {
    enigo: Enigo,
    failsafe: bool,
}

impl EnigoDriver {
    pub fn new(config: &InputConfig) -> VigilResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| VigilError::Executor(format!("input backend init failed: {e}")))?;
        tracing::info!(failsafe = config.failsafe, "input driver ready");
        Ok(Self {
            enigo,
            failsafe: config.failsafe,
        })
    }

    /// Abort gesture: the physical pointer parked in the top-left corner.
    /// This is the one failure that propagates out of action dispatch.
    fn check_failsafe(&mut self) -> VigilResult<()> {
        if !self.failsafe {
            return Ok(());
        }
        if let Ok((x, y)) = self.enigo.location() {
            if x <= FAILSAFE_ZONE && y <= FAILSAFE_ZONE {
                return Err(VigilError::FailSafe(format!(
                    "pointer parked at ({x},{y})"
                )));
            }
        }
        Ok(())
    }
}

fn map_err(e: impl std::fmt::Display) -> VigilError {
    VigilError::Executor(format!("input simulation failed: {e}"))
}

#[async_trait]
impl InputDriver for EnigoDriver {
    async fn click(
        &mut self,
        x: i32,
        y: i32,
        button: PointerButton,
        clicks: u32,
        interval_s: f64,
    ) -> VigilResult<()> {
        self.check_failsafe()?;
        let btn = match button {
            PointerButton::Left => Button::Left,
            PointerButton::Right => Button::Right,
            PointerButton::Middle => Button::Middle,
        };
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(map_err)?;
        for i in 0..clicks.max(1) {
            self.enigo.button(btn, Direction::Click).map_err(map_err)?;
            if interval_s > 0.0 && i + 1 < clicks {
                tokio::time::sleep(std::time::Duration::from_secs_f64(interval_s)).await;
            }
        }
        Ok(())
    }

    async fn type_text(&mut self, text: &str, interval_s: f64) -> VigilResult<()> {
        self.check_failsafe()?;
        if interval_s <= 0.0 {
            return self.enigo.text(text).map_err(map_err);
        }
        for ch in text.chars() {
            self.enigo.text(&ch.to_string()).map_err(map_err)?;
            tokio::time::sleep(std::time::Duration::from_secs_f64(interval_s)).await;
        }
        Ok(())
    }

    async fn press_key(&mut self, key: &str) -> VigilResult<()> {
        self.check_failsafe()?;
        let Some(parsed) = parse_key(key) else {
            tracing::warn!(key = %key, "unknown key dropped");
            return Ok(());
        };
        self.enigo.key(parsed, Direction::Click).map_err(map_err)
    }

    async fn hotkey(&mut self, keys: &[String]) -> VigilResult<()> {
        self.check_failsafe()?;
        let parsed: Vec<Key> = keys.iter().filter_map(|k| parse_key(k)).collect();
        if parsed.len() != keys.len() {
            tracing::warn!(keys = ?keys, "hotkey contains unknown keys, dropped");
        }
        let Some((last, modifiers)) = parsed.split_last() else {
            return Ok(());
        };
        for m in modifiers {
            self.enigo.key(*m, Direction::Press).map_err(map_err)?;
        }
        let tap = self.enigo.key(*last, Direction::Click).map_err(map_err);
        for m in modifiers.iter().rev() {
            self.enigo.key(*m, Direction::Release).map_err(map_err)?;
        }
        tap
    }
}
