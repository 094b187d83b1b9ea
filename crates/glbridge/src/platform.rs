//! Non-graphics imports the guest shares with the bridge: clock, text sink, cursor and link hints,
//! keyboard and gamepad state.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::info;

/// Below this magnitude a stick axis reads as 0.
pub const STICK_DEAD_ZONE: f32 = 0.1;

const BUTTON_MAPPING_STANDARD: [usize; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
const BUTTON_MAPPING_RAW: [usize; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 0];

/// Side effects the guest can request of the embedding application.
pub trait PlatformHooks: Send {
    fn set_cursor(&mut self, cursor: &str);
    fn open_link(&mut self, url: &str);
}

/// Hooks for headless sessions: requests are logged and otherwise ignored.
#[derive(Debug, Default)]
pub struct LoggingHooks;

impl PlatformHooks for LoggingHooks {
    fn set_cursor(&mut self, cursor: &str) {
        info!(cursor, "guest cursor change");
    }

    fn open_link(&mut self, url: &str) {
        info!(url, "guest requested link");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GamepadMapping {
    #[default]
    Standard,
    Raw,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadState {
    pub mapping: GamepadMapping,
    pub buttons: Vec<bool>,
    pub axes: Vec<f32>,
}

pub struct Platform {
    started: Instant,
    log_line: String,
    keys: BTreeSet<u32>,
    gamepads: Vec<GamepadState>,
    hooks: Box<dyn PlatformHooks>,
}

impl Default for Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform {
    pub fn new() -> Self {
        Self::with_hooks(Box::new(LoggingHooks))
    }

    pub fn with_hooks(hooks: Box<dyn PlatformHooks>) -> Self {
        Self {
            started: Instant::now(),
            log_line: String::new(),
            keys: BTreeSet::new(),
            gamepads: Vec::new(),
            hooks,
        }
    }

    pub fn set_hooks(&mut self, hooks: Box<dyn PlatformHooks>) {
        self.hooks = hooks;
    }

    /// Milliseconds since the bridge started, with sub-millisecond precision.
    pub fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    pub fn log_write(&mut self, text: &str) {
        self.log_line.push_str(text);
    }

    /// Emit everything written since the last flush as one `guest` log record.
    pub fn log_flush(&mut self) {
        let line = std::mem::take(&mut self.log_line);
        info!(target: "guest", "{line}");
    }

    /// Text written but not yet flushed.
    pub fn pending_log(&self) -> &str {
        &self.log_line
    }

    pub fn set_cursor(&mut self, cursor: &str) {
        self.hooks.set_cursor(cursor);
    }

    pub fn open_link(&mut self, url: &str) {
        self.hooks.open_link(url);
    }

    pub fn set_key(&mut self, code: u32, down: bool) {
        if down {
            self.keys.insert(code);
        } else {
            self.keys.remove(&code);
        }
    }

    pub fn key_down(&self, code: u32) -> bool {
        self.keys.contains(&code)
    }

    pub fn gamepads_mut(&mut self) -> &mut Vec<GamepadState> {
        &mut self.gamepads
    }

    /// Pads with at least two buttons, in connection order.
    fn gamepad(&self, index: u32) -> Option<&GamepadState> {
        self.gamepads
            .iter()
            .filter(|pad| pad.buttons.len() > 1)
            .nth(index as usize)
    }

    pub fn button_down(&self, gamepad: u32, button: u32) -> bool {
        let Some(pad) = self.gamepad(gamepad) else {
            return false;
        };
        let mapping = match pad.mapping {
            GamepadMapping::Standard => &BUTTON_MAPPING_STANDARD,
            GamepadMapping::Raw => &BUTTON_MAPPING_RAW,
        };
        mapping
            .get(button as usize)
            .and_then(|&index| pad.buttons.get(index))
            .copied()
            .unwrap_or(false)
    }

    fn axis(&self, gamepad: u32, index: usize) -> f32 {
        let axis = self
            .gamepad(gamepad)
            .and_then(|pad| pad.axes.get(index))
            .copied()
            .unwrap_or(0.0);
        if axis.abs() < STICK_DEAD_ZONE {
            0.0
        } else {
            axis
        }
    }

    pub fn stick_x(&self, gamepad: u32, stick: u32) -> f32 {
        self.axis(gamepad, 2 * stick as usize)
    }

    pub fn stick_y(&self, gamepad: u32, stick: u32) -> f32 {
        self.axis(gamepad, 2 * stick as usize + 1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default, Clone)]
    struct Captured(Arc<Mutex<Vec<String>>>);

    impl PlatformHooks for Captured {
        fn set_cursor(&mut self, cursor: &str) {
            self.0.lock().unwrap().push(format!("cursor:{cursor}"));
        }

        fn open_link(&mut self, url: &str) {
            self.0.lock().unwrap().push(format!("link:{url}"));
        }
    }

    #[test]
    fn log_buffer_clears_on_flush() {
        let mut platform = Platform::new();
        platform.log_write("frame ");
        platform.log_write("42");
        assert_eq!(platform.pending_log(), "frame 42");
        platform.log_flush();
        assert_eq!(platform.pending_log(), "");
    }

    #[test]
    fn hooks_receive_decoded_text() {
        let captured = Captured::default();
        let mut platform = Platform::with_hooks(Box::new(captured.clone()));
        platform.set_cursor("pointer");
        platform.open_link("https://example.com");
        assert_eq!(
            *captured.0.lock().unwrap(),
            ["cursor:pointer", "link:https://example.com"]
        );
    }

    #[test]
    fn raw_mapping_shifts_buttons() {
        let mut platform = Platform::new();
        platform.gamepads_mut().push(GamepadState {
            mapping: GamepadMapping::Raw,
            buttons: vec![false, true, false],
            axes: vec![],
        });
        assert!(platform.button_down(0, 0));
        assert!(!platform.button_down(0, 1));
        assert!(!platform.button_down(0, 12));
        assert!(!platform.button_down(1, 0));
    }

    #[test]
    fn single_button_pads_are_ignored() {
        let mut platform = Platform::new();
        platform.gamepads_mut().push(GamepadState {
            buttons: vec![true],
            ..Default::default()
        });
        platform.gamepads_mut().push(GamepadState {
            buttons: vec![true, false],
            ..Default::default()
        });
        assert!(platform.button_down(0, 0));
    }

    #[test]
    fn sticks_apply_dead_zone() {
        let mut platform = Platform::new();
        platform.gamepads_mut().push(GamepadState {
            buttons: vec![false; 4],
            axes: vec![0.05, -0.5, 0.9, 0.099],
            ..Default::default()
        });
        assert_eq!(platform.stick_x(0, 0), 0.0);
        assert_eq!(platform.stick_y(0, 0), -0.5);
        assert_eq!(platform.stick_x(0, 1), 0.9);
        assert_eq!(platform.stick_y(0, 1), 0.0);
        assert_eq!(platform.stick_x(0, 2), 0.0);
    }

    #[test]
    fn key_state_tracks_presses() {
        let mut platform = Platform::new();
        platform.set_key(32, true);
        assert!(platform.key_down(32));
        platform.set_key(32, false);
        assert!(!platform.key_down(32));
    }
}
