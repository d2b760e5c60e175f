//! Held-key tracking from a raw-mode terminal.
//!
//! Terminals that support the keyboard enhancement protocol report press and
//! release events, so the held set is exact. Elsewhere only presses (and
//! auto-repeats) arrive; a key then counts as held until `hold` passes
//! without another press.

use std::collections::HashMap;
use std::io::stdout;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use tracing::{debug, warn};

use crate::input::{InputError, KeyStateProvider, Keys};

/// Long enough to bridge the usual auto-repeat delay
pub const DEFAULT_KEY_HOLD: Duration = Duration::from_millis(500);

pub struct TerminalKeys {
    held: HashMap<Keys, Instant>,
    hold: Duration,
    enhanced: bool,
    raw_mode: bool,
    escape: bool,
}

impl TerminalKeys {
    /// Put the terminal in raw mode and start tracking keys.
    ///
    /// The terminal is restored when the value is dropped.
    pub fn new(hold: Duration) -> Result<Self, InputError> {
        enable_raw_mode()?;
        let mut keys = Self::detached(hold, false);
        keys.raw_mode = true;

        if terminal::supports_keyboard_enhancement().unwrap_or(false) {
            execute!(
                stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
            keys.enhanced = true;
            debug!("Terminal reports key releases");
        } else {
            debug!("Terminal lacks key release events; holding keys for {hold:?}");
        }
        Ok(keys)
    }

    fn detached(hold: Duration, enhanced: bool) -> Self {
        Self {
            held: HashMap::new(),
            hold,
            enhanced,
            raw_mode: false,
            escape: false,
        }
    }

    fn apply(&mut self, event: KeyEvent, now: Instant) {
        let ctrl_c = event.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(event.code, KeyCode::Char('c') | KeyCode::Char('C'));
        if ctrl_c || event.code == KeyCode::Esc {
            self.escape = true;
            return;
        }

        let key = match event.code {
            KeyCode::Char(c) => Keys::from_char(c),
            KeyCode::Up => Some(Keys::UP),
            KeyCode::Down => Some(Keys::DOWN),
            _ => None,
        };
        let Some(key) = key else {
            return;
        };

        match event.kind {
            KeyEventKind::Release => {
                self.held.remove(&key);
            }
            KeyEventKind::Press | KeyEventKind::Repeat => {
                self.held.insert(key, now);
            }
        }
    }

    fn held_at(&mut self, now: Instant) -> Keys {
        if !self.enhanced {
            let hold = self.hold;
            self.held
                .retain(|_, pressed| now.saturating_duration_since(*pressed) < hold);
        }
        let mut keys = self
            .held
            .keys()
            .fold(Keys::empty(), |acc, key| acc | *key);
        if self.escape {
            keys |= Keys::ESCAPE;
        }
        keys
    }
}

impl KeyStateProvider for TerminalKeys {
    fn snapshot(&mut self) -> Result<Keys, InputError> {
        let now = Instant::now();
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                self.apply(key, now);
            }
        }
        Ok(self.held_at(now))
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if self.enhanced {
            if let Err(e) = execute!(stdout(), PopKeyboardEnhancementFlags) {
                warn!("Failed to restore keyboard mode: {e}");
            }
        }
        if self.raw_mode {
            if let Err(e) = disable_raw_mode() {
                warn!("Failed to leave raw terminal mode: {e}");
            }
        }
    }
}
