/// Keyboard sampling for the terminal host.
///
/// Movement is level-triggered (a held key keeps producing a direction so a
/// character steps again as soon as it lands). Everything else is
/// edge-triggered and fires once per physical press.
///
/// ## Bindings
///   W A S D / arrows   move, or step the teleport cursor
///   Q                  switch character
///   E / Space          start teleport, confirm target, confirm destination
///   Esc                cancel teleport
///   Y                  restart level
///   N                  next level
///   Ctrl+C             quit
///
/// Terminals that never report key releases fall back to a hold timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use keyward::domain::entity::Dir;
use keyward::sim::session::FrameInput;

/// Without a Press/Repeat for this long a key counts as released.
const HOLD_TIMEOUT: Duration = Duration::from_millis(160);

const KEYS_UP: &[KeyCode] = &[KeyCode::Up, KeyCode::Char('w'), KeyCode::Char('W')];
const KEYS_DOWN: &[KeyCode] = &[KeyCode::Down, KeyCode::Char('s'), KeyCode::Char('S')];
const KEYS_LEFT: &[KeyCode] = &[KeyCode::Left, KeyCode::Char('a'), KeyCode::Char('A')];
const KEYS_RIGHT: &[KeyCode] = &[KeyCode::Right, KeyCode::Char('d'), KeyCode::Char('D')];
const KEYS_SWITCH: &[KeyCode] = &[KeyCode::Char('q'), KeyCode::Char('Q')];
const KEYS_TELEPORT: &[KeyCode] = &[KeyCode::Char('e'), KeyCode::Char('E'), KeyCode::Char(' ')];
const KEYS_CANCEL: &[KeyCode] = &[KeyCode::Esc];
const KEYS_RESTART: &[KeyCode] = &[KeyCode::Char('y'), KeyCode::Char('Y')];
const KEYS_NEXT: &[KeyCode] = &[KeyCode::Char('n'), KeyCode::Char('N')];

/// Host-level requests that never reach the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostAction {
    Quit,
    Restart,
    NextLevel,
}

pub struct Keyboard {
    last_active: HashMap<KeyCode, Instant>,
    /// Keys that went from released to held during the last `poll`.
    fresh: Vec<KeyCode>,
    events: Vec<KeyEvent>,
    /// Edge presses that arrived between two ticks; drained by `take_frame`.
    pending: FrameInput,
}

impl Keyboard {
    pub fn new() -> Self {
        Keyboard {
            last_active: HashMap::with_capacity(16),
            fresh: Vec::with_capacity(8),
            events: Vec::with_capacity(8),
            pending: FrameInput::default(),
        }
    }

    /// Read every pending terminal event without blocking.
    pub fn poll(&mut self) {
        self.fresh.clear();
        self.events.clear();

        while event::poll(Duration::ZERO).unwrap_or(false) {
            let Ok(Event::Key(key)) = event::read() else { continue };
            self.events.push(key);
            match key.kind {
                KeyEventKind::Release => {
                    self.last_active.remove(&key.code);
                }
                _ => {
                    if !self.is_held(key.code) {
                        self.fresh.push(key.code);
                    }
                    self.last_active.insert(key.code, Instant::now());
                }
            }
        }

        let now = Instant::now();
        self.last_active.retain(|_, t| now.duration_since(*t) < HOLD_TIMEOUT);

        // Latch edges so a press between ticks is not lost.
        self.pending.switch_character |= self.any_pressed(KEYS_SWITCH);
        self.pending.teleport |= self.any_pressed(KEYS_TELEPORT);
        self.pending.cancel |= self.any_pressed(KEYS_CANCEL);
        if self.pending.movement.is_none() {
            self.pending.movement = self.pressed_dir();
        }
    }

    /// Input for the next simulation tick. Clears the latched edges.
    /// With `repeat` off only fresh presses move (cursor selection).
    pub fn take_frame(&mut self, repeat: bool) -> FrameInput {
        let mut frame = std::mem::take(&mut self.pending);
        if repeat && frame.movement.is_none() {
            frame.movement = self.held_dir();
        }
        frame
    }

    pub fn host_action(&self) -> Option<HostAction> {
        if self.ctrl_c_pressed() {
            Some(HostAction::Quit)
        } else if self.any_pressed(KEYS_RESTART) {
            Some(HostAction::Restart)
        } else if self.any_pressed(KEYS_NEXT) {
            Some(HostAction::NextLevel)
        } else {
            None
        }
    }

    // ── Internal ──

    fn is_held(&self, code: KeyCode) -> bool {
        self.last_active.get(&code).is_some_and(|t| t.elapsed() < HOLD_TIMEOUT)
    }

    fn any_held(&self, codes: &[KeyCode]) -> bool {
        codes.iter().any(|c| self.is_held(*c))
    }

    fn any_pressed(&self, codes: &[KeyCode]) -> bool {
        codes.iter().any(|c| self.fresh.contains(c))
    }

    fn pressed_dir(&self) -> Option<Dir> {
        dir_from(|keys| self.any_pressed(keys))
    }

    fn held_dir(&self) -> Option<Dir> {
        dir_from(|keys| self.any_held(keys))
    }

    fn ctrl_c_pressed(&self) -> bool {
        self.events.iter().any(|k| {
            k.modifiers.contains(KeyModifiers::CONTROL)
                && matches!(k.code, KeyCode::Char('c') | KeyCode::Char('C'))
        })
    }
}

/// First direction whose key group satisfies `active`. Vertical wins ties.
fn dir_from(active: impl Fn(&[KeyCode]) -> bool) -> Option<Dir> {
    [(KEYS_UP, Dir::Up), (KEYS_DOWN, Dir::Down), (KEYS_LEFT, Dir::Left), (KEYS_RIGHT, Dir::Right)]
        .into_iter()
        .find(|(keys, _)| active(*keys))
        .map(|(_, dir)| dir)
}
