//! Input capture and shortcut dispatch.
//!
//! Two independent ingress streams feed the dispatcher: the low-level HID
//! modifier stream (reliable CapsLock and Control observation, mach-clock
//! timestamps) and the window-server keyboard tap (virtual key codes and
//! modifier masks). The dispatcher owns the lock-key double-tap machine, the
//! modal gate that decides whether a tap event is consumed or passed through,
//! the shortcut table, and the solo-Control speech interrupt.

#[cfg(target_os = "macos")]
pub mod macos;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::speech::Scheduler;
use crate::tokens::OutputToken;

/// Virtual key codes used by the shortcut surface (ANSI layout).
pub mod keycode {
    pub const TAB: u16 = 48;
    pub const SLASH: u16 = 44;
    pub const PERIOD: u16 = 47;
    pub const COMMA: u16 = 43;
    pub const B: u16 = 11;
    pub const CAPS_LOCK: u16 = 57;
    pub const LEFT: u16 = 123;
    pub const RIGHT: u16 = 124;
    pub const DOWN: u16 = 125;
    pub const UP: u16 = 126;

    pub fn is_arrow(code: u16) -> bool {
        (LEFT..=UP).contains(&code)
    }

    pub fn is_vertical_arrow(code: u16) -> bool {
        code == DOWN || code == UP
    }
}

/// Packed modifier flags carried by tap events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const SHIFT: u8 = 1 << 0;
    pub const CTRL: u8 = 1 << 1;
    pub const OPT: u8 = 1 << 2;
    pub const CMD: u8 = 1 << 3;

    pub fn has_shift(self) -> bool {
        self.0 & Self::SHIFT != 0
    }
    pub fn has_ctrl(self) -> bool {
        self.0 & Self::CTRL != 0
    }
    pub fn has_opt(self) -> bool {
        self.0 & Self::OPT != 0
    }
    pub fn has_cmd(self) -> bool {
        self.0 & Self::CMD != 0
    }
}

/// One of the four logical modifier keys, for key-state queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierKey {
    Control,
    Option,
    Command,
    Shift,
}

/// Live keyboard state, read through the OS key-state API. The semantic
/// reader uses this to disambiguate text-selection changes.
pub trait KeyState: Send + Sync {
    fn is_key_down(&self, key_code: u16) -> bool;
    fn is_modifier_down(&self, modifier: ModifierKey) -> bool;
}

/// Scriptable key state for tests and demos.
#[derive(Clone, Default)]
pub struct MockKeyState {
    keys: Arc<Mutex<HashSet<u16>>>,
    modifiers: Arc<Mutex<HashSet<ModifierKey>>>,
}

impl MockKeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, key_code: u16) {
        self.keys.lock().insert(key_code);
    }

    pub fn release(&self, key_code: u16) {
        self.keys.lock().remove(&key_code);
    }

    pub fn set_modifier(&self, modifier: ModifierKey, down: bool) {
        let mut m = self.modifiers.lock();
        if down {
            m.insert(modifier);
        } else {
            m.remove(&modifier);
        }
    }
}

impl KeyState for MockKeyState {
    fn is_key_down(&self, key_code: u16) -> bool {
        self.keys.lock().contains(&key_code)
    }

    fn is_modifier_down(&self, modifier: ModifierKey) -> bool {
        self.modifiers.lock().contains(&modifier)
    }
}

/// HID usage codes of the modifier keys (keyboard usage page).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HidUsage {
    CapsLock,
    LeftControl,
    RightControl,
    LeftShift,
    RightShift,
    LeftOption,
    RightOption,
    LeftCommand,
    RightCommand,
}

impl HidUsage {
    /// Decode a keyboard-page usage code; non-modifier usages map to `None`.
    pub fn from_usage(usage: u32) -> Option<HidUsage> {
        Some(match usage {
            0x39 => HidUsage::CapsLock,
            0xE0 => HidUsage::LeftControl,
            0xE1 => HidUsage::LeftShift,
            0xE2 => HidUsage::LeftOption,
            0xE3 => HidUsage::LeftCommand,
            0xE4 => HidUsage::RightControl,
            0xE5 => HidUsage::RightShift,
            0xE6 => HidUsage::RightOption,
            0xE7 => HidUsage::RightCommand,
            _ => return None,
        })
    }

    pub fn is_control(self) -> bool {
        matches!(self, HidUsage::LeftControl | HidUsage::RightControl)
    }
}

/// One event from the HID modifier stream. The timestamp is in nanoseconds
/// (mach host time already multiplied by the timebase ratio).
#[derive(Debug, Clone, Copy)]
pub struct HidEvent {
    pub usage: HidUsage,
    pub pressed: bool,
    pub timestamp_ns: u64,
}

/// One event from the window-server keyboard tap.
#[derive(Debug, Clone, Copy)]
pub enum TapEvent {
    KeyDown { key_code: u16, modifiers: Modifiers },
    KeyUp { key_code: u16, modifiers: Modifiers },
    FlagsChanged { modifiers: Modifiers },
    /// The OS disabled the tap after a stall; it must be re-enabled.
    DisabledByTimeout,
}

/// What the tap should do with the event it just delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapDisposition {
    /// Consume the event; the focused application never sees it.
    Captured,
    /// Deliver the event to the application unchanged.
    PassThrough,
    /// Re-enable the tap and swallow the event.
    ReEnable,
}

/// Key of one shortcut binding. At most one action per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChordKey {
    pub browse: bool,
    pub ctrl: bool,
    pub option: bool,
    pub command: bool,
    pub shift: bool,
    pub key_code: u16,
}

impl ChordKey {
    /// A bare chord: just the key, no modifiers, lock-held context.
    pub fn bare(key_code: u16) -> Self {
        Self {
            browse: false,
            ctrl: false,
            option: false,
            command: false,
            shift: false,
            key_code,
        }
    }

    /// The same chord looked up in browse mode.
    pub fn browse(key_code: u16) -> Self {
        Self { browse: true, ..Self::bare(key_code) }
    }

    fn from_tap(browse: bool, modifiers: Modifiers, key_code: u16) -> Self {
        Self {
            browse,
            ctrl: modifiers.has_ctrl(),
            option: modifiers.has_opt(),
            command: modifiers.has_cmd(),
            shift: modifiers.has_shift(),
            key_code,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("chord already bound: {0:?}")]
    DuplicateBinding(ChordKey),
}

type Action = Box<dyn Fn() + Send + Sync>;

/// Shortcut bindings keyed by chord.
#[derive(Default)]
pub struct ShortcutTable {
    bindings: HashMap<ChordKey, Action>,
}

impl ShortcutTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. Rebinding an occupied chord is a deterministic
    /// error, never a silent replacement.
    pub fn bind(&mut self, chord: ChordKey, action: Action) -> Result<(), InputError> {
        if self.bindings.contains_key(&chord) {
            return Err(InputError::DuplicateBinding(chord));
        }
        self.bindings.insert(chord, action);
        Ok(())
    }

    fn dispatch(&self, chord: ChordKey) -> bool {
        match self.bindings.get(&chord) {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }
}

/// Owner of the OS lock-state bit. No other component may toggle it.
pub trait LockState: Send {
    fn get(&self) -> bool;
    fn set(&mut self, on: bool);
    /// Synthesize the equivalent key event so OS consumers observe the toggle.
    fn post_toggle_event(&mut self, on: bool);
}

/// Recording lock-state bit for tests.
#[derive(Clone, Default)]
pub struct MockLockState {
    inner: Arc<Mutex<MockLockInner>>,
}

#[derive(Default)]
struct MockLockInner {
    on: bool,
    sets: Vec<bool>,
    posted: Vec<bool>,
}

impl MockLockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.inner.lock().on
    }

    /// Every `set` call in order (including restores).
    pub fn set_calls(&self) -> Vec<bool> {
        self.inner.lock().sets.clone()
    }

    pub fn posted_events(&self) -> Vec<bool> {
        self.inner.lock().posted.clone()
    }
}

impl LockState for MockLockState {
    fn get(&self) -> bool {
        self.inner.lock().on
    }

    fn set(&mut self, on: bool) {
        let mut inner = self.inner.lock();
        inner.on = on;
        inner.sets.push(on);
    }

    fn post_toggle_event(&mut self, on: bool) {
        self.inner.lock().posted.push(on);
    }
}

/// Double-tap window for the lock-toggle key.
pub const DOUBLE_TAP_WINDOW_NS: u64 = 250_000_000;

/// The input-side state machine: lock-key repurposing, modal gate, shortcut
/// dispatch, solo-Control interrupt.
pub struct InputDispatcher {
    table: ShortcutTable,
    scheduler: Scheduler,
    lock: Box<dyn LockState>,
    double_tap_window_ns: u64,
    /// Sticky capture without the lock key held; shared so a bound action can
    /// toggle it.
    browse_mode: Arc<AtomicBool>,
    lock_held: bool,
    /// The lock state as the user intends it; the OS bit is forced to match.
    tracked_lock: bool,
    last_lock_press_ns: u64,
    held_modifiers: HashSet<HidUsage>,
    /// Control usage armed to interrupt speech on a clean release.
    armed_interrupt: Option<HidUsage>,
}

impl InputDispatcher {
    pub fn new(scheduler: Scheduler, lock: Box<dyn LockState>) -> Self {
        let tracked_lock = lock.get();
        Self {
            table: ShortcutTable::new(),
            scheduler,
            lock,
            double_tap_window_ns: DOUBLE_TAP_WINDOW_NS,
            browse_mode: Arc::new(AtomicBool::new(false)),
            lock_held: false,
            tracked_lock,
            last_lock_press_ns: 0,
            held_modifiers: HashSet::new(),
            armed_interrupt: None,
        }
    }

    pub fn bind(&mut self, chord: ChordKey, action: Action) -> Result<(), InputError> {
        self.table.bind(chord, action)
    }

    pub fn set_double_tap_window_ms(&mut self, window_ms: u64) {
        self.double_tap_window_ns = window_ms.saturating_mul(1_000_000);
    }

    pub fn browse_mode(&self) -> bool {
        self.browse_mode.load(Ordering::Relaxed)
    }

    pub fn set_browse_mode(&mut self, on: bool) {
        self.browse_mode.store(on, Ordering::Relaxed);
    }

    /// Shared handle onto the browse-mode flag, for bound actions.
    pub fn browse_flag(&self) -> Arc<AtomicBool> {
        self.browse_mode.clone()
    }

    pub fn lock_key_held(&self) -> bool {
        self.lock_held
    }

    /// Feed one HID modifier event. Handles the lock-key double-tap machine
    /// and the solo-Control interrupt chord.
    pub fn handle_hid(&mut self, event: HidEvent) {
        match event.usage {
            HidUsage::CapsLock => {
                self.armed_interrupt = None;
                if event.pressed {
                    self.held_modifiers.insert(HidUsage::CapsLock);
                    self.on_lock_press(event.timestamp_ns);
                } else {
                    self.held_modifiers.remove(&HidUsage::CapsLock);
                    self.lock_held = false;
                }
            }
            usage if usage.is_control() => {
                if event.pressed {
                    if self.held_modifiers.is_empty() {
                        self.armed_interrupt = Some(usage);
                    } else {
                        self.armed_interrupt = None;
                    }
                    self.held_modifiers.insert(usage);
                } else {
                    self.held_modifiers.remove(&usage);
                    if self.armed_interrupt == Some(usage) {
                        debug!("solo control tap: interrupting speech");
                        self.scheduler.interrupt();
                    }
                    self.armed_interrupt = None;
                }
            }
            usage => {
                self.armed_interrupt = None;
                if event.pressed {
                    self.held_modifiers.insert(usage);
                } else {
                    self.held_modifiers.remove(&usage);
                }
            }
        }
    }

    /// A single tap must not toggle the OS lock state; a second press inside
    /// the window toggles it exactly once and announces the change.
    fn on_lock_press(&mut self, now_ns: u64) {
        // Undo whatever the press did to the OS bit.
        self.lock.set(self.tracked_lock);

        let within_window = self.last_lock_press_ns != 0
            && now_ns.saturating_sub(self.last_lock_press_ns) <= self.double_tap_window_ns;
        if within_window {
            self.tracked_lock = !self.tracked_lock;
            self.lock.set(self.tracked_lock);
            self.lock.post_toggle_event(self.tracked_lock);
            self.scheduler
                .announce_token(&OutputToken::CapsLockStatusChanged(self.tracked_lock));
            // Zeroed so a third press cannot chain another toggle.
            self.last_lock_press_ns = 0;
        } else {
            self.last_lock_press_ns = now_ns;
        }

        self.lock_held = true;
    }

    /// Feed one window-server tap event; the return value tells the tap
    /// whether to swallow or forward it.
    pub fn handle_tap(&mut self, event: TapEvent) -> TapDisposition {
        let captured = self.lock_held || self.browse_mode();
        match event {
            TapEvent::DisabledByTimeout => {
                warn!("event tap disabled by timeout; re-enabling");
                TapDisposition::ReEnable
            }
            TapEvent::KeyDown { key_code, modifiers } => {
                self.armed_interrupt = None;
                if !captured {
                    return TapDisposition::PassThrough;
                }
                // Browse-mode chords only resolve when the lock key is up.
                let browse = self.browse_mode() && !self.lock_held;
                let chord = ChordKey::from_tap(browse, modifiers, key_code);
                if !self.table.dispatch(chord) {
                    debug!(?chord, "unbound chord");
                }
                TapDisposition::Captured
            }
            TapEvent::KeyUp { .. } | TapEvent::FlagsChanged { .. } => {
                if captured {
                    TapDisposition::Captured
                } else {
                    TapDisposition::PassThrough
                }
            }
        }
    }
}
