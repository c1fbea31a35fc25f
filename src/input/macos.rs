//! macOS input ingestion: the window-server event tap and the lock-state bit.
//!
//! The tap delivers key and flags events; modifier transitions are derived
//! from flags changes and fed to the dispatcher as the HID stream, with
//! timestamps converted from mach host units to nanoseconds. The lock-state
//! bit is owned through the IOKit HID system connection.

use std::ffi::c_void;
use std::sync::Arc;

use cidre::{cf, cg};
use parking_lot::Mutex;
use tracing::{info, warn};

use super::{
    HidEvent, HidUsage, InputDispatcher, KeyState, LockState, Modifiers, ModifierKey,
    TapDisposition, TapEvent,
};

// ---------------------------------------------------------------------------
// Mach time
// ---------------------------------------------------------------------------

#[repr(C)]
struct MachTimebaseInfo {
    numer: u32,
    denom: u32,
}

extern "C" {
    fn mach_timebase_info(info: *mut MachTimebaseInfo) -> i32;
}

/// Convert a mach host timestamp to nanoseconds.
fn host_time_to_ns(host: u64) -> u64 {
    static RATIO: std::sync::OnceLock<(u64, u64)> = std::sync::OnceLock::new();
    let (numer, denom) = *RATIO.get_or_init(|| {
        let mut info = MachTimebaseInfo { numer: 1, denom: 1 };
        unsafe { mach_timebase_info(&mut info) };
        (info.numer as u64, info.denom as u64)
    });
    host.saturating_mul(numer) / denom
}

// ---------------------------------------------------------------------------
// Lock-state bit (IOKit HID system)
// ---------------------------------------------------------------------------

type IoConnect = u32;
type IoService = u32;

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    fn IOServiceGetMatchingService(master_port: u32, matching: *const c_void) -> IoService;
    fn IOServiceMatching(name: *const u8) -> *const c_void;
    fn IOServiceOpen(service: IoService, owning_task: u32, conn_type: u32, connect: *mut IoConnect) -> i32;
    fn IOServiceClose(connect: IoConnect) -> i32;
    fn IOHIDGetModifierLockState(connect: IoConnect, selector: i32, state: *mut bool) -> i32;
    fn IOHIDSetModifierLockState(connect: IoConnect, selector: i32, state: bool) -> i32;
    fn mach_task_self() -> u32;
}

const K_IOHID_PARAM_CONNECT_TYPE: u32 = 1;
const K_IOHID_CAPS_LOCK_SELECTOR: i32 = 0;
const HID_SYSTEM_CLASS: &[u8] = b"IOHIDSystem\0";

/// The process-wide owner of the OS CapsLock bit.
pub struct MacLockState {
    connect: IoConnect,
}

unsafe impl Send for MacLockState {}

impl MacLockState {
    pub fn open() -> anyhow::Result<Self> {
        unsafe {
            let service =
                IOServiceGetMatchingService(0, IOServiceMatching(HID_SYSTEM_CLASS.as_ptr()));
            if service == 0 {
                anyhow::bail!("HID system service not found");
            }
            let mut connect: IoConnect = 0;
            let rc = IOServiceOpen(service, mach_task_self(), K_IOHID_PARAM_CONNECT_TYPE, &mut connect);
            if rc != 0 {
                anyhow::bail!("opening HID system connection failed: {rc}");
            }
            Ok(Self { connect })
        }
    }
}

impl Drop for MacLockState {
    fn drop(&mut self) {
        unsafe {
            IOServiceClose(self.connect);
        }
    }
}

impl LockState for MacLockState {
    fn get(&self) -> bool {
        let mut state = false;
        let rc = unsafe {
            IOHIDGetModifierLockState(self.connect, K_IOHID_CAPS_LOCK_SELECTOR, &mut state)
        };
        if rc != 0 {
            warn!(rc, "reading lock state failed");
        }
        state
    }

    fn set(&mut self, on: bool) {
        let rc = unsafe {
            IOHIDSetModifierLockState(self.connect, K_IOHID_CAPS_LOCK_SELECTOR, on)
        };
        if rc != 0 {
            warn!(rc, on, "writing lock state failed");
        }
    }

    fn post_toggle_event(&mut self, on: bool) {
        // Equivalent key event so window-server consumers observe the toggle.
        if let Some(event) =
            cg::Event::with_keyboard_event(None, super::keycode::CAPS_LOCK, on)
        {
            event.post(cg::EventTapLocation::Hid);
        }
    }
}

// ---------------------------------------------------------------------------
// Key-state queries
// ---------------------------------------------------------------------------

/// Live key state through the window-server event source.
pub struct MacKeyState;

impl KeyState for MacKeyState {
    fn is_key_down(&self, key_code: u16) -> bool {
        cg::EventSource::key_state(cg::EventSourceStateId::CombinedSessionState, key_code)
    }

    fn is_modifier_down(&self, modifier: ModifierKey) -> bool {
        let flags = cg::EventSource::flags_state(cg::EventSourceStateId::CombinedSessionState);
        match modifier {
            ModifierKey::Control => flags.contains(cg::EventFlags::CONTROL),
            ModifierKey::Option => flags.contains(cg::EventFlags::ALTERNATE),
            ModifierKey::Command => flags.contains(cg::EventFlags::COMMAND),
            ModifierKey::Shift => flags.contains(cg::EventFlags::SHIFT),
        }
    }
}

// ---------------------------------------------------------------------------
// Event tap
// ---------------------------------------------------------------------------

fn modifiers_from_flags(flags: cg::EventFlags) -> Modifiers {
    let mut m = 0u8;
    if flags.contains(cg::EventFlags::SHIFT) {
        m |= Modifiers::SHIFT;
    }
    if flags.contains(cg::EventFlags::CONTROL) {
        m |= Modifiers::CTRL;
    }
    if flags.contains(cg::EventFlags::ALTERNATE) {
        m |= Modifiers::OPT;
    }
    if flags.contains(cg::EventFlags::COMMAND) {
        m |= Modifiers::CMD;
    }
    Modifiers(m)
}

struct TapContext {
    dispatcher: Arc<Mutex<InputDispatcher>>,
    /// Previous flags, for deriving modifier up/down transitions.
    last_flags: cg::EventFlags,
}

/// Modifier keycodes to HID usages, for transitions seen through the tap.
fn usage_for_keycode(key_code: u16) -> Option<HidUsage> {
    Some(match key_code {
        57 => HidUsage::CapsLock,
        59 => HidUsage::LeftControl,
        62 => HidUsage::RightControl,
        56 => HidUsage::LeftShift,
        60 => HidUsage::RightShift,
        58 => HidUsage::LeftOption,
        61 => HidUsage::RightOption,
        55 => HidUsage::LeftCommand,
        54 => HidUsage::RightCommand,
        _ => return None,
    })
}

extern "C" fn tap_callback(
    _proxy: *mut c_void,
    event_type: cg::EventType,
    event: &mut cg::Event,
    refcon: *mut c_void,
) -> Option<&'static mut cg::Event> {
    let ctx = unsafe { &mut *(refcon as *mut TapContext) };
    let mut dispatcher = ctx.dispatcher.lock();

    let disposition = match event_type {
        cg::EventType::TapDisabledByTimeout | cg::EventType::TapDisabledByUserInput => {
            dispatcher.handle_tap(TapEvent::DisabledByTimeout)
        }
        cg::EventType::FlagsChanged => {
            let key_code = event.integer_value_field(cg::EventField::KeyboardEventKeycode) as u16;
            let flags = event.flags();
            let timestamp_ns = host_time_to_ns(event.timestamp());
            if let Some(usage) = usage_for_keycode(key_code) {
                let pressed = flags.0 > ctx.last_flags.0;
                dispatcher.handle_hid(HidEvent { usage, pressed, timestamp_ns });
            }
            ctx.last_flags = flags;
            dispatcher.handle_tap(TapEvent::FlagsChanged {
                modifiers: modifiers_from_flags(flags),
            })
        }
        cg::EventType::KeyDown => {
            let key_code = event.integer_value_field(cg::EventField::KeyboardEventKeycode) as u16;
            dispatcher.handle_tap(TapEvent::KeyDown {
                key_code,
                modifiers: modifiers_from_flags(event.flags()),
            })
        }
        cg::EventType::KeyUp => {
            let key_code = event.integer_value_field(cg::EventField::KeyboardEventKeycode) as u16;
            dispatcher.handle_tap(TapEvent::KeyUp {
                key_code,
                modifiers: modifiers_from_flags(event.flags()),
            })
        }
        _ => TapDisposition::PassThrough,
    };

    match disposition {
        TapDisposition::Captured => None,
        TapDisposition::PassThrough => Some(unsafe { std::mem::transmute(event) }),
        TapDisposition::ReEnable => {
            // Re-enabled from the run loop below; swallow the stale event.
            None
        }
    }
}

/// Install the session event tap on the current (main) run loop.
pub fn spawn_event_tap(dispatcher: Arc<Mutex<InputDispatcher>>) -> anyhow::Result<()> {
    let ctx = Box::into_raw(Box::new(TapContext {
        dispatcher,
        last_flags: cg::EventFlags(0),
    }));

    let mask = cg::EventMask::KEY_DOWN
        | cg::EventMask::KEY_UP
        | cg::EventMask::FLAGS_CHANGED;
    let tap = cg::EventTap::new(
        cg::EventTapLocation::Session,
        cg::EventTapPlacement::HeadInsert,
        cg::EventTapOptions::Default,
        mask,
        tap_callback,
        ctx as *mut c_void,
    )
    .ok_or_else(|| anyhow::anyhow!("creating event tap failed; is input monitoring granted?"))?;

    let source = tap.run_loop_src(0)
        .ok_or_else(|| anyhow::anyhow!("creating tap run loop source failed"))?;
    cf::RunLoop::current().add_src(&source, cf::RunLoopMode::default());
    tap.enable(true);
    info!("event tap installed");
    Ok(())
}
