//! Input pipeline: lock-key double tap, the modal gate, the solo-Control
//! interrupt, and chords driving the navigator end to end through the agent.

use std::sync::Arc;
use std::time::Duration;

use outloud::gateway::mock::{MockElement, MockGateway};
use outloud::input::{keycode, HidEvent, HidUsage, Modifiers, MockKeyState, MockLockState, TapDisposition, TapEvent};
use outloud::speech::{DeviceEvent, RecordingDevice, Scheduler};
use outloud::{Agent, Attr, AxValue, EngineConfig};

struct Rig {
    agent: Agent,
    gw: MockGateway,
    scheduler: Scheduler,
    device: RecordingDevice,
    lock: MockLockState,
}

fn rig() -> Rig {
    let gw = MockGateway::new();
    let device = RecordingDevice::new();
    let scheduler = Scheduler::new(Box::new(device.clone()));
    let lock = MockLockState::new();
    let config = EngineConfig {
        dump_dir: std::env::temp_dir(),
        ..EngineConfig::default()
    };
    let agent = Agent::new(
        Arc::new(gw.clone()),
        scheduler.clone(),
        Arc::new(MockKeyState::new()),
        Box::new(lock.clone()),
        &config,
    )
    .unwrap();
    Rig { agent, gw, scheduler, device, lock }
}

impl Rig {
    /// Wait for the worker to speak, then drain the completion loop.
    fn settle(&self) -> Vec<String> {
        for _ in 0..500 {
            if !self.device.spoken().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        // One extra turn for stragglers queued behind the first utterance.
        std::thread::sleep(Duration::from_millis(10));
        while !self.scheduler.is_idle() {
            self.scheduler.utterance_finished();
        }
        self.device.spoken()
    }

    fn caps(&self, pressed: bool, at_ms: u64) {
        self.agent.dispatcher().lock().handle_hid(HidEvent {
            usage: HidUsage::CapsLock,
            pressed,
            timestamp_ns: at_ms * 1_000_000,
        });
    }

    fn key(&self, key_code: u16) -> TapDisposition {
        self.agent.dispatcher().lock().handle_tap(TapEvent::KeyDown {
            key_code,
            modifiers: Modifiers::default(),
        })
    }
}

fn two_button_app(gw: &MockGateway) -> (MockElement, MockElement) {
    let app = gw.add_app(42, "TestApp");
    let win = gw.add_child(&app, "AXWindow");
    gw.set_text(&win, Attr::Title, "W");
    let a = gw.add_child(&win, "AXButton");
    gw.set_text(&a, Attr::Title, "A");
    gw.set_text(&a, Attr::RoleDescription, "button");
    let b = gw.add_child(&win, "AXButton");
    gw.set_text(&b, Attr::Title, "B");
    gw.set_text(&b, Attr::RoleDescription, "button");
    gw.set(&app, Attr::FocusedElement, AxValue::Element(a));
    (a, b)
}

#[test]
fn lock_tab_reads_the_current_focus() {
    let rig = rig();
    two_button_app(&rig.gw);
    rig.agent.frontmost_changed(42);
    rig.settle();
    rig.device.clear();

    rig.caps(true, 1000);
    assert_eq!(rig.key(keycode::TAB), TapDisposition::Captured);
    assert_eq!(rig.settle(), vec!["A", "button"]);
}

#[test]
fn lock_right_moves_to_the_next_sibling() {
    let rig = rig();
    two_button_app(&rig.gw);
    rig.agent.frontmost_changed(42);
    rig.settle();
    rig.device.clear();

    rig.caps(true, 1000);
    assert_eq!(rig.key(keycode::RIGHT), TapDisposition::Captured);
    assert_eq!(rig.settle(), vec!["B", "button"]);
}

#[test]
fn unheld_keys_pass_through_to_the_application() {
    let rig = rig();
    two_button_app(&rig.gw);
    assert_eq!(rig.key(keycode::TAB), TapDisposition::PassThrough);
    assert_eq!(rig.key(keycode::RIGHT), TapDisposition::PassThrough);
}

#[test]
fn double_tap_toggles_the_lock_exactly_once_and_announces() {
    let rig = rig();

    rig.caps(true, 1000);
    rig.caps(false, 1050);
    rig.caps(true, 1200); // 200 ms after the first press
    rig.caps(false, 1250);

    assert!(rig.lock.is_on());
    assert_eq!(rig.lock.posted_events(), vec![true]);
    while !rig.scheduler.is_idle() {
        rig.scheduler.utterance_finished();
    }
    assert_eq!(rig.device.spoken(), vec!["CapsLock On"]);
}

#[test]
fn single_tap_leaves_the_lock_untouched_and_silent() {
    let rig = rig();

    rig.caps(true, 1000);
    rig.caps(false, 1050);

    assert!(!rig.lock.is_on());
    assert!(rig.lock.posted_events().is_empty());
    assert!(rig.device.spoken().is_empty());
}

#[test]
fn solo_control_tap_stops_speech_mid_utterance() {
    let rig = rig();
    rig.scheduler.announce("Hello world");
    rig.device.clear();

    let dispatcher = rig.agent.dispatcher();
    dispatcher.lock().handle_hid(HidEvent {
        usage: HidUsage::RightControl,
        pressed: true,
        timestamp_ns: 0,
    });
    dispatcher.lock().handle_hid(HidEvent {
        usage: HidUsage::RightControl,
        pressed: false,
        timestamp_ns: 400_000_000,
    });

    assert_eq!(rig.device.events(), vec![DeviceEvent::Stop]);
    assert!(rig.scheduler.is_idle());
}

#[test]
fn control_chord_with_a_key_between_does_not_interrupt() {
    let rig = rig();
    two_button_app(&rig.gw);
    rig.scheduler.announce("Hello world");
    rig.device.clear();

    let dispatcher = rig.agent.dispatcher();
    dispatcher.lock().handle_hid(HidEvent {
        usage: HidUsage::LeftControl,
        pressed: true,
        timestamp_ns: 0,
    });
    // A real key lands through the tap before the release.
    dispatcher.lock().handle_tap(TapEvent::KeyDown {
        key_code: keycode::B,
        modifiers: Modifiers(Modifiers::CTRL),
    });
    dispatcher.lock().handle_hid(HidEvent {
        usage: HidUsage::LeftControl,
        pressed: false,
        timestamp_ns: 100,
    });

    assert!(rig.device.events().is_empty());
    assert!(!rig.scheduler.is_idle());
}

#[test]
fn browse_mode_toggle_announces_and_gates() {
    let rig = rig();
    two_button_app(&rig.gw);

    // Lock+B flips browse mode on.
    rig.caps(true, 1000);
    rig.key(keycode::B);
    rig.caps(false, 1050);
    while !rig.scheduler.is_idle() {
        rig.scheduler.utterance_finished();
    }
    assert_eq!(rig.device.spoken(), vec!["Browse mode on"]);
    assert!(rig.agent.dispatcher().lock().browse_mode());

    // With browse mode on, keys are captured without the lock key.
    assert_eq!(rig.key(keycode::RIGHT), TapDisposition::Captured);
}

#[test]
fn disabled_tap_event_requests_reenable() {
    let rig = rig();
    assert_eq!(
        rig.agent.dispatcher().lock().handle_tap(TapEvent::DisabledByTimeout),
        TapDisposition::ReEnable
    );
}
