//! Incremental readouts for the focused text field: selection deltas, caret
//! movement, value edits, and title changes.

use std::sync::Arc;

use outloud::gateway::mock::{MockElement, MockGateway};
use outloud::input::{keycode, MockKeyState};
use outloud::speech::{RecordingDevice, Scheduler};
use outloud::{Attr, AxValue, EventKind, Gateway, Navigator, TextRange};

struct Rig {
    gw: MockGateway,
    nav: Navigator<MockGateway>,
    scheduler: Scheduler,
    device: RecordingDevice,
    keys: MockKeyState,
    field: MockElement,
}

/// Focused text field with value "abcdef" and caret at the start.
fn rig() -> Rig {
    let gw = MockGateway::new();
    let device = RecordingDevice::new();
    let scheduler = Scheduler::new(Box::new(device.clone()));
    let keys = MockKeyState::new();
    let mut nav = Navigator::new(
        Arc::new(gw.clone()),
        scheduler.clone(),
        Arc::new(keys.clone()),
        std::env::temp_dir(),
    );

    let app = gw.add_app(42, "TestApp");
    let win = gw.add_child(&app, "AXWindow");
    gw.set_text(&win, Attr::Title, "W");
    let field = gw.add_child(&win, "AXTextField");
    gw.set_text(&field, Attr::Value, "abcdef");
    gw.set(&field, Attr::SelectedTextRange, AxValue::Range(TextRange::new(0, 0)));
    gw.set(&app, Attr::FocusedElement, AxValue::Element(field));

    nav.refocus(42);
    while !scheduler.is_idle() {
        scheduler.utterance_finished();
    }
    device.clear();

    Rig { gw, nav, scheduler, device, keys, field }
}

impl Rig {
    fn select(&mut self, start: i64, end: i64) -> Vec<String> {
        self.device.clear();
        self.gw.set(
            &self.field,
            Attr::SelectedTextRange,
            AxValue::Range(TextRange::span(start, end)),
        );
        self.gw.emit(EventKind::SelectedTextChanged, &self.field);
        let event = self.nav.event_stream().unwrap().try_recv().unwrap();
        self.nav.handle_event(event);
        self.drain()
    }

    fn drain(&self) -> Vec<String> {
        while !self.scheduler.is_idle() {
            self.scheduler.utterance_finished();
        }
        self.device.spoken()
    }
}

#[test]
fn growing_selection_reads_each_delta() {
    let mut rig = rig();

    assert_eq!(rig.select(0, 3), vec!["abc", "Selected"]);
    assert_eq!(rig.select(0, 5), vec!["de", "Selected"]);
}

#[test]
fn shrinking_selection_reads_the_dropped_run() {
    let mut rig = rig();

    rig.select(0, 5);
    assert_eq!(rig.select(0, 2), vec!["cde", "Unselected"]);
}

#[test]
fn replaced_selection_reads_old_then_new() {
    let mut rig = rig();

    rig.select(0, 2);
    assert_eq!(
        rig.select(3, 5),
        vec!["ab", "Unselected", "de", "Selected"]
    );
}

#[test]
fn unchanged_selection_with_arrow_held_is_silent_boundary() {
    let mut rig = rig();
    rig.select(0, 0); // prime the cache; no change, no arrows: nothing spoken
    rig.keys.press(keycode::RIGHT);

    // Boundary is a control token: the batch renders to silence.
    let spoken = rig.select(0, 0);
    assert!(spoken.is_empty());
}

#[test]
fn caret_move_reads_the_crossed_text() {
    let mut rig = rig();

    assert_eq!(rig.select(4, 4), vec!["abcd"]);
}

#[test]
fn vertical_caret_move_reads_the_new_line() {
    let mut rig = rig();
    rig.gw.set_text(&rig.field, Attr::Value, "one\ntwo\nthree");
    rig.keys.press(keycode::DOWN);

    assert_eq!(rig.select(4, 4), vec!["two"]);
}

#[test]
fn selection_events_for_other_elements_are_ignored() {
    let mut rig = rig();
    let other = rig.gw.add_child(&rig.gw.application(42), "AXTextField");
    rig.gw.set_text(&other, Attr::Value, "zzz");

    rig.device.clear();
    rig.gw.emit(EventKind::SelectedTextChanged, &other);
    let event = rig.nav.event_stream().unwrap().try_recv().unwrap();
    rig.nav.handle_event(event);
    assert!(rig.drain().is_empty());
}

#[test]
fn typed_text_is_read_as_the_insertion() {
    let mut rig = rig();
    rig.device.clear();
    rig.gw.set_text(&rig.field, Attr::Value, "abcXYdef");
    rig.gw.emit(EventKind::ValueChanged, &rig.field);
    let event = rig.nav.event_stream().unwrap().try_recv().unwrap();
    rig.nav.handle_event(event);

    assert_eq!(rig.drain(), vec!["XY"]);
}

#[test]
fn deleted_text_is_read_as_the_removal() {
    let mut rig = rig();
    rig.device.clear();
    rig.gw.set_text(&rig.field, Attr::Value, "adef");
    rig.gw.emit(EventKind::ValueChanged, &rig.field);
    let event = rig.nav.event_stream().unwrap().try_recv().unwrap();
    rig.nav.handle_event(event);

    assert_eq!(rig.drain(), vec!["bc"]);
}

#[test]
fn title_change_reads_the_updated_label() {
    let mut rig = rig();
    rig.device.clear();
    rig.gw.set_text(&rig.field, Attr::Title, "Search");
    rig.gw.emit(EventKind::TitleChanged, &rig.field);
    let event = rig.nav.event_stream().unwrap().try_recv().unwrap();
    rig.nav.handle_event(event);

    assert_eq!(rig.drain(), vec!["Search"]);
}
