//! Accessibility event kinds and the observer stream payload.

use std::collections::BTreeMap;

use crate::value::AxValue;

/// OS-level change notifications the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FocusedWindowChanged,
    FocusedElementChanged,
    MainWindowChanged,
    TitleChanged,
    ValueChanged,
    SelectedTextChanged,
    SelectedChildrenChanged,
    AnnouncementRequested,
    ElementCreated,
    ElementDestroyed,
    RowCountChanged,
}

impl EventKind {
    /// OS notification name for this kind.
    pub fn as_ax(self) -> &'static str {
        match self {
            EventKind::FocusedWindowChanged => "AXFocusedWindowChanged",
            EventKind::FocusedElementChanged => "AXFocusedUIElementChanged",
            EventKind::MainWindowChanged => "AXMainWindowChanged",
            EventKind::TitleChanged => "AXTitleChanged",
            EventKind::ValueChanged => "AXValueChanged",
            EventKind::SelectedTextChanged => "AXSelectedTextChanged",
            EventKind::SelectedChildrenChanged => "AXSelectedChildrenChanged",
            EventKind::AnnouncementRequested => "AXAnnouncementRequested",
            EventKind::ElementCreated => "AXCreated",
            EventKind::ElementDestroyed => "AXUIElementDestroyed",
            EventKind::RowCountChanged => "AXRowCountChanged",
        }
    }

    pub fn from_ax(s: &str) -> Option<EventKind> {
        Some(match s {
            "AXFocusedWindowChanged" => EventKind::FocusedWindowChanged,
            "AXFocusedUIElementChanged" => EventKind::FocusedElementChanged,
            "AXMainWindowChanged" => EventKind::MainWindowChanged,
            "AXTitleChanged" => EventKind::TitleChanged,
            "AXValueChanged" => EventKind::ValueChanged,
            "AXSelectedTextChanged" => EventKind::SelectedTextChanged,
            "AXSelectedChildrenChanged" => EventKind::SelectedChildrenChanged,
            "AXAnnouncementRequested" => EventKind::AnnouncementRequested,
            "AXCreated" => EventKind::ElementCreated,
            "AXUIElementDestroyed" => EventKind::ElementDestroyed,
            "AXRowCountChanged" => EventKind::RowCountChanged,
            _ => return None,
        })
    }
}

/// Payload dictionary key carrying the text of a requested announcement.
pub const ANNOUNCEMENT_KEY: &str = "AXAnnouncementKey";

/// One observed accessibility change: notification kind, subject element,
/// optional payload dictionary.
#[derive(Debug, Clone)]
pub struct AxEvent<E> {
    pub kind: EventKind,
    pub element: E,
    pub payload: Option<BTreeMap<String, AxValue<E>>>,
}

impl<E> AxEvent<E> {
    pub fn new(kind: EventKind, element: E) -> Self {
        Self { kind, element, payload: None }
    }

    pub fn with_payload(mut self, payload: BTreeMap<String, AxValue<E>>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Announcement text, for `AnnouncementRequested` events.
    pub fn announcement(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.get(ANNOUNCEMENT_KEY))
            .and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            EventKind::FocusedWindowChanged,
            EventKind::FocusedElementChanged,
            EventKind::TitleChanged,
            EventKind::ValueChanged,
            EventKind::SelectedTextChanged,
            EventKind::AnnouncementRequested,
            EventKind::ElementCreated,
            EventKind::ElementDestroyed,
            EventKind::RowCountChanged,
        ] {
            assert_eq!(EventKind::from_ax(kind.as_ax()), Some(kind));
        }
        assert_eq!(EventKind::from_ax("AXSomethingElse"), None);
    }

    #[test]
    fn announcement_reads_payload() {
        let mut payload = BTreeMap::new();
        payload.insert(
            ANNOUNCEMENT_KEY.to_string(),
            AxValue::<u32>::Str("download complete".into()),
        );
        let ev = AxEvent::new(EventKind::AnnouncementRequested, 7u32).with_payload(payload);
        assert_eq!(ev.announcement(), Some("download complete"));

        let ev = AxEvent::new(EventKind::AnnouncementRequested, 7u32);
        assert_eq!(ev.announcement(), None);
    }
}
