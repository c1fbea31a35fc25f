//! The element gateway: a thin, strongly-typed facade over the OS
//! accessibility API.
//!
//! The engine is generic over [`Gateway`]; the macOS implementation talks to
//! the real accessibility client API, while [`mock::MockGateway`] serves a
//! synthetic tree for tests and demos. All blocking OS round-trips happen
//! behind this trait on the accessibility worker thread.

pub mod mock;

#[cfg(target_os = "macos")]
pub mod macos;

use std::fmt;
use std::hash::Hash;

use crossbeam_channel::Receiver;

use crate::error::AxResult;
use crate::events::{AxEvent, EventKind};
use crate::role::Role;
use crate::value::AxValue;

/// Named attribute slots on an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attr {
    Role,
    Subrole,
    RoleDescription,
    Title,
    TitleElement,
    Description,
    Help,
    Value,
    ValueDescription,
    Placeholder,
    Selected,
    SelectedText,
    SelectedTextRange,
    Enabled,
    Focused,
    Edited,
    Parent,
    Children,
    ChildrenInNavigationOrder,
    Window,
    FocusedWindow,
    FocusedElement,
    FocusableAncestor,
    Rows,
    Columns,
    SelectedCells,
    SelectedRows,
    SelectedColumns,
    SelectedChildren,
}

impl Attr {
    /// Every attribute slot, in dump order.
    pub const ALL: [Attr; 29] = [
        Attr::Role,
        Attr::Subrole,
        Attr::RoleDescription,
        Attr::Title,
        Attr::TitleElement,
        Attr::Description,
        Attr::Help,
        Attr::Value,
        Attr::ValueDescription,
        Attr::Placeholder,
        Attr::Selected,
        Attr::SelectedText,
        Attr::SelectedTextRange,
        Attr::Enabled,
        Attr::Focused,
        Attr::Edited,
        Attr::Parent,
        Attr::Children,
        Attr::ChildrenInNavigationOrder,
        Attr::Window,
        Attr::FocusedWindow,
        Attr::FocusedElement,
        Attr::FocusableAncestor,
        Attr::Rows,
        Attr::Columns,
        Attr::SelectedCells,
        Attr::SelectedRows,
        Attr::SelectedColumns,
        Attr::SelectedChildren,
    ];

    pub fn from_ax(name: &str) -> Option<Attr> {
        Attr::ALL.iter().copied().find(|a| a.as_ax() == name)
    }

    /// OS attribute name.
    pub fn as_ax(self) -> &'static str {
        match self {
            Attr::Role => "AXRole",
            Attr::Subrole => "AXSubrole",
            Attr::RoleDescription => "AXRoleDescription",
            Attr::Title => "AXTitle",
            Attr::TitleElement => "AXTitleUIElement",
            Attr::Description => "AXDescription",
            Attr::Help => "AXHelp",
            Attr::Value => "AXValue",
            Attr::ValueDescription => "AXValueDescription",
            Attr::Placeholder => "AXPlaceholderValue",
            Attr::Selected => "AXSelected",
            Attr::SelectedText => "AXSelectedText",
            Attr::SelectedTextRange => "AXSelectedTextRange",
            Attr::Enabled => "AXEnabled",
            Attr::Focused => "AXFocused",
            Attr::Edited => "AXEdited",
            Attr::Parent => "AXParent",
            Attr::Children => "AXChildren",
            Attr::ChildrenInNavigationOrder => "AXChildrenInNavigationOrder",
            Attr::Window => "AXWindow",
            Attr::FocusedWindow => "AXFocusedWindow",
            Attr::FocusedElement => "AXFocusedUIElement",
            Attr::FocusableAncestor => "AXFocusableAncestor",
            Attr::Rows => "AXRows",
            Attr::Columns => "AXColumns",
            Attr::SelectedCells => "AXSelectedCells",
            Attr::SelectedRows => "AXSelectedRows",
            Attr::SelectedColumns => "AXSelectedColumns",
            Attr::SelectedChildren => "AXSelectedChildren",
        }
    }
}

/// Parameterized queries: stateless (element, name, input) → value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    LineForIndex,
    RangeForLine,
    StringForRange,
    RangeForPosition,
    RangeForIndex,
    BoundsForRange,
    CellForColumnAndRow,
}

impl Query {
    pub fn as_ax(self) -> &'static str {
        match self {
            Query::LineForIndex => "AXLineForIndex",
            Query::RangeForLine => "AXRangeForLine",
            Query::StringForRange => "AXStringForRange",
            Query::RangeForPosition => "AXRangeForPosition",
            Query::RangeForIndex => "AXRangeForIndex",
            Query::BoundsForRange => "AXBoundsForRange",
            Query::CellForColumnAndRow => "AXCellForColumnAndRow",
        }
    }
}

/// One performable action on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescription {
    pub id: String,
    pub description: String,
}

/// Subscription half of an observer; the event half is a channel.
pub trait ObserverBackend: Send {
    fn subscribe(&mut self, kind: EventKind) -> AxResult<()>;
    fn unsubscribe(&mut self, kind: EventKind) -> AxResult<()>;
}

/// An observer over one element (usually an application element).
///
/// Events arrive on a multi-consumer channel in OS delivery order. Dropping
/// the observer tears down the OS registration and disconnects the channel,
/// so consumers observe termination as a closed stream.
pub struct Observer<E> {
    backend: Box<dyn ObserverBackend>,
    rx: Receiver<AxEvent<E>>,
}

impl<E> Observer<E> {
    pub fn new(backend: Box<dyn ObserverBackend>, rx: Receiver<AxEvent<E>>) -> Self {
        Self { backend, rx }
    }

    pub fn subscribe(&mut self, kind: EventKind) -> AxResult<()> {
        self.backend.subscribe(kind)
    }

    pub fn unsubscribe(&mut self, kind: EventKind) -> AxResult<()> {
        self.backend.unsubscribe(kind)
    }

    /// A handle onto the event stream. Clones share one stream: each event is
    /// delivered to exactly one receive call, in order.
    pub fn events(&self) -> Receiver<AxEvent<E>> {
        self.rx.clone()
    }
}

/// The facade contract.
///
/// Implementations degrade the benign error kinds (see
/// [`AxError::degrades_to_null`](crate::error::AxError::degrades_to_null)) to
/// `Ok(None)`/no-op themselves; only `InvalidElement`, `ApiDisabled`,
/// `Timeout` and `NotImplemented` reach callers.
pub trait Gateway: Send + Sync + 'static {
    /// Opaque element handle. Equality/hash follow the underlying OS node;
    /// clones are cheap (the OS reference is counted).
    type Element: Clone + PartialEq + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// The system-wide element (root of everything on screen).
    fn system_wide(&self) -> Self::Element;

    /// The application element for a process.
    fn application(&self, pid: i32) -> Self::Element;

    fn attribute(
        &self,
        element: &Self::Element,
        attr: Attr,
    ) -> AxResult<Option<AxValue<Self::Element>>>;

    fn set_attribute(
        &self,
        element: &Self::Element,
        attr: Attr,
        value: AxValue<Self::Element>,
    ) -> AxResult<()>;

    fn query(
        &self,
        element: &Self::Element,
        query: Query,
        input: AxValue<Self::Element>,
    ) -> AxResult<Option<AxValue<Self::Element>>>;

    /// All readable attribute names on the element (OS spelling).
    fn attribute_names(&self, element: &Self::Element) -> AxResult<Vec<String>>;

    /// All parameterized attribute names on the element (OS spelling).
    fn parameterized_names(&self, element: &Self::Element) -> AxResult<Vec<String>>;

    fn actions(&self, element: &Self::Element) -> AxResult<Vec<ActionDescription>>;

    fn perform(&self, element: &Self::Element, action: &str) -> AxResult<()>;

    /// Process-wide deadline for every gateway round-trip.
    fn set_global_timeout(&self, seconds: f32) -> AxResult<()>;

    /// Ask the OS whether this process holds the accessibility-client
    /// privilege, prompting the user if not. Called exactly once at startup.
    fn confirm_trusted(&self) -> bool;

    fn observe(&self, element: &Self::Element) -> AxResult<Observer<Self::Element>>;

    /// Generic attribute read by raw OS name (dump support).
    fn attribute_by_name(
        &self,
        element: &Self::Element,
        name: &str,
    ) -> AxResult<Option<AxValue<Self::Element>>>;
}

/// Typed convenience reads shared by the navigator, reader and dump.
pub trait GatewayExt: Gateway {
    fn string_attr(&self, element: &Self::Element, attr: Attr) -> AxResult<Option<String>> {
        Ok(self
            .attribute(element, attr)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Non-empty string content of an attribute.
    fn text_attr(&self, element: &Self::Element, attr: Attr) -> AxResult<Option<String>> {
        Ok(self.string_attr(element, attr)?.filter(|s| !s.is_empty()))
    }

    fn bool_attr(&self, element: &Self::Element, attr: Attr) -> AxResult<bool> {
        Ok(self
            .attribute(element, attr)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    fn element_attr(&self, element: &Self::Element, attr: Attr) -> AxResult<Option<Self::Element>> {
        Ok(self
            .attribute(element, attr)?
            .and_then(|v| v.as_element().cloned()))
    }

    fn elements_attr(&self, element: &Self::Element, attr: Attr) -> AxResult<Vec<Self::Element>> {
        Ok(self
            .attribute(element, attr)?
            .and_then(|v| v.as_elements().map(|es| es.into_iter().cloned().collect()))
            .unwrap_or_default())
    }

    fn role(&self, element: &Self::Element) -> AxResult<Role> {
        Ok(self
            .string_attr(element, Attr::Role)?
            .map(|s| Role::from_ax(&s))
            .unwrap_or(Role::Other(String::new())))
    }

    /// Children in navigation order, falling back to the plain child list.
    fn ordered_children(&self, element: &Self::Element) -> AxResult<Vec<Self::Element>> {
        let ordered = self.elements_attr(element, Attr::ChildrenInNavigationOrder)?;
        if !ordered.is_empty() {
            return Ok(ordered);
        }
        self.elements_attr(element, Attr::Children)
    }
}

impl<G: Gateway + ?Sized> GatewayExt for G {}
