//! Synthetic in-memory gateway.
//!
//! Serves a scriptable accessibility tree for tests and demos: nodes are
//! created and mutated through the builder methods, events are injected with
//! [`MockGateway::emit`], and failures with [`MockGateway::fail_with`].
//! Parameterized text queries are computed for real over the stored value
//! string, so selection-delta logic can be exercised end to end.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;

use crate::error::{AxError, AxResult};
use crate::events::{AxEvent, EventKind};
use crate::value::{AxValue, TextRange};

use super::{ActionDescription, Attr, Gateway, Observer, ObserverBackend, Query};

/// Handle onto a mock tree node. Equality and hash follow the node identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockElement(u64);

impl std::fmt::Debug for MockElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockElement({})", self.0)
    }
}

struct Node {
    attrs: HashMap<Attr, AxValue<MockElement>>,
    actions: Vec<ActionDescription>,
    parent: Option<u64>,
    children: Vec<u64>,
    destroyed: bool,
    /// Set-attribute calls silently ignored (models widgets that refuse
    /// keyboard focus).
    refuses_writes: bool,
}

impl Node {
    fn new() -> Self {
        Self {
            attrs: HashMap::new(),
            actions: Vec::new(),
            parent: None,
            children: Vec::new(),
            destroyed: false,
            refuses_writes: false,
        }
    }
}

struct MockObserver {
    id: u64,
    subscriptions: HashSet<EventKind>,
    tx: Sender<AxEvent<MockElement>>,
}

struct TreeState {
    nodes: Vec<Node>,
    apps: HashMap<i32, u64>,
    observers: Vec<MockObserver>,
    next_observer_id: u64,
    failures: HashMap<u64, AxError>,
    trusted: bool,
    timeout_secs: Option<f32>,
}

const SYSTEM_WIDE: u64 = 0;

/// The scriptable gateway. Cheap to clone; clones share the tree.
#[derive(Clone)]
pub struct MockGateway {
    state: Arc<Mutex<TreeState>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        let mut system = Node::new();
        system
            .attrs
            .insert(Attr::Role, AxValue::Str("AXSystemWide".into()));
        Self {
            state: Arc::new(Mutex::new(TreeState {
                nodes: vec![system],
                apps: HashMap::new(),
                observers: Vec::new(),
                next_observer_id: 1,
                failures: HashMap::new(),
                trusted: true,
                timeout_secs: None,
            })),
        }
    }

    // -----------------------------------------------------------------
    // Tree construction
    // -----------------------------------------------------------------

    /// Register an application node for a PID.
    pub fn add_app(&self, pid: i32, name: &str) -> MockElement {
        let mut st = self.state.lock();
        let id = st.nodes.len() as u64;
        let mut node = Node::new();
        node.attrs
            .insert(Attr::Role, AxValue::Str("AXApplication".into()));
        node.attrs.insert(Attr::Title, AxValue::Str(name.into()));
        st.nodes.push(node);
        st.apps.insert(pid, id);
        MockElement(id)
    }

    /// Append a child node with the given OS role string.
    pub fn add_child(&self, parent: &MockElement, role: &str) -> MockElement {
        let mut st = self.state.lock();
        let id = st.nodes.len() as u64;
        let mut node = Node::new();
        node.attrs.insert(Attr::Role, AxValue::Str(role.into()));
        node.parent = Some(parent.0);
        st.nodes.push(node);
        st.nodes[parent.0 as usize].children.push(id);
        MockElement(id)
    }

    pub fn set(&self, element: &MockElement, attr: Attr, value: AxValue<MockElement>) {
        self.state.lock().nodes[element.0 as usize]
            .attrs
            .insert(attr, value);
    }

    pub fn set_text(&self, element: &MockElement, attr: Attr, text: &str) {
        self.set(element, attr, AxValue::Str(text.into()));
    }

    pub fn add_action(&self, element: &MockElement, id: &str, description: &str) {
        self.state.lock().nodes[element.0 as usize]
            .actions
            .push(ActionDescription {
                id: id.into(),
                description: description.into(),
            });
    }

    /// Mark a node destroyed: every further operation on it reports
    /// `InvalidElement`, and it disappears from its parent's child list.
    pub fn destroy(&self, element: &MockElement) {
        let mut st = self.state.lock();
        st.nodes[element.0 as usize].destroyed = true;
        if let Some(parent) = st.nodes[element.0 as usize].parent {
            st.nodes[parent as usize].children.retain(|&c| c != element.0);
        }
    }

    /// Every operation on this node reports the given error.
    pub fn fail_with(&self, element: &MockElement, error: AxError) {
        self.state.lock().failures.insert(element.0, error);
    }

    pub fn refuse_writes(&self, element: &MockElement) {
        self.state.lock().nodes[element.0 as usize].refuses_writes = true;
    }

    pub fn set_trusted(&self, trusted: bool) {
        self.state.lock().trusted = trusted;
    }

    /// The last process-wide timeout applied through the gateway.
    pub fn timeout_secs(&self) -> Option<f32> {
        self.state.lock().timeout_secs
    }

    // -----------------------------------------------------------------
    // Event injection
    // -----------------------------------------------------------------

    pub fn emit(&self, kind: EventKind, subject: &MockElement) {
        self.emit_with_payload(kind, subject, None);
    }

    pub fn emit_with_payload(
        &self,
        kind: EventKind,
        subject: &MockElement,
        payload: Option<BTreeMap<String, AxValue<MockElement>>>,
    ) {
        let st = self.state.lock();
        for obs in &st.observers {
            if obs.subscriptions.contains(&kind) {
                let mut event = AxEvent::new(kind, *subject);
                if let Some(p) = &payload {
                    event = event.with_payload(p.clone());
                }
                let _ = obs.tx.send(event);
            }
        }
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn check_live(&self, st: &TreeState, element: &MockElement) -> AxResult<()> {
        if let Some(err) = st.failures.get(&element.0) {
            return Err(*err);
        }
        match st.nodes.get(element.0 as usize) {
            Some(node) if !node.destroyed => Ok(()),
            _ => Err(AxError::InvalidElement),
        }
    }

    fn window_of(&self, st: &TreeState, mut id: u64) -> Option<u64> {
        loop {
            let node = &st.nodes[id as usize];
            if node.attrs.get(&Attr::Role).and_then(|v| v.as_str()) == Some("AXWindow") {
                return Some(id);
            }
            id = node.parent?;
        }
    }

    /// Character range of `line` within `text` (content without the newline).
    fn line_range(text: &str, line: i64) -> Option<TextRange> {
        let mut start = 0i64;
        for (i, l) in text.split('\n').enumerate() {
            let len = l.chars().count() as i64;
            if i as i64 == line {
                return Some(TextRange::new(start, len));
            }
            start += len + 1;
        }
        None
    }

    fn line_for_index(text: &str, index: i64) -> i64 {
        let mut line = 0i64;
        let mut pos = 0i64;
        for c in text.chars() {
            if pos >= index {
                break;
            }
            if c == '\n' {
                line += 1;
            }
            pos += 1;
        }
        line
    }

    fn substring(text: &str, range: TextRange) -> String {
        text.chars()
            .skip(range.start.max(0) as usize)
            .take(range.len.max(0) as usize)
            .collect()
    }
}

impl Gateway for MockGateway {
    type Element = MockElement;

    fn system_wide(&self) -> MockElement {
        MockElement(SYSTEM_WIDE)
    }

    fn application(&self, pid: i32) -> MockElement {
        let mut st = self.state.lock();
        if let Some(&id) = st.apps.get(&pid) {
            return MockElement(id);
        }
        let id = st.nodes.len() as u64;
        let mut node = Node::new();
        node.attrs
            .insert(Attr::Role, AxValue::Str("AXApplication".into()));
        st.nodes.push(node);
        st.apps.insert(pid, id);
        MockElement(id)
    }

    fn attribute(
        &self,
        element: &MockElement,
        attr: Attr,
    ) -> AxResult<Option<AxValue<MockElement>>> {
        let st = self.state.lock();
        self.check_live(&st, element)?;
        let node = &st.nodes[element.0 as usize];
        let value = match attr {
            Attr::Parent => node.parent.map(|p| AxValue::Element(MockElement(p))),
            Attr::Children => Some(AxValue::Array(
                node.children
                    .iter()
                    .map(|&c| AxValue::Element(MockElement(c)))
                    .collect(),
            )),
            Attr::Window => self
                .window_of(&st, element.0)
                .map(|w| AxValue::Element(MockElement(w))),
            other => node.attrs.get(&other).cloned(),
        };
        Ok(value.filter(|v| !v.is_null()))
    }

    fn set_attribute(
        &self,
        element: &MockElement,
        attr: Attr,
        value: AxValue<MockElement>,
    ) -> AxResult<()> {
        let mut st = self.state.lock();
        self.check_live(&st, element)?;
        let node = &mut st.nodes[element.0 as usize];
        if !node.refuses_writes {
            node.attrs.insert(attr, value);
        }
        Ok(())
    }

    fn query(
        &self,
        element: &MockElement,
        query: Query,
        input: AxValue<MockElement>,
    ) -> AxResult<Option<AxValue<MockElement>>> {
        let st = self.state.lock();
        self.check_live(&st, element)?;
        let node = &st.nodes[element.0 as usize];
        let text = node
            .attrs
            .get(&Attr::Value)
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let out = match query {
            Query::LineForIndex => input
                .as_int()
                .map(|i| AxValue::Int(Self::line_for_index(text, i))),
            Query::RangeForLine => input
                .as_int()
                .and_then(|l| Self::line_range(text, l))
                .map(AxValue::Range),
            Query::StringForRange => input
                .as_range()
                .map(|r| AxValue::Str(Self::substring(text, r))),
            Query::RangeForIndex => input
                .as_int()
                .map(|i| AxValue::Range(TextRange::new(i, 0))),
            Query::RangeForPosition | Query::BoundsForRange | Query::CellForColumnAndRow => None,
        };
        Ok(out)
    }

    fn attribute_names(&self, element: &MockElement) -> AxResult<Vec<String>> {
        let st = self.state.lock();
        self.check_live(&st, element)?;
        let node = &st.nodes[element.0 as usize];
        let mut names: Vec<String> = node
            .attrs
            .keys()
            .map(|a| a.as_ax().to_string())
            .collect();
        if node.parent.is_some() {
            names.push(Attr::Parent.as_ax().to_string());
        }
        if !node.children.is_empty() {
            names.push(Attr::Children.as_ax().to_string());
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn parameterized_names(&self, element: &MockElement) -> AxResult<Vec<String>> {
        let st = self.state.lock();
        self.check_live(&st, element)?;
        let has_text = st.nodes[element.0 as usize]
            .attrs
            .get(&Attr::Value)
            .and_then(|v| v.as_str())
            .is_some();
        if has_text {
            Ok(vec![
                Query::LineForIndex.as_ax().to_string(),
                Query::RangeForLine.as_ax().to_string(),
                Query::StringForRange.as_ax().to_string(),
            ])
        } else {
            Ok(Vec::new())
        }
    }

    fn actions(&self, element: &MockElement) -> AxResult<Vec<ActionDescription>> {
        let st = self.state.lock();
        self.check_live(&st, element)?;
        Ok(st.nodes[element.0 as usize].actions.clone())
    }

    fn perform(&self, element: &MockElement, action: &str) -> AxResult<()> {
        let st = self.state.lock();
        self.check_live(&st, element)?;
        // Unknown actions degrade to a no-op per the propagation policy.
        let _ = action;
        Ok(())
    }

    fn set_global_timeout(&self, seconds: f32) -> AxResult<()> {
        self.state.lock().timeout_secs = Some(seconds);
        Ok(())
    }

    fn confirm_trusted(&self) -> bool {
        self.state.lock().trusted
    }

    fn observe(&self, element: &MockElement) -> AxResult<Observer<MockElement>> {
        let mut st = self.state.lock();
        self.check_live(&st, element)?;
        let (tx, rx) = unbounded();
        let id = st.next_observer_id;
        st.next_observer_id += 1;
        st.observers.push(MockObserver {
            id,
            subscriptions: HashSet::new(),
            tx,
        });
        let backend = MockObserverBackend {
            id,
            state: Arc::downgrade(&self.state),
        };
        Ok(Observer::new(Box::new(backend), rx))
    }

    fn attribute_by_name(
        &self,
        element: &MockElement,
        name: &str,
    ) -> AxResult<Option<AxValue<MockElement>>> {
        match Attr::from_ax(name) {
            Some(attr) => self.attribute(element, attr),
            None => Ok(None),
        }
    }
}

struct MockObserverBackend {
    id: u64,
    state: std::sync::Weak<Mutex<TreeState>>,
}

impl MockObserverBackend {
    fn with_observer(
        &self,
        f: impl FnOnce(&mut MockObserver) -> AxResult<()>,
    ) -> AxResult<()> {
        let Some(state) = self.state.upgrade() else {
            return Err(AxError::InvalidObserver);
        };
        let mut st = state.lock();
        let Some(obs) = st.observers.iter_mut().find(|o| o.id == self.id) else {
            return Err(AxError::InvalidObserver);
        };
        f(obs)
    }
}

impl ObserverBackend for MockObserverBackend {
    fn subscribe(&mut self, kind: EventKind) -> AxResult<()> {
        self.with_observer(|obs| {
            if !obs.subscriptions.insert(kind) {
                return Err(AxError::NotificationAlreadyRegistered);
            }
            Ok(())
        })
    }

    fn unsubscribe(&mut self, kind: EventKind) -> AxResult<()> {
        self.with_observer(|obs| {
            if !obs.subscriptions.remove(&kind) {
                return Err(AxError::NotificationNotRegistered);
            }
            Ok(())
        })
    }
}

impl Drop for MockObserverBackend {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().observers.retain(|o| o.id != self.id);
        }
    }
}
