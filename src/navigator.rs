//! The accessibility tree navigator and focus tracker.
//!
//! Maintains the focus entity (element plus reader strategy), implements the
//! focus-movement operations over the interestingness-filtered tree, and
//! consumes accessibility events for the focused element. All methods run on
//! the accessibility worker thread, so navigator actions are serialized and
//! gateway round-trips never stall the main loop.

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::dump;
use crate::error::{AxError, AxResult};
use crate::events::{AxEvent, EventKind};
use crate::gateway::{Attr, Gateway, GatewayExt, Observer};
use crate::input::KeyState;
use crate::reader::{selection_delta, value_delta, Reader};
use crate::speech::Scheduler;
use crate::tokens::OutputToken;
use crate::value::{AxValue, TextRange};

/// An element with the navigation behavior layered on: parent/sibling/child
/// moves filtered through interestingness, keyboard-focus propagation, and
/// focus-group membership.
pub struct Entity<'g, G: Gateway> {
    gw: &'g G,
    pub element: G::Element,
}

impl<'g, G: Gateway> Entity<'g, G> {
    pub fn new(gw: &'g G, element: G::Element) -> Self {
        Self { gw, element }
    }

    /// The interestingness predicate: keyboard-focused, titled, described, or
    /// of an interesting role; inside a web area only leaf roles qualify.
    pub fn is_interesting(&self) -> AxResult<bool> {
        is_interesting(self.gw, &self.element)
    }

    /// First interesting ancestor, stopping short of roots.
    pub fn parent(&self) -> AxResult<Option<G::Element>> {
        let mut current = self.element.clone();
        loop {
            let Some(parent) = self.gw.element_attr(&current, Attr::Parent)? else {
                return Ok(None);
            };
            if self.gw.role(&parent)?.is_root() {
                return Ok(None);
            }
            if is_interesting(self.gw, &parent)? {
                return Ok(Some(parent));
            }
            current = parent;
        }
    }

    /// First interesting descendant in navigation order (reversed when
    /// `backwards`); skips uninteresting leaves, recurses through containers.
    pub fn first_child(&self, backwards: bool) -> AxResult<Option<G::Element>> {
        first_interesting_child(self.gw, &self.element, backwards)
    }

    /// Next interesting element among the siblings in the chosen direction,
    /// descending into containers and bubbling up through uninteresting,
    /// non-root ancestors when the siblings are exhausted.
    pub fn next_sibling(&self, backwards: bool) -> AxResult<Option<G::Element>> {
        next_interesting_sibling(self.gw, &self.element, backwards)
    }

    /// Best-effort keyboard-focus propagation: set `focused`, and when it
    /// does not take effect, set it on the focusable ancestor instead.
    pub fn set_keyboard_focus(&self) {
        let Ok(role) = self.gw.role(&self.element) else { return };
        if !role.takes_keyboard_focus() {
            return;
        }
        let _ = self
            .gw
            .set_attribute(&self.element, Attr::Focused, AxValue::Bool(true));
        if self.gw.bool_attr(&self.element, Attr::Focused).unwrap_or(false) {
            return;
        }
        if let Ok(Some(ancestor)) = self.gw.element_attr(&self.element, Attr::FocusableAncestor) {
            let _ = self
                .gw
                .set_attribute(&ancestor, Attr::Focused, AxValue::Bool(true));
        }
    }

    /// Whether this element and `other` share a focusable ancestor. The
    /// grouping is an opaque predicate supplied by the gateway; elements
    /// without a focusable ancestor are never grouped.
    pub fn is_in_focus_group(&self, other: &G::Element) -> AxResult<bool> {
        let mine = self.gw.element_attr(&self.element, Attr::FocusableAncestor)?;
        let theirs = self.gw.element_attr(other, Attr::FocusableAncestor)?;
        Ok(matches!((mine, theirs), (Some(a), Some(b)) if a == b))
    }

    /// Title of the window containing this element.
    pub fn window_title(&self) -> AxResult<Option<String>> {
        match self.gw.element_attr(&self.element, Attr::Window)? {
            Some(window) => self.gw.text_attr(&window, Attr::Title),
            None => Ok(None),
        }
    }
}

fn is_interesting<G: Gateway>(gw: &G, element: &G::Element) -> AxResult<bool> {
    let qualifies = gw.bool_attr(element, Attr::Focused)?
        || gw.text_attr(element, Attr::Title)?.is_some()
        || gw.text_attr(element, Attr::Description)?.is_some()
        || gw.role(element)?.is_interesting();
    if !qualifies {
        return Ok(false);
    }
    if has_web_area_ancestor(gw, element)? {
        Ok(gw.role(element)?.is_leaf())
    } else {
        Ok(true)
    }
}

fn has_web_area_ancestor<G: Gateway>(gw: &G, element: &G::Element) -> AxResult<bool> {
    let mut current = element.clone();
    loop {
        let Some(parent) = gw.element_attr(&current, Attr::Parent)? else {
            return Ok(false);
        };
        let role = gw.role(&parent)?;
        if role == crate::role::Role::WebArea {
            return Ok(true);
        }
        if role.is_root() {
            return Ok(false);
        }
        current = parent;
    }
}

fn first_interesting_child<G: Gateway>(
    gw: &G,
    element: &G::Element,
    backwards: bool,
) -> AxResult<Option<G::Element>> {
    let mut children = gw.ordered_children(element)?;
    if backwards {
        children.reverse();
    }
    for child in children {
        if is_interesting(gw, &child)? {
            return Ok(Some(child));
        }
        if gw.role(&child)?.is_leaf() {
            continue;
        }
        if let Some(found) = first_interesting_child(gw, &child, backwards)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

fn next_interesting_sibling<G: Gateway>(
    gw: &G,
    element: &G::Element,
    backwards: bool,
) -> AxResult<Option<G::Element>> {
    let Some(parent) = gw.element_attr(element, Attr::Parent)? else {
        return Ok(None);
    };
    let mut siblings = gw.ordered_children(&parent)?;
    if backwards {
        siblings.reverse();
    }
    let Some(position) = siblings.iter().position(|s| s == element) else {
        return Ok(None);
    };
    for candidate in &siblings[position + 1..] {
        if is_interesting(gw, candidate)? {
            return Ok(Some(candidate.clone()));
        }
        if gw.role(candidate)?.is_leaf() {
            continue;
        }
        if let Some(found) = first_interesting_child(gw, candidate, backwards)? {
            return Ok(Some(found));
        }
    }
    // Siblings exhausted: bubble up unless the parent is where navigation
    // stops anyway.
    let parent_role = gw.role(&parent)?;
    if parent_role.is_root() || is_interesting(gw, &parent)? {
        return Ok(None);
    }
    next_interesting_sibling(gw, &parent, backwards)
}

#[derive(Debug, Clone, Copy)]
enum MoveOp {
    Parent,
    FirstChild,
    NextSibling { backwards: bool },
}

/// The current focus: element, reader strategy, and the caches the
/// incremental deltas diff against.
struct Focus<G: Gateway> {
    element: G::Element,
    reader: Reader,
    last_selection: Option<TextRange>,
    last_value: Option<String>,
    last_title: Option<String>,
}

struct AppTarget<G: Gateway> {
    element: G::Element,
    pid: i32,
    observer: Observer<G::Element>,
}

pub struct Navigator<G: Gateway> {
    gw: Arc<G>,
    scheduler: Scheduler,
    keys: Arc<dyn KeyState>,
    system: G::Element,
    app: Option<AppTarget<G>>,
    focus: Option<Focus<G>>,
    /// Waiting for element-created to seed a focus.
    awaiting_created: bool,
    dump_dir: PathBuf,
}

impl<G: Gateway> Navigator<G> {
    pub fn new(
        gw: Arc<G>,
        scheduler: Scheduler,
        keys: Arc<dyn KeyState>,
        dump_dir: PathBuf,
    ) -> Self {
        let system = gw.system_wide();
        Self {
            gw,
            scheduler,
            keys,
            system,
            app: None,
            focus: None,
            awaiting_created: false,
            dump_dir,
        }
    }

    pub fn focused_element(&self) -> Option<G::Element> {
        self.focus.as_ref().map(|f| f.element.clone())
    }

    pub fn current_pid(&self) -> Option<i32> {
        self.app.as_ref().map(|a| a.pid)
    }

    /// Event stream of the current observer; replaced on every retarget.
    pub fn event_stream(&self) -> Option<Receiver<AxEvent<G::Element>>> {
        self.app.as_ref().map(|a| a.observer.events())
    }

    // -----------------------------------------------------------------
    // Retargeting
    // -----------------------------------------------------------------

    /// Point the navigator at the frontmost application: replace the app
    /// element and observer, resolve a seed focus, and read it.
    pub fn refocus(&mut self, pid: i32) {
        if let Err(e) = self.refocus_inner(pid) {
            match e {
                AxError::Timeout => self.scheduler.convey(&[OutputToken::Timeout]),
                AxError::ApiDisabled => self.scheduler.convey(&[OutputToken::ApiDisabled]),
                AxError::NotImplemented => {
                    self.scheduler.convey(&[OutputToken::NotAccessible])
                }
                other => warn!(?other, pid, "retarget failed"),
            }
        }
    }

    fn refocus_inner(&mut self, pid: i32) -> AxResult<()> {
        debug!(pid, "retargeting");
        let app = self.gw.application(pid);
        let mut observer = self.gw.observe(&app)?;
        for kind in [
            EventKind::AnnouncementRequested,
            EventKind::ElementDestroyed,
            EventKind::FocusedElementChanged,
            EventKind::TitleChanged,
            EventKind::ValueChanged,
            EventKind::SelectedTextChanged,
        ] {
            let _ = observer.subscribe(kind);
        }

        let mut tokens = Vec::new();
        let app_changed = self.current_pid() != Some(pid);
        if app_changed {
            if let Some(name) = self.gw.text_attr(&app, Attr::Title)? {
                tokens.push(OutputToken::Application(name));
            }
        }

        // Seed: the reported focused element, else the focused window's
        // first interesting descendant.
        let mut seed = self.gw.element_attr(&app, Attr::FocusedElement)?;
        if seed.is_none() {
            if let Some(window) = self.gw.element_attr(&app, Attr::FocusedWindow)? {
                seed = first_interesting_child(&*self.gw, &window, false)?;
            }
        }

        match seed {
            Some(element) => {
                self.awaiting_created = false;
                let entity = Entity::new(&*self.gw, element.clone());
                if let Some(title) = entity.window_title()? {
                    tokens.push(OutputToken::Window(title));
                }
                self.app = Some(AppTarget { element: app, pid, observer });
                self.set_focus(element.clone())?;
                let reader = self.focus.as_ref().expect("focus just set").reader.clone();
                tokens.extend(reader.read(&*self.gw, &element)?);
                self.scheduler.convey(&tokens);
            }
            None => {
                tokens.push(OutputToken::NoFocus);
                // A freshly appearing element may seed focus later.
                let _ = observer.subscribe(EventKind::ElementCreated);
                self.awaiting_created = true;
                self.app = Some(AppTarget { element: app, pid, observer });
                self.focus = None;
                self.scheduler.convey(&tokens);
            }
        }
        Ok(())
    }

    fn set_focus(&mut self, element: G::Element) -> AxResult<()> {
        let role = self.gw.role(&element)?;
        let reader = Reader::for_role(&role);
        let last_selection = self
            .gw
            .attribute(&element, Attr::SelectedTextRange)?
            .and_then(|v| v.as_range());
        let last_value = self.gw.string_attr(&element, Attr::Value)?;
        let last_title = self.gw.text_attr(&element, Attr::Title)?;
        self.focus = Some(Focus {
            element,
            reader,
            last_selection,
            last_value,
            last_title,
        });
        Ok(())
    }

    // -----------------------------------------------------------------
    // Public actions
    // -----------------------------------------------------------------

    pub fn read_focus(&mut self) {
        let Some(focus) = &self.focus else {
            self.scheduler.convey(&[OutputToken::NoFocus]);
            return;
        };
        let element = focus.element.clone();
        let reader = focus.reader.clone();
        match reader.read(&*self.gw, &element) {
            Ok(tokens) => self.scheduler.convey(&tokens),
            Err(e) => self.report_error(e),
        }
    }

    pub fn focus_parent(&mut self) {
        self.do_move(OutputToken::Exiting, MoveOp::Parent);
    }

    pub fn focus_first_child(&mut self) {
        self.do_move(OutputToken::Entering, MoveOp::FirstChild);
    }

    pub fn focus_next_sibling(&mut self, backwards: bool) {
        let lead = if backwards {
            OutputToken::Previous
        } else {
            OutputToken::Next
        };
        self.do_move(lead, MoveOp::NextSibling { backwards });
    }

    fn do_move(&mut self, lead: OutputToken, op: MoveOp) {
        let Some(focus) = &self.focus else {
            self.scheduler.convey(&[OutputToken::NoFocus]);
            return;
        };
        let current = focus.element.clone();
        let entity = Entity::new(&*self.gw, current);
        let moved = match op {
            MoveOp::Parent => entity.parent(),
            MoveOp::FirstChild => entity.first_child(false),
            MoveOp::NextSibling { backwards } => entity.next_sibling(backwards),
        };
        match moved {
            Ok(Some(target)) => {
                if let Err(e) = self.set_focus(target.clone()) {
                    return self.report_error(e);
                }
                Entity::new(&*self.gw, target.clone()).set_keyboard_focus();
                let reader = self.focus.as_ref().expect("focus just set").reader.clone();
                match reader.read(&*self.gw, &target) {
                    Ok(read) => {
                        let mut tokens = vec![lead];
                        tokens.extend(read);
                        self.scheduler.convey(&tokens);
                    }
                    Err(e) => self.report_error(e),
                }
            }
            Ok(None) => self.reread_at_boundary(),
            Err(e) => self.report_error(e),
        }
    }

    /// The move failed: boundary marker, then the current entity again.
    fn reread_at_boundary(&mut self) {
        let Some(focus) = &self.focus else { return };
        let element = focus.element.clone();
        let reader = focus.reader.clone();
        match reader.read(&*self.gw, &element) {
            Ok(read) => {
                let mut tokens = vec![OutputToken::Boundary];
                tokens.extend(read);
                self.scheduler.convey(&tokens);
            }
            Err(e) => self.report_error(e),
        }
    }

    fn report_error(&mut self, error: AxError) {
        match error {
            AxError::InvalidElement => {
                // The element vanished under us; rebuild from the same app.
                self.focus = None;
                if let Some(pid) = self.current_pid() {
                    self.refocus(pid);
                }
            }
            AxError::ApiDisabled => self.scheduler.convey(&[OutputToken::ApiDisabled]),
            AxError::NotImplemented => self.scheduler.convey(&[OutputToken::NotAccessible]),
            AxError::Timeout => self.scheduler.convey(&[OutputToken::Timeout]),
            other => warn!(?other, "unexpected gateway error"),
        }
    }

    // -----------------------------------------------------------------
    // Dumps
    // -----------------------------------------------------------------

    pub fn dump_system_wide(&self) {
        let element = self.system.clone();
        self.write_dump("system", &element, false, true);
    }

    pub fn dump_application(&self) {
        let Some(app) = &self.app else { return };
        let element = app.element.clone();
        self.write_dump("application", &element, false, true);
    }

    pub fn dump_focus(&self) {
        let Some(focus) = &self.focus else { return };
        let element = focus.element.clone();
        self.write_dump("focus", &element, true, true);
    }

    fn write_dump(&self, scope: &str, element: &G::Element, parents: bool, children: bool) {
        match dump::dump_to_file(&*self.gw, element, parents, children, &self.dump_dir, scope) {
            Ok(path) => info!(path = %path.display(), scope, "element dump written"),
            Err(e) => warn!(scope, error = %e, "element dump failed"),
        }
    }

    // -----------------------------------------------------------------
    // Accessibility events
    // -----------------------------------------------------------------

    pub fn handle_event(&mut self, event: AxEvent<G::Element>) {
        match event.kind {
            EventKind::AnnouncementRequested => {
                if let Some(text) = event.announcement() {
                    self.scheduler.announce(text);
                }
            }
            EventKind::ElementDestroyed => self.on_destroyed(event.element),
            EventKind::FocusedElementChanged => self.on_focus_changed(event.element),
            EventKind::ElementCreated => {
                if self.awaiting_created {
                    if let Some(pid) = self.current_pid() {
                        self.refocus(pid);
                    }
                }
            }
            EventKind::TitleChanged => self.on_title_changed(event.element),
            EventKind::ValueChanged => self.on_value_changed(event.element),
            EventKind::SelectedTextChanged => self.on_selection_changed(event.element),
            _ => {}
        }
    }

    fn on_destroyed(&mut self, subject: G::Element) {
        let Some(focus) = &self.focus else { return };
        if focus.element != subject {
            return;
        }
        // A surviving focusable ancestor keeps the focus alive.
        let ancestor = self
            .gw
            .element_attr(&subject, Attr::FocusableAncestor)
            .ok()
            .flatten();
        if let Some(ancestor) = ancestor {
            if self.gw.attribute(&ancestor, Attr::Role).is_ok() {
                return;
            }
        }
        self.focus = None;
        if let Some(pid) = self.current_pid() {
            self.refocus(pid);
        }
    }

    fn on_focus_changed(&mut self, subject: G::Element) {
        if let Some(focus) = &self.focus {
            if focus.element == subject {
                return;
            }
            let entity = Entity::new(&*self.gw, focus.element.clone());
            if entity.is_in_focus_group(&subject).unwrap_or(false) {
                return;
            }
        }
        if let Err(e) = self.set_focus(subject.clone()) {
            return self.report_error(e);
        }
        self.read_focus();
    }

    fn on_title_changed(&mut self, subject: G::Element) {
        let Some(focus) = &mut self.focus else { return };
        if focus.element != subject {
            return;
        }
        let element = focus.element.clone();
        let new_title = match self.gw.text_attr(&element, Attr::Title) {
            Ok(t) => t,
            Err(e) => return self.report_error(e),
        };
        let focus = self.focus.as_mut().expect("checked above");
        if new_title == focus.last_title {
            return;
        }
        focus.last_title = new_title.clone();
        if let Some(title) = new_title {
            self.scheduler.convey(&[OutputToken::UpdatedLabel(title)]);
        }
    }

    fn on_value_changed(&mut self, subject: G::Element) {
        let Some(focus) = &self.focus else { return };
        if focus.element != subject {
            return;
        }
        let element = focus.element.clone();
        let value = match self.gw.attribute(&element, Attr::Value) {
            Ok(v) => v,
            Err(e) => return self.report_error(e),
        };
        let tokens = match value {
            Some(AxValue::Str(new)) | Some(AxValue::AttrStr(new)) => {
                let focus = self.focus.as_mut().expect("checked above");
                let old = focus.last_value.take().unwrap_or_default();
                focus.last_value = Some(new.clone());
                value_delta(&old, &new)
            }
            Some(AxValue::Bool(b)) => vec![OutputToken::BoolValue(b)],
            Some(AxValue::Int(i)) => vec![OutputToken::IntValue(i)],
            Some(AxValue::Float(f)) => vec![OutputToken::FloatValue(f)],
            _ => Vec::new(),
        };
        if !tokens.is_empty() {
            self.scheduler.convey(&tokens);
        }
    }

    fn on_selection_changed(&mut self, subject: G::Element) {
        let Some(focus) = &self.focus else { return };
        if focus.element != subject {
            return;
        }
        let element = focus.element.clone();
        let new = match self.gw.attribute(&element, Attr::SelectedTextRange) {
            Ok(v) => v.and_then(|v| v.as_range()),
            Err(e) => return self.report_error(e),
        };
        let Some(new) = new else { return };
        let focus = self.focus.as_mut().expect("checked above");
        let old = focus.last_selection.unwrap_or(new);
        focus.last_selection = Some(new);
        match selection_delta(&*self.gw, &element, old, new, &*self.keys) {
            Ok(tokens) => {
                if !tokens.is_empty() {
                    self.scheduler.convey(&tokens);
                }
            }
            Err(e) => self.report_error(e),
        }
    }
}
