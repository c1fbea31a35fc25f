//! macOS gateway over the accessibility client API, via cidre.
//!
//! Observer callbacks arrive as C calls with a `refcon` pointer; a global
//! context registry maps stable IDs back to the channel each observer feeds,
//! so no Rust closure ever crosses the C boundary.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use cidre::{arc, ax, cf, ns};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{AxError, AxResult};
use crate::events::{AxEvent, EventKind};
use crate::gateway::{ActionDescription, Attr, Gateway, Observer, ObserverBackend, Query};
use crate::value::{AxValue, Point, Rect, Size, TextRange};

/// Handle onto one OS accessibility node. Clones share the retained
/// reference; equality and hash follow the node identity.
#[derive(Clone)]
pub struct AxElement(arc::R<ax::UiElement>);

// AXUIElement references are process-global tokens; all calls through them
// happen on the accessibility worker.
unsafe impl Send for AxElement {}
unsafe impl Sync for AxElement {}

impl PartialEq for AxElement {
    fn eq(&self, other: &Self) -> bool {
        self.0.equal(other.0.as_type_ref())
    }
}

impl Eq for AxElement {}

impl Hash for AxElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0.hash());
    }
}

impl fmt::Debug for AxElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AxElement({:p})", self.0.as_type_ref())
    }
}

fn map_err(err: ax::Error) -> AxError {
    match AxError::check(err as i32) {
        Ok(()) => AxError::SystemFailure,
        Err(e) => e,
    }
}

/// Convert one dynamically-typed OS value into the closed taxonomy.
fn convert(value: &cf::Type) -> AxValue<AxElement> {
    let type_id = value.get_type_id();

    if type_id == cf::Boolean::type_id() {
        let b: &cf::Boolean = unsafe { std::mem::transmute(value) };
        return AxValue::Bool(b.value());
    }
    if type_id == cf::Number::type_id() {
        let n: &cf::Number = unsafe { std::mem::transmute(value) };
        return if n.is_float_type() {
            AxValue::Float(n.to_f64().unwrap_or_default())
        } else {
            AxValue::Int(n.to_i64().unwrap_or_default())
        };
    }
    if type_id == cf::String::type_id() {
        let s: &cf::String = unsafe { std::mem::transmute(value) };
        return AxValue::Str(s.to_string());
    }
    if type_id == cf::AttrString::type_id() {
        let s: &cf::AttrString = unsafe { std::mem::transmute(value) };
        return AxValue::AttrStr(s.string().to_string());
    }
    if type_id == cf::Url::type_id() {
        let u: &cf::Url = unsafe { std::mem::transmute(value) };
        return AxValue::Url(u.abs_string().to_string());
    }
    if type_id == ax::UiElement::type_id() {
        let e: &ax::UiElement = unsafe { std::mem::transmute(value) };
        return AxValue::Element(AxElement(e.retained()));
    }
    if type_id == ax::Value::type_id() {
        let v: &ax::Value = unsafe { std::mem::transmute(value) };
        if let Some(range) = v.cf_range() {
            return AxValue::Range(TextRange::new(range.location as i64, range.length as i64));
        }
        if let Some(point) = v.cg_point() {
            return AxValue::Point(Point { x: point.x, y: point.y });
        }
        if let Some(size) = v.cg_size() {
            return AxValue::Size(Size { width: size.width, height: size.height });
        }
        if let Some(rect) = v.cg_rect() {
            return AxValue::Rect(Rect {
                x: rect.origin.x,
                y: rect.origin.y,
                width: rect.size.width,
                height: rect.size.height,
            });
        }
        return AxValue::Null;
    }
    if type_id == cf::Array::type_id() {
        let a: &cf::Array = unsafe { std::mem::transmute(value) };
        let mut items = Vec::with_capacity(a.len());
        for i in 0..a.len() {
            items.push(convert(&a[i]));
        }
        return AxValue::Array(items);
    }
    if type_id == cf::Dictionary::type_id() {
        let d: &cf::DictionaryOf<cf::String, cf::Type> = unsafe { std::mem::transmute(value) };
        let mut map = BTreeMap::new();
        d.iter(|key, val| {
            map.insert(key.to_string(), convert(val));
            true
        });
        return AxValue::Dict(map);
    }
    if type_id == cf::Error::type_id() {
        let e: &cf::Error = unsafe { std::mem::transmute(value) };
        return AxValue::Failure(e.desc().to_string());
    }
    if type_id == cf::Null::type_id() {
        return AxValue::Null;
    }
    warn!(type_id, "attribute value of unmapped type");
    AxValue::Null
}

/// Build the OS value for a write or a parameterized query input.
fn lower(value: &AxValue<AxElement>) -> Option<arc::R<cf::Type>> {
    Some(match value {
        AxValue::Bool(b) => cf::Boolean::from(*b).retained().into_type(),
        AxValue::Int(i) => cf::Number::from_i64(*i).into_type(),
        AxValue::Float(f) => cf::Number::from_f64(*f).into_type(),
        AxValue::Str(s) | AxValue::AttrStr(s) | AxValue::Url(s) => {
            cf::String::from_str(s).into_type()
        }
        AxValue::Range(r) => ax::Value::with_cf_range(cf::Range {
            location: r.start as isize,
            length: r.len as isize,
        })
        .into_type(),
        AxValue::Element(e) => e.0.retained().into_type(),
        _ => return None,
    })
}

pub struct MacGateway {
    system: AxElement,
}

impl Default for MacGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MacGateway {
    pub fn new() -> Self {
        Self {
            system: AxElement(ax::UiElement::sys_wide()),
        }
    }

    /// Wrap a raw element reference obtained outside the gateway (drag
    /// payloads, other frameworks).
    pub fn from_opaque(&self, element: arc::R<ax::UiElement>) -> AxElement {
        AxElement(element)
    }
}

impl Gateway for MacGateway {
    type Element = AxElement;

    fn system_wide(&self) -> AxElement {
        self.system.clone()
    }

    fn application(&self, pid: i32) -> AxElement {
        AxElement(ax::UiElement::with_app_pid(pid))
    }

    fn attribute(&self, element: &AxElement, attr: Attr) -> AxResult<Option<AxValue<AxElement>>> {
        self.attribute_by_name(element, attr.as_ax())
    }

    fn attribute_by_name(
        &self,
        element: &AxElement,
        name: &str,
    ) -> AxResult<Option<AxValue<AxElement>>> {
        let name = cf::String::from_str(name);
        match element.0.attr_value(&name) {
            Ok(value) => {
                let converted = convert(&value);
                Ok(if converted.is_null() { None } else { Some(converted) })
            }
            Err(err) => {
                let err = map_err(err);
                if err.degrades_to_null() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn set_attribute(
        &self,
        element: &AxElement,
        attr: Attr,
        value: AxValue<AxElement>,
    ) -> AxResult<()> {
        let Some(lowered) = lower(&value) else {
            return Ok(());
        };
        let name = cf::String::from_str(attr.as_ax());
        match element.0.set_attr_value(&name, &lowered) {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = map_err(err);
                if err.degrades_to_null() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    fn query(
        &self,
        element: &AxElement,
        query: Query,
        input: AxValue<AxElement>,
    ) -> AxResult<Option<AxValue<AxElement>>> {
        let Some(lowered) = lower(&input) else {
            return Ok(None);
        };
        let name = cf::String::from_str(query.as_ax());
        match element.0.parameterized_attr_value(&name, &lowered) {
            Ok(value) => {
                let converted = convert(&value);
                Ok(if converted.is_null() { None } else { Some(converted) })
            }
            Err(err) => {
                let err = map_err(err);
                if err.degrades_to_null() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn attribute_names(&self, element: &AxElement) -> AxResult<Vec<String>> {
        match element.0.attr_names() {
            Ok(names) => Ok((0..names.len()).map(|i| names[i].to_string()).collect()),
            Err(err) => {
                let err = map_err(err);
                if err.degrades_to_null() {
                    Ok(Vec::new())
                } else {
                    Err(err)
                }
            }
        }
    }

    fn parameterized_names(&self, element: &AxElement) -> AxResult<Vec<String>> {
        match element.0.parameterized_attr_names() {
            Ok(names) => Ok((0..names.len()).map(|i| names[i].to_string()).collect()),
            Err(err) => {
                let err = map_err(err);
                if err.degrades_to_null() {
                    Ok(Vec::new())
                } else {
                    Err(err)
                }
            }
        }
    }

    fn actions(&self, element: &AxElement) -> AxResult<Vec<ActionDescription>> {
        let names = match element.0.action_names() {
            Ok(names) => names,
            Err(err) => {
                let err = map_err(err);
                return if err.degrades_to_null() { Ok(Vec::new()) } else { Err(err) };
            }
        };
        let mut actions = Vec::with_capacity(names.len());
        for i in 0..names.len() {
            let id = names[i].to_string();
            let description = element
                .0
                .action_description(&names[i])
                .map(|d| d.to_string())
                .unwrap_or_default();
            actions.push(ActionDescription { id, description });
        }
        Ok(actions)
    }

    fn perform(&self, element: &AxElement, action: &str) -> AxResult<()> {
        let name = cf::String::from_str(action);
        match element.0.perform_action(&name) {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = map_err(err);
                if err.degrades_to_null() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    fn set_global_timeout(&self, seconds: f32) -> AxResult<()> {
        match self.system.0.set_messaging_timeout(seconds) {
            Ok(()) => Ok(()),
            Err(err) => Err(map_err(err)),
        }
    }

    fn confirm_trusted(&self) -> bool {
        ax::is_process_trusted_with_prompt(true)
    }

    fn observe(&self, element: &AxElement) -> AxResult<Observer<AxElement>> {
        let pid = element.0.pid().map_err(map_err)?;
        let (tx, rx) = unbounded();
        let context_id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        OBSERVER_SENDERS.lock().insert(context_id, tx);

        let observer = ax::Observer::with_pid_and_payload(pid, observer_callback)
            .map_err(|e| {
                OBSERVER_SENDERS.lock().remove(&context_id);
                map_err(e)
            })?;
        observer.run_loop_src().add_to_current(cf::RunLoopMode::default());

        Ok(Observer::new(
            Box::new(MacObserverBackend {
                observer,
                element: element.clone(),
                context_id,
                subscribed: HashSet::new(),
            }),
            rx,
        ))
    }
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Registry from refcon IDs to event channels; refcon pointers passed to the
/// OS carry only the ID, so a late callback after teardown is a no-op.
static OBSERVER_SENDERS: LazyLock<Mutex<HashMap<u64, Sender<AxEvent<AxElement>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

extern "C" fn observer_callback(
    _observer: &mut ax::Observer,
    element: &mut ax::UiElement,
    notification: &cf::String,
    info: Option<&cf::Dictionary>,
    refcon: *mut std::ffi::c_void,
) {
    let context_id = refcon as u64;
    let Some(kind) = EventKind::from_ax(&notification.to_string()) else {
        return;
    };
    let sender = {
        let senders = OBSERVER_SENDERS.lock();
        senders.get(&context_id).cloned()
    };
    let Some(sender) = sender else { return };

    let mut event = AxEvent::new(kind, AxElement(element.retained()));
    if let Some(info) = info {
        let dict: &cf::DictionaryOf<cf::String, cf::Type> =
            unsafe { std::mem::transmute(info) };
        let mut payload = BTreeMap::new();
        dict.iter(|key, val| {
            payload.insert(key.to_string(), convert(val));
            true
        });
        if !payload.is_empty() {
            event = event.with_payload(payload);
        }
    }
    let _ = sender.send(event);
    debug!(notification = %notification, "accessibility event");
}

struct MacObserverBackend {
    observer: arc::R<ax::Observer>,
    element: AxElement,
    context_id: u64,
    subscribed: HashSet<EventKind>,
}

unsafe impl Send for MacObserverBackend {}

impl ObserverBackend for MacObserverBackend {
    fn subscribe(&mut self, kind: EventKind) -> AxResult<()> {
        if self.subscribed.contains(&kind) {
            return Err(AxError::NotificationAlreadyRegistered);
        }
        let name = cf::String::from_str(kind.as_ax());
        self.observer
            .add_notification(&self.element.0, &name, self.context_id as *mut _)
            .map_err(map_err)?;
        self.subscribed.insert(kind);
        Ok(())
    }

    fn unsubscribe(&mut self, kind: EventKind) -> AxResult<()> {
        if !self.subscribed.remove(&kind) {
            return Err(AxError::NotificationNotRegistered);
        }
        let name = cf::String::from_str(kind.as_ax());
        self.observer
            .remove_notification(&self.element.0, &name)
            .map_err(map_err)
    }
}

impl Drop for MacObserverBackend {
    fn drop(&mut self) {
        for kind in self.subscribed.drain() {
            let name = cf::String::from_str(kind.as_ax());
            let _ = self.observer.remove_notification(&self.element.0, &name);
        }
        self.observer
            .run_loop_src()
            .remove_from_current(cf::RunLoopMode::default());
        // Dropping the sender finishes every consumer stream.
        OBSERVER_SENDERS.lock().remove(&self.context_id);
    }
}

/// Frontmost-application tracking via the shared workspace.
pub struct FrontmostWatcher;

impl Default for FrontmostWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FrontmostWatcher {
    pub fn new() -> Self {
        Self
    }

    /// PID of the currently active application, if any.
    pub fn current_pid(&self) -> Option<i32> {
        let workspace = ns::Workspace::shared();
        let apps = workspace.running_apps();
        apps.iter().find(|app| app.is_active()).map(|app| app.pid())
    }

    /// Poll for activation changes; the callback fires with each new
    /// frontmost PID.
    pub fn watch(&self, callback: impl Fn(i32) + Send + 'static) {
        let mut last = self.current_pid();
        std::thread::Builder::new()
            .name("frontmost-watch".into())
            .spawn(move || loop {
                std::thread::sleep(std::time::Duration::from_millis(200));
                let workspace = ns::Workspace::shared();
                let apps = workspace.running_apps();
                let current = apps.iter().find(|app| app.is_active()).map(|app| app.pid());
                if let Some(pid) = current {
                    if last != Some(pid) {
                        last = Some(pid);
                        callback(pid);
                    }
                }
            })
            .expect("spawning frontmost watcher");
    }
}
