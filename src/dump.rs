//! Recursive element dumps.
//!
//! Walks every readable attribute of an element (optionally recursing up
//! through parents and down through children) into a serializable property
//! tree, and writes it to a timestamped file. The walk yields between sibling
//! subtrees so a dump of a large application does not starve the worker.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tracing::warn;

use crate::error::AxResult;
use crate::gateway::{Attr, Gateway, GatewayExt};
use crate::value::AxValue;

/// One dumped element: its attributes, capabilities, and the recursed
/// neighborhood.
#[derive(Debug, Serialize)]
pub struct DumpNode {
    pub attributes: BTreeMap<String, DumpValue>,
    #[serde(rename = "parameterizedAttributes", skip_serializing_if = "Vec::is_empty")]
    pub parameterized_attributes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<DumpNode>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DumpNode>,
}

/// Primitive encoding of attribute values in a dump.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum DumpValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Dict(BTreeMap<String, DumpValue>),
    List(Vec<DumpValue>),
}

/// Placeholder for element references outside the recursed fields.
const ELEMENT_PLACEHOLDER: &str = "<element>";

fn encode<E>(value: &AxValue<E>) -> DumpValue {
    match value {
        AxValue::Bool(b) => DumpValue::Bool(*b),
        AxValue::Int(i) => DumpValue::Int(*i),
        AxValue::Float(f) => DumpValue::Float(*f),
        AxValue::Str(s) | AxValue::AttrStr(s) | AxValue::Url(s) => DumpValue::Str(s.clone()),
        AxValue::Range(r) => DumpValue::Dict(BTreeMap::from([
            ("start".to_string(), DumpValue::Int(r.start)),
            ("length".to_string(), DumpValue::Int(r.len)),
        ])),
        AxValue::Point(p) => DumpValue::Dict(BTreeMap::from([
            ("x".to_string(), DumpValue::Float(p.x)),
            ("y".to_string(), DumpValue::Float(p.y)),
        ])),
        AxValue::Size(s) => DumpValue::Dict(BTreeMap::from([
            ("width".to_string(), DumpValue::Float(s.width)),
            ("height".to_string(), DumpValue::Float(s.height)),
        ])),
        AxValue::Rect(r) => DumpValue::Dict(BTreeMap::from([
            ("x".to_string(), DumpValue::Float(r.x)),
            ("y".to_string(), DumpValue::Float(r.y)),
            ("width".to_string(), DumpValue::Float(r.width)),
            ("height".to_string(), DumpValue::Float(r.height)),
        ])),
        AxValue::Element(_) => DumpValue::Str(ELEMENT_PLACEHOLDER.to_string()),
        AxValue::Array(items) => DumpValue::List(items.iter().map(encode).collect()),
        AxValue::Dict(map) => DumpValue::Dict(
            map.iter().map(|(k, v)| (k.clone(), encode(v))).collect(),
        ),
        AxValue::Failure(description) => DumpValue::Str(format!("Error: {description}")),
        AxValue::Null => DumpValue::Str(String::new()),
    }
}

/// Dump one element. Element-valued attribute slots appear as opaque
/// placeholders; the recursed parent chain and child subtrees carry the
/// actual structure.
pub fn dump_node<G: Gateway>(
    gw: &G,
    element: &G::Element,
    recurse_parents: bool,
    recurse_children: bool,
) -> AxResult<DumpNode> {
    let mut attributes = BTreeMap::new();
    for name in gw.attribute_names(element)? {
        match gw.attribute_by_name(element, &name) {
            Ok(Some(value)) => {
                attributes.insert(name, encode(&value));
            }
            Ok(None) => {}
            Err(e) => {
                // Individual attributes may go stale mid-dump; record and go on.
                attributes.insert(name, DumpValue::Str(format!("Error: {e}")));
            }
        }
    }

    let parameterized_attributes = gw.parameterized_names(element)?;
    let actions = gw
        .actions(element)?
        .into_iter()
        .map(|a| a.id)
        .collect();

    let parent = if recurse_parents {
        match gw.element_attr(element, Attr::Parent)? {
            Some(p) => Some(Box::new(dump_node(gw, &p, true, false)?)),
            None => None,
        }
    } else {
        None
    };

    let mut children = Vec::new();
    if recurse_children {
        for child in gw.elements_attr(element, Attr::Children)? {
            match dump_node(gw, &child, false, true) {
                Ok(node) => children.push(node),
                Err(e) => warn!(error = %e, "skipping stale child during dump"),
            }
            // Keep the worker responsive under thousands of attributes.
            std::thread::yield_now();
        }
    }

    Ok(DumpNode {
        attributes,
        parameterized_attributes,
        actions,
        parent,
        children,
    })
}

/// Dump an element tree into `dir` as a timestamped, scope-named file.
pub fn dump_to_file<G: Gateway>(
    gw: &G,
    element: &G::Element,
    recurse_parents: bool,
    recurse_children: bool,
    dir: &Path,
    scope: &str,
) -> anyhow::Result<PathBuf> {
    let node = dump_node(gw, element, recurse_parents, recurse_children)
        .map_err(|e| anyhow::anyhow!("dump walk failed: {e}"))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating dump directory {}", dir.display()))?;
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let path = dir.join(format!("outloud-{scope}-{stamp}.json"));
    let file = File::create(&path)
        .with_context(|| format!("creating dump file {}", path.display()))?;
    serde_json::to_writer_pretty(file, &node).context("serializing dump")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockGateway;
    use crate::value::{Point, Rect, Size, TextRange};

    #[test]
    fn encodes_primitives_per_contract() {
        type V = AxValue<u32>;
        assert_eq!(encode(&V::Bool(true)), DumpValue::Bool(true));
        assert_eq!(encode(&V::Int(3)), DumpValue::Int(3));
        assert_eq!(
            encode(&V::Url("https://example.com".into())),
            DumpValue::Str("https://example.com".into())
        );
        assert_eq!(
            encode(&V::AttrStr("styled".into())),
            DumpValue::Str("styled".into())
        );
        assert_eq!(encode(&V::Element(9)), DumpValue::Str("<element>".into()));
        assert_eq!(
            encode(&V::Failure("bad slot".into())),
            DumpValue::Str("Error: bad slot".into())
        );

        let rect = encode(&V::Rect(Rect { x: 1.0, y: 2.0, width: 3.0, height: 4.0 }));
        let DumpValue::Dict(d) = rect else { panic!("rect must encode to a dict") };
        assert_eq!(d.len(), 4);
        assert_eq!(d["width"], DumpValue::Float(3.0));

        let point = encode(&V::Point(Point { x: 1.0, y: 2.0 }));
        let DumpValue::Dict(d) = point else { panic!("point must encode to a dict") };
        assert_eq!(d.len(), 2);

        let size = encode(&V::Size(Size { width: 5.0, height: 6.0 }));
        let DumpValue::Dict(d) = size else { panic!("size must encode to a dict") };
        assert_eq!(d.len(), 2);

        let range = encode(&V::Range(TextRange::new(2, 5)));
        let DumpValue::Dict(d) = range else { panic!("range must encode to a dict") };
        assert_eq!(d["start"], DumpValue::Int(2));
        assert_eq!(d["length"], DumpValue::Int(5));
    }

    #[test]
    fn dump_recurses_children_not_attribute_elements() {
        let gw = MockGateway::new();
        let app = gw.add_app(1, "App");
        let win = gw.add_child(&app, "AXWindow");
        gw.set_text(&win, Attr::Title, "W");
        let btn = gw.add_child(&win, "AXButton");
        gw.set_text(&btn, Attr::Title, "OK");
        gw.add_action(&btn, "AXPress", "press");

        let node = dump_node(&gw, &win, false, true).unwrap();
        assert_eq!(node.attributes["AXTitle"], DumpValue::Str("W".into()));
        assert_eq!(node.children.len(), 1);
        let child = &node.children[0];
        assert_eq!(child.attributes["AXTitle"], DumpValue::Str("OK".into()));
        assert_eq!(child.actions, vec!["AXPress"]);
        // The child's parent slot is a placeholder, not a nested dump.
        assert_eq!(
            child.attributes["AXParent"],
            DumpValue::Str("<element>".into())
        );
        assert!(child.parent.is_none());
    }

    #[test]
    fn dump_recurses_parent_chain_for_focus_scope() {
        let gw = MockGateway::new();
        let app = gw.add_app(1, "App");
        let win = gw.add_child(&app, "AXWindow");
        let group = gw.add_child(&win, "AXGroup");
        let btn = gw.add_child(&group, "AXButton");
        gw.set_text(&btn, Attr::Title, "OK");

        let node = dump_node(&gw, &btn, true, true).unwrap();
        let parent = node.parent.as_ref().expect("group parent");
        let grandparent = parent.parent.as_ref().expect("window parent");
        assert!(grandparent.parent.as_ref().is_some()); // application
        // Upward recursion does not re-expand children.
        assert!(parent.children.is_empty());
    }

    #[test]
    fn dump_to_file_writes_json() {
        let gw = MockGateway::new();
        let app = gw.add_app(1, "App");
        let win = gw.add_child(&app, "AXWindow");
        gw.set_text(&win, Attr::Title, "W");

        let dir = tempfile::tempdir().unwrap();
        let path = dump_to_file(&gw, &win, false, true, dir.path(), "application").unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("outloud-application-"));
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["attributes"]["AXTitle"], "W");
    }
}
