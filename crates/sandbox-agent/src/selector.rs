//! Stable selector synthesis: a durable string address for a live node.
//!
//! Priority, first match wins: a reserved identity attribute, a unique `id`,
//! then a positional path from `body`. The result is recomputed on demand and
//! never cached across document reloads.

use crate::dom::{Document, NodeId};

/// Identity attributes checked in order. Both survive tag and class churn.
pub const IDENTITY_ATTRIBUTES: [&str; 2] = ["data-gsap-id", "data-testid"];

const PATH_SEPARATOR: &str = " > ";

/// Returns `None` for nodes that are not connected elements.
pub fn stable_selector(doc: &Document, node: NodeId) -> Option<String> {
    if !doc.is_element(node) || !doc.is_connected(node) {
        return None;
    }
    identity_selector(doc, node)
        .or_else(|| unique_id_selector(doc, node))
        .or_else(|| Some(positional_path(doc, node)))
}

fn identity_selector(doc: &Document, node: NodeId) -> Option<String> {
    IDENTITY_ATTRIBUTES.iter().find_map(|name| {
        doc.attr(node, name)
            .map(|value| format!("[{name}={}]", quoted(value)))
    })
}

fn unique_id_selector(doc: &Document, node: NodeId) -> Option<String> {
    let id = doc.id(node).filter(|id| !id.is_empty())?;
    let selector = format!("#{}", escape_identifier(id));
    match doc.query_selector_all(&selector) {
        Ok(hits) if hits.as_slice() == [node] => Some(selector),
        _ => None,
    }
}

fn positional_path(doc: &Document, node: NodeId) -> String {
    let body = doc.body();
    let mut segments = Vec::new();
    let mut current = Some(node);
    while let Some(id) = current {
        if id == body {
            segments.push("body".to_string());
            break;
        }
        segments.push(path_segment(doc, id));
        current = doc.parent_element(id);
    }
    segments.reverse();
    segments.join(PATH_SEPARATOR)
}

/// `tag` when no sibling shares the tag, else `tag:nth-of-type(n)`.
fn path_segment(doc: &Document, node: NodeId) -> String {
    let tag = doc.tag(node).unwrap_or("*");
    let Some(parent) = doc.parent(node) else {
        return tag.to_string();
    };
    let same_tag: Vec<NodeId> = doc
        .element_children(parent)
        .filter(|sibling| doc.tag(*sibling) == Some(tag))
        .collect();
    if same_tag.len() <= 1 {
        return tag.to_string();
    }
    let index = same_tag
        .iter()
        .position(|sibling| *sibling == node)
        .map(|position| position + 1)
        .unwrap_or(1);
    format!("{tag}:nth-of-type({index})")
}

/// Escapes an identifier the way `CSS.escape` does.
pub fn escape_identifier(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let _ = cssparser::serialize_identifier(value, &mut out);
    out
}

/// Double-quoted CSS string with quotes and backslashes escaped.
fn quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    let _ = cssparser::serialize_string(value, &mut out);
    out
}
