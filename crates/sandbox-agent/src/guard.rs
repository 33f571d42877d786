//! Suspends the page's own hover-driven style changes while the inspector
//! hit-tests, and puts every touched inline style back afterwards.

use std::collections::HashMap;

use tracing::debug;

use crate::dom::{format_matrix, is_identity, Document, HoverEventKind, ListenerId, NodeId};

const INTERCEPTED: [HoverEventKind; 4] = [
    HoverEventKind::MouseOver,
    HoverEventKind::MouseOut,
    HoverEventKind::MouseEnter,
    HoverEventKind::MouseLeave,
];

/// Inline values as they were before freezing; `None` means "not set".
#[derive(Debug, Clone, PartialEq, Eq)]
struct FrozenStyle {
    transform: Option<String>,
    transition: Option<String>,
}

#[derive(Debug, Default)]
pub struct InspectorGuard {
    active: bool,
    snapshots: HashMap<NodeId, FrozenStyle>,
    interceptor: Option<ListenerId>,
    shielded: Option<(NodeId, Option<String>)>,
}

impl InspectorGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn frozen_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns `false` when already active.
    pub fn activate(&mut self, doc: &mut Document, decoration: Option<NodeId>) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        if let Some(node) = decoration {
            self.shield(doc, node);
        }

        for node in doc.elements() {
            let transform = doc.computed_transform(node);
            if is_identity(transform) {
                continue;
            }
            self.snapshots.insert(
                node,
                FrozenStyle {
                    transform: doc.style_property(node, "transform").map(str::to_string),
                    transition: doc.style_property(node, "transition").map(str::to_string),
                },
            );
            doc.set_style_property(node, "transform", format_matrix(transform));
            doc.set_style_property(node, "transition", "none");
        }
        doc.set_transitions_disabled(true);
        self.interceptor = Some(doc.add_capture_interceptor(&INTERCEPTED));
        debug!(target = "agent.guard", frozen = self.snapshots.len(), "inspector guard engaged");
        true
    }

    /// Returns `false` when already inactive.
    pub fn deactivate(&mut self, doc: &mut Document) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;

        let mut dropped = 0usize;
        for (node, frozen) in self.snapshots.drain() {
            if !doc.is_connected(node) {
                dropped += 1;
                continue;
            }
            doc.restore_style_property(node, "transform", frozen.transform.as_deref());
            doc.restore_style_property(node, "transition", frozen.transition.as_deref());
        }
        doc.set_transitions_disabled(false);
        if let Some(listener) = self.interceptor.take() {
            doc.remove_listener(listener);
        }
        self.unshield(doc);
        debug!(target = "agent.guard", dropped, "inspector guard released");
        true
    }

    /// Makes `node` transparent to hit-testing, remembering its previous
    /// inline `pointer-events`. Replaces any earlier shielded node.
    pub fn shield(&mut self, doc: &mut Document, node: NodeId) {
        if self.shielded.as_ref().is_some_and(|(shielded, _)| *shielded == node) {
            return;
        }
        self.unshield(doc);
        let previous = doc.style_property(node, "pointer-events").map(str::to_string);
        doc.set_style_property(node, "pointer-events", "none");
        self.shielded = Some((node, previous));
    }

    fn unshield(&mut self, doc: &mut Document) {
        if let Some((node, previous)) = self.shielded.take() {
            doc.restore_style_property(node, "pointer-events", previous.as_deref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::{Affine, Point, Rect, Size};

    fn styled_doc() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new(Size::new(400.0, 400.0));
        let body = doc.body();
        let moved = doc
            .append_element(body, "div")
            .id("moved")
            .style("transform", "translate(10px, 0)")
            .style("transition", "transform 0.3s ease")
            .layout(Rect::new(0.0, 0.0, 100.0, 100.0))
            .build();
        let sheet = doc
            .append_element(body, "div")
            .id("sheet")
            .sheet_transform(Affine::rotate(0.5))
            .layout(Rect::new(200.0, 0.0, 300.0, 100.0))
            .build();
        let plain = doc
            .append_element(body, "div")
            .id("plain")
            .style("transition", "opacity 1s")
            .layout(Rect::new(0.0, 200.0, 100.0, 300.0))
            .build();
        (doc, moved, sheet, plain)
    }

    fn inline_snapshot(doc: &Document) -> Vec<Option<crate::dom::InlineStyle>> {
        doc.elements()
            .into_iter()
            .map(|node| doc.inline_style(node).cloned())
            .collect()
    }

    #[test]
    fn activation_is_reversible_byte_for_byte() {
        let (mut doc, moved, sheet, plain) = styled_doc();
        let before = inline_snapshot(&doc);
        let mut guard = InspectorGuard::new();

        assert!(guard.activate(&mut doc, None));
        assert_eq!(guard.frozen_count(), 2);
        assert_eq!(doc.style_property(moved, "transform"), Some("matrix(1, 0, 0, 1, 10, 0)"));
        assert_eq!(doc.style_property(sheet, "transition"), Some("none"));
        assert_eq!(doc.style_property(plain, "transform"), None);
        assert_eq!(doc.computed_transition(plain), Some("none"));

        assert!(guard.deactivate(&mut doc));
        assert_eq!(inline_snapshot(&doc), before);
        assert_eq!(doc.computed_transition(plain), Some("opacity 1s"));
        assert_eq!(doc.interceptor_count(), 0);
    }

    #[test]
    fn activation_and_deactivation_are_idempotent() {
        let (mut doc, _, _, _) = styled_doc();
        let mut guard = InspectorGuard::new();
        assert!(!guard.deactivate(&mut doc));
        assert!(guard.activate(&mut doc, None));
        assert!(!guard.activate(&mut doc, None));
        assert_eq!(doc.interceptor_count(), 1);
        assert!(guard.deactivate(&mut doc));
        assert!(!guard.deactivate(&mut doc));
        assert!(!guard.is_active());
    }

    #[test]
    fn removed_nodes_are_skipped_on_restore() {
        let (mut doc, moved, sheet, _) = styled_doc();
        let mut guard = InspectorGuard::new();
        guard.activate(&mut doc, None);
        doc.remove(moved);
        guard.deactivate(&mut doc);
        assert_eq!(doc.style_property(moved, "transform"), Some("matrix(1, 0, 0, 1, 10, 0)"));
        assert_eq!(doc.style_property(sheet, "transform"), None);
        assert_eq!(guard.frozen_count(), 0);
    }

    #[test]
    fn decoration_is_shielded_then_restored() {
        let (mut doc, _, _, _) = styled_doc();
        let html = doc.document_element();
        let overlay = doc
            .append_element(html, "div")
            .attr("data-inspector-overlay", "")
            .layout(Rect::new(0.0, 0.0, 120.0, 120.0))
            .build();
        assert_eq!(doc.element_from_point(Point::new(50.0, 50.0)), Some(overlay));

        let mut guard = InspectorGuard::new();
        guard.activate(&mut doc, Some(overlay));
        assert_ne!(doc.element_from_point(Point::new(50.0, 50.0)), Some(overlay));
        guard.deactivate(&mut doc);
        assert_eq!(doc.style_property(overlay, "pointer-events"), None);
    }

    #[test]
    fn page_hover_script_is_suppressed_while_active() {
        let (mut doc, _, _, plain) = styled_doc();
        doc.add_hover_style(plain, "scale(1.2)");
        let mut guard = InspectorGuard::new();
        guard.activate(&mut doc, None);
        doc.pointer_move(Point::new(50.0, 250.0));
        assert_eq!(doc.style_property(plain, "transform"), None);
        guard.deactivate(&mut doc);
        doc.pointer_move(Point::new(350.0, 350.0));
        doc.pointer_move(Point::new(50.0, 250.0));
        assert_eq!(doc.style_property(plain, "transform"), Some("scale(1.2)"));
    }
}
