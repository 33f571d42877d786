//! Arena document model for the sandboxed surface.
//!
//! Nodes are never freed: removing a node only disconnects it, so a
//! `NodeId` held elsewhere stays valid and can be checked with
//! [`Document::is_connected`]. Geometry is in document pixels with the
//! viewport's top-left at the origin.

mod query;
mod transform;

use kurbo::{Affine, Point, Rect, Size};

pub use query::{QueryError, SelectorList};
pub use transform::{format_matrix, is_identity, parse_transform, TransformParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoverEventKind {
    MouseOver,
    MouseOut,
    MouseEnter,
    MouseLeave,
}

/// Inline `style` declarations in source order. Values are kept verbatim so a
/// saved value can be written back byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    pub fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value.as_str())
    }

    pub fn set(&mut self, property: &str, value: impl Into<String>) {
        let value = value.into();
        match self.declarations.iter_mut().find(|(name, _)| name == property) {
            Some((_, slot)) => *slot = value,
            None => self.declarations.push((property.to_string(), value)),
        }
    }

    pub fn remove(&mut self, property: &str) -> Option<String> {
        let index = self.declarations.iter().position(|(name, _)| name == property)?;
        Some(self.declarations.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.declarations
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
    style: InlineStyle,
    layout: Rect,
    sheet_transform: Option<Affine>,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// Page script that rewrites an element's inline transform while the pointer
/// is over it or one of its descendants.
#[derive(Debug, Clone)]
struct HoverStyle {
    node: NodeId,
    transform: String,
    /// Inline transform before the hover applied; `Some` while applied.
    saved: Option<Option<String>>,
}

#[derive(Debug, Clone)]
struct CaptureInterceptor {
    id: ListenerId,
    kinds: Vec<HoverEventKind>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    html: NodeId,
    head: NodeId,
    body: NodeId,
    viewport: Size,
    transitions_disabled: bool,
    hover_styles: Vec<HoverStyle>,
    interceptors: Vec<CaptureInterceptor>,
    next_listener: u64,
    hovered: Option<NodeId>,
}

impl Document {
    /// Creates `html > (head, body)` with the body filling the viewport.
    pub fn new(viewport: Size) -> Self {
        let root = NodeId(0);
        let mut doc = Document {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root,
            html: root,
            head: root,
            body: root,
            viewport,
            transitions_disabled: false,
            hover_styles: Vec::new(),
            interceptors: Vec::new(),
            next_listener: 0,
            hovered: None,
        };
        let bounds = Rect::from_origin_size(Point::ZERO, viewport);
        doc.html = doc.append_element(root, "html").layout(bounds).build();
        doc.head = doc.append_element(doc.html, "head").build();
        doc.body = doc.append_element(doc.html, "body").layout(bounds).build();
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn document_element(&self) -> NodeId {
        self.html
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            style: InlineStyle::default(),
            layout: Rect::ZERO,
            sheet_transform: None,
        }))
    }

    /// Creates an element, appends it to `parent` and returns a builder for it.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> ElementBuilder<'_> {
        let node = self.create_element(tag);
        self.append_child(parent, node);
        ElementBuilder { doc: self, node }
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let node = self.push_node(NodeKind::Text(text.into()));
        self.append_child(parent, node);
        node
    }

    /// Moves `child` under `parent`, detaching it from any previous parent.
    /// Text nodes cannot take children, and a node cannot move under its own
    /// subtree; such calls are ignored.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if matches!(self.nodes[parent.0].kind, NodeKind::Text(_))
            || self.is_inclusive_ancestor(child, Some(parent))
        {
            return;
        }
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Disconnects `node` (and its subtree) from the document.
    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
        if self.hovered.is_some_and(|hovered| !self.is_connected(hovered)) {
            self.hovered = None;
        }
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root {
                return true;
            }
            current = self.nodes[id.0].parent;
        }
        false
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes.get(node.0).map(|n| &n.kind), Some(NodeKind::Element(_)))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|parent| self.is_element(*parent))
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn element_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Connected elements in document (pre-)order.
    pub fn elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            if self.is_element(node) {
                out.push(node);
            }
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    fn element(&self, node: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(node.0)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(node.0)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|el| el.tag.as_str())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?
            .attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if let Some(el) = self.element_mut(node) {
            match el.attrs.iter_mut().find(|(key, _)| *key == name) {
                Some((_, slot)) => *slot = value,
                None => el.attrs.push((name, value)),
            }
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> Option<String> {
        let el = self.element_mut(node)?;
        let index = el.attrs.iter().position(|(key, _)| key == name)?;
        Some(el.attrs.remove(index).1)
    }

    pub fn id(&self, node: NodeId) -> Option<&str> {
        self.attr(node, "id")
    }

    pub fn classes(&self, node: NodeId) -> impl Iterator<Item = &str> {
        self.attr(node, "class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.classes(node).any(|c| c == class)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if !self.is_element(node) || self.has_class(node, class) {
            return;
        }
        let mut value = self.attr(node, "class").unwrap_or("").trim().to_string();
        if !value.is_empty() {
            value.push(' ');
        }
        value.push_str(class);
        self.set_attr(node, "class", value);
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        if !self.has_class(node, class) {
            return;
        }
        let remaining: Vec<&str> = self.classes(node).filter(|c| *c != class).collect();
        let remaining = remaining.join(" ");
        if remaining.is_empty() {
            self.remove_attr(node, "class");
        } else {
            self.set_attr(node, "class", remaining);
        }
    }

    pub fn inline_style(&self, node: NodeId) -> Option<&InlineStyle> {
        self.element(node).map(|el| &el.style)
    }

    pub fn style_property(&self, node: NodeId, property: &str) -> Option<&str> {
        self.element(node)?.style.get(property)
    }

    pub fn set_style_property(&mut self, node: NodeId, property: &str, value: impl Into<String>) {
        if let Some(el) = self.element_mut(node) {
            el.style.set(property, value);
        }
    }

    pub fn remove_style_property(&mut self, node: NodeId, property: &str) -> Option<String> {
        self.element_mut(node)?.style.remove(property)
    }

    /// Writes `value` back, or removes the declaration when `value` is `None`.
    pub fn restore_style_property(&mut self, node: NodeId, property: &str, value: Option<&str>) {
        match value {
            Some(value) => self.set_style_property(node, property, value),
            None => {
                self.remove_style_property(node, property);
            }
        }
    }

    pub fn layout_rect(&self, node: NodeId) -> Rect {
        self.element(node).map(|el| el.layout).unwrap_or(Rect::ZERO)
    }

    pub fn set_layout_rect(&mut self, node: NodeId, rect: Rect) {
        if let Some(el) = self.element_mut(node) {
            el.layout = rect;
        }
    }

    /// Transform contributed by style sheets, used when no valid inline
    /// transform is present.
    pub fn set_sheet_transform(&mut self, node: NodeId, transform: Option<Affine>) {
        if let Some(el) = self.element_mut(node) {
            el.sheet_transform = transform;
        }
    }

    pub fn computed_transform(&self, node: NodeId) -> Affine {
        let Some(el) = self.element(node) else {
            return Affine::IDENTITY;
        };
        el.style
            .get("transform")
            .and_then(|value| parse_transform(value).ok())
            .or(el.sheet_transform)
            .unwrap_or(Affine::IDENTITY)
    }

    pub fn computed_transition(&self, node: NodeId) -> Option<&str> {
        if self.transitions_disabled {
            return Some("none");
        }
        self.style_property(node, "transition")
    }

    pub fn transitions_disabled(&self) -> bool {
        self.transitions_disabled
    }

    /// Document-wide `transition: none` override.
    pub fn set_transitions_disabled(&mut self, disabled: bool) {
        self.transitions_disabled = disabled;
    }

    /// Element box → viewport, composing every ancestor's transform about the
    /// centre of its own box.
    pub fn element_to_viewport(&self, node: NodeId) -> Affine {
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            if self.is_element(id) {
                chain.push(id);
            }
            current = self.parent(id);
        }
        chain.iter().rev().fold(Affine::IDENTITY, |acc, id| {
            let transform = self.computed_transform(*id);
            if is_identity(transform) {
                return acc;
            }
            let centre = self.layout_rect(*id).center().to_vec2();
            acc * Affine::translate(centre) * transform * Affine::translate(-centre)
        })
    }

    pub fn bounding_client_rect(&self, node: NodeId) -> Rect {
        self.element_to_viewport(node)
            .transform_rect_bbox(self.layout_rect(node))
    }

    fn pointer_events_disabled(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if let Some(value) = self.style_property(id, "pointer-events") {
                return value.trim() == "none";
            }
            current = self.parent_element(id);
        }
        false
    }

    fn hits(&self, node: NodeId, point: Point) -> bool {
        let rect = self.layout_rect(node);
        if rect.area() <= 0.0 {
            return false;
        }
        let affine = self.element_to_viewport(node);
        if affine.determinant().abs() < f64::EPSILON {
            return false;
        }
        rect.contains(affine.inverse() * point)
    }

    /// Topmost element at `point`, later elements in document order painting
    /// over earlier ones. `None` outside the viewport.
    pub fn element_from_point(&self, point: Point) -> Option<NodeId> {
        let viewport = Rect::from_origin_size(Point::ZERO, self.viewport);
        if !point.is_finite() || !viewport.contains(point) {
            return None;
        }
        self.elements()
            .into_iter()
            .rev()
            .find(|node| !self.pointer_events_disabled(*node) && self.hits(*node, point))
    }

    pub fn query_selector_all(&self, selectors: &str) -> Result<Vec<NodeId>, QueryError> {
        Ok(SelectorList::parse(selectors)?.select(self))
    }

    pub fn query_selector(&self, selectors: &str) -> Result<Option<NodeId>, QueryError> {
        Ok(self.query_selector_all(selectors)?.into_iter().next())
    }

    /// Registers page script that sets `transform` inline while `node` is hovered.
    pub fn add_hover_style(&mut self, node: NodeId, transform: impl Into<String>) {
        self.hover_styles.push(HoverStyle {
            node,
            transform: transform.into(),
            saved: None,
        });
    }

    /// Installs a capture-phase listener that stops propagation of `kinds`
    /// before any page handler sees them.
    pub fn add_capture_interceptor(&mut self, kinds: &[HoverEventKind]) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.interceptors.push(CaptureInterceptor {
            id,
            kinds: kinds.to_vec(),
        });
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.interceptors.len();
        self.interceptors.retain(|listener| listener.id != id);
        self.interceptors.len() != before
    }

    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }

    pub fn hovered(&self) -> Option<NodeId> {
        self.hovered
    }

    /// Moves the page's own pointer to `point`, firing `mouseout` on the
    /// element it leaves and `mouseover` on the one it enters.
    pub fn pointer_move(&mut self, point: Point) -> Option<NodeId> {
        let target = self.element_from_point(point);
        if target == self.hovered {
            return target;
        }
        let previous = self.hovered;
        self.hovered = target;
        if let Some(old) = previous {
            self.dispatch_hover(HoverEventKind::MouseOut, old, target);
        }
        if let Some(new) = target {
            self.dispatch_hover(HoverEventKind::MouseOver, new, previous);
        }
        target
    }

    fn intercepted(&self, kind: HoverEventKind) -> bool {
        self.interceptors
            .iter()
            .any(|listener| listener.kinds.contains(&kind))
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: Option<NodeId>) -> bool {
        let mut current = node;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    fn dispatch_hover(&mut self, kind: HoverEventKind, target: NodeId, related: Option<NodeId>) {
        if self.intercepted(kind) {
            return;
        }
        let mut styles = std::mem::take(&mut self.hover_styles);
        for style in &mut styles {
            let on_target = self.is_inclusive_ancestor(style.node, Some(target));
            let on_related = self.is_inclusive_ancestor(style.node, related);
            match kind {
                HoverEventKind::MouseOver | HoverEventKind::MouseEnter => {
                    if on_target && style.saved.is_none() {
                        let previous = self.style_property(style.node, "transform").map(str::to_string);
                        style.saved = Some(previous);
                        self.set_style_property(style.node, "transform", style.transform.clone());
                    }
                }
                HoverEventKind::MouseOut | HoverEventKind::MouseLeave => {
                    if on_target && !on_related {
                        if let Some(previous) = style.saved.take() {
                            self.restore_style_property(style.node, "transform", previous.as_deref());
                        }
                    }
                }
            }
        }
        self.hover_styles = styles;
    }
}

pub struct ElementBuilder<'a> {
    doc: &'a mut Document,
    node: NodeId,
}

impl ElementBuilder<'_> {
    pub fn id(self, id: &str) -> Self {
        self.doc.set_attr(self.node, "id", id);
        self
    }

    pub fn class(self, class: &str) -> Self {
        self.doc.set_attr(self.node, "class", class);
        self
    }

    pub fn attr(self, name: &str, value: &str) -> Self {
        self.doc.set_attr(self.node, name, value);
        self
    }

    pub fn style(self, property: &str, value: &str) -> Self {
        self.doc.set_style_property(self.node, property, value);
        self
    }

    pub fn layout(self, rect: Rect) -> Self {
        self.doc.set_layout_rect(self.node, rect);
        self
    }

    pub fn sheet_transform(self, transform: Affine) -> Self {
        self.doc.set_sheet_transform(self.node, Some(transform));
        self
    }

    pub fn text(self, text: &str) -> Self {
        self.doc.append_text(self.node, text);
        self
    }

    pub fn build(self) -> NodeId {
        self.node
    }
}
