//! `querySelector` over the arena document.
//!
//! Selector syntax is parsed by `selectors` with scraper's plain selector
//! implementation (no hover or other state pseudo-classes), and matched
//! against the arena through [`ElementRef`].

use std::fmt;

use scraper::error::SelectorErrorKind;
use scraper::selector::{CssLocalName, CssString, NonTSPseudoClass, Parser, PseudoElement, Simple};
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::bloom::BloomFilter;
use selectors::matching::{
    self, ElementSelectorFlags, MatchingContext, MatchingForInvalidation, MatchingMode,
    NeedsSelectorFlags, QuirksMode, SelectorCaches,
};
use selectors::parser::{ParseRelative, SelectorImpl};
use selectors::{Element, OpaqueElement};
use thiserror::Error;

use super::{Document, NodeId, NodeKind};

type NamespaceUrl = <Simple as SelectorImpl>::NamespaceUrl;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid selector {selector:?}: {reason}")]
pub struct QueryError {
    pub selector: String,
    pub reason: String,
}

/// A parsed, comma-separated selector group.
#[derive(Debug, Clone)]
pub struct SelectorList(selectors::SelectorList<Simple>);

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let mut parser_input = cssparser::ParserInput::new(input);
        let mut parser = cssparser::Parser::new(&mut parser_input);
        selectors::SelectorList::<Simple>::parse(&Parser, &mut parser, ParseRelative::No)
            .map(SelectorList)
            .map_err(|err| QueryError {
                selector: input.to_string(),
                reason: SelectorErrorKind::from(err).to_string(),
            })
    }

    /// Connected elements matching the group, in document order.
    pub fn select(&self, doc: &Document) -> Vec<NodeId> {
        let mut caches = SelectorCaches::default();
        let mut context = MatchingContext::new(
            MatchingMode::Normal,
            None,
            &mut caches,
            QuirksMode::NoQuirks,
            NeedsSelectorFlags::No,
            MatchingForInvalidation::No,
        );
        doc.elements()
            .into_iter()
            .filter(|node| {
                let element = ElementRef { doc, node: *node };
                matching::matches_selector_list(&self.0, &element, &mut context)
            })
            .collect()
    }
}

/// Borrowed view of one element, as the selector matcher walks the tree.
#[derive(Clone, Copy)]
pub struct ElementRef<'a> {
    doc: &'a Document,
    node: NodeId,
}

impl fmt::Debug for ElementRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRef")
            .field("node", &self.node)
            .field("tag", &self.doc.tag(self.node))
            .finish()
    }
}

impl<'a> ElementRef<'a> {
    fn at(&self, node: NodeId) -> Self {
        ElementRef { doc: self.doc, node }
    }

    fn tag(&self) -> &'a str {
        self.doc.tag(self.node).unwrap_or_default()
    }

    /// Element siblings of this node, itself included, in order.
    fn element_siblings(&self) -> Vec<NodeId> {
        match self.doc.parent(self.node) {
            Some(parent) => self.doc.element_children(parent).collect(),
            None => vec![self.node],
        }
    }

    fn sibling(&self, offset: isize) -> Option<Self> {
        let siblings = self.element_siblings();
        let index = siblings.iter().position(|id| *id == self.node)?;
        let target = index.checked_add_signed(offset)?;
        siblings.get(target).map(|id| self.at(*id))
    }
}

impl Element for ElementRef<'_> {
    type Impl = Simple;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(&self.doc.nodes[self.node.0])
    }

    fn parent_element(&self) -> Option<Self> {
        self.doc.parent_element(self.node).map(|parent| self.at(parent))
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        self.sibling(-1)
    }

    fn next_sibling_element(&self) -> Option<Self> {
        self.sibling(1)
    }

    fn first_element_child(&self) -> Option<Self> {
        self.doc.element_children(self.node).next().map(|child| self.at(child))
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, local_name: &CssLocalName) -> bool {
        self.tag() == &*local_name.0
    }

    fn has_namespace(&self, ns: &<Simple as SelectorImpl>::BorrowedNamespaceUrl) -> bool {
        ns.is_empty() || &**ns == "http://www.w3.org/1999/xhtml"
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.tag() == other.tag()
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&NamespaceUrl>,
        local_name: &CssLocalName,
        operation: &AttrSelectorOperation<&CssString>,
    ) -> bool {
        if matches!(ns, NamespaceConstraint::Specific(url) if !url.is_empty()) {
            return false;
        }
        self.doc
            .attr(self.node, &local_name.0)
            .is_some_and(|value| operation.eval_str(value))
    }

    fn match_non_ts_pseudo_class(
        &self,
        _pc: &NonTSPseudoClass,
        _context: &mut MatchingContext<'_, Simple>,
    ) -> bool {
        false
    }

    fn match_pseudo_element(
        &self,
        _pe: &PseudoElement,
        _context: &mut MatchingContext<'_, Simple>,
    ) -> bool {
        false
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        false
    }

    fn is_html_slot_element(&self) -> bool {
        false
    }

    fn has_id(&self, id: &CssLocalName, case_sensitivity: CaseSensitivity) -> bool {
        self.doc
            .id(self.node)
            .is_some_and(|value| case_sensitivity.eq(id.0.as_bytes(), value.as_bytes()))
    }

    fn has_class(&self, name: &CssLocalName, case_sensitivity: CaseSensitivity) -> bool {
        self.doc
            .classes(self.node)
            .any(|class| case_sensitivity.eq(name.0.as_bytes(), class.as_bytes()))
    }

    fn has_custom_state(&self, _name: &CssLocalName) -> bool {
        false
    }

    fn imported_part(&self, _name: &CssLocalName) -> Option<CssLocalName> {
        None
    }

    fn is_part(&self, _name: &CssLocalName) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        !self.doc.children(self.node).iter().any(|child| {
            match &self.doc.nodes[child.0].kind {
                NodeKind::Element(_) => true,
                NodeKind::Text(text) => !text.is_empty(),
                NodeKind::Document => false,
            }
        })
    }

    fn is_root(&self) -> bool {
        self.doc.parent(self.node) == Some(self.doc.root())
    }

    fn add_element_unique_hashes(&self, _filter: &mut BloomFilter) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Size;

    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new(Size::new(800.0, 600.0));
        let body = doc.body();
        let first = doc.append_element(body, "div").class("box card").build();
        doc.append_element(body, "div")
            .class("box")
            .attr("data-gsap-id", "hero")
            .build();
        let list = doc.append_element(body, "ul").build();
        let item = doc.append_element(list, "li").id("item one").build();
        (doc, first, list, item)
    }

    #[test]
    fn matches_compound_parts() {
        let (doc, first, _, _) = sample();
        assert_eq!(doc.query_selector_all("div.box.card").unwrap(), vec![first]);
        assert_eq!(doc.query_selector_all("body > div:nth-of-type(1)").unwrap(), vec![first]);
        assert_eq!(doc.query_selector_all(".box").unwrap().len(), 2);
        assert_eq!(doc.query_selector_all("div:first-child").unwrap(), vec![first]);
        assert_eq!(doc.query_selector_all("html:root > body").unwrap(), vec![doc.body()]);
    }

    #[test]
    fn attribute_selectors_with_quotes() {
        let (doc, _, _, _) = sample();
        let hits = doc.query_selector_all(r#"[data-gsap-id="hero"]"#).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(doc.query_selector_all("[data-gsap-id='hero']").unwrap(), hits);
        assert_eq!(doc.query_selector_all("[data-gsap-id]").unwrap(), hits);
        assert!(doc.query_selector_all(r#"[data-gsap-id="villain"]"#).unwrap().is_empty());
    }

    #[test]
    fn combinators_and_lists() {
        let (doc, first, list, item) = sample();
        assert_eq!(doc.query_selector_all("body li").unwrap(), vec![item]);
        assert!(doc.query_selector_all("body > li").unwrap().is_empty());
        assert_eq!(doc.query_selector_all("ul, div.card").unwrap(), vec![first, list]);
        assert_eq!(doc.query_selector_all("div + div").unwrap().len(), 1);
    }

    #[test]
    fn nth_formulas_count_element_siblings() {
        let (doc, first, list, _) = sample();
        assert_eq!(doc.query_selector_all("body > :nth-child(2n+1)").unwrap(), vec![first, list]);
        assert_eq!(doc.query_selector_all("body > div:last-of-type").unwrap().len(), 1);
    }

    #[test]
    fn escaped_identifiers_resolve() {
        let (doc, _, _, item) = sample();
        assert_eq!(doc.query_selector_all(r"#item\ one").unwrap(), vec![item]);
        assert_eq!(doc.query_selector_all(r"#\69 tem\ one").unwrap(), vec![item]);
    }

    #[test]
    fn detached_subtrees_never_match() {
        let (mut doc, _, list, item) = sample();
        doc.remove(list);
        assert!(doc.query_selector_all("li").unwrap().is_empty());
        assert_eq!(doc.id(item), Some("item one"));
    }

    #[test]
    fn rejects_unsupported_syntax() {
        let (doc, _, _, _) = sample();
        let err = doc.query_selector_all("div:hover").unwrap_err();
        assert_eq!(err.selector, "div:hover");
        assert!(doc.query_selector_all("div >").is_err());
        assert!(doc.query_selector_all("").is_err());
        assert!(doc.query_selector_all("div,,p").is_err());
    }
}
