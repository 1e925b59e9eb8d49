//! Interactivity classification and the known-interactive registry
//!
//! The registry is the Rust seam for the patched `addEventListener`: the
//! page reports listener registrations as notices, and elements whose
//! listener type is in the interactive set join a monotonic set. Elements
//! never leave it; interactivity is a deliberate over-approximation for
//! the lifetime of the recording.

use pagetape_dom::{DocId, NodeData, NodeRef, Page};
use std::collections::HashSet;

/// Event types whose listeners make an element interactive.
pub const INTERACTIVE_EVENTS: &[&str] = &[
    "click",
    "dblclick",
    "contextmenu",
    "mousedown",
    "mouseup",
    "mouseenter",
    "mouseleave",
    "keydown",
    "keyup",
    "keypress",
    "input",
    "change",
    "submit",
    "pointerdown",
    "pointerup",
    "touchstart",
    "touchmove",
    "touchend",
    "touchcancel",
    "focus",
    "blur",
    "dragstart",
    "drop",
];

/// Tags that are interactive by nature.
const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "label", "details", "summary", "dialog",
    "video", "audio",
];

/// ARIA roles that imply interactivity.
const INTERACTIVE_ROLES: &[&str] = &["button", "link", "checkbox", "switch", "menuitem"];

/// Append-only set of elements observed to register interactive listeners.
#[derive(Debug, Default)]
pub struct InteractiveRegistry {
    known: HashSet<NodeRef>,
}

impl InteractiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry from inline `on*` handler attributes, the scan
    /// run at recording start and again at DOMContentLoaded.
    pub fn scan_inline_handlers(&mut self, page: &Page, doc: DocId) {
        for node in page.elements_with_inline_handlers(doc) {
            self.known.insert(node);
        }
    }

    /// A listener was registered. Only interactive event types count.
    pub fn on_listener_added(&mut self, target: NodeRef, event_type: &str) {
        if INTERACTIVE_EVENTS.contains(&event_type) {
            self.known.insert(target);
        }
    }

    pub fn is_known(&self, node: NodeRef) -> bool {
        self.known.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Full classification: static signals or an observed listener.
    /// Text nodes inherit their parent element's classification.
    pub fn is_interactive(&self, page: &Page, node: NodeRef) -> bool {
        let element = match page.node(node).map(|n| &n.data) {
            Some(NodeData::Element(_)) => node,
            Some(NodeData::Text { .. }) => match page.parent(node) {
                Some(parent) => parent,
                None => return false,
            },
            _ => return false,
        };

        if self.known.contains(&element) {
            return true;
        }
        is_statically_interactive(page, element)
    }
}

fn is_statically_interactive(page: &Page, node: NodeRef) -> bool {
    let el = match page.element(node) {
        Some(el) => el,
        None => return false,
    };

    if INTERACTIVE_TAGS.contains(&el.tag.as_str()) {
        // Disabled buttons opt out
        if el.tag == "button" && el.disabled {
            return false;
        }
        // Anchors need an href to be interactive
        if el.tag == "a" && el.attr("href").is_none() {
            return false;
        }
        return true;
    }

    if let Some(tabindex) = el.attr("tabindex") {
        if tabindex.parse::<i32>().map(|t| t != -1).unwrap_or(false) {
            return true;
        }
    }

    if let Some(role) = el.attr("role") {
        if INTERACTIVE_ROLES.contains(&role) {
            return true;
        }
    }

    false
}
