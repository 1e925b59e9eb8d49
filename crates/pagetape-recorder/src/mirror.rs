//! Mirror - the bidirectional map between live nodes and stable ids

use crate::event::SerializedNode;
use pagetape_dom::{NodeRef, Page};
use std::collections::HashMap;

/// Id returned for nodes the mirror has never seen.
pub const UNKNOWN_NODE: i64 = -1;
/// Id reserved for detached nodes.
pub const DETACHED_NODE: i64 = 0;
/// Id assigned to nodes whose subtree is ignored outright.
pub const IGNORED_NODE: i64 = -2;

/// Live node <-> serialized id map. Ids are positive, monotonically
/// increasing, and never reused within one recording.
#[derive(Debug, Default)]
pub struct Mirror {
    next_id: i64,
    id_to_node: HashMap<i64, NodeRef>,
    node_to_id: HashMap<NodeRef, i64>,
    /// The node -> serialized side. Survives `remove_node_from_map` so
    /// equality checks across transient detaches stay stable; only
    /// `reset` purges it.
    meta: HashMap<NodeRef, SerializedNode>,
    /// Subtree roots the serializer decided to ignore.
    ignored: std::collections::HashSet<NodeRef>,
}

impl Mirror {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            id_to_node: HashMap::new(),
            node_to_id: HashMap::new(),
            meta: HashMap::new(),
            ignored: std::collections::HashSet::new(),
        }
    }

    /// Allocate the next id. Ids start at 1; 0 stays reserved.
    pub fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add(&mut self, node: NodeRef, serialized: SerializedNode) {
        let id = serialized.id;
        self.id_to_node.insert(id, node);
        self.node_to_id.insert(node, id);
        self.meta.insert(node, serialized);
    }

    /// Point an existing id at a different live node.
    pub fn replace(&mut self, id: i64, node: NodeRef) {
        if let Some(old) = self.id_to_node.insert(id, node) {
            self.node_to_id.remove(&old);
        }
        self.node_to_id.insert(node, id);
    }

    pub fn get_id(&self, node: Option<NodeRef>) -> i64 {
        match node {
            None => UNKNOWN_NODE,
            Some(n) if self.ignored.contains(&n) => IGNORED_NODE,
            Some(n) => self.node_to_id.get(&n).copied().unwrap_or(UNKNOWN_NODE),
        }
    }

    pub fn mark_ignored(&mut self, node: NodeRef) {
        self.ignored.insert(node);
    }

    pub fn is_ignored(&self, node: NodeRef) -> bool {
        self.ignored.contains(&node)
    }

    pub fn get_node(&self, id: i64) -> Option<NodeRef> {
        self.id_to_node.get(&id).copied()
    }

    pub fn get_meta(&self, node: NodeRef) -> Option<&SerializedNode> {
        self.meta.get(&node)
    }

    pub fn has(&self, id: i64) -> bool {
        self.id_to_node.contains_key(&id)
    }

    pub fn has_node(&self, node: NodeRef) -> bool {
        self.node_to_id.contains_key(&node)
    }

    /// Drop a node and its descendants from the id maps. The serialized
    /// side is intentionally left in place.
    pub fn remove_node_from_map(&mut self, node: NodeRef, page: &Page) {
        for desc in page.descendants(node) {
            if let Some(id) = self.node_to_id.remove(&desc) {
                self.id_to_node.remove(&id);
            }
        }
    }

    pub fn reset(&mut self) {
        self.next_id = 0;
        self.id_to_node.clear();
        self.node_to_id.clear();
        self.meta.clear();
        self.ignored.clear();
    }

    pub fn len(&self) -> usize {
        self.id_to_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_node.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SerializedNode;
    use pagetape_dom::Page;

    fn setup() -> (Page, NodeRef, NodeRef) {
        let mut page = Page::new("https://example.com/");
        let main = page.main();
        let body = page.doc(main).body();
        let div = page.create_element(main, "div");
        let text = page.create_text(main, "hi");
        page.append_child(body, div);
        page.append_child(div, text);
        (page, div, text)
    }

    #[test]
    fn ids_are_stable_and_unique() {
        let (_, div, text) = setup();
        let mut mirror = Mirror::new();
        let a = mirror.next_id();
        let b = mirror.next_id();
        assert!(a > 0 && b > a);
        mirror.add(div, SerializedNode::element(a, "div"));
        mirror.add(text, SerializedNode::text(b, "hi"));
        assert_eq!(mirror.get_id(Some(div)), a);
        assert_eq!(mirror.get_id(Some(text)), b);
        assert_eq!(mirror.get_id(None), UNKNOWN_NODE);
    }

    #[test]
    fn remove_keeps_serialized_side() {
        let (page, div, text) = setup();
        let mut mirror = Mirror::new();
        let id = mirror.next_id();
        mirror.add(div, SerializedNode::element(id, "div"));
        let tid = mirror.next_id();
        mirror.add(text, SerializedNode::text(tid, "hi"));

        mirror.remove_node_from_map(div, &page);
        assert_eq!(mirror.get_id(Some(div)), UNKNOWN_NODE);
        // The child was removed recursively too
        assert_eq!(mirror.get_id(Some(text)), UNKNOWN_NODE);
        // Serialized meta survives until reset
        assert!(mirror.get_meta(div).is_some());
        assert!(mirror.get_meta(text).is_some());

        mirror.reset();
        assert!(mirror.get_meta(div).is_none());
        assert!(mirror.is_empty());
    }

    #[test]
    fn replace_rebinds_id() {
        let (page, div, text) = setup();
        let _ = page;
        let mut mirror = Mirror::new();
        let id = mirror.next_id();
        mirror.add(div, SerializedNode::element(id, "div"));
        mirror.replace(id, text);
        assert_eq!(mirror.get_node(id), Some(text));
        assert_eq!(mirror.get_id(Some(div)), UNKNOWN_NODE);
        assert_eq!(mirror.get_id(Some(text)), id);
    }
}
