//! Arena-backed DOM tree for one document

use crate::node::{ElementData, Node, NodeData, NodeId};

/// Arena of nodes. Slot 0 is always the document node; removed nodes stay
/// allocated (ids are never reused) but are flagged detached.
#[derive(Debug)]
pub struct DomTree {
    nodes: Vec<Node>,
}

impl DomTree {
    pub fn new(compat_mode: &str) -> Self {
        Self {
            nodes: vec![Node::new(NodeData::Document {
                compat_mode: compat_mode.to_string(),
            })],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id).and_then(|n| n.as_element())
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        self.get_mut(id).and_then(|n| n.as_element_mut())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)
            .map(|n| n.parent)
            .filter(|p| p.is_valid())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(data));
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element(ElementData::new(tag)))
    }

    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.alloc(NodeData::Text {
            content: content.to_string(),
        })
    }

    pub fn create_comment(&mut self, content: &str) -> NodeId {
        self.alloc(NodeData::Comment {
            content: content.to_string(),
        })
    }

    pub fn create_cdata(&mut self, content: &str) -> NodeId {
        self.alloc(NodeData::Cdata {
            content: content.to_string(),
        })
    }

    pub fn create_doctype(&mut self, name: &str, public_id: &str, system_id: &str) -> NodeId {
        self.alloc(NodeData::Doctype {
            name: name.to_string(),
            public_id: public_id.to_string(),
            system_id: system_id.to_string(),
        })
    }

    /// Append `child` as the last child of `parent`. Detaches from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        if let Some(p) = self.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.get_mut(child) {
            c.parent = parent;
            c.detached = false;
        }
    }

    /// Insert `child` into `parent` before `reference`. Appends when the
    /// reference is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        let idx = self
            .get(parent)
            .and_then(|p| p.children.iter().position(|&c| c == reference));
        if let Some(p) = self.get_mut(parent) {
            match idx {
                Some(i) => p.children.insert(i, child),
                None => p.children.push(child),
            }
        }
        if let Some(c) = self.get_mut(child) {
            c.parent = parent;
            c.detached = false;
        }
    }

    /// Remove `child` from its parent. The arena slot stays allocated.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|&c| c != child);
        }
        if let Some(c) = self.get_mut(child) {
            c.parent = NodeId::NONE;
            c.detached = true;
        }
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.parent(child) {
            if let Some(p) = self.get_mut(parent) {
                p.children.retain(|&c| c != child);
            }
        }
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == id)?;
        if pos > 0 {
            Some(siblings[pos - 1])
        } else {
            None
        }
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Depth-first walk over the subtree rooted at `start`, including
    /// attached shadow trees.
    pub fn descendants(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(el) = self.element(id) {
                if let Some(root) = el.shadow_root {
                    stack.push(root);
                }
            }
            for &child in self.children(id).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// All element ids currently attached under the document node.
    pub fn attached_elements(&self) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|&id| self.element(id).is_some())
            .collect()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    /// Index of `id` among siblings of the same tag, 1-based, the way
    /// `:nth-of-type` counts.
    pub fn same_tag_index(&self, id: NodeId) -> usize {
        let tag = match self.tag(id) {
            Some(t) => t.to_string(),
            None => return 1,
        };
        let parent = match self.parent(id) {
            Some(p) => p,
            None => return 1,
        };
        let mut nth = 0;
        for &sib in self.children(parent) {
            if self.tag(sib) == Some(tag.as_str()) {
                nth += 1;
            }
            if sib == id {
                break;
            }
        }
        nth.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_remove() {
        let mut tree = DomTree::new("CSS1Compat");
        let div = tree.create_element("DIV");
        tree.append_child(tree.root(), div);
        assert_eq!(tree.tag(div), Some("div"));
        assert_eq!(tree.parent(div), Some(tree.root()));

        tree.remove_child(tree.root(), div);
        assert!(tree.parent(div).is_none());
        assert!(tree.get(div).unwrap().detached);
        // Slot stays allocated
        assert!(tree.get(div).is_some());
    }

    #[test]
    fn insert_before_orders_children() {
        let mut tree = DomTree::new("CSS1Compat");
        let a = tree.create_element("a");
        let b = tree.create_element("b");
        let c = tree.create_element("c");
        tree.append_child(tree.root(), a);
        tree.append_child(tree.root(), c);
        tree.insert_before(tree.root(), b, c);
        let tags: Vec<_> = tree
            .children(tree.root())
            .iter()
            .map(|&id| tree.tag(id).unwrap().to_string())
            .collect();
        assert_eq!(tags, ["a", "b", "c"]);
        assert_eq!(tree.previous_sibling(b), Some(a));
        assert_eq!(tree.next_sibling(b), Some(c));
    }

    #[test]
    fn nth_of_type_counts_same_tag_only() {
        let mut tree = DomTree::new("CSS1Compat");
        let p1 = tree.create_element("p");
        let span = tree.create_element("span");
        let p2 = tree.create_element("p");
        tree.append_child(tree.root(), p1);
        tree.append_child(tree.root(), span);
        tree.append_child(tree.root(), p2);
        assert_eq!(tree.same_tag_index(p1), 1);
        assert_eq!(tree.same_tag_index(span), 1);
        assert_eq!(tree.same_tag_index(p2), 2);
    }
}
