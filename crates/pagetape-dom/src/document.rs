//! Document - one frame's tree plus frame-level state

use crate::node::{DocId, NodeId, NodeRef};
use crate::stylesheet::SheetId;
use crate::tree::DomTree;

/// A registered `@font-face`.
#[derive(Debug, Clone, PartialEq)]
pub struct FontFace {
    pub family: String,
    pub src: String,
    pub descriptors: Vec<(String, String)>,
}

/// Load progress of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

/// One document in the page's frame forest.
#[derive(Debug)]
pub struct Document {
    pub id: DocId,
    pub url: String,
    pub tree: DomTree,
    pub width: u32,
    pub height: u32,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub adopted_sheets: Vec<SheetId>,
    pub fonts: Vec<FontFace>,
    pub custom_elements: Vec<String>,
    pub ready_state: ReadyState,
    html: NodeId,
    head: NodeId,
    body: NodeId,
}

impl Document {
    /// New document with the usual html/head/body skeleton.
    pub fn new(id: DocId, url: &str) -> Self {
        let mut tree = DomTree::new("CSS1Compat");
        let html = tree.create_element("html");
        let head = tree.create_element("head");
        let body = tree.create_element("body");
        tree.append_child(tree.root(), html);
        tree.append_child(html, head);
        tree.append_child(html, body);

        Self {
            id,
            url: url.to_string(),
            tree,
            width: 1280,
            height: 720,
            scroll_x: 0.0,
            scroll_y: 0.0,
            adopted_sheets: Vec::new(),
            fonts: Vec::new(),
            custom_elements: Vec::new(),
            ready_state: ReadyState::Complete,
            html,
            head,
            body,
        }
    }

    pub fn root(&self) -> NodeRef {
        NodeRef::new(self.id, self.tree.root())
    }

    pub fn document_element(&self) -> NodeRef {
        NodeRef::new(self.id, self.html)
    }

    pub fn head(&self) -> NodeRef {
        NodeRef::new(self.id, self.head)
    }

    pub fn body(&self) -> NodeRef {
        NodeRef::new(self.id, self.body)
    }

    pub fn compat_mode(&self) -> &str {
        match self.tree.get(self.tree.root()).map(|n| &n.data) {
            Some(crate::node::NodeData::Document { compat_mode }) => compat_mode,
            _ => "CSS1Compat",
        }
    }
}
