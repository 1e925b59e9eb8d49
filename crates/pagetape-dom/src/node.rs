//! Node storage: ids, data variants, element state

use crate::geometry::Rect;
use crate::stylesheet::SheetId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index of a node inside one document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_valid(&self) -> bool {
        *self != NodeId::NONE
    }
}

/// Index of a document inside the page's document forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(pub u32);

/// Page-wide node address: document plus arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub doc: DocId,
    pub node: NodeId,
}

impl NodeRef {
    pub fn new(doc: DocId, node: NodeId) -> Self {
        Self { doc, node }
    }
}

/// One arena slot.
#[derive(Debug, Clone)]
pub struct Node {
    pub parent: NodeId,
    pub children: Vec<NodeId>,
    pub data: NodeData,
    /// Set once the node has been detached from the tree.
    pub detached: bool,
}

impl Node {
    pub fn new(data: NodeData) -> Self {
        Self {
            parent: NodeId::NONE,
            children: Vec::new(),
            data,
            detached: false,
        }
    }

    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text { content } | NodeData::Comment { content } | NodeData::Cdata { content } => {
                Some(content)
            }
            _ => None,
        }
    }
}

/// Node payload variants, mirroring the DOM node types a serializer cares
/// about.
#[derive(Debug, Clone)]
pub enum NodeData {
    Document {
        compat_mode: String,
    },
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
    Element(ElementData),
    Text {
        content: String,
    },
    Comment {
        content: String,
    },
    Cdata {
        content: String,
    },
}

/// Computed style subset consulted by visibility classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
        }
    }
}

impl ComputedStyle {
    pub fn is_visible(&self) -> bool {
        self.display != "none" && self.visibility != "hidden" && self.opacity > 0.0
    }
}

/// Playback state of a media element.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaState {
    pub paused: bool,
    pub current_time: f64,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: f64,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            paused: true,
            current_time: 0.0,
            volume: 1.0,
            muted: false,
            playback_rate: 1.0,
        }
    }
}

/// Which rendering context a canvas element opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasContextKind {
    TwoD,
    WebGl,
    WebGl2,
}

/// One captured draw call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasCommand {
    pub property: String,
    pub args: Vec<serde_json::Value>,
}

/// Accumulated canvas activity.
#[derive(Debug, Clone)]
pub struct CanvasState {
    pub context: CanvasContextKind,
    pub commands: Vec<CanvasCommand>,
    /// Data URL the host rendered for snapshot capture, if any.
    pub data_url: Option<String>,
}

impl CanvasState {
    pub fn new(context: CanvasContextKind) -> Self {
        Self {
            context,
            commands: Vec::new(),
            data_url: None,
        }
    }

    /// A canvas with no draw calls and no bitmap is blank.
    pub fn is_blank(&self) -> bool {
        self.commands.is_empty() && self.data_url.is_none()
    }
}

/// Element state: markup-level plus the live bits (layout, style, form
/// value, sub-trees) the recorder queries.
#[derive(Debug, Clone)]
pub struct ElementData {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub is_svg: bool,
    pub rect: Rect,
    pub style: ComputedStyle,
    pub scroll_x: f64,
    pub scroll_y: f64,
    /// Current value of a form control, distinct from the `value` attribute.
    pub value: Option<String>,
    pub checked: Option<bool>,
    pub disabled: bool,
    /// Shadow root attached to this host.
    pub shadow_root: Option<NodeId>,
    /// Marks the root element of a shadow tree.
    pub is_shadow_root: bool,
    /// Same-origin iframe: the contained document.
    pub content_doc: Option<DocId>,
    /// Cross-origin iframe: index of its message port.
    pub frame_port: Option<usize>,
    /// Stylesheet owned by this `<style>` or `<link rel="stylesheet">`.
    pub sheet: Option<SheetId>,
    pub canvas: Option<CanvasState>,
    pub media: Option<MediaState>,
    /// Decoded bitmap of an `<img>`, as a data URL, when the host captured
    /// one for inlining.
    pub image_data_url: Option<String>,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            is_svg: false,
            rect: Rect::default(),
            style: ComputedStyle::default(),
            scroll_x: 0.0,
            scroll_y: 0.0,
            value: None,
            checked: None,
            disabled: false,
            shadow_root: None,
            is_shadow_root: false,
            content_doc: None,
            frame_port: None,
            sheet: None,
            canvas: None,
            media: None,
            image_data_url: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(|s| s.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|p| p == class))
            .unwrap_or(false)
    }
}
