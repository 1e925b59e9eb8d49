//! The recorded event taxonomy and its wire shape
//!
//! `type` and `data.source` are small integer enums whose assignments are
//! normative; replay depends on them. Serialization must produce exactly
//! the rrweb-compatible JSON shape, so the discriminants live inside the
//! payload structs and deserialization dispatches on the integers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Top-level event discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EventType {
    DomContentLoaded = 0,
    Load = 1,
    FullSnapshot = 2,
    IncrementalSnapshot = 3,
    Meta = 4,
    Custom = 5,
    Plugin = 6,
}

impl From<EventType> for u8 {
    fn from(v: EventType) -> u8 {
        v as u8
    }
}

impl TryFrom<u8> for EventType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, String> {
        Ok(match v {
            0 => EventType::DomContentLoaded,
            1 => EventType::Load,
            2 => EventType::FullSnapshot,
            3 => EventType::IncrementalSnapshot,
            4 => EventType::Meta,
            5 => EventType::Custom,
            6 => EventType::Plugin,
            other => return Err(format!("unknown event type {}", other)),
        })
    }
}

/// Incremental snapshot source discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum IncrementalSource {
    Mutation = 0,
    MouseMove = 1,
    MouseInteraction = 2,
    Scroll = 3,
    ViewportResize = 4,
    Input = 5,
    TouchMove = 6,
    MediaInteraction = 7,
    StyleSheetRule = 8,
    CanvasMutation = 9,
    Font = 10,
    Log = 11,
    Drag = 12,
    StyleDeclaration = 13,
    Selection = 14,
    AdoptedStyleSheet = 15,
    CustomElement = 16,
    VisibilityMutation = 17,
}

impl From<IncrementalSource> for u8 {
    fn from(v: IncrementalSource) -> u8 {
        v as u8
    }
}

impl TryFrom<u8> for IncrementalSource {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, String> {
        Ok(match v {
            0 => IncrementalSource::Mutation,
            1 => IncrementalSource::MouseMove,
            2 => IncrementalSource::MouseInteraction,
            3 => IncrementalSource::Scroll,
            4 => IncrementalSource::ViewportResize,
            5 => IncrementalSource::Input,
            6 => IncrementalSource::TouchMove,
            7 => IncrementalSource::MediaInteraction,
            8 => IncrementalSource::StyleSheetRule,
            9 => IncrementalSource::CanvasMutation,
            10 => IncrementalSource::Font,
            11 => IncrementalSource::Log,
            12 => IncrementalSource::Drag,
            13 => IncrementalSource::StyleDeclaration,
            14 => IncrementalSource::Selection,
            15 => IncrementalSource::AdoptedStyleSheet,
            16 => IncrementalSource::CustomElement,
            17 => IncrementalSource::VisibilityMutation,
            other => return Err(format!("unknown incremental source {}", other)),
        })
    }
}

/// Serialized node type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum NodeType {
    Document = 0,
    DocumentType = 1,
    Element = 2,
    Text = 3,
    Cdata = 4,
    Comment = 5,
}

impl From<NodeType> for u8 {
    fn from(v: NodeType) -> u8 {
        v as u8
    }
}

impl TryFrom<u8> for NodeType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, String> {
        Ok(match v {
            0 => NodeType::Document,
            1 => NodeType::DocumentType,
            2 => NodeType::Element,
            3 => NodeType::Text,
            4 => NodeType::Cdata,
            5 => NodeType::Comment,
            other => return Err(format!("unknown node type {}", other)),
        })
    }
}

/// Pointer interaction discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MouseInteractionKind {
    MouseUp = 0,
    MouseDown = 1,
    Click = 2,
    ContextMenu = 3,
    DblClick = 4,
    Focus = 5,
    Blur = 6,
    TouchStart = 7,
    TouchEnd = 9,
    TouchCancel = 10,
}

impl From<MouseInteractionKind> for u8 {
    fn from(v: MouseInteractionKind) -> u8 {
        v as u8
    }
}

impl TryFrom<u8> for MouseInteractionKind {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, String> {
        Ok(match v {
            0 => MouseInteractionKind::MouseUp,
            1 => MouseInteractionKind::MouseDown,
            2 => MouseInteractionKind::Click,
            3 => MouseInteractionKind::ContextMenu,
            4 => MouseInteractionKind::DblClick,
            5 => MouseInteractionKind::Focus,
            6 => MouseInteractionKind::Blur,
            7 => MouseInteractionKind::TouchStart,
            9 => MouseInteractionKind::TouchEnd,
            10 => MouseInteractionKind::TouchCancel,
            other => return Err(format!("unknown mouse interaction {}", other)),
        })
    }
}

/// Media interaction discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MediaInteractionKind {
    Play = 0,
    Pause = 1,
    Seeked = 2,
    VolumeChange = 3,
}

impl From<MediaInteractionKind> for u8 {
    fn from(v: MediaInteractionKind) -> u8 {
        v as u8
    }
}

impl TryFrom<u8> for MediaInteractionKind {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, String> {
        Ok(match v {
            0 => MediaInteractionKind::Play,
            1 => MediaInteractionKind::Pause,
            2 => MediaInteractionKind::Seeked,
            3 => MediaInteractionKind::VolumeChange,
            other => return Err(format!("unknown media interaction {}", other)),
        })
    }
}

/// Canvas context discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CanvasContext {
    TwoD = 0,
    WebGl = 1,
    WebGl2 = 2,
}

impl From<CanvasContext> for u8 {
    fn from(v: CanvasContext) -> u8 {
        v as u8
    }
}

impl TryFrom<u8> for CanvasContext {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, String> {
        Ok(match v {
            0 => CanvasContext::TwoD,
            1 => CanvasContext::WebGl,
            2 => CanvasContext::WebGl2,
            other => return Err(format!("unknown canvas context {}", other)),
        })
    }
}

/// Attribute values in serialized nodes: strings, numbers, or `true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Num(f64),
    Str(String),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Num(n)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// One node of a serialized tree. A single flat record covers all node
/// types; absent fields stay off the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedNode {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compat_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_nodes: Vec<SerializedNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_style: Option<bool>,
    #[serde(rename = "isSVG", skip_serializing_if = "Option::is_none")]
    pub is_svg: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub need_block: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub need_mask: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_shadow_host: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_shadow: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_interactive: Option<bool>,
}

impl SerializedNode {
    fn base(node_type: NodeType, id: i64) -> Self {
        Self {
            node_type,
            id,
            compat_mode: None,
            name: None,
            public_id: None,
            system_id: None,
            tag_name: None,
            attributes: BTreeMap::new(),
            child_nodes: Vec::new(),
            text_content: None,
            is_style: None,
            is_svg: None,
            need_block: None,
            need_mask: None,
            root_id: None,
            is_shadow_host: None,
            is_shadow: None,
            xpath: None,
            selector: None,
            is_visible: None,
            is_interactive: None,
        }
    }

    pub fn document(id: i64, compat_mode: &str) -> Self {
        let mut n = Self::base(NodeType::Document, id);
        n.compat_mode = Some(compat_mode.to_string());
        n
    }

    pub fn doctype(id: i64, name: &str, public_id: &str, system_id: &str) -> Self {
        let mut n = Self::base(NodeType::DocumentType, id);
        n.name = Some(name.to_string());
        n.public_id = Some(public_id.to_string());
        n.system_id = Some(system_id.to_string());
        n
    }

    pub fn element(id: i64, tag: &str) -> Self {
        let mut n = Self::base(NodeType::Element, id);
        n.tag_name = Some(tag.to_ascii_lowercase());
        n
    }

    pub fn text(id: i64, content: &str) -> Self {
        let mut n = Self::base(NodeType::Text, id);
        n.text_content = Some(content.to_string());
        n
    }

    pub fn comment(id: i64, content: &str) -> Self {
        let mut n = Self::base(NodeType::Comment, id);
        n.text_content = Some(content.to_string());
        n
    }

    pub fn cdata(id: i64, content: &str) -> Self {
        let mut n = Self::base(NodeType::Cdata, id);
        n.text_content = Some(content.to_string());
        n
    }

    /// Walk this node and its descendants.
    pub fn walk(&self, f: &mut impl FnMut(&SerializedNode)) {
        f(self);
        for child in &self.child_nodes {
            child.walk(f);
        }
    }
}

// Payloads

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EmptyData {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    pub href: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialOffset {
    pub top: f64,
    pub left: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSnapshotData {
    pub node: SerializedNode,
    pub initial_offset: InitialOffset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    pub tag: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginData {
    pub plugin: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMutation {
    pub id: i64,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMutation {
    pub id: i64,
    /// `None` value means the attribute was removed.
    pub attributes: BTreeMap<String, Option<AttrValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedNodeMutation {
    pub parent_id: i64,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_shadow: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedNodeMutation {
    pub parent_id: i64,
    pub next_id: Option<i64>,
    pub node: SerializedNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationData {
    pub source: IncrementalSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub texts: Vec<TextMutation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeMutation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removes: Vec<RemovedNodeMutation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adds: Vec<AddedNodeMutation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_attach_iframe: Option<bool>,
}

impl MutationData {
    pub fn new() -> Self {
        Self {
            source: IncrementalSource::Mutation,
            texts: Vec::new(),
            attributes: Vec::new(),
            removes: Vec::new(),
            adds: Vec::new(),
            is_attach_iframe: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
            && self.attributes.is_empty()
            && self.removes.is_empty()
            && self.adds.is_empty()
    }
}

impl Default for MutationData {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MousePosition {
    pub x: f64,
    pub y: f64,
    pub id: i64,
    pub time_offset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseMoveData {
    pub source: IncrementalSource,
    pub positions: Vec<MousePosition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseInteractionData {
    pub source: IncrementalSource,
    #[serde(rename = "type")]
    pub interaction: MouseInteractionKind,
    pub id: i64,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollData {
    pub source: IncrementalSource,
    pub id: i64,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportResizeData {
    pub source: IncrementalSource,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputData {
    pub source: IncrementalSource,
    pub id: i64,
    pub text: String,
    pub is_checked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_triggered: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInteractionData {
    pub source: IncrementalSource,
    #[serde(rename = "type")]
    pub interaction: MediaInteractionKind,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSheetAddRule {
    pub rule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSheetDeleteRule {
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSheetRuleData {
    pub source: IncrementalSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adds: Vec<StyleSheetAddRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removes: Vec<StyleSheetDeleteRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasCommandData {
    pub property: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasMutationData {
    pub source: IncrementalSource,
    pub id: i64,
    #[serde(rename = "type")]
    pub context: CanvasContext,
    pub commands: Vec<CanvasCommandData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontData {
    pub source: IncrementalSource,
    pub family: String,
    pub font_source: String,
    pub buffer: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub descriptors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogData {
    pub source: IncrementalSource,
    pub level: String,
    pub payload: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSetProperty {
    pub property: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRemoveProperty {
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleDeclarationData {
    pub source: IncrementalSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_id: Option<u32>,
    pub index: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set: Option<StyleSetProperty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove: Option<StyleRemoveProperty>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRangeData {
    pub start: i64,
    pub start_offset: u32,
    pub end: i64,
    pub end_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionData {
    pub source: IncrementalSource,
    pub ranges: Vec<SelectionRangeData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptedStyleSheetStyle {
    pub style_id: u32,
    pub rules: Vec<StyleSheetAddRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptedStyleSheetData {
    pub source: IncrementalSource,
    /// Mirror id of the owning document node.
    pub id: i64,
    pub style_ids: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<AdoptedStyleSheetStyle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomElementDefine {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomElementData {
    pub source: IncrementalSource,
    pub define: CustomElementDefine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityChange {
    pub id: i64,
    pub is_visible: bool,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityMutationData {
    pub source: IncrementalSource,
    pub mutations: Vec<VisibilityChange>,
}

/// Incremental payload, one variant per source family. `MouseMove` also
/// carries `TouchMove` and `Drag` streams; the embedded `source` field
/// tells them apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IncrementalData {
    Mutation(MutationData),
    MouseMove(MouseMoveData),
    MouseInteraction(MouseInteractionData),
    Scroll(ScrollData),
    ViewportResize(ViewportResizeData),
    Input(InputData),
    MediaInteraction(MediaInteractionData),
    StyleSheetRule(StyleSheetRuleData),
    CanvasMutation(CanvasMutationData),
    Font(FontData),
    Log(LogData),
    StyleDeclaration(StyleDeclarationData),
    Selection(SelectionData),
    AdoptedStyleSheet(AdoptedStyleSheetData),
    CustomElement(CustomElementData),
    VisibilityMutation(VisibilityMutationData),
}

impl IncrementalData {
    pub fn source(&self) -> IncrementalSource {
        match self {
            IncrementalData::Mutation(d) => d.source,
            IncrementalData::MouseMove(d) => d.source,
            IncrementalData::MouseInteraction(d) => d.source,
            IncrementalData::Scroll(d) => d.source,
            IncrementalData::ViewportResize(d) => d.source,
            IncrementalData::Input(d) => d.source,
            IncrementalData::MediaInteraction(d) => d.source,
            IncrementalData::StyleSheetRule(d) => d.source,
            IncrementalData::CanvasMutation(d) => d.source,
            IncrementalData::Font(d) => d.source,
            IncrementalData::Log(d) => d.source,
            IncrementalData::StyleDeclaration(d) => d.source,
            IncrementalData::Selection(d) => d.source,
            IncrementalData::AdoptedStyleSheet(d) => d.source,
            IncrementalData::CustomElement(d) => d.source,
            IncrementalData::VisibilityMutation(d) => d.source,
        }
    }

    fn from_value(source: IncrementalSource, value: Value) -> serde_json::Result<Self> {
        Ok(match source {
            IncrementalSource::Mutation => {
                IncrementalData::Mutation(serde_json::from_value(value)?)
            }
            IncrementalSource::MouseMove
            | IncrementalSource::TouchMove
            | IncrementalSource::Drag => {
                IncrementalData::MouseMove(serde_json::from_value(value)?)
            }
            IncrementalSource::MouseInteraction => {
                IncrementalData::MouseInteraction(serde_json::from_value(value)?)
            }
            IncrementalSource::Scroll => IncrementalData::Scroll(serde_json::from_value(value)?),
            IncrementalSource::ViewportResize => {
                IncrementalData::ViewportResize(serde_json::from_value(value)?)
            }
            IncrementalSource::Input => IncrementalData::Input(serde_json::from_value(value)?),
            IncrementalSource::MediaInteraction => {
                IncrementalData::MediaInteraction(serde_json::from_value(value)?)
            }
            IncrementalSource::StyleSheetRule => {
                IncrementalData::StyleSheetRule(serde_json::from_value(value)?)
            }
            IncrementalSource::CanvasMutation => {
                IncrementalData::CanvasMutation(serde_json::from_value(value)?)
            }
            IncrementalSource::Font => IncrementalData::Font(serde_json::from_value(value)?),
            IncrementalSource::Log => IncrementalData::Log(serde_json::from_value(value)?),
            IncrementalSource::StyleDeclaration => {
                IncrementalData::StyleDeclaration(serde_json::from_value(value)?)
            }
            IncrementalSource::Selection => {
                IncrementalData::Selection(serde_json::from_value(value)?)
            }
            IncrementalSource::AdoptedStyleSheet => {
                IncrementalData::AdoptedStyleSheet(serde_json::from_value(value)?)
            }
            IncrementalSource::CustomElement => {
                IncrementalData::CustomElement(serde_json::from_value(value)?)
            }
            IncrementalSource::VisibilityMutation => {
                IncrementalData::VisibilityMutation(serde_json::from_value(value)?)
            }
        })
    }
}

/// Event payload keyed by the top-level `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    Empty(EmptyData),
    Meta(MetaData),
    FullSnapshot(Box<FullSnapshotData>),
    Incremental(IncrementalData),
    Custom(CustomData),
    Plugin(PluginData),
}

impl EventData {
    pub fn empty() -> Self {
        EventData::Empty(EmptyData {})
    }

    pub fn event_type(&self) -> Option<EventType> {
        match self {
            // DomContentLoaded and Load share the empty payload; the
            // caller picks the type.
            EventData::Empty(_) => None,
            EventData::Meta(_) => Some(EventType::Meta),
            EventData::FullSnapshot(_) => Some(EventType::FullSnapshot),
            EventData::Incremental(_) => Some(EventType::IncrementalSnapshot),
            EventData::Custom(_) => Some(EventType::Custom),
            EventData::Plugin(_) => Some(EventType::Plugin),
        }
    }
}

/// One recorded event: type, payload, emit-time timestamp, and the
/// optional plugin-assigned sequence fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: EventData,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData, timestamp: u64) -> Self {
        Self {
            event_type,
            data,
            timestamp,
            id: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn incremental(&self) -> Option<&IncrementalData> {
        match &self.data {
            EventData::Incremental(d) => Some(d),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as DeError;

        let mut value = Value::deserialize(deserializer)?;
        let obj = value
            .as_object_mut()
            .ok_or_else(|| D::Error::custom("event must be a JSON object"))?;

        let type_num = obj
            .get("type")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| D::Error::custom("event is missing its type"))? as u8;
        let event_type = EventType::try_from(type_num).map_err(D::Error::custom)?;
        let timestamp = obj.get("timestamp").and_then(|v| v.as_u64()).unwrap_or(0);
        let id = obj.get("id").and_then(|v| v.as_u64());
        let data_value = obj.remove("data").unwrap_or_else(|| Value::Object(Default::default()));

        let mut extra = BTreeMap::new();
        for (k, v) in obj.iter() {
            if k != "type" && k != "timestamp" && k != "id" {
                extra.insert(k.clone(), v.clone());
            }
        }

        let data = match event_type {
            EventType::DomContentLoaded | EventType::Load => EventData::empty(),
            EventType::Meta => {
                EventData::Meta(serde_json::from_value(data_value).map_err(D::Error::custom)?)
            }
            EventType::FullSnapshot => EventData::FullSnapshot(Box::new(
                serde_json::from_value(data_value).map_err(D::Error::custom)?,
            )),
            EventType::Custom => {
                EventData::Custom(serde_json::from_value(data_value).map_err(D::Error::custom)?)
            }
            EventType::Plugin => {
                EventData::Plugin(serde_json::from_value(data_value).map_err(D::Error::custom)?)
            }
            EventType::IncrementalSnapshot => {
                let source_num = data_value
                    .get("source")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| D::Error::custom("incremental data is missing its source"))?
                    as u8;
                let source = IncrementalSource::try_from(source_num).map_err(D::Error::custom)?;
                EventData::Incremental(
                    IncrementalData::from_value(source, data_value).map_err(D::Error::custom)?,
                )
            }
        };

        Ok(Event {
            event_type,
            data,
            timestamp,
            id,
            extra,
        })
    }
}
