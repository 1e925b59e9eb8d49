//! Page - the document forest and its observation queue

use crate::document::{Document, FontFace};
use crate::event::{MediaKind, UiEvent};
use crate::geometry::Rect;
use crate::node::{
    CanvasCommand, CanvasContextKind, CanvasState, ComputedStyle, DocId, ElementData, Node,
    NodeData, NodeRef,
};
use crate::notice::{MutationRecord, PageNotice};
use crate::stylesheet::{SheetId, StyleSheet};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// One end of a selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRange {
    pub start: NodeRef,
    pub start_offset: u32,
    pub end: NodeRef,
    pub end_offset: u32,
}

#[derive(Debug, Clone)]
pub struct PortMessage {
    pub origin: String,
    pub payload: String,
}

/// Message port standing in for the postMessage boundary of a cross-origin
/// iframe. The child keeps a clone and posts; the parent page drains at
/// frame boundaries.
#[derive(Debug, Clone, Default)]
pub struct FramePort {
    queue: Rc<RefCell<VecDeque<PortMessage>>>,
}

impl FramePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, origin: &str, payload: String) {
        self.queue.borrow_mut().push_back(PortMessage {
            origin: origin.to_string(),
            payload,
        });
    }

    fn drain(&self) -> Vec<PortMessage> {
        self.queue.borrow_mut().drain(..).collect()
    }
}

/// The live page: main document, same-origin subdocuments, stylesheets,
/// selection state, cross-origin ports, and the pending notice queue.
pub struct Page {
    docs: Vec<Document>,
    sheets: Vec<StyleSheet>,
    selections: HashMap<DocId, Vec<SelectionRange>>,
    ports: Vec<(NodeRef, FramePort)>,
    notices: VecDeque<PageNotice>,
    recorder_attached: bool,
}

impl Page {
    pub fn new(url: &str) -> Self {
        Self {
            docs: vec![Document::new(DocId(0), url)],
            sheets: Vec::new(),
            selections: HashMap::new(),
            ports: Vec::new(),
            notices: VecDeque::new(),
            recorder_attached: false,
        }
    }

    /// Claim the page for a recording. Only one recorder may be attached
    /// at a time.
    pub fn attach_recorder(&mut self) -> bool {
        if self.recorder_attached {
            return false;
        }
        self.recorder_attached = true;
        true
    }

    pub fn detach_recorder(&mut self) {
        self.recorder_attached = false;
    }

    pub fn main(&self) -> DocId {
        DocId(0)
    }

    pub fn doc(&self, id: DocId) -> &Document {
        &self.docs[id.0 as usize]
    }

    pub fn doc_mut(&mut self, id: DocId) -> &mut Document {
        &mut self.docs[id.0 as usize]
    }

    pub fn doc_ids(&self) -> Vec<DocId> {
        (0..self.docs.len() as u32).map(DocId).collect()
    }

    /// New, unattached document for a same-origin iframe.
    pub fn create_document(&mut self, url: &str) -> DocId {
        let id = DocId(self.docs.len() as u32);
        self.docs.push(Document::new(id, url));
        id
    }

    // Node accessors

    pub fn node(&self, r: NodeRef) -> Option<&Node> {
        self.doc(r.doc).tree.get(r.node)
    }

    pub fn element(&self, r: NodeRef) -> Option<&ElementData> {
        self.doc(r.doc).tree.element(r.node)
    }

    fn element_mut(&mut self, r: NodeRef) -> Option<&mut ElementData> {
        self.doc_mut(r.doc).tree.element_mut(r.node)
    }

    pub fn tag(&self, r: NodeRef) -> Option<&str> {
        self.element(r).map(|el| el.tag.as_str())
    }

    pub fn attr(&self, r: NodeRef, name: &str) -> Option<String> {
        self.element(r).and_then(|el| el.attr(name)).map(String::from)
    }

    pub fn parent(&self, r: NodeRef) -> Option<NodeRef> {
        self.doc(r.doc)
            .tree
            .parent(r.node)
            .map(|p| NodeRef::new(r.doc, p))
    }

    pub fn children(&self, r: NodeRef) -> Vec<NodeRef> {
        self.doc(r.doc)
            .tree
            .children(r.node)
            .iter()
            .map(|&c| NodeRef::new(r.doc, c))
            .collect()
    }

    pub fn descendants(&self, r: NodeRef) -> Vec<NodeRef> {
        self.doc(r.doc)
            .tree
            .descendants(r.node)
            .into_iter()
            .map(|n| NodeRef::new(r.doc, n))
            .collect()
    }

    pub fn attached_elements(&self, doc: DocId) -> Vec<NodeRef> {
        self.doc(doc)
            .tree
            .attached_elements()
            .into_iter()
            .map(|n| NodeRef::new(doc, n))
            .collect()
    }

    pub fn rect(&self, r: NodeRef) -> Rect {
        self.element(r).map(|el| el.rect).unwrap_or_default()
    }

    pub fn style(&self, r: NodeRef) -> ComputedStyle {
        self.element(r).map(|el| el.style.clone()).unwrap_or_default()
    }

    pub fn value(&self, r: NodeRef) -> Option<String> {
        self.element(r).and_then(|el| el.value.clone())
    }

    pub fn checked(&self, r: NodeRef) -> Option<bool> {
        self.element(r).and_then(|el| el.checked)
    }

    pub fn text(&self, r: NodeRef) -> Option<String> {
        self.node(r).and_then(|n| n.text_content()).map(String::from)
    }

    pub fn same_tag_index(&self, r: NodeRef) -> usize {
        self.doc(r.doc).tree.same_tag_index(r.node)
    }

    /// Elements carrying any inline `on*` handler attribute.
    pub fn elements_with_inline_handlers(&self, doc: DocId) -> Vec<NodeRef> {
        self.attached_elements(doc)
            .into_iter()
            .filter(|&r| {
                self.element(r)
                    .map(|el| el.attrs.keys().any(|k| k.starts_with("on") && k.len() > 2))
                    .unwrap_or(false)
            })
            .collect()
    }

    // Node construction

    pub fn create_element(&mut self, doc: DocId, tag: &str) -> NodeRef {
        let id = self.doc_mut(doc).tree.create_element(tag);
        NodeRef::new(doc, id)
    }

    pub fn create_text(&mut self, doc: DocId, content: &str) -> NodeRef {
        let id = self.doc_mut(doc).tree.create_text(content);
        NodeRef::new(doc, id)
    }

    pub fn create_comment(&mut self, doc: DocId, content: &str) -> NodeRef {
        let id = self.doc_mut(doc).tree.create_comment(content);
        NodeRef::new(doc, id)
    }

    pub fn create_cdata(&mut self, doc: DocId, content: &str) -> NodeRef {
        let id = self.doc_mut(doc).tree.create_cdata(content);
        NodeRef::new(doc, id)
    }

    pub fn create_doctype(&mut self, doc: DocId, name: &str, public_id: &str, system_id: &str) -> NodeRef {
        let id = self.doc_mut(doc).tree.create_doctype(name, public_id, system_id);
        NodeRef::new(doc, id)
    }

    // Structural mutation - each call queues one MutationObserver record

    pub fn append_child(&mut self, parent: NodeRef, child: NodeRef) {
        debug_assert_eq!(parent.doc, child.doc, "cross-document append");
        self.doc_mut(parent.doc).tree.append_child(parent.node, child.node);
        self.notices
            .push_back(PageNotice::Mutation(MutationRecord::ChildList {
                target: parent,
                added: vec![child],
                removed: Vec::new(),
            }));
    }

    pub fn insert_before(&mut self, parent: NodeRef, child: NodeRef, reference: NodeRef) {
        debug_assert_eq!(parent.doc, child.doc, "cross-document insert");
        self.doc_mut(parent.doc)
            .tree
            .insert_before(parent.node, child.node, reference.node);
        self.notices
            .push_back(PageNotice::Mutation(MutationRecord::ChildList {
                target: parent,
                added: vec![child],
                removed: Vec::new(),
            }));
    }

    pub fn remove_child(&mut self, parent: NodeRef, child: NodeRef) {
        self.doc_mut(parent.doc).tree.remove_child(parent.node, child.node);
        self.notices
            .push_back(PageNotice::Mutation(MutationRecord::ChildList {
                target: parent,
                added: Vec::new(),
                removed: vec![child],
            }));
    }

    pub fn set_attribute(&mut self, r: NodeRef, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let old = self
            .element_mut(r)
            .map(|el| el.attrs.insert(name.clone(), value.to_string()))
            .unwrap_or(None);
        self.notices
            .push_back(PageNotice::Mutation(MutationRecord::Attributes {
                target: r,
                name,
                old_value: old,
            }));
    }

    pub fn remove_attribute(&mut self, r: NodeRef, name: &str) {
        let name = name.to_ascii_lowercase();
        let old = self
            .element_mut(r)
            .and_then(|el| el.attrs.remove(&name));
        self.notices
            .push_back(PageNotice::Mutation(MutationRecord::Attributes {
                target: r,
                name,
                old_value: old,
            }));
    }

    pub fn set_text(&mut self, r: NodeRef, text: &str) {
        let mut old = None;
        if let Some(node) = self.doc_mut(r.doc).tree.get_mut(r.node) {
            match &mut node.data {
                NodeData::Text { content }
                | NodeData::Comment { content }
                | NodeData::Cdata { content } => {
                    old = Some(content.clone());
                    *content = text.to_string();
                }
                _ => return,
            }
        }
        self.notices
            .push_back(PageNotice::Mutation(MutationRecord::CharacterData {
                target: r,
                old_value: old,
            }));
    }

    // Layout and style - silent; picked up by the visibility frame loop

    pub fn set_rect(&mut self, r: NodeRef, rect: Rect) {
        if let Some(el) = self.element_mut(r) {
            el.rect = rect;
        }
    }

    pub fn set_style(&mut self, r: NodeRef, style: ComputedStyle) {
        if let Some(el) = self.element_mut(r) {
            el.style = style;
        }
    }

    pub fn set_svg(&mut self, r: NodeRef, is_svg: bool) {
        if let Some(el) = self.element_mut(r) {
            el.is_svg = is_svg;
        }
    }

    pub fn set_disabled(&mut self, r: NodeRef, disabled: bool) {
        if let Some(el) = self.element_mut(r) {
            el.disabled = disabled;
        }
    }

    // UI events

    pub fn dispatch(&mut self, event: UiEvent) {
        self.notices.push_back(PageNotice::Ui(event));
    }

    /// Set a form control's value and fire the input event.
    pub fn input(&mut self, r: NodeRef, value: &str, user_triggered: bool) {
        if let Some(el) = self.element_mut(r) {
            el.value = Some(value.to_string());
        }
        self.notices.push_back(PageNotice::Ui(UiEvent::Input {
            target: r,
            user_triggered,
        }));
    }

    pub fn set_checked(&mut self, r: NodeRef, checked: bool, user_triggered: bool) {
        if let Some(el) = self.element_mut(r) {
            el.checked = Some(checked);
        }
        self.notices.push_back(PageNotice::Ui(UiEvent::Input {
            target: r,
            user_triggered,
        }));
    }

    pub fn scroll(&mut self, r: NodeRef, x: f64, y: f64) {
        if let Some(el) = self.element_mut(r) {
            el.scroll_x = x;
            el.scroll_y = y;
        }
        self.notices.push_back(PageNotice::Scrolled { target: r, x, y });
    }

    pub fn scroll_document(&mut self, doc: DocId, x: f64, y: f64) {
        {
            let d = self.doc_mut(doc);
            d.scroll_x = x;
            d.scroll_y = y;
        }
        let target = self.doc(doc).root();
        self.notices.push_back(PageNotice::Scrolled { target, x, y });
    }

    pub fn resize_viewport(&mut self, doc: DocId, width: u32, height: u32) {
        {
            let d = self.doc_mut(doc);
            d.width = width;
            d.height = height;
        }
        self.notices
            .push_back(PageNotice::ViewportResized { doc, width, height });
    }

    pub fn viewport_rect(&self, doc: DocId) -> Rect {
        let d = self.doc(doc);
        Rect::new(0.0, 0.0, d.width as f64, d.height as f64)
    }

    pub fn add_event_listener(&mut self, r: NodeRef, event_type: &str) {
        self.notices.push_back(PageNotice::ListenerAdded {
            target: r,
            event_type: event_type.to_string(),
        });
    }

    // Shadow DOM

    /// Attach a shadow root to `host`, returning the root node.
    pub fn attach_shadow(&mut self, host: NodeRef) -> NodeRef {
        let root_id = {
            let tree = &mut self.doc_mut(host.doc).tree;
            let root_id = tree.create_element("#shadow-root");
            if let Some(el) = tree.element_mut(root_id) {
                el.is_shadow_root = true;
            }
            if let Some(node) = tree.get_mut(root_id) {
                node.parent = host.node;
            }
            if let Some(el) = tree.element_mut(host.node) {
                el.shadow_root = Some(root_id);
            }
            root_id
        };
        let root = NodeRef::new(host.doc, root_id);
        self.notices.push_back(PageNotice::ShadowAttached { host });
        root
    }

    // Media

    pub fn set_media_time(&mut self, r: NodeRef, time: f64) {
        if let Some(el) = self.element_mut(r) {
            el.media.get_or_insert_with(Default::default).current_time = time;
        }
    }

    pub fn set_volume(&mut self, r: NodeRef, volume: f64, muted: bool) {
        if let Some(el) = self.element_mut(r) {
            let media = el.media.get_or_insert_with(Default::default);
            media.volume = volume;
            media.muted = muted;
        }
    }

    pub fn media(&mut self, r: NodeRef, kind: MediaKind) {
        if let Some(el) = self.element_mut(r) {
            let media = el.media.get_or_insert_with(Default::default);
            match kind {
                MediaKind::Play => media.paused = false,
                MediaKind::Pause => media.paused = true,
                MediaKind::Seeked | MediaKind::VolumeChange => {}
            }
        }
        self.notices.push_back(PageNotice::Media { target: r, kind });
    }

    pub fn media_state(&self, r: NodeRef) -> Option<crate::node::MediaState> {
        self.element(r).and_then(|el| el.media.clone())
    }

    // Stylesheets

    pub fn create_stylesheet(&mut self, owner: Option<NodeRef>, rules: Vec<String>) -> SheetId {
        let id = SheetId(self.sheets.len() as u32);
        let mut sheet = StyleSheet::new(id);
        sheet.owner = owner;
        sheet.rules = rules;
        self.sheets.push(sheet);
        if let Some(owner) = owner {
            if let Some(el) = self.element_mut(owner) {
                el.sheet = Some(id);
            }
        }
        id
    }

    pub fn create_linked_stylesheet(&mut self, owner: NodeRef, href: &str) -> SheetId {
        let id = SheetId(self.sheets.len() as u32);
        let mut sheet = StyleSheet::linked(id, href);
        sheet.owner = Some(owner);
        self.sheets.push(sheet);
        if let Some(el) = self.element_mut(owner) {
            el.sheet = Some(id);
        }
        id
    }

    pub fn sheet(&self, id: SheetId) -> Option<&StyleSheet> {
        self.sheets.get(id.0 as usize)
    }

    pub fn insert_rule(&mut self, id: SheetId, rule: &str, index: usize) {
        if let Some(sheet) = self.sheets.get_mut(id.0 as usize) {
            let index = index.min(sheet.rules.len());
            sheet.rules.insert(index, rule.to_string());
            self.notices.push_back(PageNotice::StyleRuleInserted {
                sheet: id,
                rule: rule.to_string(),
                index,
            });
        }
    }

    pub fn delete_rule(&mut self, id: SheetId, index: usize) {
        if let Some(sheet) = self.sheets.get_mut(id.0 as usize) {
            if index < sheet.rules.len() {
                sheet.rules.remove(index);
                self.notices
                    .push_back(PageNotice::StyleRuleDeleted { sheet: id, index });
            }
        }
    }

    pub fn set_style_declaration(
        &mut self,
        id: SheetId,
        index: Vec<usize>,
        property: &str,
        value: Option<&str>,
        priority: Option<&str>,
    ) {
        self.notices.push_back(PageNotice::StyleDeclarationSet {
            sheet: id,
            index,
            property: property.to_string(),
            value: value.map(String::from),
            priority: priority.map(String::from),
        });
    }

    pub fn set_adopted_sheets(&mut self, doc: DocId, sheets: Vec<SheetId>) {
        self.doc_mut(doc).adopted_sheets = sheets;
        self.notices.push_back(PageNotice::AdoptedStyleSheetsChanged { doc });
    }

    /// A linked sheet finished loading; its rules become readable.
    pub fn complete_stylesheet_load(&mut self, id: SheetId, rules: Vec<String>) {
        if let Some(sheet) = self.sheets.get_mut(id.0 as usize) {
            sheet.rules = rules;
            sheet.loaded = true;
            self.notices.push_back(PageNotice::StylesheetLoaded { sheet: id });
        }
    }

    // Fonts

    pub fn add_font_face(
        &mut self,
        doc: DocId,
        family: &str,
        src: &str,
        descriptors: Vec<(String, String)>,
    ) {
        self.doc_mut(doc).fonts.push(FontFace {
            family: family.to_string(),
            src: src.to_string(),
            descriptors: descriptors.clone(),
        });
        self.notices.push_back(PageNotice::FontLoaded {
            doc,
            family: family.to_string(),
            src: src.to_string(),
            descriptors,
        });
    }

    // Selection

    pub fn set_selection(&mut self, doc: DocId, ranges: Vec<SelectionRange>) {
        self.selections.insert(doc, ranges);
        self.notices.push_back(PageNotice::SelectionChanged { doc });
    }

    pub fn selection(&self, doc: DocId) -> &[SelectionRange] {
        self.selections.get(&doc).map(|v| v.as_slice()).unwrap_or(&[])
    }

    // Custom elements

    pub fn define_custom_element(&mut self, doc: DocId, name: &str) {
        self.doc_mut(doc).custom_elements.push(name.to_string());
        self.notices.push_back(PageNotice::CustomElementDefined {
            doc,
            name: name.to_string(),
        });
    }

    // Canvas

    pub fn open_canvas(&mut self, r: NodeRef, context: CanvasContextKind) {
        if let Some(el) = self.element_mut(r) {
            el.canvas = Some(CanvasState::new(context));
        }
    }

    pub fn canvas_draw(&mut self, r: NodeRef, command: CanvasCommand) {
        if let Some(el) = self.element_mut(r) {
            if let Some(canvas) = el.canvas.as_mut() {
                canvas.commands.push(command);
            }
        }
        self.notices.push_back(PageNotice::CanvasDraw { target: r });
    }

    pub fn set_canvas_data_url(&mut self, r: NodeRef, data_url: &str) {
        if let Some(el) = self.element_mut(r) {
            if let Some(canvas) = el.canvas.as_mut() {
                canvas.data_url = Some(data_url.to_string());
            }
        }
    }

    pub fn set_image_data_url(&mut self, r: NodeRef, data_url: &str) {
        if let Some(el) = self.element_mut(r) {
            el.image_data_url = Some(data_url.to_string());
        }
    }

    pub fn image_data_url(&self, r: NodeRef) -> Option<String> {
        self.element(r).and_then(|el| el.image_data_url.clone())
    }

    pub fn canvas_is_blank(&self, r: NodeRef) -> bool {
        self.element(r)
            .and_then(|el| el.canvas.as_ref())
            .map(|c| c.is_blank())
            .unwrap_or(true)
    }

    pub fn canvas_state(&self, r: NodeRef) -> Option<&CanvasState> {
        self.element(r).and_then(|el| el.canvas.as_ref())
    }

    /// Take draw commands accumulated since the last call.
    pub fn take_canvas_commands(&mut self, r: NodeRef) -> Vec<CanvasCommand> {
        self.element_mut(r)
            .and_then(|el| el.canvas.as_mut())
            .map(|c| std::mem::take(&mut c.commands))
            .unwrap_or_default()
    }

    // Frames

    /// Wire a loaded same-origin document into its iframe element.
    pub fn attach_iframe_document(&mut self, element: NodeRef, doc: DocId) {
        if let Some(el) = self.element_mut(element) {
            el.content_doc = Some(doc);
        }
        self.notices.push_back(PageNotice::IframeLoaded { element, doc });
    }

    /// Open the message port of a cross-origin iframe. The returned clone
    /// is the child side.
    pub fn attach_cross_origin_port(&mut self, element: NodeRef) -> FramePort {
        let port = FramePort::new();
        let idx = self.ports.len();
        if let Some(el) = self.element_mut(element) {
            el.frame_port = Some(idx);
        }
        self.ports.push((element, port.clone()));
        port
    }

    // Lifecycle

    pub fn set_ready_state(&mut self, doc: DocId, state: crate::document::ReadyState) {
        self.doc_mut(doc).ready_state = state;
    }

    pub fn dom_content_loaded(&mut self, doc: DocId) {
        self.doc_mut(doc).ready_state = crate::document::ReadyState::Interactive;
        self.notices.push_back(PageNotice::DomContentLoaded { doc });
    }

    pub fn load(&mut self, doc: DocId) {
        self.doc_mut(doc).ready_state = crate::document::ReadyState::Complete;
        self.notices.push_back(PageNotice::Load { doc });
    }

    /// Frame boundary: deliver pending cross-origin messages.
    pub fn tick(&mut self) {
        let drained: Vec<(NodeRef, Vec<PortMessage>)> = self
            .ports
            .iter()
            .map(|(element, port)| (*element, port.drain()))
            .collect();
        for (element, messages) in drained {
            for msg in messages {
                self.notices.push_back(PageNotice::FrameMessage {
                    element,
                    origin: msg.origin,
                    payload: msg.payload,
                });
            }
        }
    }

    pub fn take_notices(&mut self) -> Vec<PageNotice> {
        self.notices.drain(..).collect()
    }

    pub fn has_notices(&self) -> bool {
        !self.notices.is_empty()
    }
}
