//! Iframe manager: same-origin recursion and the cross-origin message
//! protocol with id rewriting

use crate::config::RecordOptions;
use crate::error::{Error, Result};
use crate::event::{
    AddedNodeMutation, Event, EventData, IncrementalData, MutationData, SerializedNode,
};
use crate::interactive::InteractiveRegistry;
use crate::mirror::Mirror;
use crate::serializer::{SerializeManifests, Serializer};
use crate::stylesheet::StylesheetManager;
use pagetape_dom::{DocId, NodeRef, Page};
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

/// Child-frame id -> parent-frame id, one per cross-origin iframe.
#[derive(Debug, Default)]
pub struct CrossOriginIframeMirror {
    map: HashMap<i64, i64>,
}

impl CrossOriginIframeMirror {
    fn rewrite(&mut self, remote_id: i64, mirror: &mut Mirror) -> i64 {
        if remote_id <= 0 {
            return remote_id;
        }
        *self.map.entry(remote_id).or_insert_with(|| mirror.next_id())
    }
}

/// Child-frame style id -> parent-frame style id.
#[derive(Debug, Default)]
pub struct CrossOriginStyleMirror {
    map: HashMap<u32, u32>,
}

impl CrossOriginStyleMirror {
    fn rewrite(&mut self, remote_id: u32, sheets: &mut StylesheetManager) -> u32 {
        *self
            .map
            .entry(remote_id)
            .or_insert_with(|| sheets.next_style_id())
    }
}

/// Wire shape of a child frame's forwarded message.
#[derive(Debug, Deserialize)]
struct FrameMessagePayload {
    #[serde(rename = "type")]
    kind: String,
    event: Event,
    origin: String,
    #[serde(rename = "isCheckout", default)]
    is_checkout: bool,
}

#[derive(Debug, Default)]
pub struct IframeManager {
    /// Same-origin iframes already woven into the stream.
    attached: HashMap<NodeRef, DocId>,
    node_mirrors: HashMap<NodeRef, CrossOriginIframeMirror>,
    style_mirrors: HashMap<NodeRef, CrossOriginStyleMirror>,
}

impl IframeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_attached(&mut self, iframes: impl IntoIterator<Item = (NodeRef, DocId)>) {
        self.attached.extend(iframes);
    }

    pub fn is_attached(&self, element: NodeRef) -> bool {
        self.attached.contains_key(&element)
    }

    pub fn reset(&mut self) {
        self.attached.clear();
        self.node_mirrors.clear();
        self.style_mirrors.clear();
    }

    /// A same-origin iframe finished loading after the snapshot: serialize
    /// its document and weave it in as an attach mutation. Ids come from
    /// the parent's mirror.
    pub fn attach_iframe(
        &mut self,
        element: NodeRef,
        doc: DocId,
        page: &Page,
        mirror: &mut Mirror,
        options: &RecordOptions,
        registry: &InteractiveRegistry,
    ) -> Result<Option<(MutationData, SerializeManifests)>> {
        let parent_id = mirror.get_id(Some(element));
        if parent_id <= 0 {
            return Ok(None);
        }
        if self.attached.insert(element, doc).is_some() {
            // Already woven in by the snapshot
            return Ok(None);
        }

        let output = Serializer::new(page, mirror, options, registry).serialize_document(doc)?;
        let mut data = MutationData::new();
        data.is_attach_iframe = Some(true);
        data.adds.push(AddedNodeMutation {
            parent_id,
            next_id: None,
            node: output.node,
        });
        Ok(Some((data, output.manifests)))
    }

    /// One message posted by a cross-origin child. Returns the event with
    /// ids rewritten into the parent's space, ready for re-emission.
    pub fn handle_message(
        &mut self,
        element: NodeRef,
        origin: &str,
        payload: &str,
        page: &Page,
        mirror: &mut Mirror,
        sheets: &mut StylesheetManager,
    ) -> Result<Option<(Event, bool)>> {
        let message: FrameMessagePayload = serde_json::from_str(payload)
            .map_err(|e| Error::new(crate::error::ErrorCode::Unknown, e.to_string()))?;
        if message.kind != "rrweb" {
            return Ok(None);
        }
        if !self.origin_allowed(element, origin, &message.origin, page) {
            tracing::warn!(origin, "dropping frame message with mismatched origin");
            return Ok(None);
        }

        let mut event = message.event;
        let node_mirror = self.node_mirrors.entry(element).or_default();
        let style_mirror = self.style_mirrors.entry(element).or_default();
        rewrite_event(&mut event, node_mirror, style_mirror, mirror, sheets);
        Ok(Some((event, message.is_checkout)))
    }

    fn origin_allowed(
        &self,
        element: NodeRef,
        transport_origin: &str,
        claimed_origin: &str,
        page: &Page,
    ) -> bool {
        if transport_origin != claimed_origin {
            return false;
        }
        let src = match page.attr(element, "src") {
            Some(src) => src,
            None => return false,
        };
        match (Url::parse(&src), Url::parse(claimed_origin)) {
            (Ok(src), Ok(claimed)) => {
                src.origin() == claimed.origin()
            }
            _ => false,
        }
    }
}

fn rewrite_event(
    event: &mut Event,
    ids: &mut CrossOriginIframeMirror,
    styles: &mut CrossOriginStyleMirror,
    mirror: &mut Mirror,
    sheets: &mut StylesheetManager,
) {
    match &mut event.data {
        EventData::FullSnapshot(snapshot) => rewrite_node(&mut snapshot.node, ids, mirror),
        EventData::Incremental(data) => match data {
            IncrementalData::Mutation(m) => {
                for text in &mut m.texts {
                    text.id = ids.rewrite(text.id, mirror);
                }
                for attr in &mut m.attributes {
                    attr.id = ids.rewrite(attr.id, mirror);
                }
                for remove in &mut m.removes {
                    remove.id = ids.rewrite(remove.id, mirror);
                    remove.parent_id = ids.rewrite(remove.parent_id, mirror);
                }
                for add in &mut m.adds {
                    add.parent_id = ids.rewrite(add.parent_id, mirror);
                    if let Some(next) = add.next_id {
                        add.next_id = Some(ids.rewrite(next, mirror));
                    }
                    rewrite_node(&mut add.node, ids, mirror);
                }
            }
            IncrementalData::MouseMove(m) => {
                for position in &mut m.positions {
                    position.id = ids.rewrite(position.id, mirror);
                }
            }
            IncrementalData::MouseInteraction(m) => m.id = ids.rewrite(m.id, mirror),
            IncrementalData::Scroll(s) => s.id = ids.rewrite(s.id, mirror),
            IncrementalData::Input(i) => i.id = ids.rewrite(i.id, mirror),
            IncrementalData::MediaInteraction(m) => m.id = ids.rewrite(m.id, mirror),
            IncrementalData::CanvasMutation(c) => c.id = ids.rewrite(c.id, mirror),
            IncrementalData::StyleSheetRule(s) => {
                if let Some(id) = s.id {
                    s.id = Some(ids.rewrite(id, mirror));
                }
                if let Some(style_id) = s.style_id {
                    s.style_id = Some(styles.rewrite(style_id, sheets));
                }
            }
            IncrementalData::StyleDeclaration(s) => {
                if let Some(id) = s.id {
                    s.id = Some(ids.rewrite(id, mirror));
                }
                if let Some(style_id) = s.style_id {
                    s.style_id = Some(styles.rewrite(style_id, sheets));
                }
            }
            IncrementalData::Selection(s) => {
                for range in &mut s.ranges {
                    range.start = ids.rewrite(range.start, mirror);
                    range.end = ids.rewrite(range.end, mirror);
                }
            }
            IncrementalData::AdoptedStyleSheet(a) => {
                a.id = ids.rewrite(a.id, mirror);
                for style_id in &mut a.style_ids {
                    *style_id = styles.rewrite(*style_id, sheets);
                }
                for style in &mut a.styles {
                    style.style_id = styles.rewrite(style.style_id, sheets);
                }
            }
            IncrementalData::VisibilityMutation(v) => {
                for change in &mut v.mutations {
                    change.id = ids.rewrite(change.id, mirror);
                }
            }
            IncrementalData::ViewportResize(_)
            | IncrementalData::Font(_)
            | IncrementalData::Log(_)
            | IncrementalData::CustomElement(_) => {}
        },
        _ => {}
    }
}

fn rewrite_node(
    node: &mut SerializedNode,
    ids: &mut CrossOriginIframeMirror,
    mirror: &mut Mirror,
) {
    node.id = ids.rewrite(node.id, mirror);
    if let Some(root_id) = node.root_id {
        node.root_id = Some(ids.rewrite(root_id, mirror));
    }
    for child in &mut node.child_nodes {
        rewrite_node(child, ids, mirror);
    }
}
