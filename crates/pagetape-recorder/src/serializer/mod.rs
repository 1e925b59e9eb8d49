//! One-shot serialization of a live subtree into an id-addressed tree

pub mod css;
pub mod locate;
pub mod mask;
pub mod slim;

use crate::config::RecordOptions;
use crate::error::{Error, Result};
use crate::event::{AttrValue, SerializedNode};
use crate::interactive::InteractiveRegistry;
use crate::mirror::Mirror;
use crate::visibility::{self, VisibilityOptions};
use pagetape_dom::{DocId, NodeData, NodeRef, Page};
use std::collections::HashMap;

/// Follow-up work a serialization pass surfaced for the managers.
#[derive(Debug, Default)]
pub struct SerializeManifests {
    /// Same-origin iframes whose documents were inlined.
    pub iframes: Vec<(NodeRef, DocId)>,
    /// `<link rel="stylesheet">` elements whose rules were not readable
    /// yet; the stylesheet manager re-emits them once loaded.
    pub pending_links: Vec<NodeRef>,
    /// Shadow roots encountered, for the shadow DOM manager.
    pub shadow_roots: Vec<NodeRef>,
}

/// Serialization result: the tree plus the follow-up work it surfaced.
#[derive(Debug)]
pub struct SerializeOutput {
    pub node: SerializedNode,
    pub manifests: SerializeManifests,
}

pub struct Serializer<'a> {
    page: &'a Page,
    mirror: &'a mut Mirror,
    options: &'a RecordOptions,
    registry: &'a InteractiveRegistry,
    manifests: SerializeManifests,
}

impl<'a> Serializer<'a> {
    pub fn new(
        page: &'a Page,
        mirror: &'a mut Mirror,
        options: &'a RecordOptions,
        registry: &'a InteractiveRegistry,
    ) -> Self {
        Self {
            page,
            mirror,
            options,
            registry,
            manifests: SerializeManifests::default(),
        }
    }

    /// Serialize a whole document.
    pub fn serialize_document(mut self, doc: DocId) -> Result<SerializeOutput> {
        if !self.page.doc_ids().contains(&doc) {
            return Err(Error::serialization_failed("detached document"));
        }
        let root = self.page.doc(doc).root();
        let node = self
            .serialize_node(root)?
            .ok_or_else(|| Error::serialization_failed("document root"))?;
        Ok(SerializeOutput {
            node,
            manifests: self.manifests,
        })
    }

    /// Serialize one subtree, for mutation adds. The node is `None` when
    /// the policy drops it.
    pub fn serialize_subtree(
        mut self,
        node: NodeRef,
    ) -> Result<(Option<SerializedNode>, SerializeManifests)> {
        if self.page.node(node).map(|n| n.detached).unwrap_or(true) {
            return Err(Error::serialization_failed("detached subtree"));
        }
        let serialized = self.serialize_node(node)?;
        Ok((serialized, self.manifests))
    }

    fn serialize_node(&mut self, node: NodeRef) -> Result<Option<SerializedNode>> {
        let live = self
            .page
            .node(node)
            .ok_or_else(|| Error::serialization_failed("missing node"))?;

        match &live.data {
            NodeData::Document { compat_mode } => {
                let compat = compat_mode.clone();
                self.serialize_document_node(node, &compat).map(Some)
            }
            NodeData::Doctype {
                name,
                public_id,
                system_id,
            } => {
                let (name, public_id, system_id) =
                    (name.clone(), public_id.clone(), system_id.clone());
                let id = self.id_for(node);
                let serialized = SerializedNode::doctype(id, &name, &public_id, &system_id);
                self.remember(node, &serialized);
                Ok(Some(serialized))
            }
            NodeData::Element(_) => self.serialize_element(node),
            NodeData::Text { content } => {
                let content = content.clone();
                Ok(Some(self.serialize_text(node, &content)))
            }
            NodeData::Comment { content } => {
                if slim::should_prune(self.page, &self.options.slim_dom, node) {
                    self.mirror.mark_ignored(node);
                    return Ok(None);
                }
                let id = self.id_for(node);
                let serialized = SerializedNode::comment(id, content);
                self.remember(node, &serialized);
                Ok(Some(serialized))
            }
            NodeData::Cdata { content } => {
                let id = self.id_for(node);
                let serialized = SerializedNode::cdata(id, content);
                self.remember(node, &serialized);
                Ok(Some(serialized))
            }
        }
    }

    fn serialize_document_node(&mut self, root: NodeRef, compat_mode: &str) -> Result<SerializedNode> {
        let id = self.id_for(root);
        let mut serialized = SerializedNode::document(id, compat_mode);
        if root.doc != self.page.main() {
            serialized.root_id = Some(id);
        }
        self.remember(root, &serialized);

        for child in self.page.children(root) {
            if let Some(child_node) = self.serialize_node(child)? {
                serialized.child_nodes.push(child_node);
            }
        }
        Ok(serialized)
    }

    fn serialize_element(&mut self, node: NodeRef) -> Result<Option<SerializedNode>> {
        if self.is_ignored(node) {
            self.mirror.mark_ignored(node);
            return Ok(None);
        }
        if slim::should_prune(self.page, &self.options.slim_dom, node) {
            self.mirror.mark_ignored(node);
            return Ok(None);
        }

        let el = self
            .page
            .element(node)
            .ok_or_else(|| Error::serialization_failed("element"))?;
        let tag = el.tag.clone();
        let blocked = self.is_blocked(node);
        let id = self.id_for(node);
        let mut serialized = SerializedNode::element(id, &tag);

        if el.is_svg {
            serialized.is_svg = Some(true);
        }
        if node.doc != self.page.main() {
            serialized.root_id = Some(self.mirror.get_id(Some(self.page.doc(node.doc).root())).max(0));
        }

        if blocked {
            // Shape without content: bounding box only
            serialized.need_block = Some(true);
            let rect = self.page.rect(node);
            serialized
                .attributes
                .insert("rr_width".into(), AttrValue::Str(format!("{}px", rect.width)));
            serialized
                .attributes
                .insert("rr_height".into(), AttrValue::Str(format!("{}px", rect.height)));
            self.annotate(node, &mut serialized);
            self.remember(node, &serialized);
            return Ok(Some(serialized));
        }

        serialized.attributes = self.serialize_attributes(node, &tag);
        self.annotate(node, &mut serialized);
        self.remember(node, &serialized);

        // Children
        for child in self.page.children(node) {
            if let Some(child_node) = self.serialize_node(child)? {
                serialized.child_nodes.push(child_node);
            }
        }

        // Shadow tree, inlined under the host with the shadow flags set
        if let Some(shadow_root_id) = self.page.element(node).and_then(|el| el.shadow_root) {
            let shadow_root = NodeRef::new(node.doc, shadow_root_id);
            serialized.is_shadow_host = Some(true);
            self.manifests.shadow_roots.push(shadow_root);
            for child in self.page.children(shadow_root) {
                if let Some(mut child_node) = self.serialize_node(child)? {
                    child_node.is_shadow = Some(true);
                    serialized.child_nodes.push(child_node);
                }
            }
        }

        // Same-origin iframe documents are serialized in place
        if let Some(content_doc) = self.page.element(node).and_then(|el| el.content_doc) {
            self.manifests.iframes.push((node, content_doc));
            let child_root = self.page.doc(content_doc).root();
            if let Some(doc_node) = self.serialize_node(child_root)? {
                serialized.child_nodes.push(doc_node);
            }
        }

        Ok(Some(serialized))
    }

    fn serialize_text(&mut self, node: NodeRef, content: &str) -> SerializedNode {
        let parent = self.page.parent(node);
        let parent_tag = parent.and_then(|p| self.page.tag(p)).unwrap_or("");
        let id = self.id_for(node);

        let mut text = content.to_string();
        if parent_tag != "style"
            && parent_tag != "script"
            && parent
                .map(|p| mask::should_mask_text(self.page, self.options, p))
                .unwrap_or(false)
        {
            text = mask::mask_text(self.options, &text);
        }

        let mut serialized = SerializedNode::text(id, &text);
        if parent_tag == "style" {
            serialized.is_style = Some(true);
        }
        self.remember(node, &serialized);
        serialized
    }

    fn serialize_attributes(&mut self, node: NodeRef, tag: &str) -> std::collections::BTreeMap<String, AttrValue> {
        let mut out = std::collections::BTreeMap::new();
        let el = match self.page.element(node) {
            Some(el) => el,
            None => return out,
        };

        for (name, value) in &el.attrs {
            if let Some(exclude) = &self.options.exclude_attribute {
                if exclude.is_match(name) {
                    continue;
                }
            }
            if tag == "iframe" && name == "src" && !self.keep_iframe_src(value) {
                continue;
            }
            out.insert(name.clone(), AttrValue::Str(value.clone()));
        }

        // Form state: the live value wins over the value attribute
        if matches!(tag, "input" | "textarea" | "select") {
            let value = el
                .value
                .clone()
                .or_else(|| el.attr("value").map(String::from))
                .unwrap_or_default();
            if !value.is_empty() {
                let masked = mask::mask_input_value(self.page, self.options, node, &value);
                out.insert("value".into(), AttrValue::Str(masked.unwrap_or(value)));
            }
            if mask::is_password(self.page, node) {
                out.insert("data-rr-is-password".into(), AttrValue::Bool(true));
            }
            if el.checked == Some(true) {
                out.insert("checked".into(), AttrValue::Bool(true));
            }
        }

        // Stylesheet inlining
        if self.options.inline_stylesheet {
            if let Some(sheet_id) = el.sheet {
                if let Some(sheet) = self.page.sheet(sheet_id) {
                    let css_text = if tag == "style" {
                        let child_texts: Vec<String> = self
                            .page
                            .children(node)
                            .into_iter()
                            .filter_map(|c| self.page.text(c))
                            .collect();
                        css::style_element_css(self.page, sheet, &child_texts)
                    } else {
                        css::stringify_sheet(self.page, sheet)
                    };
                    match css_text {
                        Some(text) => {
                            out.insert("_cssText".into(), AttrValue::Str(text));
                        }
                        None if tag == "link" => self.manifests.pending_links.push(node),
                        None => {}
                    }
                }
            }
        }

        // Canvas bitmaps, only when the canvas has been drawn to
        if self.options.record_canvas && tag == "canvas" && !self.page.canvas_is_blank(node) {
            if let Some(data_url) = self
                .page
                .canvas_state(node)
                .and_then(|c| c.data_url.clone())
            {
                out.insert("rr_dataURL".into(), AttrValue::Str(data_url));
            }
        }

        // Inline images
        if self.options.inline_images && tag == "img" {
            if let Some(data_url) = self.page.image_data_url(node) {
                out.insert("rr_dataURL".into(), AttrValue::Str(data_url));
            }
        }

        // Scroll offsets survive as rr_ attributes
        if el.scroll_x != 0.0 {
            out.insert("rr_scrollLeft".into(), AttrValue::Num(el.scroll_x));
        }
        if el.scroll_y != 0.0 {
            out.insert("rr_scrollTop".into(), AttrValue::Num(el.scroll_y));
        }

        out
    }

    /// xpath, selector and the visibility/interactivity flags.
    fn annotate(&mut self, node: NodeRef, serialized: &mut SerializedNode) {
        serialized.xpath = Some(locate::xpath(self.page, node));
        serialized.selector = Some(locate::selector(self.page, node));

        let vis = &self.options.sampling.visibility;
        let entries = visibility::evaluate(
            self.page,
            [&node],
            &HashMap::new(),
            &VisibilityOptions {
                root: None,
                threshold: vis.threshold,
                sensitivity: vis.sensitivity,
                root_margin: vis.root_margin.clone(),
            },
        );
        serialized.is_visible = Some(entries.get(&node).map(|e| e.is_visible).unwrap_or(false));
        serialized.is_interactive = Some(self.registry.is_interactive(self.page, node));
    }

    fn keep_iframe_src(&self, src: &str) -> bool {
        self.options
            .keep_iframe_src_fn
            .as_ref()
            .map(|f| f(src))
            .unwrap_or(false)
    }

    fn is_blocked(&self, node: NodeRef) -> bool {
        let el = match self.page.element(node) {
            Some(el) => el,
            None => return false,
        };
        if el.has_class(&self.options.block_class) {
            return true;
        }
        self.options
            .block_selector
            .as_deref()
            .map(|sel| locate::matches(self.page, node, sel))
            .unwrap_or(false)
    }

    fn is_ignored(&self, node: NodeRef) -> bool {
        let el = match self.page.element(node) {
            Some(el) => el,
            None => return false,
        };
        if el.has_class(&self.options.ignore_class) {
            return true;
        }
        self.options
            .ignore_selector
            .as_deref()
            .map(|sel| locate::matches(self.page, node, sel))
            .unwrap_or(false)
    }

    /// Stable id: reuse the mirror's assignment, allocate otherwise.
    fn id_for(&mut self, node: NodeRef) -> i64 {
        if self.mirror.has_node(node) {
            self.mirror.get_id(Some(node))
        } else {
            self.mirror.next_id()
        }
    }

    /// Register with the mirror. The stored copy drops children; the tree
    /// shape lives in the emitted event, not the map.
    fn remember(&mut self, node: NodeRef, serialized: &SerializedNode) {
        let mut copy = serialized.clone();
        copy.child_nodes = Vec::new();
        self.mirror.add(node, copy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordOptions;
    use crate::interactive::InteractiveRegistry;
    use pagetape_dom::{Page, Rect};

    fn serialize(page: &Page, options: &RecordOptions) -> SerializeOutput {
        let mut mirror = Mirror::new();
        let registry = InteractiveRegistry::new();
        Serializer::new(page, &mut mirror, options, &registry)
            .serialize_document(page.main())
            .unwrap()
    }

    fn base_page() -> Page {
        let mut page = Page::new("https://example.com/");
        let main = page.main();
        let body = page.doc(main).body();
        let div = page.create_element(main, "div");
        page.append_child(body, div);
        page.set_attribute(div, "id", "x");
        let text = page.create_text(main, "hi");
        page.append_child(div, text);
        page.set_rect(div, Rect::new(0.0, 0.0, 100.0, 20.0));
        page
    }

    fn find<'a>(node: &'a SerializedNode, tag: &str) -> Option<&'a SerializedNode> {
        if node.tag_name.as_deref() == Some(tag) {
            return Some(node);
        }
        node.child_nodes.iter().find_map(|c| find(c, tag))
    }

    #[test]
    fn document_tree_is_id_addressed() {
        let page = base_page();
        let out = serialize(&page, &RecordOptions::default());
        assert_eq!(out.node.node_type, crate::event::NodeType::Document);
        let div = find(&out.node, "div").unwrap();
        assert!(div.id > 0);
        assert_eq!(div.attributes.get("id").unwrap().as_str(), Some("x"));
        assert_eq!(div.selector.as_deref(), Some("#x"));
        assert_eq!(div.xpath.as_deref(), Some("//*[@id=\"x\"]"));
        assert_eq!(div.is_visible, Some(true));
        assert_eq!(div.is_interactive, Some(false));
        assert_eq!(div.child_nodes[0].text_content.as_deref(), Some("hi"));
    }

    #[test]
    fn blocked_element_keeps_shape_only() {
        let mut page = base_page();
        let main = page.main();
        let body = page.doc(main).body();
        let secret = page.create_element(main, "section");
        page.append_child(body, secret);
        page.set_attribute(secret, "class", "rr-block");
        page.set_rect(secret, Rect::new(0.0, 0.0, 300.0, 200.0));
        let child = page.create_text(main, "hidden");
        page.append_child(secret, child);

        let out = serialize(&page, &RecordOptions::default());
        let section = find(&out.node, "section").unwrap();
        assert_eq!(section.need_block, Some(true));
        assert!(section.child_nodes.is_empty());
        assert_eq!(
            section.attributes.get("rr_width").unwrap().as_str(),
            Some("300px")
        );
    }

    #[test]
    fn ignored_subtree_is_dropped() {
        let mut page = base_page();
        let main = page.main();
        let body = page.doc(main).body();
        let noise = page.create_element(main, "aside");
        page.append_child(body, noise);
        page.set_attribute(noise, "class", "rr-ignore");

        let mut mirror = Mirror::new();
        let registry = InteractiveRegistry::new();
        let options = RecordOptions::default();
        let out = Serializer::new(&page, &mut mirror, &options, &registry)
            .serialize_document(page.main())
            .unwrap();
        assert!(find(&out.node, "aside").is_none());
        assert_eq!(mirror.get_id(Some(noise)), crate::mirror::IGNORED_NODE);
    }

    #[test]
    fn password_value_is_masked_in_snapshot() {
        let mut page = base_page();
        let main = page.main();
        let body = page.doc(main).body();
        let input = page.create_element(main, "input");
        page.append_child(body, input);
        page.set_attribute(input, "type", "password");
        page.input(input, "secret", false);

        let out = serialize(&page, &RecordOptions::default());
        let input_node = find(&out.node, "input").unwrap();
        assert_eq!(
            input_node.attributes.get("value").unwrap().as_str(),
            Some("******")
        );
        assert_eq!(
            input_node.attributes.get("data-rr-is-password"),
            Some(&AttrValue::Bool(true))
        );
    }

    #[test]
    fn shadow_children_carry_flags() {
        let mut page = base_page();
        let main = page.main();
        let body = page.doc(main).body();
        let host = page.create_element(main, "widget-card");
        page.append_child(body, host);
        let root = page.attach_shadow(host);
        let span = page.create_element(main, "span");
        page.append_child(root, span);

        let out = serialize(&page, &RecordOptions::default());
        let host_node = find(&out.node, "widget-card").unwrap();
        assert_eq!(host_node.is_shadow_host, Some(true));
        let span_node = find(host_node, "span").unwrap();
        assert_eq!(span_node.is_shadow, Some(true));
        assert_eq!(out.manifests.shadow_roots.len(), 1);
    }

    #[test]
    fn same_origin_iframe_is_inlined_with_root_id() {
        let mut page = base_page();
        let main = page.main();
        let body = page.doc(main).body();
        let iframe = page.create_element(main, "iframe");
        page.append_child(body, iframe);
        let child_doc = page.create_document("https://example.com/frame");
        let child_body = page.doc(child_doc).body();
        let button = page.create_element(child_doc, "button");
        page.append_child(child_body, button);
        page.attach_iframe_document(iframe, child_doc);

        let out = serialize(&page, &RecordOptions::default());
        let iframe_node = find(&out.node, "iframe").unwrap();
        assert_eq!(out.manifests.iframes.len(), 1);
        let doc_node = &iframe_node.child_nodes[0];
        assert_eq!(doc_node.node_type, crate::event::NodeType::Document);
        let button_node = find(doc_node, "button").unwrap();
        assert!(button_node.root_id.is_some());
        assert!(button_node.id > 0);
    }

    #[test]
    fn style_element_css_is_inlined() {
        let mut page = base_page();
        let main = page.main();
        let head = page.doc(main).head();
        let style = page.create_element(main, "style");
        page.append_child(head, style);
        let text = page.create_text(main, ".a { color: red; }");
        page.append_child(style, text);
        page.create_stylesheet(Some(style), vec![".a { color: red; }".to_string()]);

        let out = serialize(&page, &RecordOptions::default());
        let style_node = find(&out.node, "style").unwrap();
        assert_eq!(
            style_node.attributes.get("_cssText").unwrap().as_str(),
            Some(".a { color: red; }")
        );
        assert_eq!(style_node.child_nodes[0].is_style, Some(true));
    }
}
