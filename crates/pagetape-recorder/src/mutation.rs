//! Per-frame coalescing of DOM mutation records

use crate::config::RecordOptions;
use crate::event::{AddedNodeMutation, AttrValue, AttributeMutation, MutationData, RemovedNodeMutation, TextMutation};
use crate::interactive::InteractiveRegistry;
use crate::mirror::Mirror;
use crate::serializer::{mask, SerializeManifests, Serializer};
use pagetape_dom::{MutationRecord, NodeRef, Page};
use std::collections::{HashMap, HashSet};

/// Buffers mutation records between animation frames and flushes them as
/// one coalesced mutation event.
///
/// `locked` defers emission while a full snapshot is in progress;
/// `frozen` defers it across a pause. Both keep accumulating.
#[derive(Debug, Default)]
pub struct MutationBuffer {
    added: Vec<NodeRef>,
    added_set: HashSet<NodeRef>,
    removed: Vec<(NodeRef, NodeRef)>,
    attributes: Vec<(NodeRef, String)>,
    texts: Vec<NodeRef>,
    locked: bool,
    frozen: bool,
}

impl MutationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: &MutationRecord) {
        match record {
            MutationRecord::ChildList { added, removed, .. } => {
                for &node in added {
                    // A node removed earlier in the same frame moved here
                    self.removed.retain(|&(_, r)| r != node);
                    if self.added_set.insert(node) {
                        self.added.push(node);
                    }
                }
                for &node in removed {
                    if self.added_set.remove(&node) {
                        // Added and removed within one frame: drop both
                        self.added.retain(|&a| a != node);
                        continue;
                    }
                    self.removed.push((record.target(), node));
                }
            }
            MutationRecord::Attributes { target, name, .. } => {
                self.attributes.push((*target, name.clone()));
            }
            MutationRecord::CharacterData { target, .. } => {
                self.texts.push(*target);
            }
        }
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.attributes.is_empty()
            && self.texts.is_empty()
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.added_set.clear();
        self.removed.clear();
        self.attributes.clear();
        self.texts.clear();
    }

    /// Coalesce everything buffered into one mutation event. Returns
    /// `None` while suppressed or when nothing survives coalescing.
    pub fn flush(
        &mut self,
        page: &Page,
        mirror: &mut Mirror,
        options: &RecordOptions,
        registry: &InteractiveRegistry,
    ) -> Option<(MutationData, SerializeManifests)> {
        if self.locked || self.frozen || self.is_empty() {
            return None;
        }

        let mut data = MutationData::new();
        let mut manifests = SerializeManifests::default();

        // Removes come first so replay detaches before attaching
        for &(parent, child) in &self.removed {
            let id = mirror.get_id(Some(child));
            if id <= 0 {
                // Never introduced to the stream
                continue;
            }
            let parent_id = mirror.get_id(Some(parent));
            data.removes.push(RemovedNodeMutation {
                parent_id,
                id,
                is_shadow: in_shadow_tree(page, child).then_some(true),
            });
        }
        for &(_, child) in &self.removed {
            mirror.remove_node_from_map(child, page);
        }

        // Top-most added roots; nested adds serialize inside their parent
        for &node in &self.added {
            if self.has_added_ancestor(page, node) {
                continue;
            }
            let mut parent = match page.parent(node) {
                Some(p) => p,
                None => continue,
            };
            // Adds into a shadow tree resolve against the host
            let in_shadow = page
                .element(parent)
                .map(|el| el.is_shadow_root)
                .unwrap_or(false);
            if in_shadow {
                parent = match page.parent(parent) {
                    Some(host) => host,
                    None => continue,
                };
            }
            let parent_id = mirror.get_id(Some(parent));
            if parent_id <= 0 {
                tracing::warn!(?node, "dropping add with unresolvable parent");
                continue;
            }
            let serializer = Serializer::new(page, mirror, options, registry);
            match serializer.serialize_subtree(node) {
                Ok((Some(mut serialized), more)) => {
                    if in_shadow {
                        serialized.is_shadow = Some(true);
                    }
                    let next_id = next_sibling_id(page, mirror, node);
                    manifests.iframes.extend(more.iframes);
                    manifests.pending_links.extend(more.pending_links);
                    manifests.shadow_roots.extend(more.shadow_roots);
                    data.adds.push(AddedNodeMutation {
                        parent_id,
                        next_id,
                        node: serialized,
                    });
                }
                Ok((None, _)) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unserializable added subtree");
                }
            }
        }

        // Attribute edits: last value wins, reads taken from the live tree
        let mut attr_edits: HashMap<NodeRef, Vec<String>> = HashMap::new();
        for (node, name) in &self.attributes {
            let names = attr_edits.entry(*node).or_default();
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        for (node, names) in attr_edits {
            let id = mirror.get_id(Some(node));
            if id <= 0 || self.added_set.contains(&node) || self.has_added_ancestor(page, node) {
                continue;
            }
            if self.skip_title_mutation(page, options, node) {
                continue;
            }
            let mut attributes = std::collections::BTreeMap::new();
            for name in names {
                if let Some(exclude) = &options.exclude_attribute {
                    if exclude.is_match(&name) {
                        continue;
                    }
                }
                let value = page.attr(node, &name);
                let value = match value {
                    Some(v) if name == "value" => Some(
                        mask::mask_input_value(page, options, node, &v).unwrap_or(v),
                    ),
                    other => other,
                };
                attributes.insert(name, value.map(AttrValue::Str));
            }
            if !attributes.is_empty() {
                data.attributes.push(AttributeMutation { id, attributes });
            }
        }

        // Text edits, deduplicated to the final value
        let mut seen_texts = HashSet::new();
        for &node in &self.texts {
            if !seen_texts.insert(node) {
                continue;
            }
            let id = mirror.get_id(Some(node));
            if id <= 0 || self.has_added_ancestor(page, node) {
                continue;
            }
            if self.skip_title_mutation(page, options, node) {
                continue;
            }
            let value = page.text(node).map(|t| {
                let parent = page.parent(node);
                match parent {
                    Some(p) if mask::should_mask_text(page, options, p) => {
                        mask::mask_text(options, &t)
                    }
                    _ => t,
                }
            });
            data.texts.push(TextMutation { id, value });
        }

        self.clear();

        if data.is_empty() {
            None
        } else {
            Some((data, manifests))
        }
    }

    fn has_added_ancestor(&self, page: &Page, node: NodeRef) -> bool {
        let mut current = page.parent(node);
        while let Some(n) = current {
            if self.added_set.contains(&n) {
                return true;
            }
            current = page.parent(n);
        }
        false
    }

    fn skip_title_mutation(&self, page: &Page, options: &RecordOptions, node: NodeRef) -> bool {
        if !options.slim_dom.head_title_mutations {
            return false;
        }
        let element = match page.tag(node) {
            Some(_) => Some(node),
            None => page.parent(node),
        };
        element.and_then(|e| page.tag(e)) == Some("title")
    }
}

fn in_shadow_tree(page: &Page, node: NodeRef) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if page.element(n).map(|el| el.is_shadow_root).unwrap_or(false) {
            return true;
        }
        current = page.parent(n);
    }
    false
}

fn next_sibling_id(page: &Page, mirror: &Mirror, node: NodeRef) -> Option<i64> {
    let parent = page.parent(node)?;
    let siblings = page.children(parent);
    let pos = siblings.iter().position(|&s| s == node)?;
    for &sibling in &siblings[pos + 1..] {
        let id = mirror.get_id(Some(sibling));
        if id > 0 {
            return Some(id);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordOptions;
    use pagetape_dom::PageNotice;

    struct Fixture {
        page: Page,
        mirror: Mirror,
        options: RecordOptions,
        registry: InteractiveRegistry,
        buffer: MutationBuffer,
    }

    impl Fixture {
        fn new() -> Self {
            let page = Page::new("https://example.com/");
            let mut mirror = Mirror::new();
            let options = RecordOptions::default();
            let registry = InteractiveRegistry::new();
            // Baseline snapshot so structural nodes have ids
            Serializer::new(&page, &mut mirror, &options, &registry)
                .serialize_document(page.main())
                .unwrap();
            Self {
                page,
                mirror,
                options,
                registry,
                buffer: MutationBuffer::new(),
            }
        }

        fn drain(&mut self) {
            for notice in self.page.take_notices() {
                if let PageNotice::Mutation(record) = notice {
                    self.buffer.push(&record);
                }
            }
        }

        fn flush(&mut self) -> Option<MutationData> {
            self.buffer
                .flush(&self.page, &mut self.mirror, &self.options, &self.registry)
                .map(|(data, _)| data)
        }
    }

    #[test]
    fn add_then_remove_in_one_frame_vanishes() {
        let mut f = Fixture::new();
        let main = f.page.main();
        let body = f.page.doc(main).body();
        let div = f.page.create_element(main, "div");
        f.page.append_child(body, div);
        f.page.remove_child(body, div);
        f.drain();
        assert!(f.flush().is_none());
    }

    #[test]
    fn attribute_edit_on_removed_node_is_dropped() {
        let mut f = Fixture::new();
        let main = f.page.main();
        let body = f.page.doc(main).body();
        let div = f.page.create_element(main, "div");
        f.page.append_child(body, div);
        f.drain();
        let first = f.flush().unwrap();
        assert_eq!(first.adds.len(), 1);

        f.page.set_attribute(div, "class", "gone");
        f.page.remove_child(body, div);
        f.drain();
        let second = f.flush().unwrap();
        assert_eq!(second.removes.len(), 1);
        assert!(second.attributes.is_empty());
    }

    #[test]
    fn nested_adds_serialize_once() {
        let mut f = Fixture::new();
        let main = f.page.main();
        let body = f.page.doc(main).body();
        let outer = f.page.create_element(main, "div");
        let inner = f.page.create_element(main, "span");
        f.page.append_child(body, outer);
        f.page.append_child(outer, inner);
        f.drain();
        let data = f.flush().unwrap();
        assert_eq!(data.adds.len(), 1);
        let added = &data.adds[0].node;
        assert_eq!(added.tag_name.as_deref(), Some("div"));
        assert_eq!(added.child_nodes[0].tag_name.as_deref(), Some("span"));
    }

    #[test]
    fn attribute_last_write_wins() {
        let mut f = Fixture::new();
        let main = f.page.main();
        let body = f.page.doc(main).body();
        let div = f.page.create_element(main, "div");
        f.page.append_child(body, div);
        f.drain();
        f.flush().unwrap();

        f.page.set_attribute(div, "class", "a");
        f.page.set_attribute(div, "class", "b");
        f.drain();
        let data = f.flush().unwrap();
        assert_eq!(data.attributes.len(), 1);
        assert_eq!(
            data.attributes[0].attributes.get("class").unwrap(),
            &Some(AttrValue::Str("b".to_string()))
        );
    }

    #[test]
    fn locked_buffer_defers_and_flushes_later() {
        let mut f = Fixture::new();
        let main = f.page.main();
        let body = f.page.doc(main).body();
        f.buffer.lock();
        let div = f.page.create_element(main, "div");
        f.page.append_child(body, div);
        f.drain();
        assert!(f.flush().is_none());
        f.buffer.unlock();
        let data = f.flush().unwrap();
        assert_eq!(data.adds.len(), 1);
    }

    #[test]
    fn removed_node_leaves_id_maps() {
        let mut f = Fixture::new();
        let main = f.page.main();
        let body = f.page.doc(main).body();
        let div = f.page.create_element(main, "div");
        f.page.append_child(body, div);
        f.drain();
        f.flush().unwrap();
        let id = f.mirror.get_id(Some(div));
        assert!(id > 0);

        f.page.remove_child(body, div);
        f.drain();
        let data = f.flush().unwrap();
        assert_eq!(data.removes[0].id, id);
        assert_eq!(f.mirror.get_id(Some(div)), crate::mirror::UNKNOWN_NODE);
        // Serialized meta survives for stable equality checks
        assert!(f.mirror.get_meta(div).is_some());
    }
}
