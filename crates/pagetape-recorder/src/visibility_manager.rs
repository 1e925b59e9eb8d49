//! Frame-paced batching of visibility changes into incremental events

use crate::config::{VisibilityFlushMode, VisibilitySampling};
use crate::event::{IncrementalSource, VisibilityChange, VisibilityMutationData};
use crate::mirror::Mirror;
use crate::visibility::{self, VisibilityEntry, VisibilityOptions};
use pagetape_dom::{MutationRecord, NodeRef, Page};
use std::collections::{HashMap, HashSet};

/// Drives the evaluator on animation frames and turns reportable changes
/// into batched `VisibilityMutation` events.
pub struct VisibilityManager {
    sampling: VisibilitySampling,
    observed: Vec<NodeRef>,
    observed_set: HashSet<NodeRef>,
    previous: HashMap<NodeRef, VisibilityEntry>,
    /// Pending changes keyed by element, last writer wins, emission in
    /// first-change order.
    buffer: Vec<(NodeRef, VisibilityChange)>,
    initialized: bool,
    frozen: bool,
    locked: bool,
    last_eval: Option<u64>,
    last_emit: Option<u64>,
    debounce_deadline: Option<u64>,
}

impl VisibilityManager {
    pub fn new(sampling: VisibilitySampling) -> Self {
        Self {
            sampling,
            observed: Vec::new(),
            observed_set: HashSet::new(),
            previous: HashMap::new(),
            buffer: Vec::new(),
            initialized: false,
            frozen: false,
            locked: false,
            last_eval: None,
            last_emit: None,
            debounce_deadline: None,
        }
    }

    /// Seed the observed set with every element currently attached.
    pub fn observe_page(&mut self, page: &Page) {
        for doc in page.doc_ids() {
            for node in page.attached_elements(doc) {
                self.observe(node);
            }
        }
    }

    pub fn observe(&mut self, node: NodeRef) {
        if self.observed_set.insert(node) {
            self.observed.push(node);
        }
    }

    pub fn unobserve(&mut self, node: NodeRef) {
        if self.observed_set.remove(&node) {
            self.observed.retain(|&n| n != node);
            self.previous.remove(&node);
            self.buffer.retain(|(n, _)| *n != node);
        }
    }

    /// Keep the observed set in sync with structural mutations.
    pub fn on_mutation(&mut self, page: &Page, record: &MutationRecord) {
        if let MutationRecord::ChildList { added, removed, .. } = record {
            for &node in added {
                for desc in page.descendants(node) {
                    if page.element(desc).is_some() {
                        self.observe(desc);
                    }
                }
            }
            for &node in removed {
                let gone: Vec<NodeRef> = self
                    .observed
                    .iter()
                    .copied()
                    .filter(|&n| n == node || has_ancestor(page, n, node))
                    .collect();
                for n in gone {
                    self.unobserve(n);
                }
            }
        }
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Cancel pending work and forget all state.
    pub fn reset(&mut self) {
        self.observed.clear();
        self.observed_set.clear();
        self.previous.clear();
        self.buffer.clear();
        self.initialized = false;
        self.last_eval = None;
        self.last_emit = None;
        self.debounce_deadline = None;
    }

    /// One animation frame. Returns a batch when the flush policy fires.
    pub fn on_frame(
        &mut self,
        now: u64,
        page: &Page,
        mirror: &Mirror,
    ) -> Option<VisibilityMutationData> {
        if self.frozen || self.locked || self.observed.is_empty() {
            return None;
        }

        let due = match self.last_eval {
            Some(last) => now.saturating_sub(last) >= self.sampling.raf_throttle,
            None => true,
        };
        if due {
            self.last_eval = Some(now);
            self.evaluate_pass(page, mirror, now);
        }

        self.flush_due(now)
    }

    fn evaluate_pass(&mut self, page: &Page, mirror: &Mirror, now: u64) {
        let options = VisibilityOptions {
            root: None,
            threshold: self.sampling.threshold,
            sensitivity: self.sampling.sensitivity,
            root_margin: self.sampling.root_margin.clone(),
        };
        let entries = visibility::evaluate(page, self.observed.iter(), &self.previous, &options);

        let mut changed_any = false;
        for (node, entry) in &entries {
            if visibility::changed(self.previous.get(node), entry, self.sampling.sensitivity) {
                let id = mirror.get_id(Some(*node));
                if id > 0 {
                    changed_any = true;
                    self.record(
                        *node,
                        VisibilityChange {
                            id,
                            is_visible: entry.is_visible,
                            ratio: entry.intersection_ratio,
                        },
                    );
                }
            }
        }
        self.previous = entries;

        if !self.initialized {
            // The very first pass establishes the baseline silently
            self.initialized = true;
            self.buffer.clear();
            return;
        }

        if changed_any && self.sampling.mode == VisibilityFlushMode::Debounce {
            self.debounce_deadline = Some(now + self.sampling.debounce);
        }
    }

    fn record(&mut self, node: NodeRef, change: VisibilityChange) {
        match self.buffer.iter_mut().find(|(n, _)| *n == node) {
            Some((_, existing)) => *existing = change,
            None => self.buffer.push((node, change)),
        }
    }

    fn flush_due(&mut self, now: u64) -> Option<VisibilityMutationData> {
        if self.buffer.is_empty() {
            return None;
        }
        let fire = match self.sampling.mode {
            VisibilityFlushMode::None => true,
            VisibilityFlushMode::Debounce => self
                .debounce_deadline
                .map(|deadline| now >= deadline)
                .unwrap_or(false),
            VisibilityFlushMode::Throttle => match self.last_emit {
                Some(last) => now.saturating_sub(last) >= self.sampling.throttle,
                None => true,
            },
        };
        if !fire {
            return None;
        }

        self.last_emit = Some(now);
        self.debounce_deadline = None;
        let mutations: Vec<VisibilityChange> =
            self.buffer.drain(..).map(|(_, change)| change).collect();
        Some(VisibilityMutationData {
            source: IncrementalSource::VisibilityMutation,
            mutations,
        })
    }
}

fn has_ancestor(page: &Page, node: NodeRef, ancestor: NodeRef) -> bool {
    let mut current = page.parent(node);
    while let Some(n) = current {
        if n == ancestor {
            return true;
        }
        current = page.parent(n);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VisibilitySampling;
    use crate::event::SerializedNode;
    use pagetape_dom::{ComputedStyle, Page, Rect};

    fn fixture() -> (Page, Mirror, NodeRef) {
        let mut page = Page::new("https://example.com/");
        let main = page.main();
        let body = page.doc(main).body();
        let section = page.create_element(main, "section");
        page.append_child(body, section);
        page.set_rect(section, Rect::new(0.0, 0.0, 200.0, 100.0));
        page.take_notices();

        let mut mirror = Mirror::new();
        let id = mirror.next_id();
        mirror.add(section, SerializedNode::element(id, "section"));
        (page, mirror, section)
    }

    fn manager_for(page: &Page, sampling: VisibilitySampling) -> VisibilityManager {
        let mut manager = VisibilityManager::new(sampling);
        manager.observe_page(page);
        manager
    }

    #[test]
    fn initial_pass_is_suppressed() {
        let (page, mirror, _) = fixture();
        let mut manager = manager_for(&page, VisibilitySampling::default());
        assert!(manager.on_frame(0, &page, &mirror).is_none());
    }

    #[test]
    fn display_flip_emits_one_batch() {
        let (mut page, mirror, section) = fixture();
        page.set_style(
            section,
            ComputedStyle {
                display: "none".into(),
                ..Default::default()
            },
        );
        let mut manager = manager_for(&page, VisibilitySampling::default());
        assert!(manager.on_frame(0, &page, &mirror).is_none());

        page.set_style(section, ComputedStyle::default());
        let batch = manager.on_frame(16, &page, &mirror).unwrap();
        assert_eq!(batch.mutations.len(), 1);
        assert!(batch.mutations[0].is_visible);
        assert_eq!(batch.mutations[0].ratio, 1.0);

        // Stable state emits nothing further
        assert!(manager.on_frame(32, &page, &mirror).is_none());
    }

    #[test]
    fn last_writer_wins_within_a_batch() {
        let (mut page, mirror, section) = fixture();
        let mut manager = manager_for(
            &page,
            VisibilitySampling {
                mode: VisibilityFlushMode::Throttle,
                throttle: 100,
                ..Default::default()
            },
        );
        manager.on_frame(0, &page, &mirror);

        // First flip is buffered but throttled
        page.set_style(
            section,
            ComputedStyle {
                display: "none".into(),
                ..Default::default()
            },
        );
        let first = manager.on_frame(10, &page, &mirror);
        // Throttle window starts unconsumed, so the very first batch fires
        assert!(first.is_some());

        page.set_style(section, ComputedStyle::default());
        assert!(manager.on_frame(20, &page, &mirror).is_none());
        page.set_style(
            section,
            ComputedStyle {
                opacity: 0.0,
                ..Default::default()
            },
        );
        let batch = manager.on_frame(120, &page, &mirror).unwrap();
        assert_eq!(batch.mutations.len(), 1);
        assert!(!batch.mutations[0].is_visible);
    }

    #[test]
    fn frozen_manager_skips_frames() {
        let (mut page, mirror, section) = fixture();
        let mut manager = manager_for(&page, VisibilitySampling::default());
        manager.on_frame(0, &page, &mirror);
        manager.freeze();
        page.set_style(
            section,
            ComputedStyle {
                display: "none".into(),
                ..Default::default()
            },
        );
        assert!(manager.on_frame(16, &page, &mirror).is_none());
        manager.unfreeze();
        assert!(manager.on_frame(32, &page, &mirror).is_some());
    }

    #[test]
    fn mutation_sync_tracks_added_and_removed() {
        let (mut page, _mirror, section) = fixture();
        let mut manager = manager_for(&page, VisibilitySampling::default());
        let main = page.main();
        let div = page.create_element(main, "div");
        page.append_child(section, div);
        for notice in page.take_notices() {
            if let pagetape_dom::PageNotice::Mutation(record) = notice {
                manager.on_mutation(&page, &record);
            }
        }
        assert!(manager.observed_set.contains(&div));

        page.remove_child(section, div);
        for notice in page.take_notices() {
            if let pagetape_dom::PageNotice::Mutation(record) = notice {
                manager.on_mutation(&page, &record);
            }
        }
        assert!(!manager.observed_set.contains(&div));
    }

    #[test]
    fn debounce_waits_for_quiet() {
        let (mut page, mirror, section) = fixture();
        let mut manager = manager_for(
            &page,
            VisibilitySampling {
                mode: VisibilityFlushMode::Debounce,
                debounce: 50,
                ..Default::default()
            },
        );
        manager.on_frame(0, &page, &mirror);

        page.set_style(
            section,
            ComputedStyle {
                display: "none".into(),
                ..Default::default()
            },
        );
        assert!(manager.on_frame(10, &page, &mirror).is_none());
        assert!(manager.on_frame(30, &page, &mirror).is_none());
        // Quiet period elapsed
        let batch = manager.on_frame(70, &page, &mirror).unwrap();
        assert_eq!(batch.mutations.len(), 1);
    }
}
