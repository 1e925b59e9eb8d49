//! Shadow DOM manager
//!
//! All documents and shadow trees share the page's single notice queue, so
//! no per-root observer install is needed; the manager keeps the set of
//! known roots so late-attached ones are recognized and mutation targets
//! inside shadow trees resolve against their hosts.

use pagetape_dom::{NodeRef, Page, PageNotice};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct ShadowDomManager {
    roots: HashSet<NodeRef>,
}

impl ShadowDomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roots found by a serialization pass.
    pub fn track_roots(&mut self, roots: impl IntoIterator<Item = NodeRef>) {
        self.roots.extend(roots);
    }

    /// A root opened after the snapshot.
    pub fn handle(&mut self, notice: &PageNotice, page: &Page) {
        if let PageNotice::ShadowAttached { host } = notice {
            if let Some(root_id) = page.element(*host).and_then(|el| el.shadow_root) {
                self.roots.insert(NodeRef::new(host.doc, root_id));
            }
        }
    }

    pub fn is_known_root(&self, node: NodeRef) -> bool {
        self.roots.contains(&node)
    }

    pub fn reset(&mut self) {
        self.roots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetape_dom::Page;

    #[test]
    fn late_attached_roots_are_tracked() {
        let mut page = Page::new("https://example.com/");
        let main = page.main();
        let body = page.doc(main).body();
        let host = page.create_element(main, "x-card");
        page.append_child(body, host);
        page.take_notices();

        let mut manager = ShadowDomManager::new();
        let root = page.attach_shadow(host);
        for notice in page.take_notices() {
            manager.handle(&notice, &page);
        }
        assert!(manager.is_known_root(root));
    }
}
