//! Stylesheet objects shared between documents and elements

use crate::node::NodeRef;

/// Page-wide stylesheet index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SheetId(pub u32);

/// A CSSStyleSheet stand-in: an ordered rule list plus load state for
/// linked sheets.
#[derive(Debug, Clone)]
pub struct StyleSheet {
    pub id: SheetId,
    /// Element owning the sheet (`<style>` or `<link>`), if any.
    pub owner: Option<NodeRef>,
    /// href of a linked sheet.
    pub href: Option<String>,
    pub rules: Vec<String>,
    /// Linked sheets start unloaded; their rules are unreadable until the
    /// load completes.
    pub loaded: bool,
}

impl StyleSheet {
    pub fn new(id: SheetId) -> Self {
        Self {
            id,
            owner: None,
            href: None,
            rules: Vec::new(),
            loaded: true,
        }
    }

    pub fn linked(id: SheetId, href: &str) -> Self {
        Self {
            id,
            owner: None,
            href: Some(href.to_string()),
            rules: Vec::new(),
            loaded: false,
        }
    }

    /// Full text of the sheet, `None` while an external sheet is loading.
    pub fn css_text(&self) -> Option<String> {
        if !self.loaded {
            return None;
        }
        Some(self.rules.join(""))
    }
}
