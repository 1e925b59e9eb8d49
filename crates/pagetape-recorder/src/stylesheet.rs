//! Stylesheet manager: rule/declaration/adopted-sheet events plus
//! deferred `<link>` inlining

use crate::config::RecordOptions;
use crate::event::{
    AdoptedStyleSheetData, AdoptedStyleSheetStyle, AttrValue, AttributeMutation, IncrementalData,
    IncrementalSource, MutationData, StyleDeclarationData, StyleRemoveProperty, StyleSetProperty,
    StyleSheetAddRule, StyleSheetDeleteRule, StyleSheetRuleData,
};
use crate::mirror::Mirror;
use crate::serializer::css;
use pagetape_dom::{DocId, NodeRef, Page, PageNotice, SheetId};
use std::collections::{HashMap, HashSet};

/// Tracks constructed/adopted sheet ids and link elements whose rules
/// were unreadable at serialization time.
#[derive(Debug, Default)]
pub struct StylesheetManager {
    /// Sheets without an owner element get a style id instead.
    style_ids: HashMap<SheetId, u32>,
    next_style_id: u32,
    pending_links: HashSet<NodeRef>,
    /// Adopted sheets whose text already went out.
    announced: HashSet<SheetId>,
}

impl StylesheetManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_style_id(&mut self) -> u32 {
        self.next_style_id += 1;
        self.next_style_id
    }

    fn style_id_for(&mut self, sheet: SheetId) -> u32 {
        if let Some(&id) = self.style_ids.get(&sheet) {
            return id;
        }
        let id = self.next_style_id();
        self.style_ids.insert(sheet, id);
        id
    }

    /// Link elements the serializer could not inline yet.
    pub fn track_pending_links(&mut self, links: impl IntoIterator<Item = NodeRef>) {
        self.pending_links.extend(links);
    }

    pub fn reset(&mut self) {
        self.style_ids.clear();
        self.next_style_id = 0;
        self.pending_links.clear();
        self.announced.clear();
    }

    /// Owner element id or constructed style id for a sheet.
    fn resolve(
        &mut self,
        page: &Page,
        mirror: &Mirror,
        sheet: SheetId,
    ) -> (Option<i64>, Option<u32>) {
        let owner = page.sheet(sheet).and_then(|s| s.owner);
        match owner {
            Some(node) => {
                let id = mirror.get_id(Some(node));
                if id > 0 {
                    (Some(id), None)
                } else {
                    (None, Some(self.style_id_for(sheet)))
                }
            }
            None => (None, Some(self.style_id_for(sheet))),
        }
    }

    pub fn handle(
        &mut self,
        notice: &PageNotice,
        page: &Page,
        mirror: &Mirror,
        options: &RecordOptions,
        out: &mut Vec<IncrementalData>,
    ) {
        match notice {
            PageNotice::StyleRuleInserted { sheet, rule, index } => {
                let (id, style_id) = self.resolve(page, mirror, *sheet);
                out.push(IncrementalData::StyleSheetRule(StyleSheetRuleData {
                    source: IncrementalSource::StyleSheetRule,
                    id,
                    style_id,
                    adds: vec![StyleSheetAddRule {
                        rule: rule.clone(),
                        index: Some(*index),
                    }],
                    removes: Vec::new(),
                }));
            }
            PageNotice::StyleRuleDeleted { sheet, index } => {
                let (id, style_id) = self.resolve(page, mirror, *sheet);
                out.push(IncrementalData::StyleSheetRule(StyleSheetRuleData {
                    source: IncrementalSource::StyleSheetRule,
                    id,
                    style_id,
                    adds: Vec::new(),
                    removes: vec![StyleSheetDeleteRule { index: *index }],
                }));
            }
            PageNotice::StyleDeclarationSet {
                sheet,
                index,
                property,
                value,
                priority,
            } => {
                if options.ignore_css_attributes.contains(property) {
                    return;
                }
                let (id, style_id) = self.resolve(page, mirror, *sheet);
                let (set, remove) = match value {
                    Some(value) => (
                        Some(StyleSetProperty {
                            property: property.clone(),
                            value: value.clone(),
                            priority: priority.clone(),
                        }),
                        None,
                    ),
                    None => (
                        None,
                        Some(StyleRemoveProperty {
                            property: property.clone(),
                        }),
                    ),
                };
                out.push(IncrementalData::StyleDeclaration(StyleDeclarationData {
                    source: IncrementalSource::StyleDeclaration,
                    id,
                    style_id,
                    index: index.clone(),
                    set,
                    remove,
                }));
            }
            PageNotice::AdoptedStyleSheetsChanged { doc } => {
                self.emit_adopted(page, mirror, *doc, out);
            }
            PageNotice::StylesheetLoaded { sheet } => {
                self.emit_loaded_link(page, mirror, *sheet, out);
            }
            _ => {}
        }
    }

    /// Re-emit the full adopted list, with text for sheets not announced
    /// before.
    fn emit_adopted(
        &mut self,
        page: &Page,
        mirror: &Mirror,
        doc: DocId,
        out: &mut Vec<IncrementalData>,
    ) {
        let doc_id = mirror.get_id(Some(page.doc(doc).root()));
        if doc_id <= 0 {
            return;
        }
        let sheets = page.doc(doc).adopted_sheets.clone();
        let mut style_ids = Vec::new();
        let mut styles = Vec::new();
        for sheet_id in sheets {
            let style_id = self.style_id_for(sheet_id);
            style_ids.push(style_id);
            if self.announced.insert(sheet_id) {
                if let Some(sheet) = page.sheet(sheet_id) {
                    let rules = sheet
                        .rules
                        .iter()
                        .enumerate()
                        .map(|(index, rule)| StyleSheetAddRule {
                            rule: rule.clone(),
                            index: Some(index),
                        })
                        .collect();
                    styles.push(AdoptedStyleSheetStyle { style_id, rules });
                }
            }
        }
        out.push(IncrementalData::AdoptedStyleSheet(AdoptedStyleSheetData {
            source: IncrementalSource::AdoptedStyleSheet,
            id: doc_id,
            style_ids,
            styles,
        }));
    }

    /// A linked sheet became readable: replay gets the text through an
    /// attribute mutation on the owning element.
    fn emit_loaded_link(
        &mut self,
        page: &Page,
        mirror: &Mirror,
        sheet_id: SheetId,
        out: &mut Vec<IncrementalData>,
    ) {
        let sheet = match page.sheet(sheet_id) {
            Some(sheet) => sheet,
            None => return,
        };
        let owner = match sheet.owner {
            Some(owner) if self.pending_links.remove(&owner) => owner,
            _ => return,
        };
        let id = mirror.get_id(Some(owner));
        if id <= 0 {
            return;
        }
        let text = match css::stringify_sheet(page, sheet) {
            Some(text) => text,
            None => return,
        };
        let mut data = MutationData::new();
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert("_cssText".to_string(), Some(AttrValue::Str(text)));
        data.attributes.push(AttributeMutation { id, attributes });
        out.push(IncrementalData::Mutation(data));
    }
}
