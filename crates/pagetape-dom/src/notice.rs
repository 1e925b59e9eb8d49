//! Notices: the observation stream the page queues for its observers
//!
//! In a browser these arrive through MutationObserver callbacks, event
//! listeners, patched prototypes and load handlers. The page model funnels
//! all of them through one typed queue drained at frame boundaries.

use crate::event::{MediaKind, UiEvent};
use crate::node::{DocId, NodeRef};
use crate::stylesheet::SheetId;

/// A structural mutation, one per MutationObserver record.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRecord {
    ChildList {
        target: NodeRef,
        added: Vec<NodeRef>,
        removed: Vec<NodeRef>,
    },
    Attributes {
        target: NodeRef,
        name: String,
        old_value: Option<String>,
    },
    CharacterData {
        target: NodeRef,
        old_value: Option<String>,
    },
}

impl MutationRecord {
    pub fn target(&self) -> NodeRef {
        match self {
            MutationRecord::ChildList { target, .. }
            | MutationRecord::Attributes { target, .. }
            | MutationRecord::CharacterData { target, .. } => *target,
        }
    }
}

/// Everything the page reports to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum PageNotice {
    DomContentLoaded {
        doc: DocId,
    },
    Load {
        doc: DocId,
    },
    Mutation(MutationRecord),
    Ui(UiEvent),
    Scrolled {
        target: NodeRef,
        x: f64,
        y: f64,
    },
    ViewportResized {
        doc: DocId,
        width: u32,
        height: u32,
    },
    Media {
        target: NodeRef,
        kind: MediaKind,
    },
    StyleRuleInserted {
        sheet: SheetId,
        rule: String,
        index: usize,
    },
    StyleRuleDeleted {
        sheet: SheetId,
        index: usize,
    },
    /// A CSSStyleDeclaration assignment. `value: None` means the property
    /// was removed.
    StyleDeclarationSet {
        sheet: SheetId,
        index: Vec<usize>,
        property: String,
        value: Option<String>,
        priority: Option<String>,
    },
    AdoptedStyleSheetsChanged {
        doc: DocId,
    },
    /// A linked stylesheet's rules became readable.
    StylesheetLoaded {
        sheet: SheetId,
    },
    FontLoaded {
        doc: DocId,
        family: String,
        src: String,
        descriptors: Vec<(String, String)>,
    },
    SelectionChanged {
        doc: DocId,
    },
    CustomElementDefined {
        doc: DocId,
        name: String,
    },
    /// `addEventListener` was called on a node.
    ListenerAdded {
        target: NodeRef,
        event_type: String,
    },
    ShadowAttached {
        host: NodeRef,
    },
    CanvasDraw {
        target: NodeRef,
    },
    /// A same-origin iframe finished loading its document.
    IframeLoaded {
        element: NodeRef,
        doc: DocId,
    },
    /// A message posted by a cross-origin child frame.
    FrameMessage {
        element: NodeRef,
        origin: String,
        payload: String,
    },
}
