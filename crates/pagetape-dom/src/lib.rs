//! pagetape-dom - the live page a recording observes
//!
//! An arena-allocated document forest with the observation surface the
//! recorder needs: structural mutations are delivered as records, UI events
//! as dispatches, and everything else (listener registration, shadow roots,
//! stylesheet edits, canvas draws, frame messages) as typed notices drained
//! once per animation frame.
//!
//! The model performs no recording of its own; it answers queries (rects,
//! computed styles, form values, stylesheet text) and queues notices.

pub mod document;
pub mod event;
pub mod geometry;
pub mod node;
pub mod notice;
pub mod page;
pub mod stylesheet;
pub mod tree;

pub use document::{Document, FontFace, ReadyState};
pub use event::{MediaKind, PointerKind, UiEvent};
pub use geometry::{Margin, MarginValue, Rect};
pub use node::{
    CanvasCommand, CanvasContextKind, CanvasState, ComputedStyle, DocId, ElementData, MediaState,
    Node, NodeData, NodeId, NodeRef,
};
pub use notice::{MutationRecord, PageNotice};
pub use page::{FramePort, Page, PortMessage, SelectionRange};
pub use stylesheet::{SheetId, StyleSheet};
pub use tree::DomTree;
