//! Per-source incremental observers
//!
//! Each observer consumes page notices and may flush buffered work at
//! frame boundaries. Observers run in install order and push the
//! incremental payloads they produce; the facade feeds those to the emit
//! pipeline. A failing observer never poisons the others.

pub mod canvas;
pub mod custom_element;
pub mod font;
pub mod input;
pub mod media;
pub mod mouse;
pub mod scroll;
pub mod selection;

use crate::config::RecordOptions;
use crate::error::Result;
use crate::event::IncrementalData;
use crate::interactive::InteractiveRegistry;
use crate::mirror::Mirror;
use crate::serializer::locate;
use pagetape_dom::{NodeRef, Page, PageNotice};

/// Read-only view observers get per dispatch.
pub struct ObserverContext<'a> {
    pub page: &'a Page,
    pub mirror: &'a Mirror,
    pub options: &'a RecordOptions,
    pub registry: &'a InteractiveRegistry,
    pub now: u64,
}

pub trait Observer {
    fn name(&self) -> &'static str;

    fn handle(
        &mut self,
        notice: &PageNotice,
        ctx: &ObserverContext,
        out: &mut Vec<IncrementalData>,
    ) -> Result<()>;

    /// Frame boundary; flush any batching buffers.
    fn on_frame(
        &mut self,
        _ctx: &ObserverContext,
        _out: &mut Vec<IncrementalData>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Whether the element or any ancestor is blocked by class or selector.
pub fn element_blocked(page: &Page, options: &RecordOptions, node: NodeRef) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if let Some(el) = page.element(n) {
            if el.has_class(&options.block_class) {
                return true;
            }
            if let Some(selector) = &options.block_selector {
                if locate::matches(page, n, selector) {
                    return true;
                }
            }
        }
        current = page.parent(n);
    }
    false
}

/// The default observer set, in install order.
pub fn default_observers() -> Vec<Box<dyn Observer>> {
    vec![
        Box::new(mouse::MouseMoveObserver::new()),
        Box::new(mouse::MouseInteractionObserver::new()),
        Box::new(scroll::ScrollObserver::new()),
        Box::new(scroll::ViewportResizeObserver::new()),
        Box::new(input::InputObserver::new()),
        Box::new(media::MediaInteractionObserver::new()),
        Box::new(canvas::CanvasObserver::new()),
        Box::new(font::FontObserver::new()),
        Box::new(selection::SelectionObserver::new()),
        Box::new(custom_element::CustomElementObserver::new()),
    ]
}
