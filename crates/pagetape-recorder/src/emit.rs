//! Emit pipeline: timestamping, plugin chain, packing, sink dispatch, and
//! the checkout counters

use crate::clock::Clock;
use crate::config::{EmitFn, ErrorHandler, Hooks, PackFn, SinkEvent};
use crate::error::Error;
use crate::event::{Event, EventData, EventType, IncrementalData, IncrementalSource};
use crate::plugin::RecordPlugin;
use pagetape_dom::FramePort;
use std::rc::Rc;

/// Where finished events go: the host sink, or the parent frame when this
/// recorder runs inside a cross-origin iframe.
pub enum Transport {
    Sink(EmitFn),
    Parent { port: FramePort, origin: String },
}

pub struct EmitPipeline {
    clock: Rc<dyn Clock>,
    transport: Transport,
    pack_fn: Option<PackFn>,
    plugins: Vec<Box<dyn RecordPlugin>>,
    hooks: Hooks,
    error_handler: Option<ErrorHandler>,
    checkout_every_nth: Option<u64>,
    checkout_every_nms: Option<u64>,
    checkout_every_nvm: Option<u64>,
    incremental_count: u64,
    visibility_count: u64,
    last_full_timestamp: u64,
    last_timestamp: u64,
    checkout_due: bool,
    emitted: u64,
}

impl EmitPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Rc<dyn Clock>,
        transport: Transport,
        pack_fn: Option<PackFn>,
        plugins: Vec<Box<dyn RecordPlugin>>,
        hooks: Hooks,
        error_handler: Option<ErrorHandler>,
        checkout_every_nth: Option<u64>,
        checkout_every_nms: Option<u64>,
        checkout_every_nvm: Option<u64>,
    ) -> Self {
        Self {
            clock,
            transport,
            pack_fn,
            plugins,
            hooks,
            error_handler,
            checkout_every_nth,
            checkout_every_nms,
            checkout_every_nvm,
            incremental_count: 0,
            visibility_count: 0,
            last_full_timestamp: 0,
            last_timestamp: 0,
            checkout_due: false,
            emitted: 0,
        }
    }

    /// True when any checkout predicate fired since the last full
    /// snapshot. The facade answers by taking one.
    pub fn checkout_due(&self) -> bool {
        self.checkout_due
    }

    pub fn events_emitted(&self) -> u64 {
        self.emitted
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Stamp and dispatch a new event.
    pub fn emit(&mut self, event_type: EventType, data: EventData, is_checkout: bool) {
        let timestamp = self.clock.now_ms().max(self.last_timestamp);
        let event = Event::new(event_type, data, timestamp);
        self.dispatch(event, is_checkout);
    }

    /// Re-emit an event forwarded from a child frame, keeping its
    /// timestamp (clamped so the stream stays monotonic).
    pub fn emit_forwarded(&mut self, mut event: Event, is_checkout: bool) {
        event.timestamp = event.timestamp.max(self.last_timestamp);
        self.dispatch(event, is_checkout);
    }

    fn dispatch(&mut self, mut event: Event, is_checkout: bool) {
        self.last_timestamp = event.timestamp;

        for plugin in &mut self.plugins {
            plugin.event_processor(&mut event);
        }
        if let EventData::Incremental(data) = &event.data {
            self.run_hook(data);
        }

        match &self.transport {
            Transport::Sink(sink) => {
                let out = match &self.pack_fn {
                    Some(pack) => SinkEvent::Packed(pack(&event)),
                    None => SinkEvent::Event(event.clone()),
                };
                if let Err(e) = sink(&out, is_checkout) {
                    let error = Error::emit_failed(&e.to_string());
                    match &self.error_handler {
                        Some(handler) => handler(&error),
                        None => tracing::warn!(error = %error, "sink rejected event"),
                    }
                }
            }
            Transport::Parent { port, origin } => {
                // The parent packs once; pass-through frames never pack
                let payload = serde_json::json!({
                    "type": "rrweb",
                    "event": event,
                    "origin": origin,
                    "isCheckout": is_checkout,
                });
                port.post(origin, payload.to_string());
            }
        }

        self.emitted += 1;
        self.update_counters(&event);
    }

    fn update_counters(&mut self, event: &Event) {
        match event.event_type {
            EventType::FullSnapshot => {
                self.incremental_count = 0;
                self.visibility_count = 0;
                self.last_full_timestamp = event.timestamp;
                self.checkout_due = false;
            }
            EventType::IncrementalSnapshot => {
                if let EventData::Incremental(data) = &event.data {
                    if let IncrementalData::Mutation(m) = data {
                        if m.is_attach_iframe == Some(true) {
                            // Counted as a full snapshot: no counter bump
                            return;
                        }
                    }
                    self.incremental_count += 1;
                    if let IncrementalData::VisibilityMutation(v) = data {
                        self.visibility_count += v.mutations.len() as u64;
                    }

                    let exceed_count = self
                        .checkout_every_nth
                        .map(|n| self.incremental_count >= n)
                        .unwrap_or(false);
                    let exceed_time = self
                        .checkout_every_nms
                        .map(|n| event.timestamp.saturating_sub(self.last_full_timestamp) > n)
                        .unwrap_or(false);
                    let exceed_visibility = self
                        .checkout_every_nvm
                        .map(|n| self.visibility_count >= n)
                        .unwrap_or(false);
                    if exceed_count || exceed_time || exceed_visibility {
                        self.checkout_due = true;
                    }
                }
            }
            _ => {}
        }
    }

    fn run_hook(&self, data: &IncrementalData) {
        let hook = match data.source() {
            IncrementalSource::Mutation => &self.hooks.mutation,
            IncrementalSource::MouseMove
            | IncrementalSource::TouchMove
            | IncrementalSource::Drag => &self.hooks.mouse_move,
            IncrementalSource::MouseInteraction => &self.hooks.mouse_interaction,
            IncrementalSource::Scroll => &self.hooks.scroll,
            IncrementalSource::ViewportResize => &self.hooks.viewport_resize,
            IncrementalSource::Input => &self.hooks.input,
            IncrementalSource::MediaInteraction => &self.hooks.media_interaction,
            IncrementalSource::StyleSheetRule => &self.hooks.style_sheet_rule,
            IncrementalSource::StyleDeclaration => &self.hooks.style_declaration,
            IncrementalSource::CanvasMutation => &self.hooks.canvas_mutation,
            IncrementalSource::Font => &self.hooks.font,
            IncrementalSource::Selection => &self.hooks.selection,
            IncrementalSource::AdoptedStyleSheet => &self.hooks.adopted_style_sheet,
            IncrementalSource::CustomElement => &self.hooks.custom_element,
            IncrementalSource::VisibilityMutation => &self.hooks.visibility_mutation,
            IncrementalSource::Log => &None,
        };
        if let Some(hook) = hook {
            hook(data);
        }
    }
}
