//! pagetape-recorder - a visibility-aware page-session recording engine
//!
//! Converts a live [`Page`] into a time-ordered stream of self-contained
//! events that replays deterministically: one full snapshot up front, then
//! incremental snapshots from a set of observers sharing a node mirror.
//! Fresh full snapshots (checkouts) are forced by event-count, elapsed-time
//! and visibility-change thresholds.
//!
//! ```no_run
//! use pagetape_recorder::{record, RecordOptions};
//! use pagetape_recorder::stream::EventStream;
//! use pagetape_dom::Page;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let page = Rc::new(RefCell::new(Page::new("https://example.com/")));
//! let (emit, stream) = EventStream::channel(1024);
//! let handle = record(
//!     page.clone(),
//!     RecordOptions {
//!         emit: Some(emit),
//!         checkout_every_nvm: Some(50),
//!         ..Default::default()
//!     },
//! )
//! .unwrap();
//!
//! // ... drive the page, calling handle.tick() each frame ...
//! handle.stop();
//! let events = stream.drain_events();
//! # let _ = events;
//! ```

pub mod clock;
pub mod config;
pub mod emit;
pub mod error;
pub mod event;
pub mod iframe;
pub mod interactive;
pub mod mirror;
pub mod mutation;
pub mod observers;
pub mod plugin;
pub mod serializer;
pub mod shadow;
pub mod stream;
pub mod stylesheet;
pub mod visibility;
pub mod visibility_manager;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RecordOptions, RecordSettings, SinkEvent};
pub use error::{Error, ErrorCode, Result};
pub use event::{Event, EventData, EventType, IncrementalData, IncrementalSource, SerializedNode};
pub use mirror::Mirror;
pub use plugin::{RecordPlugin, SequentialIdPlugin};

use crate::clock::SystemClock as DefaultClock;
use crate::config::{FlushCustomEvent, RecordAfter};
use crate::emit::{EmitPipeline, Transport};
use crate::event::{CustomData, FullSnapshotData, InitialOffset, LogData, MetaData};
use crate::iframe::IframeManager;
use crate::interactive::InteractiveRegistry;
use crate::mutation::MutationBuffer;
use crate::observers::{Observer, ObserverContext};
use crate::serializer::{SerializeManifests, Serializer};
use crate::shadow::ShadowDomManager;
use crate::stylesheet::StylesheetManager;
use crate::visibility_manager::VisibilityManager;
use pagetape_dom::{FramePort, NodeRef, Page, PageNotice, ReadyState};
use std::cell::RefCell;
use std::rc::Rc;

/// Recording lifecycle. IDLE is the absence of a live recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for the `record_after` milestone.
    Starting,
    Recording,
    Frozen,
}

enum Job {
    New(EventType, EventData),
    Forward(Event, bool),
}

struct Recorder {
    page: Rc<RefCell<Page>>,
    options: RecordOptions,
    pipeline: EmitPipeline,
    mirror: Mirror,
    registry: InteractiveRegistry,
    buffer: MutationBuffer,
    visibility: VisibilityManager,
    observers: Vec<Box<dyn Observer>>,
    iframes: IframeManager,
    shadow: ShadowDomManager,
    stylesheets: StylesheetManager,
    state: State,
    custom_queue: Vec<CustomData>,
}

/// Start a recording on a page. The sink is required; a second concurrent
/// recording on the same page is rejected.
pub fn record(page: Rc<RefCell<Page>>, options: RecordOptions) -> Result<RecordHandle> {
    let mut options = options;
    options.normalize()?;
    let emit = options.emit.clone().expect("normalize checked emit");
    start_recording(page, options, |_| Transport::Sink(emit))
}

/// Start a pass-through recording inside a cross-origin child frame. The
/// sink is the parent's message port; no `emit` is required and packing
/// is left to the parent.
pub fn record_subframe(
    page: Rc<RefCell<Page>>,
    port: FramePort,
    options: RecordOptions,
) -> Result<RecordHandle> {
    let mut options = options;
    if let Some(wait) = options.mousemove_wait.take() {
        options.sampling.mousemove = wait;
    }
    start_recording(page, options, move |origin| Transport::Parent {
        port,
        origin: origin.to_string(),
    })
}

fn start_recording(
    page: Rc<RefCell<Page>>,
    mut options: RecordOptions,
    transport: impl FnOnce(&str) -> Transport,
) -> Result<RecordHandle> {
    {
        let mut page_ref = page.borrow_mut();
        if !page_ref.attach_recorder() {
            return Err(Error::recorder_busy());
        }
        // History predating the recording is the snapshot's business
        page_ref.take_notices();
    }

    let clock = options
        .clock
        .take()
        .unwrap_or_else(|| Rc::new(DefaultClock));
    let plugins = std::mem::take(&mut options.plugins);
    let origin = origin_of(&page.borrow().doc(page.borrow().main()).url);

    let pipeline = EmitPipeline::new(
        clock,
        transport(&origin),
        options.pack_fn.clone(),
        plugins,
        options.hooks.clone(),
        options.error_handler.clone(),
        options.checkout_every_nth,
        options.checkout_every_nms,
        options.checkout_every_nvm,
    );

    let mut registry = InteractiveRegistry::new();
    let mut visibility = VisibilityManager::new(options.sampling.visibility.clone());
    {
        let page_ref = page.borrow();
        for doc in page_ref.doc_ids() {
            registry.scan_inline_handlers(&page_ref, doc);
        }
        visibility.observe_page(&page_ref);
    }

    let mut recorder = Recorder {
        page: page.clone(),
        options,
        pipeline,
        mirror: Mirror::new(),
        registry,
        buffer: MutationBuffer::new(),
        visibility,
        observers: observers::default_observers(),
        iframes: IframeManager::new(),
        shadow: ShadowDomManager::new(),
        stylesheets: StylesheetManager::new(),
        state: State::Starting,
        custom_queue: Vec::new(),
    };

    if recorder.milestone_reached() {
        recorder.begin();
    }

    Ok(RecordHandle {
        inner: Rc::new(RefCell::new(Some(recorder))),
    })
}

fn origin_of(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_else(|_| url.to_string())
}

impl Recorder {
    fn milestone_reached(&self) -> bool {
        let page = self.page.borrow();
        let ready = page.doc(page.main()).ready_state;
        match self.options.record_after {
            RecordAfter::Load => ready == ReadyState::Complete,
            RecordAfter::DomContentLoaded => ready >= ReadyState::Interactive,
        }
    }

    /// First snapshot plus queued custom events, per the flush policy.
    fn begin(&mut self) {
        if self.state != State::Starting {
            return;
        }
        if self.options.flush_custom_event == FlushCustomEvent::Before {
            self.flush_custom_queue();
        }
        self.take_full_snapshot(false);
        self.state = State::Recording;
        if self.options.flush_custom_event == FlushCustomEvent::After {
            self.flush_custom_queue();
        }
    }

    fn flush_custom_queue(&mut self) {
        for data in std::mem::take(&mut self.custom_queue) {
            self.pipeline
                .emit(EventType::Custom, EventData::Custom(data), false);
        }
    }

    fn take_full_snapshot(&mut self, is_checkout: bool) {
        if !self.options.record_dom {
            return;
        }
        self.buffer.lock();
        self.visibility.lock();

        let (meta, serialized) = {
            let page = self.page.borrow();
            let main = page.main();
            let doc = page.doc(main);
            let meta = MetaData {
                href: doc.url.clone(),
                width: doc.width,
                height: doc.height,
            };
            let serialized = Serializer::new(
                &page,
                &mut self.mirror,
                &self.options,
                &self.registry,
            )
            .serialize_document(main);
            (meta, serialized)
        };

        match serialized {
            Ok(output) => {
                self.pipeline
                    .emit(EventType::Meta, EventData::Meta(meta), is_checkout);
                let offset = {
                    let page = self.page.borrow();
                    let doc = page.doc(page.main());
                    InitialOffset {
                        top: doc.scroll_y,
                        left: doc.scroll_x,
                    }
                };
                self.absorb_manifests(output.manifests);
                self.pipeline.emit(
                    EventType::FullSnapshot,
                    EventData::FullSnapshot(Box::new(FullSnapshotData {
                        node: output.node,
                        initial_offset: offset,
                    })),
                    is_checkout,
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "full snapshot failed, recording continues");
                self.pipeline.emit(
                    EventType::IncrementalSnapshot,
                    EventData::Incremental(IncrementalData::Log(LogData {
                        source: IncrementalSource::Log,
                        level: "warn".to_string(),
                        payload: vec![serde_json::Value::String(e.message.clone())],
                    })),
                    false,
                );
                self.report(&e);
            }
        }

        self.buffer.unlock();
        self.visibility.unlock();
        // Anything enqueued while locked flushes as one mutation event
        self.flush_mutations();
    }

    fn absorb_manifests(&mut self, manifests: SerializeManifests) {
        self.iframes.track_attached(manifests.iframes);
        self.stylesheets.track_pending_links(manifests.pending_links);
        self.shadow.track_roots(manifests.shadow_roots);
    }

    fn report(&self, error: &Error) {
        match &self.options.error_handler {
            Some(handler) => handler(error),
            None => tracing::warn!(error = %error, "recorder error"),
        }
    }

    /// Route one notice; returns the emissions it produced.
    fn route(&mut self, notice: &PageNotice) -> Vec<Job> {
        let mut jobs = Vec::new();

        match notice {
            PageNotice::DomContentLoaded { doc } => {
                {
                    let page = self.page.borrow();
                    self.registry.scan_inline_handlers(&page, *doc);
                }
                if self.state == State::Starting
                    && self.options.record_after == RecordAfter::DomContentLoaded
                {
                    self.begin();
                } else if self.state == State::Recording {
                    jobs.push(Job::New(EventType::DomContentLoaded, EventData::empty()));
                }
                return jobs;
            }
            PageNotice::Load { .. } => {
                if self.state == State::Starting && self.options.record_after == RecordAfter::Load {
                    self.begin();
                }
                return jobs;
            }
            _ => {}
        }

        if self.state == State::Starting {
            // Nothing else is recorded before the first snapshot
            return jobs;
        }

        match notice {
            PageNotice::Mutation(record) => {
                let page = self.page.borrow();
                self.buffer.push(record);
                self.visibility.on_mutation(&page, record);
            }
            PageNotice::ListenerAdded { target, event_type } => {
                self.registry.on_listener_added(*target, event_type);
            }
            PageNotice::ShadowAttached { .. } => {
                let page = self.page.borrow();
                self.shadow.handle(notice, &page);
            }
            PageNotice::IframeLoaded { element, doc } => {
                let result = {
                    let page = self.page.borrow();
                    self.iframes.attach_iframe(
                        *element,
                        *doc,
                        &page,
                        &mut self.mirror,
                        &self.options,
                        &self.registry,
                    )
                };
                match result {
                    Ok(Some((data, manifests))) => {
                        self.absorb_manifests(manifests);
                        jobs.push(Job::New(
                            EventType::IncrementalSnapshot,
                            EventData::Incremental(IncrementalData::Mutation(data)),
                        ));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let error = Error::observer_install_failed("iframe", &e.message);
                        self.report(&error);
                    }
                }
            }
            PageNotice::FrameMessage {
                element,
                origin,
                payload,
            } => {
                if self.options.record_cross_origin_iframes {
                    let result = {
                        let page = self.page.borrow();
                        self.iframes.handle_message(
                            *element,
                            origin,
                            payload,
                            &page,
                            &mut self.mirror,
                            &mut self.stylesheets,
                        )
                    };
                    match result {
                        Ok(Some((event, is_checkout))) => {
                            jobs.push(Job::Forward(event, is_checkout));
                        }
                        Ok(None) => {}
                        Err(e) => self.report(&e),
                    }
                }
            }
            PageNotice::StyleRuleInserted { .. }
            | PageNotice::StyleRuleDeleted { .. }
            | PageNotice::StyleDeclarationSet { .. }
            | PageNotice::AdoptedStyleSheetsChanged { .. }
            | PageNotice::StylesheetLoaded { .. } => {
                let page = self.page.borrow();
                let mut out = Vec::new();
                self.stylesheets
                    .handle(notice, &page, &self.mirror, &self.options, &mut out);
                jobs.extend(out.into_iter().map(|data| {
                    Job::New(EventType::IncrementalSnapshot, EventData::Incremental(data))
                }));
            }
            _ => {
                let page = self.page.borrow();
                let ctx = ObserverContext {
                    page: &page,
                    mirror: &self.mirror,
                    options: &self.options,
                    registry: &self.registry,
                    now: self.pipeline.now(),
                };
                let mut out = Vec::new();
                for observer in &mut self.observers {
                    if let Err(e) = observer.handle(notice, &ctx, &mut out) {
                        drop_observer_error(observer.name(), &e, &self.options);
                    }
                }
                jobs.extend(out.into_iter().map(|data| {
                    Job::New(EventType::IncrementalSnapshot, EventData::Incremental(data))
                }));
            }
        }

        jobs
    }

    fn emit_jobs(&mut self, jobs: Vec<Job>) {
        for job in jobs {
            match job {
                Job::New(event_type, data) => self.pipeline.emit(event_type, data, false),
                Job::Forward(event, is_checkout) => {
                    self.pipeline.emit_forwarded(event, is_checkout)
                }
            }
            if self.pipeline.checkout_due() && self.state == State::Recording {
                self.take_full_snapshot(true);
            }
        }
    }

    fn pump(&mut self) {
        loop {
            let notices = self.page.borrow_mut().take_notices();
            if notices.is_empty() {
                break;
            }
            for notice in notices {
                let jobs = self.route(&notice);
                self.emit_jobs(jobs);
            }
        }
    }

    fn flush_mutations(&mut self) {
        let flushed = {
            let page = self.page.borrow();
            self.buffer
                .flush(&page, &mut self.mirror, &self.options, &self.registry)
        };
        if let Some((data, manifests)) = flushed {
            self.absorb_manifests(manifests);
            self.emit_jobs(vec![Job::New(
                EventType::IncrementalSnapshot,
                EventData::Incremental(IncrementalData::Mutation(data)),
            )]);
        }
    }

    /// One animation frame: deliver frame messages, drain notices, flush
    /// the mutation buffer, run the visibility pass, and let observers
    /// flush their batches.
    fn tick(&mut self) {
        self.page.borrow_mut().tick();
        self.pump();

        if self.state != State::Recording {
            return;
        }

        self.flush_mutations();

        let now = self.pipeline.now();
        let batch = {
            let page = self.page.borrow();
            self.visibility.on_frame(now, &page, &self.mirror)
        };
        if let Some(data) = batch {
            self.emit_jobs(vec![Job::New(
                EventType::IncrementalSnapshot,
                EventData::Incremental(IncrementalData::VisibilityMutation(data)),
            )]);
        }

        let mut out = Vec::new();
        {
            let page = self.page.borrow();
            let ctx = ObserverContext {
                page: &page,
                mirror: &self.mirror,
                options: &self.options,
                registry: &self.registry,
                now,
            };
            for observer in &mut self.observers {
                if let Err(e) = observer.on_frame(&ctx, &mut out) {
                    drop_observer_error(observer.name(), &e, &self.options);
                }
            }
        }
        self.emit_jobs(
            out.into_iter()
                .map(|data| {
                    Job::New(EventType::IncrementalSnapshot, EventData::Incremental(data))
                })
                .collect(),
        );
    }

    fn freeze(&mut self) {
        if self.state == State::Recording {
            self.buffer.freeze();
            self.visibility.freeze();
            self.state = State::Frozen;
        }
    }

    fn unfreeze(&mut self) {
        if self.state == State::Frozen {
            self.buffer.unfreeze();
            self.visibility.unfreeze();
            self.state = State::Recording;
            // Mutations coalesced across the pause flush as one event
            self.pump();
            self.flush_mutations();
        }
    }

    fn add_custom_event(&mut self, tag: &str, payload: serde_json::Value) {
        let data = CustomData {
            tag: tag.to_string(),
            payload,
        };
        if self.state == State::Recording || self.state == State::Frozen {
            self.pipeline
                .emit(EventType::Custom, EventData::Custom(data), false);
        } else {
            self.custom_queue.push(data);
        }
    }

    fn shutdown(&mut self) {
        self.buffer.clear();
        self.visibility.reset();
        self.iframes.reset();
        self.shadow.reset();
        self.stylesheets.reset();
        self.mirror.reset();
        self.page.borrow_mut().detach_recorder();
    }
}

fn drop_observer_error(name: &str, error: &Error, options: &RecordOptions) {
    match &options.error_handler {
        Some(handler) => handler(error),
        None => tracing::warn!(observer = name, error = %error, "observer failed"),
    }
}

/// Owner handle for a live recording. Dropping it without `stop()` leaves
/// the page claimed; call `stop()` to release everything.
pub struct RecordHandle {
    inner: Rc<RefCell<Option<Recorder>>>,
}

impl std::fmt::Debug for RecordHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordHandle").finish_non_exhaustive()
    }
}

impl RecordHandle {
    /// Drive one animation frame.
    pub fn tick(&self) {
        if let Some(recorder) = self.inner.borrow_mut().as_mut() {
            recorder.tick();
        }
    }

    /// Stop recording: detach from the page, reset the mirror, cancel
    /// pending work. Idempotent.
    pub fn stop(&self) {
        if let Some(mut recorder) = self.inner.borrow_mut().take() {
            recorder.shutdown();
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.borrow().is_some()
    }

    /// Emit (or queue, before the first snapshot) a custom event.
    pub fn add_custom_event(&self, tag: &str, payload: serde_json::Value) {
        if let Some(recorder) = self.inner.borrow_mut().as_mut() {
            recorder.add_custom_event(tag, payload);
        }
    }

    /// Emit every queued custom event now.
    pub fn flush_custom_event_queue(&self) {
        if let Some(recorder) = self.inner.borrow_mut().as_mut() {
            recorder.flush_custom_queue();
        }
    }

    /// Pause observation; mutations keep coalescing.
    pub fn freeze_page(&self) {
        if let Some(recorder) = self.inner.borrow_mut().as_mut() {
            recorder.freeze();
        }
    }

    /// Resume after `freeze_page`, flushing coalesced mutations.
    pub fn unfreeze_page(&self) {
        if let Some(recorder) = self.inner.borrow_mut().as_mut() {
            recorder.unfreeze();
        }
    }

    /// Force a full snapshot.
    pub fn take_full_snapshot(&self, is_checkout: bool) {
        if let Some(recorder) = self.inner.borrow_mut().as_mut() {
            recorder.take_full_snapshot(is_checkout);
        }
    }

    /// Read-only view of the node mirror.
    pub fn with_mirror<R>(&self, f: impl FnOnce(&Mirror) -> R) -> Option<R> {
        self.inner.borrow().as_ref().map(|r| f(&r.mirror))
    }

    /// Mirror id of a live node, `-1` when unknown.
    pub fn node_id(&self, node: NodeRef) -> i64 {
        self.with_mirror(|m| m.get_id(Some(node)))
            .unwrap_or(crate::mirror::UNKNOWN_NODE)
    }
}
