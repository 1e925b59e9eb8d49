//! End-to-end recording scenarios driven through a manually-clocked page

use pagetape_dom::{ComputedStyle, NodeRef, Page, PointerKind, Rect, UiEvent};
use pagetape_recorder::config::SinkEvent;
use pagetape_recorder::stream::EventStream;
use pagetape_recorder::{
    record, Event, EventData, EventType, IncrementalData, IncrementalSource, ManualClock,
    RecordOptions, SerializedNode,
};
use std::cell::RefCell;
use std::rc::Rc;

struct Harness {
    page: Rc<RefCell<Page>>,
    handle: pagetape_recorder::RecordHandle,
    stream: EventStream,
    clock: Rc<ManualClock>,
}

fn start(page: Page, configure: impl FnOnce(&mut RecordOptions)) -> Harness {
    let page = Rc::new(RefCell::new(page));
    let clock = Rc::new(ManualClock::new(1_000));
    let (emit, stream) = EventStream::channel(4096);
    let mut options = RecordOptions {
        emit: Some(emit),
        clock: Some(clock.clone()),
        ..Default::default()
    };
    configure(&mut options);
    let handle = record(page.clone(), options).unwrap();
    Harness {
        page,
        handle,
        stream,
        clock,
    }
}

impl Harness {
    fn frame(&self) {
        self.clock.advance(16);
        self.handle.tick();
    }

    fn events(&self) -> Vec<Event> {
        self.stream.drain_events()
    }
}

fn simple_page() -> (Page, NodeRef) {
    let mut page = Page::new("https://example.com/");
    let main = page.main();
    let body = page.doc(main).body();
    let div = page.create_element(main, "div");
    page.append_child(body, div);
    page.set_attribute(div, "id", "x");
    page.set_rect(div, Rect::new(0.0, 0.0, 100.0, 40.0));
    let text = page.create_text(main, "hi");
    page.append_child(div, text);
    (page, div)
}

fn find_node<'a>(node: &'a SerializedNode, tag: &str) -> Option<&'a SerializedNode> {
    if node.tag_name.as_deref() == Some(tag) {
        return Some(node);
    }
    node.child_nodes.iter().find_map(|c| find_node(c, tag))
}

fn incremental_source(event: &Event) -> Option<IncrementalSource> {
    event.incremental().map(|d| d.source())
}

#[test]
fn s1_start_stop_emits_meta_then_full_snapshot() {
    let (page, _) = simple_page();
    let h = start(page, |_| {});
    h.handle.stop();

    let events = h.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, EventType::Meta);
    match &events[0].data {
        EventData::Meta(meta) => {
            assert_eq!(meta.href, "https://example.com/");
            assert_eq!(meta.width, 1280);
            assert_eq!(meta.height, 720);
        }
        other => panic!("expected meta, got {:?}", other),
    }
    assert_eq!(events[1].event_type, EventType::FullSnapshot);
    match &events[1].data {
        EventData::FullSnapshot(snapshot) => {
            let div = find_node(&snapshot.node, "div").expect("#x serialized");
            assert_eq!(div.attributes.get("id").unwrap().as_str(), Some("x"));
            assert_eq!(div.child_nodes[0].text_content.as_deref(), Some("hi"));
        }
        other => panic!("expected full snapshot, got {:?}", other),
    }
}

#[test]
fn s2_password_input_is_masked_everywhere() {
    let mut page = Page::new("https://example.com/");
    let main = page.main();
    let body = page.doc(main).body();
    let input = page.create_element(main, "input");
    page.append_child(body, input);
    page.set_attribute(input, "type", "password");
    page.set_attribute(input, "id", "p");

    let h = start(page, |_| {});
    h.page.borrow_mut().input(input, "secret", true);
    h.frame();
    h.handle.stop();

    let events = h.events();
    let input_event = events
        .iter()
        .find(|e| incremental_source(e) == Some(IncrementalSource::Input))
        .expect("input event recorded");
    match input_event.incremental().unwrap() {
        IncrementalData::Input(data) => assert_eq!(data.text, "******"),
        other => panic!("unexpected {:?}", other),
    }

    // No unmasked value anywhere in the stream
    for event in &events {
        let json = serde_json::to_string(event).unwrap();
        assert!(!json.contains("secret"), "leaked value in {}", json);
    }
}

#[test]
fn s3_checkout_every_nth_forces_snapshots() {
    let (page, div) = simple_page();
    let h = start(page, |options| {
        options.checkout_every_nth = Some(5);
    });

    for i in 0..12 {
        h.page
            .borrow_mut()
            .set_attribute(div, "data-step", &i.to_string());
        h.frame();
    }
    h.handle.stop();

    let events = h.events();
    let full_snapshots = events
        .iter()
        .filter(|e| e.event_type == EventType::FullSnapshot)
        .count();
    assert_eq!(full_snapshots, 3, "initial + 2 checkouts");

    // The checkouts land where the 6th and 11th incrementals would be
    let mut incrementals_seen = 0;
    let mut checkout_positions = Vec::new();
    for event in &events {
        match event.event_type {
            EventType::IncrementalSnapshot => incrementals_seen += 1,
            EventType::FullSnapshot if incrementals_seen > 0 => {
                checkout_positions.push(incrementals_seen)
            }
            _ => {}
        }
    }
    assert_eq!(checkout_positions, vec![5, 10]);

    // Each full snapshot is preceded by a meta event
    for (i, event) in events.iter().enumerate() {
        if event.event_type == EventType::FullSnapshot {
            assert_eq!(events[i - 1].event_type, EventType::Meta);
        }
    }
}

#[test]
fn s4_visibility_flip_emits_mutation_and_initial_pass_is_silent() {
    let mut page = Page::new("https://example.com/");
    let main = page.main();
    let body = page.doc(main).body();
    let section = page.create_element(main, "section");
    page.append_child(body, section);
    page.set_rect(section, Rect::new(0.0, 0.0, 400.0, 300.0));
    page.set_style(
        section,
        ComputedStyle {
            display: "none".into(),
            ..Default::default()
        },
    );

    let h = start(page, |_| {});
    let section_id = h.handle.node_id(section);
    assert!(section_id > 0);

    // Baseline frames while hidden: nothing visibility-related
    h.frame();
    h.frame();
    let before: Vec<Event> = h.events();
    assert!(
        before
            .iter()
            .all(|e| incremental_source(e) != Some(IncrementalSource::VisibilityMutation)),
        "initial pass must not emit"
    );

    h.page
        .borrow_mut()
        .set_style(section, ComputedStyle::default());
    h.frame();
    h.handle.stop();

    let events = h.events();
    let batch = events
        .iter()
        .find(|e| incremental_source(e) == Some(IncrementalSource::VisibilityMutation))
        .expect("visibility mutation emitted");
    match batch.incremental().unwrap() {
        IncrementalData::VisibilityMutation(data) => {
            assert_eq!(data.mutations.len(), 1);
            assert_eq!(data.mutations[0].id, section_id);
            assert!(data.mutations[0].is_visible);
            assert!(data.mutations[0].ratio > 0.0);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn s5_same_origin_iframe_joins_parent_id_space() {
    let (page, _) = simple_page();
    let h = start(page, |_| {});

    // Frame one: iframe element without a document yet
    let (iframe, child_doc, button) = {
        let mut page = h.page.borrow_mut();
        let main = page.main();
        let body = page.doc(main).body();
        let iframe = page.create_element(main, "iframe");
        page.append_child(body, iframe);
        let child_doc = page.create_document("https://example.com/frame");
        let child_body = page.doc(child_doc).body();
        let button = page.create_element(child_doc, "button");
        page.append_child(child_body, button);
        (iframe, child_doc, button)
    };
    h.frame();

    // Frame two: the document loads
    h.page
        .borrow_mut()
        .attach_iframe_document(iframe, child_doc);
    h.frame();
    h.handle.stop();

    let events = h.events();
    let attach = events
        .iter()
        .filter_map(|e| match e.incremental() {
            Some(IncrementalData::Mutation(m)) if m.is_attach_iframe == Some(true) => Some(m),
            _ => None,
        })
        .next()
        .expect("attach-iframe mutation");

    let doc_node = &attach.adds[0].node;
    let button_node = find_node(doc_node, "button").expect("button inside iframe doc");
    // Ids are drawn from the parent's space and resolvable there
    assert!(button_node.id > 0);
    assert_eq!(
        h.page.borrow().tag(button),
        Some("button"),
        "harness sanity"
    );
}

#[test]
fn s6_cross_origin_messages_are_rewritten_and_packed_once() {
    let mut page = Page::new("https://example.com/");
    let main = page.main();
    let body = page.doc(main).body();
    let iframe = page.create_element(main, "iframe");
    page.append_child(body, iframe);
    page.set_attribute(iframe, "src", "https://widgets.test/embed");
    let port = page.attach_cross_origin_port(iframe);

    let packed = Rc::new(RefCell::new(Vec::<String>::new()));
    let raw = Rc::new(RefCell::new(Vec::<Event>::new()));

    let page = Rc::new(RefCell::new(page));
    let clock = Rc::new(ManualClock::new(1_000));
    let packed_sink = packed.clone();
    let raw_sink = raw.clone();
    let options = RecordOptions {
        emit: Some(Rc::new(move |event: &SinkEvent, _| {
            match event {
                SinkEvent::Packed(s) => packed_sink.borrow_mut().push(s.clone()),
                SinkEvent::Event(e) => raw_sink.borrow_mut().push(e.clone()),
            }
            Ok(())
        })),
        clock: Some(clock.clone()),
        record_cross_origin_iframes: true,
        pack_fn: Some(Rc::new(|event| {
            serde_json::to_string(event).map(|s| format!("packed:{}", s)).unwrap_or_default()
        })),
        ..Default::default()
    };
    let handle = record(page.clone(), options).unwrap();

    for i in 0..3 {
        let child_event = serde_json::json!({
            "type": "rrweb",
            "event": {
                "type": 3,
                "data": { "source": 3, "id": 42, "x": 0.0, "y": (i * 10) as f64 },
                "timestamp": 500 + i,
            },
            "origin": "https://widgets.test",
            "isCheckout": false,
        });
        port.post("https://widgets.test", child_event.to_string());
    }
    clock.advance(16);
    handle.tick();
    handle.stop();

    // Everything the sink saw was packed exactly once by the parent
    assert!(raw.borrow().is_empty());
    let packed = packed.borrow();
    let forwarded: Vec<&String> = packed
        .iter()
        .filter(|s| s.contains("\"source\":3"))
        .collect();
    assert_eq!(forwarded.len(), 3);
    for s in &forwarded {
        assert!(s.starts_with("packed:"));
        assert!(!s.contains("packed:packed:"), "double packed: {}", s);
        // Child-local id 42 was rewritten into the parent's id space
        assert!(!s.contains("\"id\":42"));
    }
}

#[test]
fn subframe_recorder_forwards_through_the_port() {
    let mut parent = Page::new("https://example.com/");
    let main = parent.main();
    let body = parent.doc(main).body();
    let iframe = parent.create_element(main, "iframe");
    parent.append_child(body, iframe);
    parent.set_attribute(iframe, "src", "https://widgets.test/embed");
    let port = parent.attach_cross_origin_port(iframe);

    let h = start(parent, |options| {
        options.record_cross_origin_iframes = true;
    });
    h.events(); // parent's own meta + snapshot

    // The child frame runs the same engine in pass-through mode
    let mut child_page = Page::new("https://widgets.test/embed");
    let child_main = child_page.main();
    let child_body = child_page.doc(child_main).body();
    let button = child_page.create_element(child_main, "button");
    child_page.append_child(child_body, button);

    let child_page = Rc::new(RefCell::new(child_page));
    let child_clock = Rc::new(ManualClock::new(5_000));
    let child_handle = pagetape_recorder::record_subframe(
        child_page,
        port,
        RecordOptions {
            clock: Some(child_clock.clone()),
            ..Default::default()
        },
    )
    .unwrap();

    h.frame();
    h.handle.stop();
    child_handle.stop();

    let forwarded = h.events();
    assert_eq!(forwarded[0].event_type, EventType::Meta);
    assert_eq!(forwarded[1].event_type, EventType::FullSnapshot);
    match &forwarded[1].data {
        EventData::FullSnapshot(snapshot) => {
            let button_node = find_node(&snapshot.node, "button").expect("child button");
            // Rewritten into the parent's id space
            assert!(button_node.id > 0);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn timestamps_are_monotonic_across_a_session() {
    let (page, div) = simple_page();
    let h = start(page, |options| {
        options.checkout_every_nth = Some(3);
    });
    for i in 0..10 {
        h.page
            .borrow_mut()
            .set_attribute(div, "data-i", &i.to_string());
        h.frame();
    }
    h.handle.stop();

    let events = h.events();
    assert!(events.len() > 4);
    for pair in events.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[test]
fn stop_is_idempotent_and_silences_the_stream() {
    let (page, div) = simple_page();
    let h = start(page, |_| {});
    h.handle.stop();
    h.handle.stop();
    assert!(!h.handle.is_recording());

    h.events();
    h.page.borrow_mut().set_attribute(div, "class", "late");
    h.frame();
    assert!(h.events().is_empty());

    // The page can host a fresh recording afterwards
    let (emit, _stream) = EventStream::channel(16);
    let again = record(
        h.page.clone(),
        RecordOptions {
            emit: Some(emit),
            ..Default::default()
        },
    );
    assert!(again.is_ok());
    again.unwrap().stop();
}

#[test]
fn second_recorder_on_same_page_is_rejected() {
    let (page, _) = simple_page();
    let h = start(page, |_| {});
    let (emit, _stream) = EventStream::channel(16);
    let err = record(
        h.page.clone(),
        RecordOptions {
            emit: Some(emit),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert_eq!(err.code, pagetape_recorder::ErrorCode::RecorderBusy);
    h.handle.stop();
}

#[test]
fn missing_emit_is_fatal_at_record_time() {
    let (page, _) = simple_page();
    let page = Rc::new(RefCell::new(page));
    let err = record(page, RecordOptions::default()).unwrap_err();
    assert_eq!(err.code, pagetape_recorder::ErrorCode::InvalidConfig);
}

#[test]
fn mouse_moves_batch_with_negative_offsets() {
    let (page, div) = simple_page();
    let h = start(page, |_| {});

    for i in 0..4 {
        h.page.borrow_mut().dispatch(UiEvent::PointerMove {
            target: div,
            x: (i * 5) as f64,
            y: 10.0,
            touch: false,
        });
        h.frame();
    }
    // Pass the batch window
    h.clock.advance(60);
    h.handle.tick();
    h.handle.stop();

    let events = h.events();
    let batch = events
        .iter()
        .find(|e| incremental_source(e) == Some(IncrementalSource::MouseMove))
        .expect("mouse move batch");
    match batch.incremental().unwrap() {
        IncrementalData::MouseMove(data) => {
            assert_eq!(data.positions.len(), 4);
            assert!(data.positions.iter().all(|p| p.time_offset <= 0));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn clicks_on_blocked_elements_are_dropped() {
    let (mut page, _) = simple_page();
    let main = page.main();
    let body = page.doc(main).body();
    let secret = page.create_element(main, "section");
    page.append_child(body, secret);
    page.set_attribute(secret, "class", "rr-block");
    let inner = page.create_element(main, "button");
    page.append_child(secret, inner);

    let h = start(page, |_| {});
    h.page.borrow_mut().dispatch(UiEvent::Pointer {
        kind: PointerKind::Click,
        target: inner,
        x: 5.0,
        y: 5.0,
    });
    h.frame();
    h.handle.stop();

    let events = h.events();
    assert!(events
        .iter()
        .all(|e| incremental_source(e) != Some(IncrementalSource::MouseInteraction)));
}

#[test]
fn freeze_coalesces_and_unfreeze_flushes_once() {
    let (page, div) = simple_page();
    let h = start(page, |_| {});
    h.events();

    h.handle.freeze_page();
    for i in 0..5 {
        h.page
            .borrow_mut()
            .set_attribute(div, "data-frozen", &i.to_string());
        h.frame();
    }
    assert!(
        h.events()
            .iter()
            .all(|e| incremental_source(e) != Some(IncrementalSource::Mutation)),
        "frozen recorder must not emit mutations"
    );

    h.handle.unfreeze_page();
    h.frame();
    h.handle.stop();

    let events = h.events();
    let mutations: Vec<_> = events
        .iter()
        .filter(|e| incremental_source(e) == Some(IncrementalSource::Mutation))
        .collect();
    assert_eq!(mutations.len(), 1, "one coalesced flush");
    match mutations[0].incremental().unwrap() {
        IncrementalData::Mutation(data) => {
            assert_eq!(
                data.attributes[0].attributes.get("data-frozen").unwrap(),
                &Some(pagetape_recorder::event::AttrValue::Str("4".into()))
            );
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn custom_events_queue_until_after_first_snapshot() {
    let mut page = Page::new("https://example.com/");
    let main = page.main();
    page.set_ready_state(main, pagetape_dom::ReadyState::Loading);

    let page = Rc::new(RefCell::new(page));
    let (emit, stream) = EventStream::channel(256);
    let handle = record(
        page.clone(),
        RecordOptions {
            emit: Some(emit),
            ..Default::default()
        },
    )
    .unwrap();

    handle.add_custom_event("session-tag", serde_json::json!({"case": 7}));
    assert!(stream.drain_events().is_empty(), "nothing before load");

    page.borrow_mut().load(main);
    handle.tick();
    handle.stop();

    let events = stream.drain_events();
    assert_eq!(events[0].event_type, EventType::Meta);
    assert_eq!(events[1].event_type, EventType::FullSnapshot);
    assert_eq!(events[2].event_type, EventType::Custom);
    match &events[2].data {
        EventData::Custom(data) => assert_eq!(data.tag, "session-tag"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn visibility_batch_carries_one_entry_per_changed_element() {
    let mut page = Page::new("https://example.com/");
    let main = page.main();
    let body = page.doc(main).body();
    let mut cards = Vec::new();
    for i in 0..3 {
        let card = page.create_element(main, "article");
        page.append_child(body, card);
        page.set_rect(card, Rect::new(0.0, (i * 120) as f64, 300.0, 100.0));
        page.set_style(
            card,
            ComputedStyle {
                display: "none".into(),
                ..Default::default()
            },
        );
        cards.push(card);
    }

    let h = start(page, |_| {});
    h.frame(); // baseline

    {
        let mut page = h.page.borrow_mut();
        for &card in &cards {
            page.set_style(card, ComputedStyle::default());
        }
    }
    h.frame();
    h.handle.stop();

    let events = h.events();
    let batches: Vec<_> = events
        .iter()
        .filter(|e| incremental_source(e) == Some(IncrementalSource::VisibilityMutation))
        .collect();
    assert_eq!(batches.len(), 1, "k changes, one batch");
    match batches[0].incremental().unwrap() {
        IncrementalData::VisibilityMutation(data) => {
            assert_eq!(data.mutations.len(), 3);
            assert!(data.mutations.iter().all(|m| m.is_visible));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn checkout_every_nvm_triggers_on_visibility_changes() {
    let mut page = Page::new("https://example.com/");
    let main = page.main();
    let body = page.doc(main).body();
    let banner = page.create_element(main, "aside");
    page.append_child(body, banner);
    page.set_rect(banner, Rect::new(0.0, 0.0, 100.0, 100.0));

    let h = start(page, |options| {
        options.checkout_every_nvm = Some(2);
    });
    h.frame(); // baseline

    // Two flips -> two visibility entries -> checkout
    for visible in [false, true] {
        let style = if visible {
            ComputedStyle::default()
        } else {
            ComputedStyle {
                display: "none".into(),
                ..Default::default()
            }
        };
        h.page.borrow_mut().set_style(banner, style);
        h.frame();
    }
    h.handle.stop();

    let events = h.events();
    let full_snapshots = events
        .iter()
        .filter(|e| e.event_type == EventType::FullSnapshot)
        .count();
    assert_eq!(full_snapshots, 2, "initial + visibility checkout");
}
