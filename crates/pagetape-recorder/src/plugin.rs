//! Record plugins and the sequential-id annotator

use crate::event::Event;
use std::rc::Rc;

/// A plugin sees every event after timestamping and before packing, in
/// declaration order. A plugin that rewrites an event sees all prior
/// plugins' output.
pub trait RecordPlugin {
    fn name(&self) -> &str;
    fn event_processor(&mut self, event: &mut Event);
}

/// Counter source shared across frames.
pub type GetIdFn = Rc<dyn Fn() -> u64>;

/// Attaches a monotonically increasing integer to each event, either from
/// a local counter or from an injected counter shared across iframes.
pub struct SequentialIdPlugin {
    key: String,
    counter: u64,
    get_id: Option<GetIdFn>,
}

impl SequentialIdPlugin {
    pub fn new() -> Self {
        Self {
            key: "id".to_string(),
            counter: 0,
            get_id: None,
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn with_get_id(mut self, get_id: GetIdFn) -> Self {
        self.get_id = Some(get_id);
        self
    }

    fn next(&mut self) -> u64 {
        match &self.get_id {
            Some(get_id) => get_id(),
            None => {
                self.counter += 1;
                self.counter
            }
        }
    }
}

impl Default for SequentialIdPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordPlugin for SequentialIdPlugin {
    fn name(&self) -> &str {
        "sequential-id"
    }

    fn event_processor(&mut self, event: &mut Event) {
        let id = self.next();
        if self.key == "id" {
            event.id = Some(id);
        } else {
            event
                .extra
                .insert(self.key.clone(), serde_json::Value::from(id));
        }
    }
}
