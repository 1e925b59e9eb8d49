//! Custom element definitions

use crate::error::Result;
use crate::event::{CustomElementData, CustomElementDefine, IncrementalData, IncrementalSource};
use crate::observers::{Observer, ObserverContext};
use pagetape_dom::PageNotice;

pub struct CustomElementObserver;

impl CustomElementObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for CustomElementObserver {
    fn name(&self) -> &'static str {
        "custom-element"
    }

    fn handle(
        &mut self,
        notice: &PageNotice,
        _ctx: &ObserverContext,
        out: &mut Vec<IncrementalData>,
    ) -> Result<()> {
        if let PageNotice::CustomElementDefined { name, .. } = notice {
            out.push(IncrementalData::CustomElement(CustomElementData {
                source: IncrementalSource::CustomElement,
                define: CustomElementDefine { name: name.clone() },
            }));
        }
        Ok(())
    }
}
