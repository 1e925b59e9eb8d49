//! Font face loads

use crate::error::Result;
use crate::event::{FontData, IncrementalData, IncrementalSource};
use crate::observers::{Observer, ObserverContext};
use pagetape_dom::PageNotice;

pub struct FontObserver;

impl FontObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for FontObserver {
    fn name(&self) -> &'static str {
        "font"
    }

    fn handle(
        &mut self,
        notice: &PageNotice,
        ctx: &ObserverContext,
        out: &mut Vec<IncrementalData>,
    ) -> Result<()> {
        if !ctx.options.collect_fonts {
            return Ok(());
        }
        if let PageNotice::FontLoaded {
            family,
            src,
            descriptors,
            ..
        } = notice
        {
            out.push(IncrementalData::Font(FontData {
                source: IncrementalSource::Font,
                family: family.clone(),
                font_source: src.clone(),
                buffer: src.starts_with("data:"),
                descriptors: descriptors.iter().cloned().collect(),
            }));
        }
        Ok(())
    }
}
