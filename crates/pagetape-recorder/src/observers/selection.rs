//! Selection changes as id-addressed ranges

use crate::error::Result;
use crate::event::{IncrementalData, IncrementalSource, SelectionData, SelectionRangeData};
use crate::observers::{Observer, ObserverContext};
use pagetape_dom::PageNotice;

pub struct SelectionObserver;

impl SelectionObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for SelectionObserver {
    fn name(&self) -> &'static str {
        "selection"
    }

    fn handle(
        &mut self,
        notice: &PageNotice,
        ctx: &ObserverContext,
        out: &mut Vec<IncrementalData>,
    ) -> Result<()> {
        let doc = match notice {
            PageNotice::SelectionChanged { doc } => *doc,
            _ => return Ok(()),
        };

        let ranges: Vec<SelectionRangeData> = ctx
            .page
            .selection(doc)
            .iter()
            .filter_map(|range| {
                let start = ctx.mirror.get_id(Some(range.start));
                let end = ctx.mirror.get_id(Some(range.end));
                if start <= 0 || end <= 0 {
                    return None;
                }
                Some(SelectionRangeData {
                    start,
                    start_offset: range.start_offset,
                    end,
                    end_offset: range.end_offset,
                })
            })
            .collect();

        if !ranges.is_empty() {
            out.push(IncrementalData::Selection(SelectionData {
                source: IncrementalSource::Selection,
                ranges,
            }));
        }
        Ok(())
    }
}
