//! Scroll throttling and viewport resizes

use crate::error::Result;
use crate::event::{IncrementalData, IncrementalSource, ScrollData, ViewportResizeData};
use crate::observers::{element_blocked, Observer, ObserverContext};
use pagetape_dom::PageNotice;
use std::collections::HashMap;

pub struct ScrollObserver {
    last_emit: HashMap<i64, u64>,
}

impl ScrollObserver {
    pub fn new() -> Self {
        Self {
            last_emit: HashMap::new(),
        }
    }
}

impl Observer for ScrollObserver {
    fn name(&self) -> &'static str {
        "scroll"
    }

    fn handle(
        &mut self,
        notice: &PageNotice,
        ctx: &ObserverContext,
        out: &mut Vec<IncrementalData>,
    ) -> Result<()> {
        let (target, x, y) = match notice {
            PageNotice::Scrolled { target, x, y } => (*target, *x, *y),
            _ => return Ok(()),
        };

        if element_blocked(ctx.page, ctx.options, target) {
            return Ok(());
        }
        let id = ctx.mirror.get_id(Some(target));
        if id <= 0 {
            return Ok(());
        }

        let throttle = ctx.options.sampling.scroll;
        if let Some(&last) = self.last_emit.get(&id) {
            if ctx.now.saturating_sub(last) < throttle {
                return Ok(());
            }
        }
        self.last_emit.insert(id, ctx.now);

        out.push(IncrementalData::Scroll(ScrollData {
            source: IncrementalSource::Scroll,
            id,
            x,
            y,
        }));
        Ok(())
    }
}

pub struct ViewportResizeObserver;

impl ViewportResizeObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for ViewportResizeObserver {
    fn name(&self) -> &'static str {
        "viewport-resize"
    }

    fn handle(
        &mut self,
        notice: &PageNotice,
        _ctx: &ObserverContext,
        out: &mut Vec<IncrementalData>,
    ) -> Result<()> {
        if let PageNotice::ViewportResized { width, height, .. } = notice {
            out.push(IncrementalData::ViewportResize(ViewportResizeData {
                source: IncrementalSource::ViewportResize,
                width: *width,
                height: *height,
            }));
        }
        Ok(())
    }
}
