//! Canvas draw capture: command lists, or snapshots when an fps cap is set

use crate::error::Result;
use crate::event::{
    CanvasCommandData, CanvasContext, CanvasMutationData, IncrementalData, IncrementalSource,
};
use crate::observers::{element_blocked, Observer, ObserverContext};
use pagetape_dom::{CanvasContextKind, NodeRef, PageNotice};
use std::collections::HashMap;

pub struct CanvasObserver {
    /// Canvases with unemitted draws and how many commands were already
    /// captured from each.
    cursors: HashMap<NodeRef, usize>,
    dirty: Vec<NodeRef>,
    last_snapshot: HashMap<NodeRef, u64>,
}

impl CanvasObserver {
    pub fn new() -> Self {
        Self {
            cursors: HashMap::new(),
            dirty: Vec::new(),
            last_snapshot: HashMap::new(),
        }
    }
}

fn map_context(kind: CanvasContextKind) -> CanvasContext {
    match kind {
        CanvasContextKind::TwoD => CanvasContext::TwoD,
        CanvasContextKind::WebGl => CanvasContext::WebGl,
        CanvasContextKind::WebGl2 => CanvasContext::WebGl2,
    }
}

impl Observer for CanvasObserver {
    fn name(&self) -> &'static str {
        "canvas"
    }

    fn handle(
        &mut self,
        notice: &PageNotice,
        ctx: &ObserverContext,
        _out: &mut Vec<IncrementalData>,
    ) -> Result<()> {
        if !ctx.options.record_canvas {
            return Ok(());
        }
        if let PageNotice::CanvasDraw { target } = notice {
            if !self.dirty.contains(target) {
                self.dirty.push(*target);
            }
        }
        Ok(())
    }

    fn on_frame(&mut self, ctx: &ObserverContext, out: &mut Vec<IncrementalData>) -> Result<()> {
        if !ctx.options.record_canvas {
            return Ok(());
        }

        for target in std::mem::take(&mut self.dirty) {
            if element_blocked(ctx.page, ctx.options, target) {
                continue;
            }
            let id = ctx.mirror.get_id(Some(target));
            if id <= 0 {
                // Not in the stream yet; try again after the next add
                self.dirty.push(target);
                continue;
            }
            let state = match ctx.page.canvas_state(target) {
                Some(state) => state,
                None => continue,
            };
            let context = map_context(state.context);

            if let Some(fps) = ctx.options.sampling.canvas.fps {
                let interval = 1000 / u64::from(fps.max(1));
                let due = self
                    .last_snapshot
                    .get(&target)
                    .map(|&last| ctx.now.saturating_sub(last) >= interval)
                    .unwrap_or(true);
                if !due {
                    self.dirty.push(target);
                    continue;
                }
                let data_url = match &state.data_url {
                    Some(url) => url.clone(),
                    None => continue,
                };
                self.last_snapshot.insert(target, ctx.now);
                self.cursors.insert(target, state.commands.len());
                out.push(IncrementalData::CanvasMutation(CanvasMutationData {
                    source: IncrementalSource::CanvasMutation,
                    id,
                    context,
                    commands: vec![CanvasCommandData {
                        property: "dataURL".to_string(),
                        args: vec![serde_json::Value::String(data_url)],
                    }],
                }));
            } else {
                let cursor = self.cursors.get(&target).copied().unwrap_or(0);
                let commands: Vec<CanvasCommandData> = state.commands[cursor.min(state.commands.len())..]
                    .iter()
                    .map(|c| CanvasCommandData {
                        property: c.property.clone(),
                        args: c.args.clone(),
                    })
                    .collect();
                if commands.is_empty() {
                    continue;
                }
                self.cursors.insert(target, state.commands.len());
                out.push(IncrementalData::CanvasMutation(CanvasMutationData {
                    source: IncrementalSource::CanvasMutation,
                    id,
                    context,
                    commands,
                }));
            }
        }
        Ok(())
    }
}
