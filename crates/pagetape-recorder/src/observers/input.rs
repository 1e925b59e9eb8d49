//! Form control input capture with masking and sampling

use crate::error::Result;
use crate::event::{IncrementalData, IncrementalSource, InputData};
use crate::observers::{element_blocked, Observer, ObserverContext};
use crate::serializer::mask;
use pagetape_dom::{NodeRef, PageNotice, UiEvent};

pub struct InputObserver {
    /// Pending per-id values under `last` sampling; last writer wins.
    pending: Vec<(i64, InputData)>,
}

impl InputObserver {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    fn build(ctx: &ObserverContext, target: NodeRef, user_triggered: bool) -> Option<InputData> {
        let id = ctx.mirror.get_id(Some(target));
        if id <= 0 {
            return None;
        }
        if element_blocked(ctx.page, ctx.options, target) {
            return None;
        }

        let value = ctx.page.value(target).unwrap_or_default();
        let text = mask::mask_input_value(ctx.page, ctx.options, target, &value).unwrap_or(value);
        let is_checked = ctx.page.checked(target).unwrap_or(false);

        Some(InputData {
            source: IncrementalSource::Input,
            id,
            text,
            is_checked,
            user_triggered: ctx
                .options
                .user_triggered_on_input
                .then_some(user_triggered),
        })
    }
}

impl Observer for InputObserver {
    fn name(&self) -> &'static str {
        "input"
    }

    fn handle(
        &mut self,
        notice: &PageNotice,
        ctx: &ObserverContext,
        out: &mut Vec<IncrementalData>,
    ) -> Result<()> {
        let (target, user_triggered) = match notice {
            PageNotice::Ui(UiEvent::Input {
                target,
                user_triggered,
            }) => (*target, *user_triggered),
            _ => return Ok(()),
        };

        let data = match Self::build(ctx, target, user_triggered) {
            Some(data) => data,
            None => return Ok(()),
        };

        match ctx.options.sampling.input {
            crate::config::InputSampling::All => out.push(IncrementalData::Input(data)),
            crate::config::InputSampling::Last => {
                match self.pending.iter_mut().find(|(id, _)| *id == data.id) {
                    Some((_, existing)) => *existing = data,
                    None => self.pending.push((data.id, data)),
                }
            }
        }
        Ok(())
    }

    fn on_frame(&mut self, _ctx: &ObserverContext, out: &mut Vec<IncrementalData>) -> Result<()> {
        for (_, data) in self.pending.drain(..) {
            out.push(IncrementalData::Input(data));
        }
        Ok(())
    }
}
