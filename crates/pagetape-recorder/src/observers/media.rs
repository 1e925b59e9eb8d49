//! Media element interactions

use crate::error::Result;
use crate::event::{IncrementalData, IncrementalSource, MediaInteractionData, MediaInteractionKind};
use crate::observers::{element_blocked, Observer, ObserverContext};
use pagetape_dom::{MediaKind, PageNotice};
use std::collections::HashMap;

pub struct MediaInteractionObserver {
    last_emit: HashMap<i64, u64>,
}

impl MediaInteractionObserver {
    pub fn new() -> Self {
        Self {
            last_emit: HashMap::new(),
        }
    }
}

fn map_kind(kind: MediaKind) -> MediaInteractionKind {
    match kind {
        MediaKind::Play => MediaInteractionKind::Play,
        MediaKind::Pause => MediaInteractionKind::Pause,
        MediaKind::Seeked => MediaInteractionKind::Seeked,
        MediaKind::VolumeChange => MediaInteractionKind::VolumeChange,
    }
}

impl Observer for MediaInteractionObserver {
    fn name(&self) -> &'static str {
        "media-interaction"
    }

    fn handle(
        &mut self,
        notice: &PageNotice,
        ctx: &ObserverContext,
        out: &mut Vec<IncrementalData>,
    ) -> Result<()> {
        let (target, kind) = match notice {
            PageNotice::Media { target, kind } => (*target, *kind),
            _ => return Ok(()),
        };

        if element_blocked(ctx.page, ctx.options, target) {
            return Ok(());
        }
        let id = ctx.mirror.get_id(Some(target));
        if id <= 0 {
            return Ok(());
        }

        let throttle = ctx.options.sampling.media;
        if throttle > 0 {
            if let Some(&last) = self.last_emit.get(&id) {
                if ctx.now.saturating_sub(last) < throttle {
                    return Ok(());
                }
            }
        }
        self.last_emit.insert(id, ctx.now);

        let state = ctx.page.media_state(target).unwrap_or_default();
        out.push(IncrementalData::MediaInteraction(MediaInteractionData {
            source: IncrementalSource::MediaInteraction,
            interaction: map_kind(kind),
            id,
            current_time: Some(state.current_time),
            volume: Some(state.volume),
            muted: Some(state.muted),
            playback_rate: Some(state.playback_rate),
        }));
        Ok(())
    }
}
