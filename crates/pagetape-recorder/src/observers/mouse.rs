//! Pointer movement batching and discrete pointer interactions

use crate::error::Result;
use crate::event::{
    IncrementalData, IncrementalSource, MouseInteractionData, MouseInteractionKind, MouseMoveData,
    MousePosition,
};
use crate::observers::{element_blocked, Observer, ObserverContext};
use pagetape_dom::{PageNotice, PointerKind, UiEvent};

/// Buffers continuous movement and flushes one batch per wait window,
/// with per-position offsets relative to the flush time.
pub struct MouseMoveObserver {
    /// (source, x, y, node id, capture time)
    buffer: Vec<(IncrementalSource, f64, f64, i64, u64)>,
    batch_start: Option<u64>,
}

impl MouseMoveObserver {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            batch_start: None,
        }
    }

    fn flush(&mut self, now: u64, out: &mut Vec<IncrementalData>) {
        for source in [
            IncrementalSource::MouseMove,
            IncrementalSource::TouchMove,
            IncrementalSource::Drag,
        ] {
            let positions: Vec<MousePosition> = self
                .buffer
                .iter()
                .filter(|(s, ..)| *s == source)
                .map(|&(_, x, y, id, t)| MousePosition {
                    x,
                    y,
                    id,
                    time_offset: t as i64 - now as i64,
                })
                .collect();
            if !positions.is_empty() {
                out.push(IncrementalData::MouseMove(MouseMoveData {
                    source,
                    positions,
                }));
            }
        }
        self.buffer.clear();
        self.batch_start = None;
    }
}

impl Observer for MouseMoveObserver {
    fn name(&self) -> &'static str {
        "mousemove"
    }

    fn handle(
        &mut self,
        notice: &PageNotice,
        ctx: &ObserverContext,
        _out: &mut Vec<IncrementalData>,
    ) -> Result<()> {
        let (source, target, x, y) = match notice {
            PageNotice::Ui(UiEvent::PointerMove {
                target,
                x,
                y,
                touch,
            }) => {
                let source = if *touch {
                    IncrementalSource::TouchMove
                } else {
                    IncrementalSource::MouseMove
                };
                (source, *target, *x, *y)
            }
            PageNotice::Ui(UiEvent::Drag { target, x, y }) => {
                (IncrementalSource::Drag, *target, *x, *y)
            }
            _ => return Ok(()),
        };

        let id = ctx.mirror.get_id(Some(target));
        self.buffer.push((source, x, y, id, ctx.now));
        self.batch_start.get_or_insert(ctx.now);
        Ok(())
    }

    fn on_frame(&mut self, ctx: &ObserverContext, out: &mut Vec<IncrementalData>) -> Result<()> {
        if let Some(start) = self.batch_start {
            if ctx.now.saturating_sub(start) >= ctx.options.mousemove_window() {
                self.flush(ctx.now, out);
            }
        }
        Ok(())
    }
}

/// Discrete pointer interactions, emitted immediately, honoring the
/// per-kind sampling toggles.
pub struct MouseInteractionObserver;

impl MouseInteractionObserver {
    pub fn new() -> Self {
        Self
    }
}

fn map_kind(kind: PointerKind) -> MouseInteractionKind {
    match kind {
        PointerKind::MouseUp => MouseInteractionKind::MouseUp,
        PointerKind::MouseDown => MouseInteractionKind::MouseDown,
        PointerKind::Click => MouseInteractionKind::Click,
        PointerKind::ContextMenu => MouseInteractionKind::ContextMenu,
        PointerKind::DblClick => MouseInteractionKind::DblClick,
        PointerKind::Focus => MouseInteractionKind::Focus,
        PointerKind::Blur => MouseInteractionKind::Blur,
        PointerKind::TouchStart => MouseInteractionKind::TouchStart,
        PointerKind::TouchEnd => MouseInteractionKind::TouchEnd,
        PointerKind::TouchCancel => MouseInteractionKind::TouchCancel,
    }
}

fn sampled(ctx: &ObserverContext, kind: MouseInteractionKind) -> bool {
    let s = &ctx.options.sampling.mouse_interaction;
    match kind {
        MouseInteractionKind::MouseUp => s.mouse_up,
        MouseInteractionKind::MouseDown => s.mouse_down,
        MouseInteractionKind::Click => s.click,
        MouseInteractionKind::ContextMenu => s.context_menu,
        MouseInteractionKind::DblClick => s.dbl_click,
        MouseInteractionKind::Focus => s.focus,
        MouseInteractionKind::Blur => s.blur,
        MouseInteractionKind::TouchStart => s.touch_start,
        MouseInteractionKind::TouchEnd => s.touch_end,
        MouseInteractionKind::TouchCancel => s.touch_cancel,
    }
}

impl Observer for MouseInteractionObserver {
    fn name(&self) -> &'static str {
        "mouse-interaction"
    }

    fn handle(
        &mut self,
        notice: &PageNotice,
        ctx: &ObserverContext,
        out: &mut Vec<IncrementalData>,
    ) -> Result<()> {
        let (kind, target, x, y) = match notice {
            PageNotice::Ui(UiEvent::Pointer {
                kind,
                target,
                x,
                y,
            }) => (map_kind(*kind), *target, *x, *y),
            _ => return Ok(()),
        };

        if !sampled(ctx, kind) {
            return Ok(());
        }
        if element_blocked(ctx.page, ctx.options, target) {
            return Ok(());
        }
        let id = ctx.mirror.get_id(Some(target));
        if id <= 0 {
            return Ok(());
        }

        out.push(IncrementalData::MouseInteraction(MouseInteractionData {
            source: IncrementalSource::MouseInteraction,
            interaction: kind,
            id,
            x,
            y,
        }));
        Ok(())
    }
}
