//! UI events dispatched against the page

use crate::node::NodeRef;

/// Discrete pointer interactions. Continuous movement goes through
/// [`UiEvent::PointerMove`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    MouseUp,
    MouseDown,
    Click,
    ContextMenu,
    DblClick,
    Focus,
    Blur,
    TouchStart,
    TouchEnd,
    TouchCancel,
}

/// Media element interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Play,
    Pause,
    Seeked,
    VolumeChange,
}

/// A user-level event observed on the page.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Pointer {
        kind: PointerKind,
        target: NodeRef,
        x: f64,
        y: f64,
    },
    PointerMove {
        target: NodeRef,
        x: f64,
        y: f64,
        touch: bool,
    },
    /// A form control's value or checked state changed.
    Input {
        target: NodeRef,
        user_triggered: bool,
    },
    Drag {
        target: NodeRef,
        x: f64,
        y: f64,
    },
}

impl UiEvent {
    pub fn target(&self) -> NodeRef {
        match self {
            UiEvent::Pointer { target, .. }
            | UiEvent::PointerMove { target, .. }
            | UiEvent::Input { target, .. }
            | UiEvent::Drag { target, .. } => *target,
        }
    }
}
