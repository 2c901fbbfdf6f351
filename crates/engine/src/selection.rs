use std::fmt;

/// Which entity, if any, is selected and how far the selection has progressed.
///
/// At most one entity is ever selected: `TitleShown` and `DetailOpen` carry
/// the single selected id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectionState {
    #[default]
    Idle,
    /// The title overlay is mounted over the entity's pin.
    TitleShown(String),
    /// The detail panel is open above the title overlay.
    DetailOpen(String),
}

impl SelectionState {
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            SelectionState::Idle => None,
            SelectionState::TitleShown(id) | SelectionState::DetailOpen(id) => Some(id),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SelectionState::Idle)
    }
}

impl fmt::Display for SelectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionState::Idle => write!(f, "idle"),
            SelectionState::TitleShown(id) => write!(f, "title({})", id),
            SelectionState::DetailOpen(id) => write!(f, "detail({})", id),
        }
    }
}

/// User or host input that can move the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionEvent<'a> {
    PinClick(&'a str),
    OverlayClick,
    OutsideClick,
    ExplicitClose,
    /// Selection requested by the host (deep link, recents, search result).
    Programmatic(&'a str),
}

/// What the engine has to do in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Stay,
    /// Tear down whatever is shown, then select `id` from scratch.
    Select(String),
    OpenDetail(String),
    Deselect,
}

/// The selection state machine, as a pure function.
pub fn next(state: &SelectionState, event: SelectionEvent<'_>) -> Transition {
    use SelectionEvent::*;
    use SelectionState::*;

    match (state, event) {
        (Idle, PinClick(id) | Programmatic(id)) => Transition::Select(id.to_string()),
        (TitleShown(current) | DetailOpen(current), PinClick(id)) => {
            if current == id {
                Transition::Deselect
            } else {
                Transition::Select(id.to_string())
            }
        }
        (TitleShown(current) | DetailOpen(current), Programmatic(id)) => {
            if current == id {
                Transition::Stay
            } else {
                Transition::Select(id.to_string())
            }
        }
        (TitleShown(current), OverlayClick) => Transition::OpenDetail(current.clone()),
        (DetailOpen(_), OverlayClick) => Transition::Stay,
        (TitleShown(_) | DetailOpen(_), OutsideClick) => Transition::Deselect,
        (DetailOpen(_), ExplicitClose) => Transition::Deselect,
        (TitleShown(_), ExplicitClose) => Transition::Stay,
        (Idle, OverlayClick | OutsideClick | ExplicitClose) => Transition::Stay,
    }
}

/// Suppresses the outside-click that the map reports for the same physical
/// click an overlay or marker already handled.
///
/// Armed on every marker or overlay click; the first outside click within
/// the window is swallowed and disarms it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickGuard {
    armed: bool,
    armed_at_ms: i64,
}

impl ClickGuard {
    pub fn arm(&mut self, now_ms: i64) {
        self.armed = true;
        self.armed_at_ms = now_ms;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Whether an outside click at `now_ms` must be ignored. Consumes the guard.
    pub fn suppresses(&mut self, now_ms: i64, window_ms: i64) -> bool {
        if !self.armed {
            return false;
        }
        self.armed = false;
        now_ms - self.armed_at_ms < window_ms
    }
}

/// Broadcast to subscribers on every selection state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub from: SelectionState,
    pub to: SelectionState,
    pub generation: u64,
}
