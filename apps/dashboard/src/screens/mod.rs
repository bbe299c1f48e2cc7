//! Dashboard screen definitions.
//!
//! Each screen corresponds to a tab and owns its own input state; the
//! dataset itself lives in the shared [`ReviewSession`].

mod detail;
mod export;
mod review;
mod tagging;
mod weights;

use std::fmt;

use crossterm::event::{KeyCode, KeyModifiers};
use jbook_core::ReviewSession;
use jbook_shared::AppConfig;
use ratatui::prelude::*;

pub(crate) use tagging::TagForm;

/// Screen identifiers, in tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScreenId {
    Review,
    Detail,
    Weights,
    Tagging,
    Export,
}

impl ScreenId {
    pub(crate) const ALL: [ScreenId; 5] = [
        Self::Review,
        Self::Detail,
        Self::Weights,
        Self::Tagging,
        Self::Export,
    ];
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Review => write!(f, "Review"),
            Self::Detail => write!(f, "Detail"),
            Self::Weights => write!(f, "Weights"),
            Self::Tagging => write!(f, "Tagging"),
            Self::Export => write!(f, "Export"),
        }
    }
}

/// What a screen asks the app to do after a key press.
#[derive(Debug, PartialEq)]
pub(crate) enum Action {
    None,
    Status(String),
    /// Show this dataset row on the Detail tab.
    OpenDetail(usize),
    /// Run tagging over the filtered rows with this form.
    RunTagging(TagForm),
}

/// Per-screen state and behaviour.
pub(crate) struct Screens {
    review: review::ReviewScreen,
    detail: detail::DetailScreen,
    weights: weights::WeightsScreen,
    pub tagging: tagging::TaggingScreen,
    export: export::ExportScreen,
}

impl Screens {
    pub(crate) fn new(config: &AppConfig) -> Self {
        Self {
            review: review::ReviewScreen::new(),
            detail: detail::DetailScreen::new(),
            weights: weights::WeightsScreen::new(),
            tagging: tagging::TaggingScreen::new(config),
            export: export::ExportScreen::new(),
        }
    }

    /// Whether the screen has an active text input field.
    pub(crate) fn is_editing(&self, id: ScreenId) -> bool {
        match id {
            ScreenId::Review => self.review.is_editing(),
            ScreenId::Detail => self.detail.is_editing(),
            ScreenId::Weights => false,
            ScreenId::Tagging => self.tagging.is_editing(),
            ScreenId::Export => self.export.is_editing(),
        }
    }

    pub(crate) fn open_detail(&mut self, index: usize, session: &ReviewSession) {
        self.detail.open(index, session);
    }

    pub(crate) fn draw(&self, id: ScreenId, f: &mut Frame, area: Rect, session: &ReviewSession) {
        match id {
            ScreenId::Review => self.review.draw(f, area, session),
            ScreenId::Detail => self.detail.draw(f, area, session),
            ScreenId::Weights => self.weights.draw(f, area, session),
            ScreenId::Tagging => self.tagging.draw(f, area, session),
            ScreenId::Export => self.export.draw(f, area, session),
        }
    }

    pub(crate) fn handle_key(
        &mut self,
        id: ScreenId,
        code: KeyCode,
        modifiers: KeyModifiers,
        session: &mut ReviewSession,
    ) -> Action {
        match id {
            ScreenId::Review => self.review.handle_key(code, modifiers, session),
            ScreenId::Detail => self.detail.handle_key(code, modifiers, session),
            ScreenId::Weights => self.weights.handle_key(code, modifiers, session),
            ScreenId::Tagging => self.tagging.handle_key(code, modifiers),
            ScreenId::Export => self.export.handle_key(code, modifiers, session),
        }
    }
}
