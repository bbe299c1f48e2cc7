//! "Detail" screen: one row's narrative and a relevance override.

use crossterm::event::{KeyCode, KeyModifiers};
use jbook_core::ReviewSession;
use jbook_shared::Relevance;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use super::Action;
use crate::widgets::{field_block, hint, relevance_style};

pub(crate) struct DetailScreen {
    /// Dataset row being shown.
    index: Option<usize>,
    /// Pending override, applied with `a`.
    relevance: Relevance,
    rationale: String,
    editing: bool,
    scroll: u16,
}

impl DetailScreen {
    pub(crate) fn new() -> Self {
        Self {
            index: None,
            relevance: Relevance::Low,
            rationale: String::new(),
            editing: false,
            scroll: 0,
        }
    }

    pub(crate) fn is_editing(&self) -> bool {
        self.editing
    }

    pub(crate) fn open(&mut self, index: usize, session: &ReviewSession) {
        if let Some(tagged) = session.record(index) {
            self.index = Some(index);
            self.relevance = tagged.relevance;
            self.rationale = tagged.rationale.clone();
            self.editing = false;
            self.scroll = 0;
        }
    }

    pub(crate) fn draw(&self, f: &mut Frame, area: Rect, session: &ReviewSession) {
        let Some(tagged) = self.index.and_then(|i| session.record(i)) else {
            let empty = Paragraph::new("No row selected.\n\nPick a row on the Review tab and press Enter.")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title(" Detail "));
            f.render_widget(empty, area);
            return;
        };
        let r = &tagged.record;

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(5), // Identity
                Constraint::Min(5),    // Narrative
                Constraint::Length(3), // Relevance
                Constraint::Length(3), // Rationale
                Constraint::Length(1), // Hint
            ])
            .split(area);

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let identity = vec![
            Line::from(Span::styled(format!("PE {} - {}", r.pe_number, r.pe_name), bold)),
            Line::from(Span::styled(
                format!("Project {} - {}", r.project_number, r.project_name),
                bold,
            )),
            Line::from(format!("Cost Category: {}", r.cost_category)),
        ];
        f.render_widget(
            Paragraph::new(identity).block(Block::default().borders(Borders::ALL)),
            chunks[0],
        );

        let section = |title: &'static str, text: &Option<String>| {
            let mut lines = vec![Line::from(Span::styled(title, bold.fg(Color::Cyan)))];
            lines.push(Line::from(text.clone().unwrap_or_default()));
            lines.push(Line::from(""));
            lines
        };
        let mut narrative = section("Mission Description (A)", &r.mission_description_text);
        narrative.extend(section("Accomplishments / Planned (C)", &r.accomplishments_text));
        narrative.extend(section("Acquisition Strategy (D)", &r.acquisition_strategy_text));
        if let Some(new_start) = r.is_new_start {
            narrative.push(Line::from(format!(
                "New Start: {}",
                if new_start { "Yes" } else { "No" }
            )));
        }
        f.render_widget(
            Paragraph::new(narrative)
                .wrap(Wrap { trim: false })
                .scroll((self.scroll, 0))
                .block(Block::default().borders(Borders::ALL).title(" Narrative · ↑/↓ scroll ")),
            chunks[1],
        );

        let changed = self.relevance != tagged.relevance || self.rationale != tagged.rationale;
        let relevance = Line::from(vec![
            Span::raw("< "),
            Span::styled(self.relevance.as_str(), relevance_style(self.relevance)),
            Span::raw(" >"),
            Span::styled(
                if changed { "   (unsaved)" } else { "" },
                Style::default().fg(Color::Yellow),
            ),
        ]);
        f.render_widget(
            Paragraph::new(relevance).block(field_block("Relevance (←/→)", !self.editing, false)),
            chunks[2],
        );
        f.render_widget(
            Paragraph::new(self.rationale.as_str())
                .block(field_block("Rationale (e to edit)", self.editing, self.editing)),
            chunks[3],
        );

        let text = if self.editing {
            "Type to edit · Enter/Esc to stop editing"
        } else {
            "a apply override to dataset · Use the Export tab to save"
        };
        f.render_widget(hint(text), chunks[4]);
    }

    pub(crate) fn handle_key(
        &mut self,
        code: KeyCode,
        _modifiers: KeyModifiers,
        session: &mut ReviewSession,
    ) -> Action {
        let Some(index) = self.index else {
            return Action::None;
        };

        if self.editing {
            match code {
                KeyCode::Esc | KeyCode::Enter => self.editing = false,
                KeyCode::Backspace => {
                    self.rationale.pop();
                }
                KeyCode::Char(c) => self.rationale.push(c),
                _ => {}
            }
            return Action::None;
        }

        match code {
            KeyCode::Left => self.relevance = self.relevance.prev(),
            KeyCode::Right => self.relevance = self.relevance.next(),
            KeyCode::Up | KeyCode::Char('k') => self.scroll = self.scroll.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => self.scroll = self.scroll.saturating_add(1),
            KeyCode::Char('e') => self.editing = true,
            KeyCode::Char('a') => {
                return match session.apply_override(index, self.relevance, self.rationale.clone()) {
                    Ok(()) => Action::Status(format!(
                        "Row {index} set to {}. Use Export to save.",
                        self.relevance
                    )),
                    Err(e) => Action::Status(format!("Override failed: {e}")),
                };
            }
            _ => {}
        }
        Action::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbook_shared::{RelevanceWeights, TaggedRecord};

    #[test]
    fn override_applies_draft_to_the_dataset() {
        let mut session = ReviewSession::new(
            vec![TaggedRecord::default(), TaggedRecord::default()],
            RelevanceWeights::default(),
        );
        let mut screen = DetailScreen::new();
        screen.open(1, &session);

        screen.handle_key(KeyCode::Left, KeyModifiers::NONE, &mut session);
        assert_eq!(screen.relevance, Relevance::Medium);
        screen.handle_key(KeyCode::Char('e'), KeyModifiers::NONE, &mut session);
        for c in "core".chars() {
            screen.handle_key(KeyCode::Char(c), KeyModifiers::NONE, &mut session);
        }
        screen.handle_key(KeyCode::Esc, KeyModifiers::NONE, &mut session);
        assert_eq!(session.record(1).unwrap().relevance, Relevance::Low);

        let action = screen.handle_key(KeyCode::Char('a'), KeyModifiers::NONE, &mut session);
        assert!(matches!(action, Action::Status(_)));
        assert_eq!(session.record(1).unwrap().relevance, Relevance::Medium);
        assert_eq!(session.record(1).unwrap().rationale, "core");
        assert_eq!(session.record(0).unwrap().relevance, Relevance::Low);
    }

    #[test]
    fn keys_do_nothing_without_a_row() {
        let mut session = ReviewSession::default();
        let mut screen = DetailScreen::new();
        assert_eq!(
            screen.handle_key(KeyCode::Char('a'), KeyModifiers::NONE, &mut session),
            Action::None
        );
    }
}
