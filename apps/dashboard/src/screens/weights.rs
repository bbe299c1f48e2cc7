//! "Weights" screen: per-label multipliers and the live weighted total.

use crossterm::event::{KeyCode, KeyModifiers};
use jbook_core::{ReviewSession, format_currency};
use jbook_shared::{Relevance, RelevanceWeights};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use super::Action;
use crate::widgets::{hint, relevance_style};

const STEP: f64 = 0.1;

pub(crate) struct WeightsScreen {
    selected: usize,
}

impl WeightsScreen {
    pub(crate) fn new() -> Self {
        Self { selected: 0 }
    }

    fn selected_label(&self) -> Relevance {
        Relevance::ALL[self.selected.min(Relevance::ALL.len() - 1)]
    }

    pub(crate) fn draw(&self, f: &mut Frame, area: Rect, session: &ReviewSession) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Weighted total
                Constraint::Length(7), // Per-label table
                Constraint::Length(1), // Hint
                Constraint::Min(0),
            ])
            .split(area);

        let total = Line::from(vec![
            Span::raw(" Weighted Total: "),
            Span::styled(
                format_currency(session.weighted_total()),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
        ]);
        f.render_widget(
            Paragraph::new(total).block(Block::default().borders(Borders::ALL)),
            chunks[0],
        );

        let rows = Relevance::ALL.iter().enumerate().map(|(i, &label)| {
            let (count, raw) = label_totals(session, label);
            let weight = session.weights.get(label);
            let marker = if i == self.selected { "▸" } else { " " };
            let shown = if session.filter.allows(label) { "" } else { " (hidden)" };
            Row::new([
                Cell::from(marker),
                Cell::from(format!("{label}{shown}")).style(relevance_style(label)),
                Cell::from(format!("{weight:.1}")),
                Cell::from(count.to_string()),
                Cell::from(format_currency(raw)),
                Cell::from(format_currency(raw * weight)),
            ])
        });
        let header = Row::new(["", "Label", "Weight", "Rows", "Cost", "Weighted"])
            .style(Style::default().add_modifier(Modifier::BOLD));
        let widths = [
            Constraint::Length(2),
            Constraint::Length(16),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(18),
            Constraint::Length(18),
        ];
        f.render_widget(
            Table::new(rows, widths)
                .header(header)
                .block(Block::default().borders(Borders::ALL).title(" Relevance weights ")),
            chunks[1],
        );

        f.render_widget(
            hint("↑/↓ select · ←/→ or -/+ adjust by 0.1 · r reset to defaults"),
            chunks[2],
        );
    }

    pub(crate) fn handle_key(
        &mut self,
        code: KeyCode,
        _modifiers: KeyModifiers,
        session: &mut ReviewSession,
    ) -> Action {
        match code {
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected = (self.selected + 1).min(Relevance::ALL.len() - 1);
            }
            KeyCode::Left | KeyCode::Char('-') => return self.adjust(session, -STEP),
            KeyCode::Right | KeyCode::Char('+') | KeyCode::Char('=') => {
                return self.adjust(session, STEP);
            }
            KeyCode::Char('r') => {
                session.weights = RelevanceWeights::default();
                return Action::Status("Weights reset".to_string());
            }
            _ => {}
        }
        Action::None
    }

    fn adjust(&self, session: &mut ReviewSession, delta: f64) -> Action {
        let label = self.selected_label();
        let weight = session.weights.get_mut(label);
        *weight = round_weight(*weight + delta);
        Action::Status(format!("{label} weight = {:.1}", *weight))
    }
}

/// Clamp to non-negative and snap to one decimal so repeated steps don't drift.
fn round_weight(value: f64) -> f64 {
    ((value * 10.0).round() / 10.0).max(0.0)
}

/// Row count and unweighted cost for one label.
fn label_totals(session: &ReviewSession, label: Relevance) -> (usize, f64) {
    session
        .records()
        .iter()
        .filter(|r| r.relevance == label)
        .fold((0, 0.0), |(n, sum), r| (n + 1, sum + r.record.total_cost()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbook_shared::{EnrichedRecord, TaggedRecord};

    fn session() -> ReviewSession {
        let rows = vec![
            TaggedRecord {
                record: EnrichedRecord {
                    fy2023_cost: Some(10.0),
                    fy2024_cost: Some(20.0),
                    ..Default::default()
                },
                relevance: Relevance::Medium,
                rationale: String::new(),
            },
            TaggedRecord {
                record: EnrichedRecord {
                    fy2025_base_cost: Some(5.0),
                    ..Default::default()
                },
                relevance: Relevance::Low,
                rationale: String::new(),
            },
        ];
        ReviewSession::new(rows, RelevanceWeights::default())
    }

    #[test]
    fn adjusting_weights_updates_total() {
        let mut s = session();
        let mut screen = WeightsScreen::new();
        assert_eq!(s.weighted_total(), 15.0);

        screen.handle_key(KeyCode::Down, KeyModifiers::NONE, &mut s);
        for _ in 0..5 {
            screen.handle_key(KeyCode::Right, KeyModifiers::NONE, &mut s);
        }
        assert_eq!(s.weights.medium, 1.0);
        assert_eq!(s.weighted_total(), 30.0);
    }

    #[test]
    fn weights_never_go_negative() {
        let mut s = session();
        let mut screen = WeightsScreen::new();
        for _ in 0..3 {
            screen.handle_key(KeyCode::Down, KeyModifiers::NONE, &mut s);
        }
        screen.handle_key(KeyCode::Char('-'), KeyModifiers::NONE, &mut s);
        assert_eq!(s.weights.low, 0.0);

        screen.handle_key(KeyCode::Char('+'), KeyModifiers::NONE, &mut s);
        assert_eq!(s.weights.low, 0.1);
        screen.handle_key(KeyCode::Char('r'), KeyModifiers::NONE, &mut s);
        assert_eq!(s.weights, RelevanceWeights::default());
    }

    #[test]
    fn label_totals_count_all_rows() {
        let s = session();
        assert_eq!(label_totals(&s, Relevance::Medium), (1, 30.0));
        assert_eq!(label_totals(&s, Relevance::High), (0, 0.0));
    }
}
