//! "Review" screen: weighted total, filters, and the dataset table.

use crossterm::event::{KeyCode, KeyModifiers};
use jbook_core::{ReviewSession, format_currency};
use jbook_shared::Relevance;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

use super::Action;
use crate::widgets::{cost, field_block, relevance_style};

const PAGE: usize = 10;

pub(crate) struct ReviewScreen {
    /// Position within the visible rows.
    selected: usize,
    editing: bool,
}

impl ReviewScreen {
    pub(crate) fn new() -> Self {
        Self {
            selected: 0,
            editing: false,
        }
    }

    pub(crate) fn is_editing(&self) -> bool {
        self.editing
    }

    pub(crate) fn draw(&self, f: &mut Frame, area: Rect, session: &ReviewSession) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Total + counts
                Constraint::Length(3), // Filters
                Constraint::Min(3),    // Table
            ])
            .split(area);

        let visible = session.visible();

        let summary = Line::from(vec![
            Span::raw(" Weighted Total: "),
            Span::styled(
                format_currency(session.weighted_total()),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("   {} of {} rows", visible.len(), session.len()),
                Style::default().fg(Color::DarkGray),
            ),
        ]);
        f.render_widget(
            Paragraph::new(summary).block(Block::default().borders(Borders::ALL)),
            chunks[0],
        );

        let filter_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        let filter_text = if session.filter.text.is_empty() && !self.editing {
            Span::styled("press / to filter", Style::default().fg(Color::DarkGray))
        } else {
            Span::raw(session.filter.text.as_str())
        };
        f.render_widget(
            Paragraph::new(Line::from(filter_text)).block(field_block(
                "Filter (PE / Project / CostCategory)",
                self.editing,
                self.editing,
            )),
            filter_chunks[0],
        );

        let toggles: Vec<Span> = Relevance::ALL
            .iter()
            .flat_map(|&r| {
                let mark = if session.filter.allows(r) { "[x]" } else { "[ ]" };
                let key = r.as_str()[..1].to_lowercase();
                [
                    Span::raw(format!(" {mark} ")),
                    Span::styled(format!("{r}({key})"), relevance_style(r)),
                ]
            })
            .collect();
        f.render_widget(
            Paragraph::new(Line::from(toggles)).block(field_block("Relevance", false, false)),
            filter_chunks[1],
        );

        let header = Row::new([
            "PE", "PE Name", "Project", "Project Name", "Cost Category", "FY23", "FY24", "FY25 Base",
            "Relevance",
        ])
        .style(Style::default().add_modifier(Modifier::BOLD));

        let rows: Vec<Row> = visible
            .iter()
            .filter_map(|&i| session.record(i))
            .map(|t| {
                let r = &t.record;
                Row::new([
                    Cell::from(r.pe_number.clone()),
                    Cell::from(r.pe_name.clone()),
                    Cell::from(r.project_number.clone()),
                    Cell::from(r.project_name.clone()),
                    Cell::from(r.cost_category.clone()),
                    Cell::from(cost(r.fy2023_cost)),
                    Cell::from(cost(r.fy2024_cost)),
                    Cell::from(cost(r.fy2025_base_cost)),
                    Cell::from(t.relevance.as_str()).style(relevance_style(t.relevance)),
                ])
            })
            .collect();

        let widths = [
            Constraint::Length(10),
            Constraint::Percentage(20),
            Constraint::Length(8),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(9),
        ];
        let table = Table::new(rows, widths)
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Rows · ↑/↓ select · Enter details · h/m/l toggle "),
            )
            .row_highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol("▸ ");

        let mut state = TableState::default();
        if !visible.is_empty() {
            state.select(Some(self.selected.min(visible.len() - 1)));
        }
        f.render_stateful_widget(table, chunks[2], &mut state);
    }

    pub(crate) fn handle_key(
        &mut self,
        code: KeyCode,
        _modifiers: KeyModifiers,
        session: &mut ReviewSession,
    ) -> Action {
        if self.editing {
            match code {
                KeyCode::Esc | KeyCode::Enter => self.editing = false,
                KeyCode::Backspace => {
                    session.filter.text.pop();
                }
                KeyCode::Char(c) => session.filter.text.push(c),
                _ => {}
            }
            self.clamp(session);
            return Action::None;
        }

        let action = match code {
            KeyCode::Char('/') => {
                self.editing = true;
                Action::None
            }
            KeyCode::Char(c @ ('h' | 'm' | 'l')) => {
                let relevance = match c {
                    'h' => Relevance::High,
                    'm' => Relevance::Medium,
                    _ => Relevance::Low,
                };
                session.filter.toggle(relevance);
                let state = if session.filter.allows(relevance) { "shown" } else { "hidden" };
                Action::Status(format!("{relevance} rows {state}"))
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                Action::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected += 1;
                Action::None
            }
            KeyCode::PageUp => {
                self.selected = self.selected.saturating_sub(PAGE);
                Action::None
            }
            KeyCode::PageDown => {
                self.selected += PAGE;
                Action::None
            }
            KeyCode::Home => {
                self.selected = 0;
                Action::None
            }
            KeyCode::End => {
                self.selected = usize::MAX;
                Action::None
            }
            KeyCode::Enter => match session.visible().get(self.selected) {
                Some(&index) => Action::OpenDetail(index),
                None => Action::Status("No row selected".to_string()),
            },
            _ => Action::None,
        };
        self.clamp(session);
        action
    }

    /// Keep the selection inside the visible rows.
    fn clamp(&mut self, session: &ReviewSession) {
        let count = session.visible().len();
        self.selected = self.selected.min(count.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbook_shared::{EnrichedRecord, RelevanceWeights, TaggedRecord};

    fn session() -> ReviewSession {
        let rows = ["Alpha", "Beta", "Gamma"]
            .iter()
            .zip([Relevance::High, Relevance::Low, Relevance::High])
            .map(|(name, relevance)| TaggedRecord {
                record: EnrichedRecord {
                    pe_name: name.to_string(),
                    ..Default::default()
                },
                relevance,
                rationale: String::new(),
            })
            .collect();
        ReviewSession::new(rows, RelevanceWeights::default())
    }

    fn press(screen: &mut ReviewScreen, session: &mut ReviewSession, code: KeyCode) -> Action {
        screen.handle_key(code, KeyModifiers::NONE, session)
    }

    #[test]
    fn enter_opens_the_selected_dataset_row() {
        let mut s = session();
        let mut screen = ReviewScreen::new();
        press(&mut screen, &mut s, KeyCode::Char('l'));
        press(&mut screen, &mut s, KeyCode::Down);
        press(&mut screen, &mut s, KeyCode::Down);
        assert_eq!(press(&mut screen, &mut s, KeyCode::Enter), Action::OpenDetail(2));
    }

    #[test]
    fn typing_filter_text_while_editing() {
        let mut s = session();
        let mut screen = ReviewScreen::new();
        press(&mut screen, &mut s, KeyCode::Char('/'));
        assert!(screen.is_editing());
        for c in "gam".chars() {
            press(&mut screen, &mut s, KeyCode::Char(c));
        }
        press(&mut screen, &mut s, KeyCode::Enter);
        assert!(!screen.is_editing());
        assert_eq!(s.filter.text, "gam");
        assert_eq!(press(&mut screen, &mut s, KeyCode::Enter), Action::OpenDetail(2));
    }

    #[test]
    fn empty_view_has_nothing_to_open() {
        let mut s = session();
        let mut screen = ReviewScreen::new();
        for c in ['h', 'm', 'l'] {
            press(&mut screen, &mut s, KeyCode::Char(c));
        }
        assert!(matches!(press(&mut screen, &mut s, KeyCode::Enter), Action::Status(_)));
    }
}
