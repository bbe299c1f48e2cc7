//! "Export" screen: write the reviewed dataset to a tagged CSV.

use std::path::Path;

use crossterm::event::{KeyCode, KeyModifiers};
use jbook_core::ReviewSession;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use super::Action;
use crate::widgets::{field_block, hint};

const DEFAULT_EXPORT_PATH: &str = "enriched_tagged.csv";

pub(crate) struct ExportScreen {
    path: String,
    editing: bool,
    message: Option<String>,
}

impl ExportScreen {
    pub(crate) fn new() -> Self {
        Self {
            path: DEFAULT_EXPORT_PATH.to_string(),
            editing: false,
            message: None,
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
                Constraint::Length(3), // Path
                Constraint::Length(1), // Hint
                Constraint::Length(4), // Summary
                Constraint::Min(1),    // Result
            ])
            .split(area);

        f.render_widget(
            Paragraph::new(self.path.as_str())
                .block(field_block("Output CSV", true, self.editing)),
            chunks[0],
        );

        let text = if self.editing {
            "Type to edit · Enter/Esc to stop editing"
        } else {
            "Enter to export · e to edit the path"
        };
        f.render_widget(hint(text), chunks[1]);

        let source = session
            .source()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(in memory)".to_string());
        let summary = vec![
            Line::from(format!("Source: {source}")),
            Line::from(format!(
                "All {} rows are written, including rows hidden by filters.",
                session.len()
            )),
        ];
        f.render_widget(Paragraph::new(summary), chunks[2]);

        if let Some(message) = &self.message {
            f.render_widget(
                Paragraph::new(message.as_str())
                    .wrap(Wrap { trim: true })
                    .block(Block::default().borders(Borders::ALL).title(" Result ")),
                chunks[3],
            );
        }
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
                    self.path.pop();
                }
                KeyCode::Char(c) => self.path.push(c),
                _ => {}
            }
            return Action::None;
        }

        match code {
            KeyCode::Char('e') => {
                self.editing = true;
                Action::None
            }
            KeyCode::Enter => self.export(session),
            _ => Action::None,
        }
    }

    fn export(&mut self, session: &ReviewSession) -> Action {
        let path = self.path.trim();
        if path.is_empty() {
            return Action::Status("Export path is empty".to_string());
        }
        let message = match session.export(Path::new(path)) {
            Ok(()) => {
                tracing::info!(path, rows = session.len(), "exported tagged dataset");
                format!("Wrote {} rows to {path}", session.len())
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "export failed");
                format!("Export failed: {e}")
            }
        };
        self.message = Some(message.clone());
        Action::Status(message)
    }
}
