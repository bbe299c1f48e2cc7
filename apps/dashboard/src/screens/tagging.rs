//! "Tagging" screen: keywords, provider, model, definitions and a run action.

use crossterm::event::{KeyCode, KeyModifiers};
use jbook_core::ReviewSession;
use jbook_shared::{AppConfig, ProviderKind};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use super::Action;
use crate::widgets::{field_block, hint};

const MAX_CONCURRENCY: usize = 16;

/// Which input field is focused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Keywords,
    Provider,
    Model,
    Definitions,
    Concurrency,
    Run,
}

impl Field {
    const ALL: [Field; 6] = [
        Self::Keywords,
        Self::Provider,
        Self::Model,
        Self::Definitions,
        Self::Concurrency,
        Self::Run,
    ];

    fn is_text(self) -> bool {
        matches!(self, Self::Keywords | Self::Model | Self::Definitions)
    }
}

/// Snapshot of the form handed to the app when a run starts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TagForm {
    pub keywords: Vec<String>,
    pub provider: ProviderKind,
    pub model: String,
    /// Raw JSON object text; parsed by the app.
    pub definitions: String,
    pub concurrency: usize,
}

pub(crate) struct TaggingScreen {
    keywords: String,
    provider: ProviderKind,
    model: String,
    definitions: String,
    concurrency: usize,
    focused: Field,
    editing: bool,
    progress: Option<(usize, usize)>,
    last_result: Option<String>,
}

impl TaggingScreen {
    pub(crate) fn new(config: &AppConfig) -> Self {
        Self {
            keywords: config.tagging.keywords.join(", "),
            provider: config.llm.provider,
            model: config.llm.default_model.clone(),
            definitions: String::new(),
            concurrency: config.defaults.concurrency.clamp(1, MAX_CONCURRENCY),
            focused: Field::Keywords,
            editing: false,
            progress: None,
            last_result: None,
        }
    }

    pub(crate) fn is_editing(&self) -> bool {
        self.editing
    }

    pub(crate) fn is_running(&self) -> bool {
        self.progress.is_some()
    }

    /// Mark a run as started (or advanced).
    pub(crate) fn set_progress(&mut self, current: usize, total: usize) {
        self.progress = Some((current, total));
    }

    /// Mark the run as over, with a one-line summary.
    pub(crate) fn finish(&mut self, summary: impl Into<String>) {
        self.progress = None;
        self.last_result = Some(summary.into());
    }

    fn form(&self) -> TagForm {
        TagForm {
            keywords: self
                .keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect(),
            provider: self.provider,
            model: self.model.trim().to_string(),
            definitions: self.definitions.clone(),
            concurrency: self.concurrency,
        }
    }

    pub(crate) fn draw(&self, f: &mut Frame, area: Rect, session: &ReviewSession) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Keywords
                Constraint::Length(3), // Provider + model
                Constraint::Length(5), // Definitions
                Constraint::Length(3), // Concurrency + run
                Constraint::Length(1), // Hint
                Constraint::Length(3), // Progress
                Constraint::Min(1),    // Last result
            ])
            .split(area);

        let editing = |field: Field| self.focused == field && self.editing;
        let focused = |field: Field| self.focused == field;

        f.render_widget(
            Paragraph::new(self.keywords.as_str()).block(field_block(
                "Keywords (comma-separated)",
                focused(Field::Keywords),
                editing(Field::Keywords),
            )),
            chunks[0],
        );

        let row = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(chunks[1]);
        f.render_widget(
            Paragraph::new(format!("< {} >", self.provider))
                .block(field_block("Provider", focused(Field::Provider), false)),
            row[0],
        );
        f.render_widget(
            Paragraph::new(self.model.as_str()).block(field_block(
                "Model",
                focused(Field::Model),
                editing(Field::Model),
            )),
            row[1],
        );

        let definitions = if self.definitions.is_empty() && !editing(Field::Definitions) {
            Span::styled(
                r#"{"C-UAS": "counter unmanned aircraft systems"}"#,
                Style::default().fg(Color::DarkGray),
            )
        } else {
            Span::raw(self.definitions.as_str())
        };
        f.render_widget(
            Paragraph::new(Line::from(definitions))
                .wrap(Wrap { trim: false })
                .block(field_block(
                    "Definitions (JSON, optional)",
                    focused(Field::Definitions),
                    editing(Field::Definitions),
                )),
            chunks[2],
        );

        let row = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(chunks[3]);
        f.render_widget(
            Paragraph::new(format!("< {} >", self.concurrency))
                .block(field_block("Concurrency", focused(Field::Concurrency), false)),
            row[0],
        );
        let rows = session.visible().len();
        let run_label = if self.is_running() {
            "Running...".to_string()
        } else {
            format!("Run on {rows} filtered rows")
        };
        f.render_widget(
            Paragraph::new(run_label)
                .alignment(Alignment::Center)
                .block(field_block("Action", focused(Field::Run), false)),
            row[1],
        );

        let text = if self.editing {
            "Type to edit · Esc to stop editing · Tab to next field"
        } else {
            "Enter to edit · ←/→ change · Tab next field · r run"
        };
        f.render_widget(hint(text), chunks[4]);

        let (ratio, label) = match self.progress {
            Some((current, total)) if total > 0 => (
                (current as f64 / total as f64).clamp(0.0, 1.0),
                format!("{current}/{total}"),
            ),
            Some(_) => (0.0, "starting".to_string()),
            None => (0.0, "idle".to_string()),
        };
        f.render_widget(
            Gauge::default()
                .block(Block::default().borders(Borders::ALL).title(" Progress "))
                .gauge_style(Style::default().fg(Color::Cyan))
                .ratio(ratio)
                .label(label),
            chunks[5],
        );

        f.render_widget(
            Paragraph::new(self.last_result.as_deref().unwrap_or(""))
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL).title(" Last run ")),
            chunks[6],
        );
    }

    pub(crate) fn handle_key(&mut self, code: KeyCode, _modifiers: KeyModifiers) -> Action {
        if self.editing {
            match code {
                KeyCode::Esc | KeyCode::Enter => self.editing = false,
                KeyCode::Tab => {
                    self.editing = false;
                    self.step_field(1);
                }
                KeyCode::Backspace => {
                    if let Some(field) = self.text_field_mut() {
                        field.pop();
                    }
                }
                KeyCode::Char(c) => {
                    if let Some(field) = self.text_field_mut() {
                        field.push(c);
                    }
                }
                _ => {}
            }
            return Action::None;
        }

        match code {
            KeyCode::Enter if self.focused == Field::Run => return self.run(),
            KeyCode::Enter if self.focused.is_text() => self.editing = true,
            KeyCode::Char('r') => return self.run(),
            KeyCode::Tab | KeyCode::Down => self.step_field(1),
            KeyCode::BackTab | KeyCode::Up => self.step_field(-1),
            KeyCode::Left => self.cycle(false),
            KeyCode::Right => self.cycle(true),
            _ => {}
        }
        Action::None
    }

    fn run(&self) -> Action {
        if self.is_running() {
            return Action::Status("Tagging already running".to_string());
        }
        Action::RunTagging(self.form())
    }

    fn text_field_mut(&mut self) -> Option<&mut String> {
        match self.focused {
            Field::Keywords => Some(&mut self.keywords),
            Field::Model => Some(&mut self.model),
            Field::Definitions => Some(&mut self.definitions),
            Field::Provider | Field::Concurrency | Field::Run => None,
        }
    }

    fn step_field(&mut self, delta: isize) {
        let len = Field::ALL.len() as isize;
        let current = Field::ALL
            .iter()
            .position(|&f| f == self.focused)
            .unwrap_or(0) as isize;
        self.focused = Field::ALL[(current + delta).rem_euclid(len) as usize];
    }

    fn cycle(&mut self, forward: bool) {
        match self.focused {
            Field::Provider => {
                self.provider = match self.provider {
                    ProviderKind::OpenAi => ProviderKind::RuleBased,
                    ProviderKind::RuleBased => ProviderKind::OpenAi,
                };
            }
            Field::Concurrency => {
                self.concurrency = if forward {
                    (self.concurrency + 1).min(MAX_CONCURRENCY)
                } else {
                    self.concurrency.saturating_sub(1).max(1)
                };
            }
            _ => {}
        }
    }
}
