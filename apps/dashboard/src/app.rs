//! Dashboard application state and event loop.

use std::io;
use std::sync::mpsc::TryRecvError;
use std::time::Duration;

use color_eyre::eyre::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use jbook_core::{ReviewSession, TaggingOptions, parse_definitions, resolve_llm_client};
use jbook_shared::{AppConfig, ProviderKind};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Tabs};
use tracing::{info, warn};

use crate::job::{JobEvent, TagJob, TagRequest};
use crate::screens::{Action, ScreenId, Screens, TagForm};
use crate::widgets::{centered_rect, status_bar};

/// Application state.
pub(crate) struct App {
    session: ReviewSession,
    config: AppConfig,
    /// Currently active screen tab.
    active_tab: usize,
    screens: Screens,
    /// Status message shown in bottom bar.
    status: String,
    show_help: bool,
    should_quit: bool,
    /// Tagging run in flight, if any.
    job: Option<TagJob>,
}

impl App {
    pub(crate) fn new(session: ReviewSession, config: AppConfig) -> Self {
        let screens = Screens::new(&config);
        Self {
            status: format!("Loaded {} rows · press ? for help", session.len()),
            session,
            config,
            active_tab: 0,
            screens,
            show_help: false,
            should_quit: false,
            job: None,
        }
    }

    fn current(&self) -> ScreenId {
        ScreenId::ALL[self.active_tab]
    }

    fn select_tab(&mut self, index: usize) {
        self.active_tab = index % ScreenId::ALL.len();
        self.status = self.current().to_string();
    }

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        let editing = self.screens.is_editing(self.current());

        // Global keybindings
        match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('q') if !editing => {
                self.should_quit = true;
                return;
            }
            KeyCode::Char('?') if !editing => {
                self.show_help = !self.show_help;
                return;
            }
            KeyCode::Char(c @ '1'..='5') if !editing => {
                self.select_tab((c as usize) - ('1' as usize));
                return;
            }
            KeyCode::Tab if !editing => {
                self.select_tab(self.active_tab + 1);
                return;
            }
            KeyCode::BackTab if !editing => {
                self.select_tab(self.active_tab + ScreenId::ALL.len() - 1);
                return;
            }
            _ => {}
        }

        // Any key dismisses the help overlay
        if self.show_help {
            self.show_help = false;
            return;
        }

        let action = self
            .screens
            .handle_key(self.current(), code, modifiers, &mut self.session);
        self.apply(action);
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::None => {}
            Action::Status(message) => self.status = message,
            Action::OpenDetail(index) => {
                self.screens.open_detail(index, &self.session);
                if let Some(pos) = ScreenId::ALL.iter().position(|&s| s == ScreenId::Detail) {
                    self.active_tab = pos;
                }
                self.status = format!("Row {index}");
            }
            Action::RunTagging(form) => self.start_tagging(form),
        }
    }

    fn start_tagging(&mut self, form: TagForm) {
        if self.job.is_some() {
            self.status = "Tagging already running".to_string();
            return;
        }
        let indices = self.session.visible();
        if indices.is_empty() {
            self.status = "No rows match the current filters".to_string();
            return;
        }
        if form.keywords.is_empty() {
            self.status = "Enter at least one keyword".to_string();
            return;
        }

        let mut notes = Vec::new();
        let definitions = if form.definitions.trim().is_empty() {
            Default::default()
        } else {
            match parse_definitions(&form.definitions) {
                Ok(defs) => defs,
                Err(e) => {
                    notes.push(format!("Invalid JSON for definitions: {e}"));
                    Default::default()
                }
            }
        };

        let client = resolve_llm_client(&self.config, form.provider, Some(&form.model));
        if client.is_none() && form.provider != ProviderKind::RuleBased {
            notes.push("LLM unavailable, using keyword rules".to_string());
        }

        let cache_path = if self.config.cache.enabled {
            self.config
                .cache
                .resolved_path()
                .inspect_err(|e| warn!(error = %e, "no cache path"))
                .ok()
        } else {
            None
        };

        let request = TagRequest {
            records: self.session.enriched(&indices),
            indices,
            options: TaggingOptions {
                keywords: form.keywords,
                definitions,
                concurrency: form.concurrency,
                max_corpus_chars: self.config.defaults.max_corpus_chars,
            },
            client,
            cache_path,
        };
        info!(rows = request.indices.len(), provider = %form.provider, "starting dashboard tagging");

        let job = TagJob::spawn(request);
        self.screens.tagging.set_progress(0, job.total);
        self.status = if notes.is_empty() {
            format!("Tagging {} rows...", job.total)
        } else {
            format!("Tagging {} rows... ({})", job.total, notes.join("; "))
        };
        self.job = Some(job);
    }

    /// Drain pending events from the tagging thread.
    fn poll_job(&mut self) {
        loop {
            let Some(job) = &self.job else {
                return;
            };
            match job.try_next() {
                Ok(JobEvent::Progress { current, total }) => {
                    self.screens.tagging.set_progress(current, total);
                }
                Ok(JobEvent::Finished {
                    indices,
                    tags,
                    stats,
                }) => {
                    self.job = None;
                    let summary = format!(
                        "Tagged {} rows: {} LLM, {} cached, {} rule-based, {} failed",
                        stats.records, stats.llm_calls, stats.cache_hits, stats.rule_based, stats.failures
                    );
                    match self.session.apply_tags(&indices, tags) {
                        Ok(()) => self.status = summary.clone(),
                        Err(e) => self.status = format!("Could not apply tags: {e}"),
                    }
                    self.screens.tagging.finish(summary);
                }
                Ok(JobEvent::Failed(message)) => {
                    self.job = None;
                    self.status = format!("Tagging failed: {message}");
                    self.screens.tagging.finish(self.status.clone());
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    self.job = None;
                    self.screens.tagging.finish("Tagging stopped unexpectedly");
                    return;
                }
            }
        }
    }
}

/// Entry point: sets up terminal, runs event loop, restores terminal.
pub(crate) fn run(session: ReviewSession, config: AppConfig) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, App::new(session, config));

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    loop {
        terminal.draw(|f| draw(f, &app))?;

        // Poll for events with 100ms timeout so job progress keeps drawing
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code, key.modifiers);
                }
            }
        }
        app.poll_job();

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tab bar
            Constraint::Min(1),    // Content
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    let titles: Vec<Line> = ScreenId::ALL
        .iter()
        .enumerate()
        .map(|(i, s)| Line::from(format!("{} {s}", i + 1)))
        .collect();
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(" J-Book Dashboard "))
        .select(app.active_tab)
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .divider(" │ ");
    f.render_widget(tabs, chunks[0]);

    app.screens.draw(app.current(), f, chunks[1], &app.session);

    f.render_widget(status_bar(&app.status), chunks[2]);

    if app.show_help {
        draw_help_overlay(f);
    }
}

fn draw_help_overlay(f: &mut Frame) {
    let area = centered_rect(60, 70, f.area());
    let bold = Style::default().add_modifier(Modifier::BOLD);

    let help_text = vec![
        Line::from("Keybindings").style(bold),
        Line::from(""),
        Line::from("  1-5          Switch to screen"),
        Line::from("  Tab/S-Tab    Next/previous screen"),
        Line::from("  ?            Toggle this help"),
        Line::from("  q / Ctrl-C   Quit"),
        Line::from(""),
        Line::from("Review:").style(bold),
        Line::from("  /            Edit text filter"),
        Line::from("  h / m / l    Toggle High / Medium / Low"),
        Line::from("  Enter        Open row details"),
        Line::from(""),
        Line::from("Detail:").style(bold),
        Line::from("  ←/→  e  a    Relevance, edit rationale, apply"),
        Line::from(""),
        Line::from("Weights:  ←/→ adjust · r reset"),
        Line::from("Tagging:  r run on filtered rows"),
        Line::from("Export:   Enter write CSV · e edit path"),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help · press any key to close ")
                .style(Style::default().bg(Color::DarkGray)),
        )
        .style(Style::default().fg(Color::White).bg(Color::DarkGray));

    f.render_widget(Clear, area);
    f.render_widget(help, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbook_shared::{EnrichedRecord, Relevance, RelevanceWeights, TaggedRecord};

    fn app() -> App {
        let rows = (0..3)
            .map(|i| TaggedRecord {
                record: EnrichedRecord {
                    pe_number: format!("060000{i}A"),
                    mission_description_text: Some("Counter-UAS radar".into()),
                    ..Default::default()
                },
                relevance: Relevance::Low,
                rationale: String::new(),
            })
            .collect();
        let mut config = AppConfig::default();
        config.cache.enabled = false;
        App::new(ReviewSession::new(rows, RelevanceWeights::default()), config)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(code, KeyModifiers::NONE);
    }

    #[test]
    fn tabs_switch_with_numbers_and_tab() {
        let mut app = app();
        press(&mut app, KeyCode::Char('3'));
        assert_eq!(app.current(), ScreenId::Weights);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.current(), ScreenId::Tagging);
        press(&mut app, KeyCode::BackTab);
        press(&mut app, KeyCode::BackTab);
        press(&mut app, KeyCode::BackTab);
        assert_eq!(app.current(), ScreenId::Review);
        press(&mut app, KeyCode::BackTab);
        assert_eq!(app.current(), ScreenId::Export);
    }

    #[test]
    fn global_keys_are_typed_while_editing() {
        let mut app = app();
        press(&mut app, KeyCode::Char('/'));
        press(&mut app, KeyCode::Char('q'));
        press(&mut app, KeyCode::Char('2'));
        assert!(!app.should_quit);
        assert_eq!(app.current(), ScreenId::Review);
        assert_eq!(app.session.filter.text, "q2");

        app.handle_key(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(app.should_quit);
    }

    #[test]
    fn enter_on_review_opens_detail() {
        let mut app = app();
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.current(), ScreenId::Detail);
        assert_eq!(app.status, "Row 1");
    }

    #[test]
    fn rule_based_tagging_updates_rows() {
        let mut app = app();
        app.start_tagging(TagForm {
            keywords: vec!["radar".into()],
            provider: ProviderKind::RuleBased,
            model: String::new(),
            definitions: "{not json".into(),
            concurrency: 2,
        });
        assert!(app.status.contains("Invalid JSON for definitions"));
        assert!(app.job.is_some());

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while app.job.is_some() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
            app.poll_job();
        }
        assert!(app.job.is_none());
        assert!(app.status.starts_with("Tagged 3 rows"), "{}", app.status);
        assert!(
            app.session
                .records()
                .iter()
                .all(|r| r.relevance != Relevance::Low)
        );
    }

    #[test]
    fn tagging_needs_visible_rows() {
        let mut app = app();
        app.session.filter.toggle(Relevance::Low);
        app.start_tagging(TagForm {
            keywords: vec!["radar".into()],
            provider: ProviderKind::RuleBased,
            model: String::new(),
            definitions: String::new(),
            concurrency: 1,
        });
        assert!(app.job.is_none());
        assert_eq!(app.status, "No rows match the current filters");
    }
}
