//! Reusable dashboard widgets.

use jbook_shared::Relevance;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

/// Bottom status bar.
pub(crate) fn status_bar(msg: &str) -> Paragraph<'_> {
    Paragraph::new(format!(" {msg}")).style(Style::default().bg(Color::DarkGray).fg(Color::White))
}

/// Bordered block for an input field; yellow while editing, cyan when focused.
pub(crate) fn field_block(title: &str, focused: bool, editing: bool) -> Block<'_> {
    let style = if focused && editing {
        Style::default().fg(Color::Yellow)
    } else if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .title(format!(" {title} "))
        .border_style(style)
}

/// Centered hint line under a form.
pub(crate) fn hint(text: &str) -> Paragraph<'_> {
    Paragraph::new(text)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
}

pub(crate) fn relevance_style(relevance: Relevance) -> Style {
    match relevance {
        Relevance::High => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        Relevance::Medium => Style::default().fg(Color::Yellow),
        Relevance::Low => Style::default().fg(Color::DarkGray),
    }
}

/// Cost cell text; blank when missing.
pub(crate) fn cost(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.3}")).unwrap_or_default()
}

/// Create a centered rectangle with percentage width and height.
pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
