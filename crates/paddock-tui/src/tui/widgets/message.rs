// Message line and help bar.
//
// A persistent consistency fault on the snapshot outranks notices; errors
// are red, notices cyan.

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::tui::{MessageKind, ViewState};

const HELP: &str =
    " j/k:Select | Enter:Pick | b:Board view | r:Refresh | o:Create order | Esc:Dismiss | q:Quit";

/// Text and style for the message line, if anything should show.
pub fn current_message(state: &ViewState) -> Option<(String, Style)> {
    if let Some(fault) = state.snapshot.as_ref().and_then(|s| s.fault.as_ref()) {
        return Some((
            format!(" FAULT: {fault}"),
            Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::BOLD),
        ));
    }
    state.message.as_ref().map(|m| match m.kind {
        MessageKind::Error => (format!(" {}", m.text), Style::default().fg(Color::Red)),
        MessageKind::Notice => (format!(" {}", m.text), Style::default().fg(Color::Cyan)),
    })
}

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let line = match current_message(state) {
        Some((text, style)) => Line::from(Span::styled(text, style)),
        None => Line::default(),
    };
    frame.render_widget(Paragraph::new(line), area);
}

pub fn render_help(frame: &mut Frame, area: Rect) {
    let paragraph = Paragraph::new(Line::from(Span::styled(
        HELP,
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::DIM),
    )))
    .style(Style::default().bg(Color::DarkGray));
    frame.render_widget(paragraph, area);
}
