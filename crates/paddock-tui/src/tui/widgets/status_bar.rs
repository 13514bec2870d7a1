// Status bar widget: connection indicator, draft phase, pick counter.

use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use paddock_core::protocol::ConnectionStatus;

use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let (label, color) = connection_indicator(state.connection_status);
    let mut spans = vec![
        Span::styled(" ● ", Style::default().fg(color)),
        Span::styled(label, Style::default().fg(Color::White)),
        Span::styled(" | ", Style::default().fg(Color::Gray)),
    ];

    match &state.snapshot {
        Some(snap) => {
            spans.push(Span::styled(
                snap.phase.label(),
                Style::default().fg(Color::White),
            ));
            spans.push(Span::styled(" | ", Style::default().fg(Color::Gray)));
            spans.push(Span::styled(
                format!("Pick {}/{}", snap.picks.len(), snap.total_picks),
                Style::default().fg(Color::White),
            ));
            spans.push(Span::styled(
                format!(" | {}", snap.method.as_str()),
                Style::default().fg(Color::Gray),
            ));
        }
        None => spans.push(Span::styled(
            "Waiting for draft data",
            Style::default().fg(Color::Gray),
        )),
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}

/// Label and dot color for a connection status.
pub fn connection_indicator(status: ConnectionStatus) -> (&'static str, Color) {
    match status {
        ConnectionStatus::Connecting => ("Connecting", Color::Yellow),
        ConnectionStatus::Connected => ("Connected", Color::Green),
        ConnectionStatus::Error => ("Reconnecting", Color::LightRed),
        ConnectionStatus::Offline => ("Offline", Color::Red),
    }
}
