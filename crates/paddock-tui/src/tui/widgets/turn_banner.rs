// Turn banner widget: who is on the clock, which slot, and the timer.
//
// Line 1: "ON THE CLOCK: {team} (you)"
// Line 2: "Round {r}, pick {p} (#{n}) | 1:15 [PAUSED]"

use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use paddock_core::draft::countdown::DraftTimer;
use paddock_core::draft::turn::DraftPhase;

use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let mine = state.is_my_turn();
    let border = if mine {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let paragraph = Paragraph::new(build_lines(state)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Turn")
            .border_style(border),
    );
    frame.render_widget(paragraph, area);
}

fn dim(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!("  {text}"),
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::DIM),
    ))
}

pub fn build_lines(state: &ViewState) -> Vec<Line<'static>> {
    let Some(snap) = &state.snapshot else {
        return vec![dim("Waiting for draft data...")];
    };

    match snap.phase {
        DraftPhase::Completed => return vec![dim("Draft complete")],
        DraftPhase::NotStarted => return vec![dim("Draft has not started")],
        DraftPhase::InProgress | DraftPhase::Paused => {}
    }

    let Some(slot) = &snap.current else {
        return vec![dim("No turn open")];
    };

    let mut holder = vec![
        Span::styled(
            " ON THE CLOCK: ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            slot.team_name.clone(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
    ];
    if snap.is_my_turn {
        holder.push(Span::styled(
            " (you)",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ));
    }

    let mut detail = vec![Span::styled(
        format!(
            " Round {}, pick {} (#{})",
            slot.round, slot.position, slot.pick_number
        ),
        Style::default().fg(Color::Gray),
    )];
    if let Some(timer) = state.timer {
        detail.push(Span::styled(" | ", Style::default().fg(Color::Gray)));
        detail.push(Span::styled(
            format_clock(timer.time_remaining_seconds),
            timer_style(timer, snap.is_my_turn),
        ));
        if timer.is_draft_paused {
            detail.push(Span::styled(
                " PAUSED",
                Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            ));
        }
    }

    vec![Line::from(holder), Line::from(detail)]
}

fn timer_style(timer: DraftTimer, mine: bool) -> Style {
    let style = Style::default().add_modifier(Modifier::BOLD);
    if timer.is_draft_paused {
        style.fg(Color::Gray)
    } else if mine && timer.time_remaining_seconds <= 10 {
        style.fg(Color::Red)
    } else {
        style.fg(Color::White)
    }
}

/// `m:ss`.
pub fn format_clock(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
