// Available drivers widget: the undrafted pool with a selection cursor.
//
// Columns: rank, racing number, name, constructor, season points.
// Enter submits the highlighted driver while it is the user's turn.

use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Row, Table, TableState};
use ratatui::Frame;

use paddock_core::draft::pick::Driver;

use crate::tui::ViewState;

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let drivers = state.available();

    let header = Row::new(vec![
        Cell::from("#"),
        Cell::from("No."),
        Cell::from("Driver"),
        Cell::from("Constructor"),
        Cell::from("Pts"),
    ])
    .style(
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let rows: Vec<Row> = drivers
        .iter()
        .enumerate()
        .map(|(i, d)| {
            Row::new(vec![
                Cell::from(format!("{}", i + 1)),
                Cell::from(format_number(d)),
                Cell::from(d.name.clone()),
                Cell::from(d.constructor.clone()),
                Cell::from(format!("{:.0}", d.season_points)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(3),
        Constraint::Length(4),
        Constraint::Min(14),
        Constraint::Length(14),
        Constraint::Length(5),
    ];

    let highlight = if state.is_my_turn() {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().bg(Color::DarkGray)
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Available Drivers ({})", drivers.len())),
        )
        .row_highlight_style(highlight)
        .highlight_symbol("> ");

    let mut table_state = TableState::default();
    if !drivers.is_empty() {
        table_state.select(Some(state.selected));
    }
    frame.render_stateful_widget(table, area, &mut table_state);
}

/// Racing number, or "--" for drivers without one.
pub fn format_number(driver: &Driver) -> String {
    driver
        .number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "--".to_string())
}
