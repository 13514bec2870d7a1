// Board widget: the draft grid, grouped by round or by team.
//
// By round: one row per round, slots in pick order. Empty slots show the
// team due to pick there.
// By team: one column per team in draft position order, one row per round.
// Auto-picks are marked "(A)"; the slot on the clock is highlighted.

use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Frame;

use paddock_core::draft::board::{self, BoardCell};
use paddock_core::protocol::EngineSnapshot;

use crate::tui::{BoardView, ViewState};

pub fn render(frame: &mut Frame, area: Rect, state: &ViewState) {
    let title = match state.board_view {
        BoardView::ByRound => "Board by round [b]",
        BoardView::ByTeam => "Board by team [b]",
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    let Some(snap) = &state.snapshot else {
        let paragraph = Paragraph::new("  No draft order yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    };

    let table = match state.board_view {
        BoardView::ByRound => round_table(snap),
        BoardView::ByTeam => team_table(snap),
    };
    frame.render_widget(table.block(block), area);
}

/// Text for one slot.
pub fn cell_text(cell: &BoardCell, show_team_when_empty: bool) -> String {
    match &cell.driver_label {
        Some(label) if cell.is_auto_pick => format!("{label} (A)"),
        Some(label) => label.clone(),
        None if show_team_when_empty => format!("({})", cell.team_name),
        None => String::new(),
    }
}

fn cell_style(cell: &BoardCell, my_team: Option<i64>) -> Style {
    if cell.is_current {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else if cell.driver_label.is_none() {
        Style::default().fg(Color::DarkGray)
    } else if Some(cell.team_id) == my_team {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    }
}

fn header_style() -> Style {
    Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD)
}

fn round_table(snap: &EngineSnapshot) -> Table<'static> {
    let teams = snap.order.len();
    let mut header = vec![Cell::from("Rd")];
    header.extend((1..=teams).map(|i| Cell::from(i.to_string())));

    let rows: Vec<Row> = board::by_round(snap)
        .into_iter()
        .map(|round| {
            let mut cells = vec![Cell::from(round.round.to_string())];
            cells.extend(round.cells.iter().map(|c| {
                Cell::from(cell_text(c, true)).style(cell_style(c, snap.my_team_id))
            }));
            Row::new(cells)
        })
        .collect();

    let mut widths = vec![Constraint::Length(3)];
    widths.extend(std::iter::repeat_n(Constraint::Fill(1), teams));

    Table::new(rows, widths).header(Row::new(header).style(header_style()))
}

fn team_table(snap: &EngineSnapshot) -> Table<'static> {
    let columns = board::by_team(snap);
    let rounds = columns.first().map_or(0, |c| c.cells.len());

    let mut header = vec![Cell::from("Rd")];
    header.extend(columns.iter().map(|c| {
        let style = if Some(c.team_id) == snap.my_team_id {
            header_style().fg(Color::Green)
        } else {
            header_style()
        };
        Cell::from(c.team_name.clone()).style(style)
    }));

    let rows: Vec<Row> = (0..rounds)
        .map(|r| {
            let mut cells = vec![Cell::from((r + 1).to_string())];
            cells.extend(columns.iter().map(|col| match col.cells.get(r) {
                Some(c) => Cell::from(cell_text(c, false)).style(cell_style(c, snap.my_team_id)),
                None => Cell::from(""),
            }));
            Row::new(cells)
        })
        .collect();

    let mut widths = vec![Constraint::Length(3)];
    widths.extend(std::iter::repeat_n(Constraint::Fill(1), columns.len()));

    Table::new(rows, widths).header(Row::new(header).style(header_style()))
}
