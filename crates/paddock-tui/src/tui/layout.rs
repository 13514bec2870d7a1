// Screen layout: panel arrangement and sizing.
//
// +--------------------------------------------------+
// | Status Bar (1 row)                                |
// +--------------------------------------------------+
// | Turn Banner (4 rows)                              |
// +-------------------------+------------------------+
// | Board (60%)              | Available Drivers (40%)|
// +-------------------------+------------------------+
// | Message Line (1 row)                              |
// | Help Bar (1 row)                                  |
// +--------------------------------------------------+

use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Resolved screen areas for each zone.
#[derive(Debug, Clone)]
pub struct AppLayout {
    pub status_bar: Rect,
    pub turn_banner: Rect,
    pub board: Rect,
    pub available: Rect,
    /// Latest notice, error, or consistency fault.
    pub message: Rect,
    pub help_bar: Rect,
}

pub fn build_layout(area: Rect) -> AppLayout {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Length(4), // turn banner
            Constraint::Min(8),    // board + available
            Constraint::Length(1), // message
            Constraint::Length(1), // help bar
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(vertical[2]);

    AppLayout {
        status_bar: vertical[0],
        turn_banner: vertical[1],
        board: horizontal[0],
        available: horizontal[1],
        message: vertical[3],
        help_bar: vertical[4],
    }
}
