// TUI widget modules for each board panel.

pub mod available;
pub mod board;
pub mod message;
pub mod status_bar;
pub mod turn_banner;
