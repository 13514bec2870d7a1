// Draft domain: ordering, turn tracking, countdown, auto-pick, board.

pub mod autopick;
pub mod board;
pub mod connectivity;
pub mod countdown;
pub mod engine;
pub mod order;
pub mod pick;
pub mod turn;
