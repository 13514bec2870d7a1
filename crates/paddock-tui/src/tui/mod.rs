// Terminal board view: layout, input handling, and widget rendering.
//
// The TUI owns a `ViewState` built from the `UiUpdate` messages the session
// loop pushes over an mpsc channel, and re-renders at ~30 fps. It never
// mutates draft state; picks and refreshes go back as `UserCommand`s.

pub mod input;
pub mod layout;
pub mod widgets;

use std::time::Duration;

use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use ratatui::Frame;
use tokio::sync::mpsc;
use tracing::{error, info};

use paddock_core::draft::countdown::DraftTimer;
use paddock_core::draft::pick::Driver;
use paddock_core::protocol::{ConnectionStatus, EngineSnapshot, UiUpdate, UserCommand};

use layout::build_layout;

/// How the board panel groups slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardView {
    ByRound,
    ByTeam,
}

impl BoardView {
    pub fn toggled(self) -> Self {
        match self {
            BoardView::ByRound => BoardView::ByTeam,
            BoardView::ByTeam => BoardView::ByRound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Notice,
    Error,
}

/// The single message line under the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
}

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

/// TUI-local state, rebuilt from `UiUpdate` messages.
pub struct ViewState {
    /// Latest engine snapshot; `None` until the first successful fetch.
    pub snapshot: Option<EngineSnapshot>,
    /// Displayed timer. Refreshed every tick, between snapshots.
    pub timer: Option<DraftTimer>,
    pub connection_status: ConnectionStatus,
    pub board_view: BoardView,
    /// Highlighted row in the available driver list.
    pub selected: usize,
    pub message: Option<Message>,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            snapshot: None,
            timer: None,
            connection_status: ConnectionStatus::Connecting,
            board_view: BoardView::ByRound,
            selected: 0,
            message: None,
        }
    }
}

impl ViewState {
    pub fn available(&self) -> &[Driver] {
        self.snapshot
            .as_ref()
            .map(|s| s.available.as_slice())
            .unwrap_or(&[])
    }

    pub fn selected_driver(&self) -> Option<&Driver> {
        self.available().get(self.selected)
    }

    pub fn is_my_turn(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|s| s.is_my_turn)
    }

    pub fn apply_snapshot(&mut self, snapshot: EngineSnapshot) {
        self.timer = snapshot.timer;
        self.connection_status = snapshot.connection;
        // Keep the highlight on the same driver when the list shifts.
        let keep = self.selected_driver().map(|d| d.id);
        self.selected = keep
            .and_then(|id| snapshot.available.iter().position(|d| d.id == id))
            .unwrap_or_else(|| self.selected.min(snapshot.available.len().saturating_sub(1)));
        self.snapshot = Some(snapshot);
    }

    pub fn select_next(&mut self) {
        let len = self.available().len();
        if len > 0 && self.selected + 1 < len {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn notice(&mut self, text: impl Into<String>) {
        self.message = Some(Message {
            kind: MessageKind::Notice,
            text: text.into(),
        });
    }
}

/// Apply a single UiUpdate to the ViewState.
pub fn apply_ui_update(state: &mut ViewState, update: UiUpdate) {
    match update {
        UiUpdate::Snapshot(snapshot) => state.apply_snapshot(*snapshot),
        UiUpdate::Timer(timer) => state.timer = timer,
        UiUpdate::ConnectionStatus(status) => state.connection_status = status,
        UiUpdate::Notice(text) => state.notice(text),
        UiUpdate::Error(text) => {
            state.message = Some(Message {
                kind: MessageKind::Error,
                text,
            });
        }
    }
}

/// Render the complete board frame.
pub fn render_frame(frame: &mut Frame, state: &ViewState) {
    let layout = build_layout(frame.area());

    widgets::status_bar::render(frame, layout.status_bar, state);
    widgets::turn_banner::render(frame, layout.turn_banner, state);
    widgets::board::render(frame, layout.board, state);
    widgets::available::render(frame, layout.available, state);
    widgets::message::render(frame, layout.message, state);
    widgets::message::render_help(frame, layout.help_bar);
}

// ---------------------------------------------------------------------------
// Main TUI loop
// ---------------------------------------------------------------------------

/// Run the TUI event loop until the user quits or the session closes the
/// update channel.
pub async fn run(
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<()> {
    let mut terminal = ratatui::init();

    // Restore the terminal before the default hook prints.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = ratatui::restore();
        original_hook(panic_info);
    }));

    let mut view_state = ViewState::default();
    let mut event_stream = EventStream::new();

    let mut render_tick = tokio::time::interval(Duration::from_millis(33));
    render_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let result = loop {
        tokio::select! {
            update = ui_rx.recv() => {
                match update {
                    Some(ui_update) => apply_ui_update(&mut view_state, ui_update),
                    None => {
                        info!("Session closed the update channel");
                        break Ok(());
                    }
                }
            }

            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key_event))) => {
                        match input::handle_key(key_event, &mut view_state) {
                            Some(UserCommand::Quit) => {
                                let _ = cmd_tx.send(UserCommand::Quit).await;
                                break Ok(());
                            }
                            Some(cmd) => {
                                let _ = cmd_tx.send(cmd).await;
                            }
                            None => {}
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Terminal input error: {}", e);
                        break Err(e.into());
                    }
                    None => break Ok(()),
                }
            }

            _ = render_tick.tick() => {
                if let Err(e) = terminal.draw(|frame| render_frame(frame, &view_state)) {
                    break Err(e.into());
                }
            }
        }
    };

    ratatui::restore();
    result
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use chrono::{TimeZone, Utc};
    use paddock_core::draft::countdown::DraftTimer;
    use paddock_core::draft::order::{DraftMethod, DraftOrderEntry};
    use paddock_core::draft::pick::{DraftPick, Driver};
    use paddock_core::draft::turn::{DraftPhase, TurnSlot};
    use paddock_core::protocol::{ConnectionStatus, EngineSnapshot};

    pub fn driver(id: i64, name: &str, constructor: &str, points: f64) -> Driver {
        Driver {
            id,
            number: Some(id as u32),
            name: name.to_string(),
            constructor: constructor.to_string(),
            season_points: points,
        }
    }

    /// Two-team snake draft, two rounds, one pick made; team 2 is on the
    /// clock and is the observing user.
    pub fn snapshot() -> EngineSnapshot {
        let drivers = vec![
            driver(1, "Max Verstappen", "Red Bull", 150.0),
            driver(16, "Charles Leclerc", "Ferrari", 120.0),
            driver(4, "Lando Norris", "McLaren", 140.0),
            driver(44, "Lewis Hamilton", "Ferrari", 90.0),
        ];
        let order = vec![
            DraftOrderEntry {
                draft_position_number: 1,
                team_id: 1,
                team_name: "Apex".into(),
            },
            DraftOrderEntry {
                draft_position_number: 2,
                team_id: 2,
                team_name: "Box Box".into(),
            },
        ];
        EngineSnapshot {
            phase: DraftPhase::InProgress,
            method: DraftMethod::Snake,
            order,
            current: Some(TurnSlot {
                pick_number: 2,
                round: 1,
                position: 2,
                team_id: 2,
                team_name: "Box Box".into(),
            }),
            my_team_id: Some(2),
            is_my_turn: true,
            timer: Some(DraftTimer {
                time_remaining_seconds: 75,
                is_draft_paused: false,
            }),
            picks: vec![DraftPick {
                id: 1,
                round: 1,
                pick_number: 1,
                team_id: 1,
                driver_id: 1,
                is_auto_pick: false,
                created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            }],
            total_picks: 4,
            available: drivers[1..].to_vec(),
            drivers: drivers.into_iter().map(|d| (d.id, d)).collect::<HashMap<_, _>>(),
            connection: ConnectionStatus::Connected,
            fault: None,
        }
    }

    /// Flatten a test buffer into one string per row.
    pub fn buffer_lines(buffer: &ratatui::buffer::Buffer) -> Vec<String> {
        let area = buffer.area;
        (0..area.height)
            .map(|y| {
                (0..area.width)
                    .map(|x| buffer[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect()
    }
}
