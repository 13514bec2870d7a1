// Keyboard input handling and command dispatch.
//
// Translates crossterm key events into UserCommand messages for the session
// loop, or into local ViewState changes (selection, board grouping).

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use paddock_core::protocol::UserCommand;

use super::ViewState;

/// Handle a keyboard event.
///
/// Returns the command to forward to the session loop, or `None` when the
/// key was handled locally.
pub fn handle_key(key_event: KeyEvent, view_state: &mut ViewState) -> Option<UserCommand> {
    // Only presses; some platforms also report releases.
    if key_event.kind != KeyEventKind::Press {
        return None;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL)
        && key_event.code == KeyCode::Char('c')
    {
        return Some(UserCommand::Quit);
    }

    match key_event.code {
        KeyCode::Char('q') => Some(UserCommand::Quit),

        KeyCode::Up | KeyCode::Char('k') => {
            view_state.select_prev();
            None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            view_state.select_next();
            None
        }

        KeyCode::Enter => submit_selected(view_state),

        KeyCode::Char('b') => {
            view_state.board_view = view_state.board_view.toggled();
            None
        }

        KeyCode::Char('r') => Some(UserCommand::Refresh),
        KeyCode::Char('o') => Some(UserCommand::CreateOrder),

        KeyCode::Esc => {
            view_state.message = None;
            None
        }

        _ => None,
    }
}

fn submit_selected(view_state: &mut ViewState) -> Option<UserCommand> {
    if !view_state.is_my_turn() {
        view_state.notice("It is not your turn");
        return None;
    }
    match view_state.selected_driver() {
        Some(driver) => Some(UserCommand::SubmitPick {
            driver_id: driver.id,
        }),
        None => {
            view_state.notice("No driver selected");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::test_support::snapshot;
    use crate::tui::{BoardView, MessageKind};
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn loaded() -> ViewState {
        let mut state = ViewState::default();
        state.apply_snapshot(snapshot());
        state
    }

    #[test]
    fn quit_keys() {
        let mut state = ViewState::default();
        assert_eq!(handle_key(press(KeyCode::Char('q')), &mut state), Some(UserCommand::Quit));
        let ctrl_c = KeyEvent {
            modifiers: KeyModifiers::CONTROL,
            ..press(KeyCode::Char('c'))
        };
        assert_eq!(handle_key(ctrl_c, &mut state), Some(UserCommand::Quit));
    }

    #[test]
    fn release_events_are_ignored() {
        let mut state = ViewState::default();
        let release = KeyEvent {
            kind: KeyEventKind::Release,
            ..press(KeyCode::Char('q'))
        };
        assert_eq!(handle_key(release, &mut state), None);
    }

    #[test]
    fn refresh_and_create_order_are_forwarded() {
        let mut state = ViewState::default();
        assert_eq!(handle_key(press(KeyCode::Char('r')), &mut state), Some(UserCommand::Refresh));
        assert_eq!(
            handle_key(press(KeyCode::Char('o')), &mut state),
            Some(UserCommand::CreateOrder)
        );
    }

    #[test]
    fn selection_moves_within_bounds() {
        let mut state = loaded();
        handle_key(press(KeyCode::Char('k')), &mut state);
        assert_eq!(state.selected, 0);
        for _ in 0..10 {
            handle_key(press(KeyCode::Char('j')), &mut state);
        }
        assert_eq!(state.selected, 2);
        handle_key(press(KeyCode::Up), &mut state);
        assert_eq!(state.selected, 1);
    }

    #[test]
    fn enter_submits_selected_driver_on_my_turn() {
        let mut state = loaded();
        handle_key(press(KeyCode::Down), &mut state);
        assert_eq!(
            handle_key(press(KeyCode::Enter), &mut state),
            Some(UserCommand::SubmitPick { driver_id: 4 })
        );
    }

    #[test]
    fn enter_off_turn_only_notifies() {
        let mut state = ViewState::default();
        let mut snap = snapshot();
        snap.is_my_turn = false;
        state.apply_snapshot(snap);

        assert_eq!(handle_key(press(KeyCode::Enter), &mut state), None);
        let msg = state.message.unwrap();
        assert_eq!(msg.kind, MessageKind::Notice);
        assert!(msg.text.contains("not your turn"));
    }

    #[test]
    fn b_toggles_board_grouping() {
        let mut state = ViewState::default();
        handle_key(press(KeyCode::Char('b')), &mut state);
        assert_eq!(state.board_view, BoardView::ByTeam);
        handle_key(press(KeyCode::Char('b')), &mut state);
        assert_eq!(state.board_view, BoardView::ByRound);
    }

    #[test]
    fn esc_clears_message() {
        let mut state = ViewState::default();
        state.notice("hello");
        handle_key(press(KeyCode::Esc), &mut state);
        assert!(state.message.is_none());
    }
}
