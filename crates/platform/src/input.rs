//! Keyboard bindings for the frame loop.
//!
//! Only strategy selection is bound: Tab cycles through the registered
//! render strategies and the number keys 1..9 pick one directly.

pub use winit::keyboard::KeyCode;

/// What a key press asks the frame loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    /// Switch to the next registered strategy, wrapping around.
    CycleStrategy,
    /// Switch to the strategy at this zero-based index.
    SelectStrategy(usize),
    /// Close the window.
    Quit,
}

/// Maps a pressed key to its action, if it has one.
pub fn action_for_key(key: KeyCode) -> Option<InputAction> {
    let index = match key {
        KeyCode::Tab => return Some(InputAction::CycleStrategy),
        KeyCode::Escape => return Some(InputAction::Quit),
        KeyCode::Digit1 => 0,
        KeyCode::Digit2 => 1,
        KeyCode::Digit3 => 2,
        KeyCode::Digit4 => 3,
        KeyCode::Digit5 => 4,
        KeyCode::Digit6 => 5,
        KeyCode::Digit7 => 6,
        KeyCode::Digit8 => 7,
        KeyCode::Digit9 => 8,
        _ => return None,
    };

    Some(InputAction::SelectStrategy(index))
}
