use std::io::stdout;
use std::{process, time::Duration};

use crossterm::{
    cursor::{Hide, MoveToColumn, Show},
    event::{poll, read, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
    Result,
};

/// Waits up to `timeout` for a key press and tells whether it was `Esc`.
pub(crate) fn poll_escape(timeout: Duration) -> Result<bool> {
    enable_raw_mode()?;
    execute!(stdout(), Hide)?;
    let ready = poll(timeout);
    execute!(stdout(), MoveToColumn(0), Show)?;
    disable_raw_mode()?;

    if !ready? {
        return Ok(false);
    }

    // `read` does not block once `poll` reported an event.
    match read()? {
        Event::Key(KeyEvent {
            code: KeyCode::Esc, ..
        }) => Ok(true),
        Event::Key(KeyEvent {
            code: KeyCode::Char('c'),
            modifiers,
        }) if modifiers.contains(KeyModifiers::CONTROL) => {
            // Raw mode swallows the Ctrl+C signal
            println!("🛑 received Ctrl+C!");
            process::exit(0);
        }
        _ => Ok(false),
    }
}
