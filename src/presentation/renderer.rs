//! Terminal setup and the input loop for the explorer.

use std::io::{self, Stdout};
use std::panic;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::warn;

use super::app::ExplorerApp;
use crate::pipeline::AnalysisSnapshot;

pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Runs `setup`, calling `undo` if it fails.
fn undo_on_error<T>(
    setup: impl FnOnce() -> io::Result<T>,
    undo: impl FnOnce(),
) -> io::Result<T> {
    setup().map_err(|err| {
        undo();
        err
    })
}

/// Best-effort reset used on failed setup and from the panic hook.
fn reset_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
}

/// Restores the terminal before the default hook prints the panic message.
fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        reset_terminal();
        previous(info);
    }));
}

/// Puts the terminal into raw mode on the alternate screen.
///
/// # Errors
/// Returns the underlying I/O error; raw mode is switched off again if any
/// step after enabling it fails
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    undo_on_error(
        || {
            let mut stdout = io::stdout();
            execute!(stdout, EnterAlternateScreen)?;
            Terminal::new(CrosstermBackend::new(stdout))
        },
        reset_terminal,
    )
}

pub fn restore_terminal(terminal: &mut TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Redraws only after input; nothing here touches quotes or derived data.
pub fn run_event_loop(terminal: &mut TuiTerminal, app: &mut ExplorerApp) -> io::Result<()> {
    terminal.draw(|f| app.render(f))?;

    while app.running {
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
            Event::Resize(_, _) => {}
            _ => continue,
        }
        terminal.draw(|f| app.render(f))?;
    }

    Ok(())
}

/// Shows the explorer over `snapshot` until the user quits.
pub fn run(snapshot: &AnalysisSnapshot) -> io::Result<()> {
    let mut app = ExplorerApp::new(snapshot);
    install_panic_hook();
    let mut terminal = init_terminal()?;

    let result = run_event_loop(&mut terminal, &mut app);

    // Restore even when the loop failed
    if let Err(err) = restore_terminal(&mut terminal) {
        warn!(error = %err, "Could not restore terminal");
        if result.is_ok() {
            return Err(err);
        }
    }

    result
}
