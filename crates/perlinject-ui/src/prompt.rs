//! Terminal escalation prompter.
//!
//! Asks the operator for a signal to send to a stuck target. Each call to
//! [`EscalationPrompter::prompt`] puts the terminal in raw mode for at most
//! one attempt window and restores it before returning, so the rest of the
//! session (and any log output) sees a normal terminal. Input is polled in
//! short ticks so a cancelled attempt gives the terminal back promptly.
//!
//! Output goes to stderr; stdout carries only the target's result.

use std::io::{self, Stderr, Write};
use std::time::{Duration, Instant};

use crossterm::cursor::MoveToColumn;
use crossterm::event::{self, Event};
use crossterm::style::Print;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType};
use crossterm::{queue, QueueableCommand};
use perlinject_core::escalation::{
    parse_selection, EscalationPrompter, PromptCancel, PromptOutcome, Selection, ESCALATION_BANNER, SIGNAL_HELP,
    SIGNAL_PROMPT,
};
use perlinject_core::signals::SignalCatalog;
use perlinject_utils::{debug, error, warn};

use crate::input::{EditAction, LineEditor};

/// How long one prompt attempt waits for a complete line.
pub const DEFAULT_ATTEMPT_WINDOW: Duration = Duration::from_secs(30);

/// Longest single wait for input before the cancel flag is checked again.
const POLL_TICK: Duration = Duration::from_millis(50);

/// Restores cooked mode when dropped.
struct RawModeGuard;

impl RawModeGuard
{
    fn enable() -> io::Result<Self>
    {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard
{
    fn drop(&mut self)
    {
        if let Err(err) = disable_raw_mode() {
            error!("failed to restore terminal mode: {err}");
        }
    }
}

/// Interactive prompter on the controlling terminal.
pub struct TerminalPrompter
{
    attempt_window: Duration,
    introduced: bool,
    editor: LineEditor,
    out: Stderr,
}

impl TerminalPrompter
{
    /// Create a prompter whose attempts last at most `attempt_window`.
    #[must_use]
    pub fn new(attempt_window: Duration) -> Self
    {
        Self {
            attempt_window,
            introduced: false,
            editor: LineEditor::new(),
            out: io::stderr(),
        }
    }

    fn introduce(&mut self) -> io::Result<()>
    {
        if self.introduced {
            return Ok(());
        }
        self.introduced = true;
        writeln!(self.out, "{ESCALATION_BANNER}")?;
        writeln!(self.out, "{SIGNAL_HELP}")?;
        self.out.flush()
    }

    /// Write text while in raw mode, where `\n` alone does not return the carriage.
    fn write_raw(&mut self, text: &str) -> io::Result<()>
    {
        self.out.queue(Print(text.replace('\n', "\r\n")))?;
        self.out.flush()
    }

    fn redraw(&mut self) -> io::Result<()>
    {
        queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(SIGNAL_PROMPT),
            Print(self.editor.buffer())
        )?;
        self.out.flush()
    }

    fn attempt(&mut self, catalog: &SignalCatalog, cancel: &PromptCancel) -> io::Result<PromptOutcome>
    {
        let _raw = RawModeGuard::enable()?;
        let deadline = Instant::now() + self.attempt_window;
        self.redraw()?;

        loop {
            if cancel.is_cancelled() {
                self.write_raw("\n")?;
                return Ok(PromptOutcome::Abort);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.write_raw("\n")?;
                return Ok(PromptOutcome::Retry);
            }
            if !event::poll(remaining.min(POLL_TICK))? {
                continue;
            }

            let Event::Key(key) = event::read()? else {
                continue;
            };

            let line = match self.editor.handle_key(key) {
                EditAction::Continue => {
                    self.redraw()?;
                    continue;
                }
                EditAction::Abort => {
                    self.write_raw("\n")?;
                    return Ok(PromptOutcome::Abort);
                }
                EditAction::Submit(line) => line,
            };
            self.write_raw("\n")?;

            match parse_selection(&line, catalog) {
                Selection::Empty => {}
                Selection::List => self.write_raw(&catalog.listing())?,
                Selection::Abort => return Ok(PromptOutcome::Abort),
                Selection::Signal(signal) => return Ok(PromptOutcome::Signal(signal)),
                Selection::Invalid(input) => {
                    self.write_raw(&format!(
                        "Invalid input (no signal found as string or number): '{input}'\n{SIGNAL_HELP}\n"
                    ))?;
                    return Ok(PromptOutcome::Invalid(input));
                }
            }
            self.redraw()?;
        }
    }
}

impl Default for TerminalPrompter
{
    fn default() -> Self
    {
        Self::new(DEFAULT_ATTEMPT_WINDOW)
    }
}

impl EscalationPrompter for TerminalPrompter
{
    fn prompt(&mut self, catalog: &SignalCatalog, cancel: &PromptCancel) -> PromptOutcome
    {
        if cancel.is_cancelled() {
            return PromptOutcome::Abort;
        }
        if let Err(err) = self.introduce() {
            warn!("could not write to the terminal: {err}");
        }

        match self.attempt(catalog, cancel) {
            Ok(outcome) => {
                debug!("escalation prompt answered with {outcome:?}");
                outcome
            }
            Err(err) => {
                error!("cannot prompt for a signal: {err}");
                PromptOutcome::Abort
            }
        }
    }
}
