//! Line editing for the escalation prompt.
//!
//! The prompt runs in raw mode, so echo and editing are ours to do.
//! [`LineEditor`] is the pure part: it turns key events into edits and tells
//! the caller when a line is complete.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// What the caller should do after a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditAction
{
    /// Keep reading; redraw if the buffer changed
    Continue,
    /// Enter was pressed; carries the line
    Submit(String),
    /// Ctrl+C or Ctrl+D
    Abort,
}

/// Single-line input buffer.
#[derive(Debug, Clone, Default)]
pub struct LineEditor
{
    buffer: String,
}

impl LineEditor
{
    /// Create an empty editor.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Text typed so far.
    #[must_use]
    pub fn buffer(&self) -> &str
    {
        &self.buffer
    }

    /// Apply one key event.
    ///
    /// Only key presses count; repeats and releases are ignored.
    pub fn handle_key(&mut self, key: KeyEvent) -> EditAction
    {
        if key.kind == KeyEventKind::Release {
            return EditAction::Continue;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c' | 'd') => EditAction::Abort,
                KeyCode::Char('u') => {
                    self.buffer.clear();
                    EditAction::Continue
                }
                _ => EditAction::Continue,
            };
        }

        match key.code {
            KeyCode::Enter => EditAction::Submit(std::mem::take(&mut self.buffer)),
            KeyCode::Backspace => {
                self.buffer.pop();
                EditAction::Continue
            }
            KeyCode::Esc => {
                self.buffer.clear();
                EditAction::Continue
            }
            KeyCode::Char(c) => {
                self.buffer.push(c);
                EditAction::Continue
            }
            _ => EditAction::Continue,
        }
    }
}
