//! # Debugger Command Builder
//!
//! Builds the non-interactive gdb invocation that performs one injection.
//! Nothing runs here; the result is turned into a process by the session.
//!
//! ## Sequence
//!
//! Before attaching (`-iex`):
//! 1. `set confirm off`, `set pagination off`
//!
//! After attaching to the target (`-ex`):
//! 2. `handle all nostop noprint pass`: signals flow to the target untouched
//! 3. `break Perl_despatch_signals`: a point where the interpreter is between
//!    ops and may safely evaluate code
//! 4. `set variable PL_sig_pending = 1`: makes the runloop call it soon
//! 5. `continue` until the breakpoint is hit, then `delete breakpoints`
//! 6. `call Perl_eval_pv("<wrapper>", 0)`
//! 7. `detach`, `quit`

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::RuntimeHooks;
use crate::types::ProcessId;

/// One debugger directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive
{
    /// `set <name> <value>` for a debugger setting
    Setting
    {
        /// Setting name
        name: &'static str,
        /// Value
        value: &'static str,
    },
    /// Pass every signal to the target without stopping or printing
    PassAllSignals,
    /// Break at a function
    Break(String),
    /// Assign a variable in the target
    SetVariable
    {
        /// Variable name
        name: String,
        /// Value expression
        value: String,
    },
    /// Resume the target
    Continue,
    /// Remove all breakpoints
    DeleteBreakpoints,
    /// Call a function in the target with a single string argument and a `0` flag
    CallWithString
    {
        /// Function name
        function: String,
        /// Argument, already flattened and escaped
        argument: String,
    },
    /// Detach from the target
    Detach,
    /// Exit the debugger
    Quit,
}

impl fmt::Display for Directive
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Setting { name, value } => write!(f, "set {name} {value}"),
            Self::PassAllSignals => f.write_str("handle all nostop noprint pass"),
            Self::Break(function) => write!(f, "break {function}"),
            Self::SetVariable { name, value } => write!(f, "set variable {name} = {value}"),
            Self::Continue => f.write_str("continue"),
            Self::DeleteBreakpoints => f.write_str("delete breakpoints"),
            Self::CallWithString { function, argument } => write!(f, "call {function}(\"{argument}\", 0)"),
            Self::Detach => f.write_str("detach"),
            Self::Quit => f.write_str("quit"),
        }
    }
}

/// Flatten multi-line code into one debugger string literal body.
///
/// Backslashes are doubled and newlines become the two-character escape
/// `\n`, so the debugger's C-string parsing hands the interpreter the
/// original lines. Carriage returns are dropped. Double quotes are not
/// touched: code containing them is rejected by validation unless forced.
#[must_use]
pub fn flatten_for_debugger(code: &str) -> String
{
    let mut flat = String::with_capacity(code.len());
    for c in code.chars() {
        match c {
            '\\' => flat.push_str("\\\\"),
            '\n' => flat.push_str("\\n"),
            '\r' => {}
            other => flat.push(other),
        }
    }
    flat
}

/// The text the interpreter receives for a literal body produced by
/// [`flatten_for_debugger`], decoded the way the debugger decodes `\\` and
/// `\n` in a C string. Other escapes are left as written.
#[must_use]
pub fn debugger_string_value(flat: &str) -> String
{
    let mut value = String::with_capacity(flat.len());
    let mut chars = flat.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => value.push('\\'),
            Some('n') => value.push('\n'),
            Some(other) => {
                value.push('\\');
                value.push(other);
            }
            None => value.push('\\'),
        }
    }
    value
}

/// What the interpreter evaluates when `code` is injected.
#[must_use]
pub fn evaluated_text(code: &str) -> String
{
    debugger_string_value(&flatten_for_debugger(code))
}

/// A complete debugger invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerCommand
{
    program: PathBuf,
    target: ProcessId,
    before_attach: Vec<Directive>,
    after_attach: Vec<Directive>,
}

impl DebuggerCommand
{
    /// Build the injection sequence for `target`, evaluating `wrapped_code`.
    #[must_use]
    pub fn injection(program: impl Into<PathBuf>, target: ProcessId, hooks: &RuntimeHooks, wrapped_code: &str) -> Self
    {
        let before_attach = vec![
            Directive::Setting {
                name: "confirm",
                value: "off",
            },
            Directive::Setting {
                name: "pagination",
                value: "off",
            },
        ];

        let after_attach = vec![
            Directive::PassAllSignals,
            Directive::Break(hooks.reentry_function.clone()),
            Directive::SetVariable {
                name: hooks.pending_flag.clone(),
                value: "1".to_string(),
            },
            Directive::Continue,
            Directive::DeleteBreakpoints,
            Directive::CallWithString {
                function: hooks.eval_function.clone(),
                argument: flatten_for_debugger(wrapped_code),
            },
            Directive::Detach,
            Directive::Quit,
        ];

        Self {
            program: program.into(),
            target,
            before_attach,
            after_attach,
        }
    }

    /// Debugger executable.
    #[must_use]
    pub fn program(&self) -> &Path
    {
        &self.program
    }

    /// Directives run after attaching, in order.
    #[must_use]
    pub fn directives(&self) -> &[Directive]
    {
        &self.after_attach
    }

    /// Full argument vector, without the program.
    #[must_use]
    pub fn args(&self) -> Vec<OsString>
    {
        let mut args: Vec<OsString> = vec!["-quiet".into(), "-nx".into()];
        for directive in &self.before_attach {
            args.push("-iex".into());
            args.push(directive.to_string().into());
        }
        args.push("-p".into());
        args.push(self.target.to_string().into());
        for directive in &self.after_attach {
            args.push("-ex".into());
            args.push(directive.to_string().into());
        }
        args
    }

    /// A process builder with stdout and stderr piped and stdin closed.
    ///
    /// The child is killed if its handle is dropped.
    #[must_use]
    pub fn to_command(&self) -> Command
    {
        let mut command = Command::new(&self.program);
        command
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl fmt::Display for DebuggerCommand
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.program.display())?;
        for arg in self.args() {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn args_as_strings(command: &DebuggerCommand) -> Vec<String>
    {
        command.args().into_iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_flatten_escapes_backslashes_and_line_breaks()
    {
        assert_eq!(flatten_for_debugger("a\nb\r\nc"), r"a\nb\nc");
        assert_eq!(flatten_for_debugger(r"qq{x\n}"), r"qq{x\\n}");
    }

    #[test]
    fn test_evaluated_text_keeps_line_structure()
    {
        // A comment only ends at a real newline; joining lines would comment out the rest.
        let code = "# report the stack\nprint $fh 42;\n}";
        assert_eq!(evaluated_text(code), code);
        assert_eq!(evaluated_text("a\r\nb"), "a\nb");
        assert_eq!(evaluated_text(r"print $fh qq{done\n}"), r"print $fh qq{done\n}");
    }

    #[test]
    fn test_debugger_string_value_leaves_other_escapes()
    {
        assert_eq!(debugger_string_value(r"a\tb"), r"a\tb");
        assert_eq!(debugger_string_value("trailing\\"), "trailing\\");
    }

    #[test]
    fn test_injection_sequence_order()
    {
        let command = DebuggerCommand::injection("/usr/bin/gdb", ProcessId(4242), &RuntimeHooks::default(), "{ 1 };");
        let args = args_as_strings(&command);

        assert_eq!(&args[..2], ["-quiet", "-nx"]);
        assert_eq!(&args[2..6], ["-iex", "set confirm off", "-iex", "set pagination off"]);
        assert_eq!(&args[6..8], ["-p", "4242"]);

        let after: Vec<&str> = args[8..].chunks(2).map(|pair| pair[1].as_str()).collect();
        assert_eq!(
            after,
            [
                "handle all nostop noprint pass",
                "break Perl_despatch_signals",
                "set variable PL_sig_pending = 1",
                "continue",
                "delete breakpoints",
                "call Perl_eval_pv(\"{ 1 };\", 0)",
                "detach",
                "quit",
            ]
        );
        assert!(args[8..].chunks(2).all(|pair| pair[0] == "-ex"));
    }

    #[test]
    fn test_custom_hooks_are_used()
    {
        let hooks = RuntimeHooks {
            reentry_function: "my_safe_point".into(),
            pending_flag: "my_flag".into(),
            eval_function: "my_eval".into(),
        };
        let command = DebuggerCommand::injection("gdb", ProcessId(1), &hooks, "x");
        let rendered = command.to_string();
        assert!(rendered.contains("break my_safe_point"));
        assert!(rendered.contains("set variable my_flag = 1"));
        assert!(rendered.contains("call my_eval(\"x\", 0)"));
    }

    #[test]
    fn test_wrapper_is_a_single_argument()
    {
        let command = DebuggerCommand::injection("gdb", ProcessId(1), &RuntimeHooks::default(), "{\n  1;\n};");
        let args = args_as_strings(&command);
        let call = args.iter().find(|a| a.starts_with("call ")).unwrap();
        assert!(!call.contains('\n'));
        assert!(call.contains(r"{\n  1;\n};"));
    }
}
