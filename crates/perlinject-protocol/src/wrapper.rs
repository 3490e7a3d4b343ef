//! The Perl wrapper placed around injected code.
//!
//! The wrapper runs inside the target's interpreter between two of its own
//! statements, so it must leave no trace behind:
//!
//! - `$_`, `$@`, `$!`, `@_`, `%SIG` and `$|` are localized and restored on scope exit
//! - the snippet runs inside `eval`, so a `die` is reported on the channel
//!   instead of unwinding into the target
//! - `$fh` is opened on the channel; the snippet prints to it
//! - the sentinel line is always written last, then `$fh` closes as it
//!   falls out of scope
//!
//! The wrapper is embedded in a double-quoted debugger expression, which is
//! why it uses `q{}`/`qq{}` quoting throughout and why operator code may not
//! contain `"` unless forced.

use std::path::Path;

use crate::sentinel::Sentinel;

/// Destination used when the wrapper is only being syntax-checked.
pub const DISCARD_DESTINATION: &str = "/dev/null";

/// Render the wrapper for `code`, writing to `destination` and ending with `sentinel`.
///
/// The result is multi-line so syntax errors in offline checks point at a
/// useful line; the debugger command builder flattens it.
#[must_use]
pub fn render_wrapper(code: &str, destination: &Path, sentinel: &Sentinel) -> String
{
    format!(
        r"{{
    local $_;
    local $@;
    local $!;
    local @_;
    local %SIG = %SIG;
    local $| = 1;
    if ( open(my $fh, q{{>}}, q{{{destination}}}) ) {{
        unless ( eval {{ {code}; 1 }} ) {{
            print $fh qq{{injected code died: $@}};
        }}
        print $fh qq{{{sentinel}\n}};
    }}
}};",
        destination = destination.display(),
        code = code,
        sentinel = sentinel.line(),
    )
}
