//! Termination sentinel for the communication channel.
//!
//! A sentinel line looks like `END 1718123456789012345 4100-4242-0`: the
//! literal marker, a nanosecond wall-clock timestamp, the orchestrator PID,
//! the target PID, and a per-process sequence number. The sequence number
//! keeps tokens distinct even when two sessions start within the clock's
//! resolution.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Marker every sentinel line starts with.
pub const SENTINEL_MARKER: &str = "END";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Unique end-of-output token for one injection session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sentinel
{
    token: String,
}

impl Sentinel
{
    /// Generate a fresh sentinel for a session between `orchestrator_pid` and `target_pid`.
    #[must_use]
    pub fn generate(orchestrator_pid: u32, target_pid: u32) -> Self
    {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            token: format!("{nanos} {orchestrator_pid}-{target_pid}-{sequence}"),
        }
    }

    /// Build a sentinel around a fixed token.
    ///
    /// Used for offline syntax checks, where uniqueness does not matter.
    #[must_use]
    pub fn from_token(token: impl Into<String>) -> Self
    {
        Self { token: token.into() }
    }

    /// The unique part of the sentinel.
    #[must_use]
    pub fn token(&self) -> &str
    {
        &self.token
    }

    /// The full line the target writes last, without a trailing newline.
    #[must_use]
    pub fn line(&self) -> String
    {
        format!("{SENTINEL_MARKER} {}", self.token)
    }

    /// If `line` carries this sentinel, return whatever preceded it.
    ///
    /// Output that the snippet printed without a trailing newline ends up on
    /// the same line as the sentinel; that prefix is still payload.
    #[must_use]
    pub fn strip_from<'a>(&self, line: &'a str) -> Option<&'a str>
    {
        let marker = self.line();
        line.find(&marker).map(|pos| &line[..pos])
    }
}

impl fmt::Display for Sentinel
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{SENTINEL_MARKER} {}", self.token)
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_generated_sentinels_are_pairwise_distinct()
    {
        let tokens: HashSet<String> = (0..1000).map(|_| Sentinel::generate(10, 20).token().to_string()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_token_embeds_both_pids()
    {
        let sentinel = Sentinel::generate(4100, 4242);
        assert!(sentinel.token().contains("4100-4242-"));
        assert!(sentinel.line().starts_with("END "));
        assert_eq!(sentinel.to_string(), sentinel.line());
    }

    #[test]
    fn test_token_is_safe_inside_perl_and_gdb_strings()
    {
        let sentinel = Sentinel::generate(1, 2);
        assert!(sentinel
            .line()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-'));
    }

    #[test]
    fn test_strip_from_returns_prefix()
    {
        let sentinel = Sentinel::from_token("99 1-2-3");
        assert_eq!(sentinel.strip_from("END 99 1-2-3"), Some(""));
        assert_eq!(sentinel.strip_from("tailEND 99 1-2-3"), Some("tail"));
        assert_eq!(sentinel.strip_from("END 99 1-2-4"), None);
        assert_eq!(sentinel.strip_from("plain payload"), None);
    }
}
