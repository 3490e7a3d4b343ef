//! # Signal Catalog
//!
//! Read-only mapping from signal numbers to symbolic names, offered to the
//! operator during escalation.
//!
//! Names are stored without the conventional `SIG` prefix (`INT`, `TERM`),
//! and lookups accept either form in any case.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use nix::sys::signal::Signal;

/// Prefix conventionally placed before signal names.
const SIGNAL_PREFIX: &str = "SIG";

/// Entries per row in [`SignalCatalog::listing`], like `kill -l`.
const LISTING_COLUMNS: i32 = 5;

/// Ordered signal number → name map.
///
/// An empty catalog disables escalation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalCatalog
{
    entries: BTreeMap<i32, String>,
}

impl SignalCatalog
{
    /// Every signal the host OS defines.
    #[must_use]
    pub fn host() -> Self
    {
        let entries = Signal::iterator()
            .map(|signal| {
                let name = signal.as_str();
                (signal as i32, name.strip_prefix(SIGNAL_PREFIX).unwrap_or(name).to_string())
            })
            .collect();
        Self { entries }
    }

    /// Build a catalog from explicit entries. A leading `SIG` on names is dropped.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|(number, name)| {
                let name = name.as_ref().trim().to_ascii_uppercase();
                let name = name.strip_prefix(SIGNAL_PREFIX).map(str::to_string).unwrap_or(name);
                (number, name)
            })
            .collect();
        Self { entries }
    }

    /// Whether the catalog has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Name of signal `number`, without the `SIG` prefix.
    #[must_use]
    pub fn name(&self, number: i32) -> Option<&str>
    {
        self.entries.get(&number).map(String::as_str)
    }

    /// Resolve operator input to a signal number.
    ///
    /// Accepts a number present in the catalog, or a name in any case with or
    /// without the `SIG` prefix: `sigint`, `INT` and `2` are equivalent.
    #[must_use]
    pub fn resolve(&self, input: &str) -> Option<i32>
    {
        let input = input.trim().to_ascii_uppercase();
        if input.is_empty() {
            return None;
        }

        if let Ok(number) = input.parse::<i32>() {
            return (number >= 1 && self.entries.contains_key(&number)).then_some(number);
        }

        let bare = input.strip_prefix(SIGNAL_PREFIX).unwrap_or(&input);
        self.entries
            .iter()
            .find(|(_, name)| name.as_str() == bare || name.as_str() == input)
            .map(|(number, _)| *number)
    }

    /// Render the catalog the way `kill -l` does: five `"%2d) %-16s"` cells
    /// per row, gaps shown as `[unknown]`.
    #[must_use]
    pub fn listing(&self) -> String
    {
        let Some(&highest) = self.entries.keys().next_back() else {
            return String::new();
        };

        let mut out = String::new();
        let mut row_start = 1;
        while row_start <= highest {
            let row_end = (row_start + LISTING_COLUMNS - 1).min(highest);
            for number in row_start..=row_end {
                let label = match self.name(number) {
                    Some(name) => format!("{SIGNAL_PREFIX}{name}"),
                    None => "[unknown]".to_string(),
                };
                let _ = write!(out, "{number:2}) {label:<16}");
            }
            out.push('\n');
            row_start += LISTING_COLUMNS;
        }
        out
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn sample() -> SignalCatalog
    {
        SignalCatalog::from_entries([(1, "HUP"), (2, "SIGINT"), (3, "QUIT"), (9, "KILL"), (15, "TERM")])
    }

    #[test]
    fn test_resolve_names_and_numbers()
    {
        let catalog = sample();
        assert_eq!(catalog.resolve("sigint"), Some(2));
        assert_eq!(catalog.resolve("INT"), Some(2));
        assert_eq!(catalog.resolve("2"), Some(2));
        assert_eq!(catalog.resolve(" term "), Some(15));
        assert_eq!(catalog.resolve("SIGKILL"), Some(9));
    }

    #[test]
    fn test_resolve_rejects_unknown_input()
    {
        let catalog = sample();
        assert_eq!(catalog.resolve(""), None);
        assert_eq!(catalog.resolve("0"), None);
        assert_eq!(catalog.resolve("-2"), None);
        assert_eq!(catalog.resolve("7"), None);
        assert_eq!(catalog.resolve("SIGFOO"), None);
        assert_eq!(catalog.resolve("SIG"), None);
    }

    #[test]
    fn test_listing_layout()
    {
        let listing = sample().listing();
        let rows: Vec<&str> = listing.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with(" 1) SIGHUP          "));
        assert!(rows[0].contains(" 4) [unknown]"));
        assert!(rows[1].contains(" 9) SIGKILL"));
        assert!(rows[2].contains("15) SIGTERM"));
    }

    #[test]
    fn test_empty_catalog()
    {
        let catalog = SignalCatalog::default();
        assert!(catalog.is_empty());
        assert_eq!(catalog.listing(), "");
        assert_eq!(catalog.resolve("INT"), None);
    }

    #[test]
    fn test_host_catalog_has_common_signals()
    {
        let catalog = SignalCatalog::host();
        assert_eq!(catalog.resolve("INT"), Some(Signal::SIGINT as i32));
        assert_eq!(catalog.name(Signal::SIGTERM as i32), Some("TERM"));
    }
}
