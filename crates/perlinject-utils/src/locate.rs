//! # Executable Lookup
//!
//! Finds the helper programs perlinject drives (`gdb`, `perl`).
//!
//! Lookup is layered and the first hit wins:
//!
//! 1. `PATH`, via the `which` crate
//! 2. Caller-supplied overrides (e.g. the value of `$GDB`), in order
//! 3. Conventional install locations: `/usr/bin`, `/usr/local/bin`, `/bin`,
//!    then `$HOMEBREW_ROOT` and `$HOMEBREW_ROOT/bin`
//!
//! A candidate only counts if it is a regular file with the owner-execute bit set.

use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Environment variable consulted as a package-manager install root.
pub const HOMEBREW_ROOT_ENV: &str = "HOMEBREW_ROOT";

const FALLBACK_DIRS: [&str; 3] = ["/usr/bin", "/usr/local/bin", "/bin"];

/// Executable lookup error
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LocateError
{
    /// No candidate location held a usable executable
    #[error("couldn't find a '{name}' executable")]
    NotFound
    {
        /// Program name that was searched for
        name: String,
    },
}

/// Locate an executable by name.
///
/// `overrides` are explicit candidate paths checked after `PATH`; empty
/// entries are skipped so an unset environment variable can be passed
/// straight through.
///
/// ## Errors
///
/// Returns [`LocateError::NotFound`] when no layer yields an executable file.
pub fn locate_binary<P: AsRef<Path>>(name: &str, overrides: &[P]) -> Result<PathBuf, LocateError>
{
    if let Ok(found) = which::which(name) {
        if is_executable(&found) {
            debug!("Found {name} on PATH at {}", found.display());
            return Ok(found);
        }
    }

    let explicit = overrides.iter().map(AsRef::as_ref).filter(|p| !p.as_os_str().is_empty());
    if let Some(found) = first_executable(explicit.map(Path::to_path_buf)) {
        debug!("Found {name} via override at {}", found.display());
        return Ok(found);
    }

    if let Some(found) = first_executable(fallback_candidates(name, env::var_os(HOMEBREW_ROOT_ENV).map(PathBuf::from)))
    {
        debug!("Found {name} in fallback location {}", found.display());
        return Ok(found);
    }

    Err(LocateError::NotFound { name: name.to_string() })
}

/// Return the first candidate that is an executable file.
pub fn first_executable<I>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    candidates.into_iter().find(|candidate| is_executable(candidate))
}

/// Whether `path` is a regular file the owner may execute.
#[must_use]
pub fn is_executable(path: &Path) -> bool
{
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o100 != 0)
}

fn fallback_candidates(name: &str, homebrew_root: Option<PathBuf>) -> Vec<PathBuf>
{
    let mut candidates: Vec<PathBuf> = FALLBACK_DIRS.iter().map(|dir| Path::new(dir).join(name)).collect();
    if let Some(root) = homebrew_root.filter(|root| !root.as_os_str().is_empty()) {
        candidates.push(root.join(name));
        candidates.push(root.join("bin").join(name));
    }
    candidates
}

#[cfg(test)]
mod tests
{
    use std::fs;

    use super::*;

    fn make_file(dir: &Path, name: &str, mode: u32) -> PathBuf
    {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn test_is_executable_requires_owner_execute_bit()
    {
        let dir = tempfile::tempdir().unwrap();
        let exec = make_file(dir.path(), "tool", 0o755);
        let plain = make_file(dir.path(), "data", 0o644);

        assert!(is_executable(&exec));
        assert!(!is_executable(&plain));
        assert!(!is_executable(dir.path()));
        assert!(!is_executable(&dir.path().join("missing")));
    }

    #[test]
    fn test_first_executable_prefers_earliest_match()
    {
        let dir = tempfile::tempdir().unwrap();
        let skipped = make_file(dir.path(), "a", 0o644);
        let first = make_file(dir.path(), "b", 0o700);
        let second = make_file(dir.path(), "c", 0o755);

        let found = first_executable(vec![skipped, first.clone(), second]);
        assert_eq!(found, Some(first));
    }

    #[test]
    fn test_override_is_used_when_not_on_path()
    {
        let dir = tempfile::tempdir().unwrap();
        let custom = make_file(dir.path(), "perlinject-test-gdb-override", 0o755);

        let found = locate_binary("perlinject-test-gdb-override", &[PathBuf::new(), custom.clone()]).unwrap();
        assert_eq!(found, custom);
    }

    #[test]
    fn test_missing_binary_reports_name()
    {
        let err = locate_binary::<PathBuf>("perlinject-definitely-not-installed", &[]).unwrap_err();
        assert_eq!(err, LocateError::NotFound { name: "perlinject-definitely-not-installed".to_string() });
        assert!(err.to_string().contains("perlinject-definitely-not-installed"));
    }

    #[test]
    fn test_fallback_candidates_include_homebrew_root()
    {
        let candidates = fallback_candidates("gdb", Some(PathBuf::from("/opt/homebrew")));
        assert_eq!(candidates.first(), Some(&PathBuf::from("/usr/bin/gdb")));
        assert!(candidates.contains(&PathBuf::from("/opt/homebrew/gdb")));
        assert!(candidates.contains(&PathBuf::from("/opt/homebrew/bin/gdb")));

        let without_root = fallback_candidates("gdb", Some(PathBuf::new()));
        assert_eq!(without_root.len(), FALLBACK_DIRS.len());
    }
}
