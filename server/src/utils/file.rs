//! File utility functions

use std::path::PathBuf;

/// Expand a user-supplied path into an absolute path.
///
/// A leading `~` resolves to the home directory; anything still relative
/// afterwards (including bare names) is joined onto the current directory.
/// The path is not canonicalized, so it need not exist yet.
///
/// ```text
/// expand_path("~/.mediashelf") // -> /home/user/.mediashelf
/// expand_path("catalog.db")    // -> /current/dir/catalog.db
/// expand_path("/var/media")    // -> /var/media
/// ```
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();
    let cwd = || std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    if path.is_empty() {
        return cwd();
    }

    let expanded = match path.strip_prefix('~') {
        Some("") => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        Some(rest) if rest.starts_with('/') || rest.starts_with('\\') => {
            match dirs::home_dir() {
                Some(home) => home.join(&rest[1..]),
                None => PathBuf::from(path),
            }
        }
        _ => PathBuf::from(path),
    };

    if expanded.is_relative() {
        cwd().join(expanded)
    } else {
        expanded
    }
}
