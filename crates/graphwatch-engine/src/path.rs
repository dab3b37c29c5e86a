//! Root resolution and relative-path normalization.

use crate::WatchError;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;
use url::Url;

/// Resolve a watch root given as a bare path or a `file://` URI.
///
/// The result is canonical: absolute, with symlinks resolved. Any scheme
/// other than `file` is rejected. Single-letter schemes are Windows drive
/// letters and are treated as bare paths.
pub fn resolve_root(input: &str) -> Result<PathBuf, WatchError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(WatchError::InvalidPath(input.to_string()));
    }

    let raw = match Url::parse(input) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| WatchError::InvalidPath(input.to_string()))?,
        Ok(url) if url.scheme().len() > 1 => {
            return Err(WatchError::UnsupportedScheme(url.scheme().to_string()));
        }
        _ => PathBuf::from(input),
    };

    let canonical = raw
        .canonicalize()
        .map_err(|_| WatchError::InvalidPath(input.to_string()))?;

    if !canonical.is_dir() {
        return Err(WatchError::InvalidPath(input.to_string()));
    }

    Ok(canonical)
}

/// `file://` URI of a session root, with a trailing slash.
pub fn root_uri(root: &Path) -> String {
    Url::from_directory_path(root)
        .map(String::from)
        .unwrap_or_else(|_| format!("file://{}", root.display()))
}

/// Root-relative key for `path`: forward slashes, no leading separator, NFC.
///
/// Returns `None` when `path` is not below `root`, or is the root itself.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;

    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    if joined.is_empty() {
        return None;
    }

    Some(normalize(&joined))
}

/// Unicode canonical composition.
pub fn normalize(s: &str) -> String {
    s.nfc().collect()
}

/// Find the regular file under `root` whose key is `key`, whatever Unicode
/// spelling its path components have on disk.
pub fn locate_file(root: &Path, key: &str) -> Option<PathBuf> {
    let mut current = root.to_path_buf();
    let mut parts = key.split('/').peekable();

    while let Some(part) = parts.next() {
        let want_file = parts.peek().is_none();
        current = find_child(&current, part, want_file)?;
    }

    Some(current)
}

fn find_child(dir: &Path, name: &str, want_file: bool) -> Option<PathBuf> {
    let is_match = |path: &Path| {
        std::fs::metadata(path).map_or(false, |m| if want_file { m.is_file() } else { m.is_dir() })
    };

    let direct = dir.join(name);
    if is_match(&direct) {
        return Some(direct);
    }

    std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| {
            path.file_name()
                .map_or(false, |n| normalize(&n.to_string_lossy()) == name)
                && is_match(path)
        })
}
