//! Conditional content loading for add/change events.

use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Decides which files carry their text content, and reads it.
#[derive(Debug, Clone)]
pub struct ContentLoader {
    extensions: HashSet<String>,
}

impl ContentLoader {
    pub fn new(extensions: impl IntoIterator<Item = String>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Name matches the extension allow-list and is not a dotfile.
    pub fn is_eligible(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if name.starts_with('.') {
            return false;
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| {
                self.extensions.contains(&ext.to_ascii_lowercase())
            })
    }

    /// Full UTF-8 content, or `None` when not eligible or unreadable.
    pub fn load(&self, path: &Path) -> Option<String> {
        if !self.is_eligible(path) {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                debug!(path = ?path, error = %e, "Content read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WatchOptions;
    use std::fs;
    use tempfile::tempdir;

    fn loader() -> ContentLoader {
        ContentLoader::new(WatchOptions::default().content_extensions)
    }

    #[test]
    fn test_eligibility_is_case_insensitive() {
        let loader = loader();
        assert!(loader.is_eligible(Path::new("/g/pages/a.md")));
        assert!(loader.is_eligible(Path::new("/g/pages/A.MD")));
        assert!(loader.is_eligible(Path::new("/g/logseq/custom.Css")));
        assert!(loader.is_eligible(Path::new("/g/draws/x.excalidraw")));
    }

    #[test]
    fn test_ineligible_names() {
        let loader = loader();
        assert!(!loader.is_eligible(Path::new("/g/assets/img.png")));
        assert!(!loader.is_eligible(Path::new("/g/.hidden.md")));
        assert!(!loader.is_eligible(Path::new("/g/README")));
        assert!(!loader.is_eligible(Path::new("/g/.md")));
    }

    #[test]
    fn test_load_eligible_file() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("a.md");
        fs::write(&file, "- hello").unwrap();

        assert_eq!(loader().load(&file), Some("- hello".to_string()));
    }

    #[test]
    fn test_load_returns_none_on_failure() {
        let temp_dir = tempdir().unwrap();
        let loader = loader();

        assert_eq!(loader.load(&temp_dir.path().join("missing.md")), None);

        let binary = temp_dir.path().join("bad.md");
        fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
        assert_eq!(loader.load(&binary), None);

        let image = temp_dir.path().join("img.png");
        fs::write(&image, "not really").unwrap();
        assert_eq!(loader.load(&image), None);
    }
}
