use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::WatchSettings;

/// Decides which paths under the workspace are worth scanning
pub struct WatchFilter {
    root: PathBuf,
    include: GlobSet,
    ignore: Vec<String>,
}

impl WatchFilter {
    pub fn new(root: &Path, settings: &WatchSettings) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &settings.patterns {
            builder.add(
                Glob::new(pattern)
                    .with_context(|| format!("Invalid watch pattern: {}", pattern))?,
            );
        }
        let include = builder.build().context("Failed to build watch patterns")?;

        Ok(Self {
            root: root.to_path_buf(),
            include,
            ignore: settings.ignore.clone(),
        })
    }

    /// Path must sit under the root, outside ignored and dot-prefixed
    /// directories, and match an include pattern
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };

        for component in relative.components() {
            let Component::Normal(name) = component else {
                return false;
            };
            let name = name.to_string_lossy();
            if name.starts_with('.') || self.ignore.iter().any(|i| *i == name) {
                return false;
            }
        }

        self.include.is_match(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> WatchFilter {
        WatchFilter::new(Path::new("/work"), &WatchSettings::default()).unwrap()
    }

    #[test]
    fn test_includes_default_extensions() {
        let f = filter();
        assert!(f.matches(Path::new("/work/index.ts")));
        assert!(f.matches(Path::new("/work/src/ui/App.tsx")));
        assert!(f.matches(Path::new("/work/lib/a.js")));
        assert!(!f.matches(Path::new("/work/README.md")));
    }

    #[test]
    fn test_excludes_ignored_and_dot_dirs() {
        let f = filter();
        assert!(!f.matches(Path::new("/work/node_modules/pkg/index.js")));
        assert!(!f.matches(Path::new("/work/packages/x/dist/out.js")));
        assert!(!f.matches(Path::new("/work/.delegate/tasks/a.js")));
        assert!(!f.matches(Path::new("/work/src/.hidden.ts")));
    }

    #[test]
    fn test_outside_root_is_rejected() {
        assert!(!filter().matches(Path::new("/elsewhere/a.ts")));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let settings = WatchSettings {
            patterns: vec!["src/[".to_string()],
            ..WatchSettings::default()
        };
        assert!(WatchFilter::new(Path::new("/work"), &settings).is_err());
    }
}
