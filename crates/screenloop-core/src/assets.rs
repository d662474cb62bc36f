use std::path::{Path, PathBuf};

/// Maps a template path stored in a workflow to a file the matcher can read.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, stored: &str) -> PathBuf;
}

/// Resolves relative paths against a fixed directory, usually the one the
/// workflow file was loaded from. Absolute paths pass through untouched.
#[derive(Debug, Clone)]
pub struct AssetRoot {
    root: PathBuf,
}

impl AssetRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for AssetRoot {
    fn default() -> Self {
        Self::new(".")
    }
}

impl AssetResolver for AssetRoot {
    fn resolve(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_the_root() {
        let assets = AssetRoot::new("/projects/farm");
        assert_eq!(
            assets.resolve("templates/ok.png"),
            PathBuf::from("/projects/farm/templates/ok.png")
        );
    }

    #[test]
    fn absolute_paths_are_kept() {
        let assets = AssetRoot::new("/projects/farm");
        assert_eq!(assets.resolve("/tmp/ok.png"), PathBuf::from("/tmp/ok.png"));
    }
}
