//! Weighted configuration source directories.
//!
//! The registry keeps directories in two orders at once: the order they were
//! registered in (which identifies the path set for cache-key purposes) and a
//! stable weight-ascending order (which drives fragment discovery). Both are
//! deterministic for a given sequence of `add` calls.

use crate::error::{ConfigError, ConfigResult};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// A registered configuration directory and its weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub path: PathBuf,
    pub weight: i32,
}

/// Ordered, weighted set of configuration source directories.
///
/// Directories are unique by normalized path; re-adding a directory
/// overwrites its weight but keeps its original insertion position.
/// Fragment discovery iterates [`PathRegistry::ordered`]: weight ascending,
/// ties broken by insertion order, so layering stays predictable when most
/// paths use the default weight.
#[derive(Debug, Clone, Default)]
pub struct PathRegistry {
    /// Entries in insertion order.
    entries: Vec<PathEntry>,
    /// Entries sorted by weight, recomputed on every mutation.
    ordered: Vec<PathBuf>,
    /// Memoized fingerprint, cleared on every mutation.
    fingerprint: Option<String>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a directory with the given weight.
    ///
    /// Returns [`ConfigError::InvalidInput`] if the path is empty.
    pub fn add(&mut self, path: impl Into<PathBuf>, weight: i32) -> ConfigResult<()> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidInput("config path is empty".into()));
        }

        let path = normalize_dir(&path);
        match self.entries.iter_mut().find(|e| e.path == path) {
            Some(entry) => entry.weight = weight,
            None => self.entries.push(PathEntry { path, weight }),
        }

        self.resort();
        self.fingerprint = None;
        Ok(())
    }

    /// Register a batch of weighted directories.
    ///
    /// All-or-nothing: the whole batch is validated before any entry is
    /// applied, so a rejected batch leaves the registry untouched. Returns
    /// [`ConfigError::InvalidInput`] if the batch is empty or contains an
    /// empty path.
    pub fn extend(
        &mut self,
        entries: impl IntoIterator<Item = (PathBuf, i32)>,
    ) -> ConfigResult<()> {
        let entries: Vec<_> = entries.into_iter().collect();
        if entries.is_empty() {
            return Err(ConfigError::InvalidInput("config path batch is empty".into()));
        }
        if entries.iter().any(|(path, _)| path.as_os_str().is_empty()) {
            return Err(ConfigError::InvalidInput(
                "config path batch contains an empty path".into(),
            ));
        }

        for (path, weight) in entries {
            self.add(path, weight)?;
        }
        Ok(())
    }

    /// Directories in discovery order: weight ascending, ties by insertion.
    pub fn ordered(&self) -> &[PathBuf] {
        &self.ordered
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 8-character digest over the registered path set.
    ///
    /// Hashes the path strings and their weights in insertion order (not
    /// discovery order). Weights take part because they determine fragment
    /// layering: a weight change reorders discovery, so it must produce a
    /// new fingerprint or cached values from the old order would survive.
    /// The value is memoized until the next mutation.
    pub fn fingerprint(&mut self) -> &str {
        if self.fingerprint.is_none() {
            let mut hasher = Sha256::new();
            for (i, entry) in self.entries.iter().enumerate() {
                if i > 0 {
                    hasher.update(b"|");
                }
                hasher.update(entry.path.to_string_lossy().as_bytes());
                hasher.update(b":");
                hasher.update(entry.weight.to_string().as_bytes());
            }
            let digest = format!("{:x}", hasher.finalize());
            self.fingerprint = Some(digest[..8].to_string());
        }

        self.fingerprint.as_deref().unwrap_or_default()
    }

    /// `Vec::sort_by_key` is stable, so equal weights keep insertion order.
    fn resort(&mut self) {
        let mut entries: Vec<&PathEntry> = self.entries.iter().collect();
        entries.sort_by_key(|e| e.weight);
        self.ordered = entries.into_iter().map(|e| e.path.clone()).collect();
    }
}

/// Normalize a directory path for identity purposes.
///
/// Drops trailing separators and `.` components so that `conf/` and `conf`
/// name the same entry. Pathname assembly later uses [`Path::join`], which
/// inserts exactly one separator.
fn normalize_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(paths: &[(&str, i32)]) -> PathRegistry {
        let mut registry = PathRegistry::new();
        for (path, weight) in paths {
            registry.add(*path, *weight).unwrap();
        }
        registry
    }

    #[test]
    fn empty_path_rejected() {
        let mut registry = PathRegistry::new();
        assert!(matches!(
            registry.add("", 0),
            Err(ConfigError::InvalidInput(_))
        ));
    }

    #[test]
    fn empty_batch_rejected() {
        let mut registry = PathRegistry::new();
        assert!(matches!(
            registry.extend(Vec::new()),
            Err(ConfigError::InvalidInput(_))
        ));
    }

    #[test]
    fn equal_weights_keep_insertion_order() {
        let registry = registry_with(&[("/b", 0), ("/a", 0), ("/c", 0)]);
        let ordered: Vec<_> = registry.ordered().iter().map(|p| p.as_path()).collect();
        assert_eq!(
            ordered,
            [Path::new("/b"), Path::new("/a"), Path::new("/c")]
        );
    }

    #[test]
    fn lower_weight_sorts_first() {
        let registry = registry_with(&[("/high", 10), ("/low", -10), ("/default", 0)]);
        let ordered: Vec<_> = registry.ordered().iter().map(|p| p.as_path()).collect();
        assert_eq!(
            ordered,
            [Path::new("/low"), Path::new("/default"), Path::new("/high")]
        );
    }

    #[test]
    fn readd_overwrites_weight_in_place() {
        let mut registry = registry_with(&[("/a", 0), ("/b", 0)]);
        registry.add("/a", 5).unwrap();

        // Insertion order unchanged, discovery order reflects the new weight.
        assert_eq!(registry.entries()[0].path, Path::new("/a"));
        assert_eq!(registry.entries()[0].weight, 5);
        let ordered: Vec<_> = registry.ordered().iter().map(|p| p.as_path()).collect();
        assert_eq!(ordered, [Path::new("/b"), Path::new("/a")]);
    }

    #[test]
    fn trailing_separator_does_not_duplicate() {
        let mut registry = registry_with(&[("/etc/conf", 0)]);
        registry.add("/etc/conf/", 3).unwrap();
        assert_eq!(registry.entries().len(), 1);
        assert_eq!(registry.entries()[0].weight, 3);
    }

    #[test]
    fn fingerprint_is_stable_across_instances() {
        let mut a = registry_with(&[("/one", 0), ("/two", 10)]);
        let mut b = registry_with(&[("/one", 0), ("/two", 10)]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 8);
    }

    #[test]
    fn batch_with_empty_path_applies_nothing() {
        let mut registry = registry_with(&[("/a", 0)]);
        let result = registry.extend(vec![
            (PathBuf::from("/b"), 0),
            (PathBuf::from(""), 0),
        ]);

        assert!(matches!(result, Err(ConfigError::InvalidInput(_))));
        // The valid half of the batch was not applied either.
        assert_eq!(registry.entries().len(), 1);
        assert_eq!(registry.entries()[0].path, Path::new("/a"));
    }

    #[test]
    fn fingerprint_changes_when_paths_change() {
        let mut a = registry_with(&[("/one", 0)]);
        let first = a.fingerprint().to_string();
        a.add("/two", 0).unwrap();
        assert_ne!(first, a.fingerprint());
    }

    #[test]
    fn fingerprint_changes_when_a_weight_changes() {
        let mut a = registry_with(&[("/one", 0), ("/two", 0)]);
        let first = a.fingerprint().to_string();

        // Same directories, but /one now sorts after /two.
        a.add("/one", 10).unwrap();
        assert_ne!(first, a.fingerprint());
    }

    #[test]
    fn fingerprint_memoized_until_mutation() {
        let mut registry = registry_with(&[("/one", 0)]);
        let first = registry.fingerprint().to_string();
        assert_eq!(first, registry.fingerprint());
    }
}
