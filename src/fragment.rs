//! Fragment loading.
//!
//! A fragment file contributes either a mutation closure (builder mode) or a
//! plain data value (named synthesis, or builders that accept data). The
//! loader is a seam: the aggregator only needs existence checks and
//! deterministic, idempotent loads, so alternative sources (other formats,
//! embedded fixtures) slot in behind the same trait.

use crate::builder::Mutation;
use anyhow::Context;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Content contributed by one fragment file.
#[derive(Debug, Clone)]
pub enum Fragment {
    /// A closure that mutates a builder instance.
    Mutation(Mutation),
    /// A plain data value, merged during synthesis or folded into a
    /// builder through [`crate::ConfigBuilder::apply`].
    Value(Value),
}

/// Source of fragment content, keyed by pathname.
///
/// Loads must be deterministic for a given pathname; implementations may
/// cache internally since the aggregator can probe the same pathname once
/// per build generation.
pub trait FragmentLoader {
    /// File extension appended to fragment filenames during discovery.
    fn extension(&self) -> &str {
        "yaml"
    }

    /// Whether a fragment exists at `pathname`.
    fn exists(&self, pathname: &Path) -> bool {
        pathname.is_file()
    }

    fn load(&self, pathname: &Path) -> anyhow::Result<Fragment>;
}

/// Disk-backed loader for YAML fragment files.
///
/// Parses into `serde_json::Value` so fragments share a currency with the
/// merge strategies and the external cache. Loaded fragments are cached by
/// pathname for the life of the loader.
#[derive(Debug, Default)]
pub struct YamlFragmentLoader {
    cache: Mutex<HashMap<PathBuf, Fragment>>,
}

impl YamlFragmentLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FragmentLoader for YamlFragmentLoader {
    fn load(&self, pathname: &Path) -> anyhow::Result<Fragment> {
        let mut cache = self.cache.lock().expect("fragment cache poisoned");
        if let Some(fragment) = cache.get(pathname) {
            return Ok(fragment.clone());
        }

        let content = std::fs::read_to_string(pathname)
            .with_context(|| format!("reading fragment {}", pathname.display()))?;
        let value: Value = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing fragment {}", pathname.display()))?;

        let fragment = Fragment::Value(value);
        cache.insert(pathname.to_path_buf(), fragment.clone());
        Ok(fragment)
    }
}

/// In-memory loader mapping pathnames to fragments.
///
/// This is how mutation fragments enter the system: closures are code, so
/// they are registered up front rather than parsed from disk. Also used to
/// run hermetic tests without touching the filesystem.
#[derive(Debug)]
pub struct StaticFragmentLoader {
    extension: String,
    fragments: HashMap<PathBuf, Fragment>,
}

impl Default for StaticFragmentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticFragmentLoader {
    pub fn new() -> Self {
        Self {
            extension: "yaml".to_string(),
            fragments: HashMap::new(),
        }
    }

    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            fragments: HashMap::new(),
        }
    }

    pub fn insert(&mut self, pathname: impl Into<PathBuf>, fragment: Fragment) -> &mut Self {
        self.fragments.insert(pathname.into(), fragment);
        self
    }
}

impl FragmentLoader for StaticFragmentLoader {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn exists(&self, pathname: &Path) -> bool {
        self.fragments.contains_key(pathname)
    }

    fn load(&self, pathname: &Path) -> anyhow::Result<Fragment> {
        self.fragments
            .get(pathname)
            .cloned()
            .with_context(|| format!("no fragment registered at {}", pathname.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn yaml_loader_parses_into_json_value() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.yaml");
        std::fs::write(&path, "session:\n  name: X\n").unwrap();

        let loader = YamlFragmentLoader::new();
        assert!(loader.exists(&path));
        let fragment = loader.load(&path).unwrap();
        match fragment {
            Fragment::Value(value) => assert_eq!(value, json!({"session": {"name": "X"}})),
            Fragment::Mutation(_) => panic!("expected a value fragment"),
        }
    }

    #[test]
    fn yaml_loader_caches_by_pathname() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.yaml");
        std::fs::write(&path, "a: 1\n").unwrap();

        let loader = YamlFragmentLoader::new();
        loader.load(&path).unwrap();

        // A rewrite is not observed: the first load is authoritative.
        std::fs::write(&path, "a: 2\n").unwrap();
        match loader.load(&path).unwrap() {
            Fragment::Value(value) => assert_eq!(value, json!({"a": 1})),
            Fragment::Mutation(_) => panic!("expected a value fragment"),
        }
    }

    #[test]
    fn yaml_loader_missing_file_errors() {
        let loader = YamlFragmentLoader::new();
        assert!(loader.load(Path::new("/nonexistent/app.yaml")).is_err());
    }

    #[test]
    fn static_loader_owns_existence() {
        let mut loader = StaticFragmentLoader::new();
        loader.insert("/virtual/app.yaml", Fragment::Value(json!({"a": 1})));

        assert!(loader.exists(Path::new("/virtual/app.yaml")));
        assert!(!loader.exists(Path::new("/virtual/other.yaml")));
        assert!(loader.load(Path::new("/virtual/other.yaml")).is_err());
    }
}
