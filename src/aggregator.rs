//! The configuration aggregator.
//!
//! Resolves a configuration for an identifier through a three-tier lookup:
//! the in-memory registry, the optional external cache (keyed by path-set
//! fingerprint plus identifier), and finally a rebuild from fragments. Each
//! identifier is built at most once per generation; registering another path
//! starts a new generation and clears the in-memory registry.
//!
//! All mutating operations take `&mut self`: the aggregator assumes a single
//! configuration-construction pass, typically at process startup. When an
//! external cache backend is shared between processes, the
//! retrieve-miss/build/store sequence can race across processes; builds are
//! deterministic, so the last store wins with identical content.

use crate::builder::{BuilderRegistration, ConfigBuilder, ErasedBuilder, SharedConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::fragment::{Fragment, FragmentLoader};
use crate::paths::{PathEntry, PathRegistry};
use crate::storage::Storage;
use crate::synthesis::{MergeStrategy, SynthesizerRegistration};
use anyhow::anyhow;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Aggregates configuration fragments from weighted source directories into
/// finished, memoized configuration values.
pub struct ConfigAggregator {
    paths: PathRegistry,
    builders: HashMap<String, BuilderRegistration>,
    synthesizers: HashMap<String, SynthesizerRegistration>,
    loader: Box<dyn FragmentLoader>,
    cache: Option<Box<dyn Storage>>,
    /// Values built in the current generation.
    built: HashMap<String, SharedConfig>,
}

impl ConfigAggregator {
    pub fn new(loader: impl FragmentLoader + 'static) -> Self {
        Self {
            paths: PathRegistry::new(),
            builders: HashMap::new(),
            synthesizers: HashMap::new(),
            loader: Box::new(loader),
            cache: None,
            built: HashMap::new(),
        }
    }

    /// Attach an external cache backend.
    pub fn with_cache(mut self, cache: impl Storage + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    /// Register a builder type for `id`.
    pub fn register<B: ConfigBuilder>(&mut self, id: impl Into<String>) -> &mut Self {
        self.register_builder(id, BuilderRegistration::of::<B>())
    }

    pub fn register_builder(
        &mut self,
        id: impl Into<String>,
        registration: BuilderRegistration,
    ) -> &mut Self {
        self.builders.insert(id.into(), registration);
        self
    }

    pub fn register_synthesizer(
        &mut self,
        id: impl Into<String>,
        registration: SynthesizerRegistration,
    ) -> &mut Self {
        self.synthesizers.insert(id.into(), registration);
        self
    }

    /// Register a source directory, invalidating everything built so far.
    ///
    /// The external cache is left untouched: its keys carry the path-set
    /// fingerprint, so entries from the old generation simply stop matching.
    pub fn add(&mut self, path: impl Into<PathBuf>, weight: i32) -> ConfigResult<()> {
        self.paths.add(path, weight)?;
        self.revoke();
        Ok(())
    }

    /// Register a batch of weighted source directories.
    pub fn extend(
        &mut self,
        entries: impl IntoIterator<Item = (PathBuf, i32)>,
    ) -> ConfigResult<()> {
        self.paths.extend(entries)?;
        self.revoke();
        Ok(())
    }

    pub fn paths(&self) -> &[PathEntry] {
        self.paths.entries()
    }

    /// Resolve the configuration for `id`.
    ///
    /// Checks the in-memory registry, then the external cache, then rebuilds
    /// from fragments. Within one generation, repeated calls return the same
    /// `Arc`. Falls through to a registered synthesizer when no builder is
    /// registered for `id`.
    pub fn get(&mut self, id: &str) -> ConfigResult<SharedConfig> {
        if let Some(existing) = self.built.get(id) {
            return Ok(Arc::clone(existing));
        }

        if !self.builders.contains_key(id) {
            if let Some(registration) = self.synthesizers.get(id) {
                let strategy = registration.strategy;
                let from = registration.from.clone();
                return self.synthesize_value(id, strategy, from.as_deref());
            }
            return Err(ConfigError::NoBuilderDefined(id.to_string()));
        }

        let cache_key = self.cache_key(id);

        // A cache hit is memoized as-is; the backend is not refreshed.
        if let Some(cached) = self.retrieve_cached(id, &cache_key) {
            self.built.insert(id.to_string(), Arc::clone(&cached));
            return Ok(cached);
        }

        let started = Instant::now();
        let registration = &self.builders[id];
        let shared = build_for_real(registration, &self.paths, self.loader.as_ref())?;

        if let Some(cache) = &self.cache {
            match registration.encode(&shared) {
                Ok(value) => {
                    if let Err(error) = cache.store(&cache_key, &value) {
                        warn!(%cache_key, %error, "failed to store configuration");
                    }
                }
                Err(error) => {
                    warn!(%cache_key, %error, "failed to encode configuration for cache");
                }
            }
        }

        debug!(
            id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built configuration"
        );
        self.built.insert(id.to_string(), Arc::clone(&shared));
        Ok(shared)
    }

    /// Typed variant of [`ConfigAggregator::get`].
    pub fn config_for<T: Any + Send + Sync>(&mut self, id: &str) -> ConfigResult<Arc<T>> {
        self.get(id)?
            .downcast::<T>()
            .map_err(|_| ConfigError::TypeMismatch { id: id.to_string() })
    }

    /// Synthesize the configuration registered for `id`.
    ///
    /// Unlike builder-style configuration, synthesis requires at least one
    /// fragment; an empty merge has no meaningful value.
    pub fn synthesize(&mut self, id: &str) -> ConfigResult<Arc<Value>> {
        let Some(registration) = self.synthesizers.get(id) else {
            return Err(ConfigError::NoSynthesizerDefined(id.to_string()));
        };
        let strategy = registration.strategy;
        let from = registration.from.clone();

        self.synthesize_value(id, strategy, from.as_deref())?
            .downcast::<Value>()
            .map_err(|_| ConfigError::TypeMismatch { id: id.to_string() })
    }

    /// Synthesize with an explicit strategy, bypassing the registration map.
    pub fn synthesize_with(
        &mut self,
        id: &str,
        strategy: MergeStrategy,
        from: Option<&str>,
    ) -> ConfigResult<Arc<Value>> {
        self.synthesize_value(id, strategy, from)?
            .downcast::<Value>()
            .map_err(|_| ConfigError::TypeMismatch { id: id.to_string() })
    }

    fn synthesize_value(
        &mut self,
        id: &str,
        strategy: MergeStrategy,
        from: Option<&str>,
    ) -> ConfigResult<SharedConfig> {
        if let Some(existing) = self.built.get(id) {
            return Ok(Arc::clone(existing));
        }

        let cache_key = self.cache_key(id);
        if let Some(cache) = self.cache.as_deref() {
            match cache.retrieve(&cache_key) {
                Ok(Some(value)) => {
                    let shared: SharedConfig = Arc::new(value);
                    self.built.insert(id.to_string(), Arc::clone(&shared));
                    return Ok(shared);
                }
                Ok(None) => {}
                Err(error) => warn!(%cache_key, %error, "cache retrieve failed, rebuilding"),
            }
        }

        let stem = from.unwrap_or(id);
        let filename = format!("{stem}.{}", self.loader.extension());
        let mut fragments = Vec::new();

        for dir in self.paths.ordered() {
            let pathname = dir.join(&filename);
            if !self.loader.exists(&pathname) {
                continue;
            }
            match self.loader.load(&pathname) {
                Ok(Fragment::Value(value)) => fragments.push(value),
                Ok(Fragment::Mutation(_)) => {
                    return Err(ConfigError::fragment_failed(
                        pathname,
                        anyhow!("mutation fragments cannot be synthesized"),
                    ));
                }
                Err(source) => return Err(ConfigError::fragment_failed(pathname, source)),
            }
        }

        if fragments.is_empty() {
            return Err(ConfigError::NoFragmentDefined(stem.to_string()));
        }

        let merged = strategy.merge_all(fragments);
        if let Some(cache) = &self.cache {
            if let Err(error) = cache.store(&cache_key, &merged) {
                warn!(%cache_key, %error, "failed to store configuration");
            }
        }

        let shared: SharedConfig = Arc::new(merged);
        self.built.insert(id.to_string(), Arc::clone(&shared));
        Ok(shared)
    }

    /// Cache key for `id` under the current path-set generation.
    fn cache_key(&mut self, id: &str) -> String {
        format!("{}_{id}", self.paths.fingerprint())
    }

    fn retrieve_cached(&self, id: &str, cache_key: &str) -> Option<SharedConfig> {
        let cache = self.cache.as_deref()?;
        let registration = self.builders.get(id)?;

        match cache.retrieve(cache_key) {
            Ok(Some(value)) => match registration.decode(&value) {
                Ok(shared) => Some(shared),
                Err(error) => {
                    // An undecodable entry is treated as a miss: the schema
                    // may have changed since the entry was written.
                    warn!(%cache_key, %error, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                warn!(%cache_key, %error, "cache retrieve failed, rebuilding");
                None
            }
        }
    }

    /// Drops everything built in the current generation.
    fn revoke(&mut self) {
        self.built.clear();
    }
}

/// Instantiate a fresh builder and fold matching fragments into it, in
/// discovery order. The first failing fragment aborts the build.
fn build_for_real(
    registration: &BuilderRegistration,
    paths: &PathRegistry,
    loader: &dyn FragmentLoader,
) -> ConfigResult<SharedConfig> {
    let mut builder: Box<dyn ErasedBuilder> = registration.instantiate();
    let filename = format!(
        "{}.{}",
        registration.fragment_filename(),
        loader.extension()
    );

    for dir in paths.ordered() {
        let pathname = dir.join(&filename);
        if !loader.exists(&pathname) {
            continue;
        }

        let applied = loader.load(&pathname).and_then(|fragment| match fragment {
            Fragment::Mutation(mutation) => mutation.apply(builder.as_any_mut()),
            Fragment::Value(value) => builder.apply_value(&value),
        });
        if let Err(source) = applied {
            return Err(ConfigError::fragment_failed(pathname, source));
        }
    }

    Ok(builder.finish())
}
