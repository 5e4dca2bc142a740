//! The builder contract and its type-erased registration machinery.
//!
//! A builder is a per-identifier accumulator: instantiated fresh for each
//! build attempt, mutated by every matching fragment in path order, then
//! finalized exactly once. The aggregator never names builder types at
//! runtime; it works through [`BuilderRegistration`] entries created at
//! wiring time with [`BuilderRegistration::of`].

use anyhow::{Context, anyhow, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A finished configuration value, shared between the in-memory registry
/// and callers. Treated as immutable once produced.
pub type SharedConfig = Arc<dyn Any + Send + Sync>;

/// Stateful accumulator that consumes fragments and finalizes into a
/// configuration value.
pub trait ConfigBuilder: Default + 'static {
    /// Filename (without extension) of the fragments this builder consumes.
    /// A type-level property so discovery can run before instantiation.
    const FRAGMENT_FILENAME: &'static str;

    /// The finished configuration. Must round-trip through the external
    /// cache, hence the serde bounds.
    type Output: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Fold a plain data fragment into the builder.
    ///
    /// Builders that are only ever driven by [`Mutation`] fragments can
    /// keep the default, which rejects data fragments.
    fn apply(&mut self, value: &Value) -> anyhow::Result<()> {
        let _ = value;
        bail!(
            "builder for `{}` fragments does not accept data fragments",
            Self::FRAGMENT_FILENAME
        )
    }

    /// Finalize into the configuration value. Called exactly once, after
    /// zero or more fragments have been applied; zero fragments yields the
    /// builder's defaults.
    fn build(self) -> Self::Output;
}

/// A type-erased fragment closure that mutates a builder in place.
///
/// Constructed from a closure over a concrete builder type; applying it to
/// any other builder type fails, which surfaces as a fragment application
/// error rather than a panic.
#[derive(Clone)]
pub struct Mutation {
    apply: Arc<dyn Fn(&mut dyn Any) -> anyhow::Result<()> + Send + Sync>,
}

impl Mutation {
    pub fn new<B: Any>(
        f: impl Fn(&mut B) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            apply: Arc::new(move |builder: &mut dyn Any| {
                let builder = builder
                    .downcast_mut::<B>()
                    .ok_or_else(|| anyhow!("fragment targets a different builder type"))?;
                f(builder)
            }),
        }
    }

    pub(crate) fn apply(&self, builder: &mut dyn Any) -> anyhow::Result<()> {
        (self.apply)(builder)
    }
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mutation")
    }
}

/// Object-safe view of a builder during one build attempt.
pub(crate) trait ErasedBuilder {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn apply_value(&mut self, value: &Value) -> anyhow::Result<()>;
    fn finish(self: Box<Self>) -> SharedConfig;
}

struct Erased<B: ConfigBuilder>(B);

impl<B: ConfigBuilder> ErasedBuilder for Erased<B> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        &mut self.0
    }

    fn apply_value(&mut self, value: &Value) -> anyhow::Result<()> {
        self.0.apply(value)
    }

    fn finish(self: Box<Self>) -> SharedConfig {
        Arc::new(self.0.build())
    }
}

/// Registration entry binding an identifier to a builder type.
///
/// Holds the fragment filename plus erased hooks for instantiation and for
/// moving values across the external-cache boundary.
pub struct BuilderRegistration {
    fragment_filename: &'static str,
    make: fn() -> Box<dyn ErasedBuilder>,
    encode: fn(&SharedConfig) -> anyhow::Result<Value>,
    decode: fn(&Value) -> anyhow::Result<SharedConfig>,
}

impl BuilderRegistration {
    /// Registration for builder type `B`.
    pub fn of<B: ConfigBuilder>() -> Self {
        Self {
            fragment_filename: B::FRAGMENT_FILENAME,
            make: || Box::new(Erased(B::default())),
            encode: |shared| {
                let output = shared
                    .downcast_ref::<B::Output>()
                    .ok_or_else(|| anyhow!("configuration value has an unexpected type"))?;
                serde_json::to_value(output).context("serializing configuration for cache")
            },
            decode: |value| {
                let output: B::Output = serde_json::from_value(value.clone())
                    .context("deserializing cached configuration")?;
                Ok(Arc::new(output))
            },
        }
    }

    pub fn fragment_filename(&self) -> &'static str {
        self.fragment_filename
    }

    pub(crate) fn instantiate(&self) -> Box<dyn ErasedBuilder> {
        (self.make)()
    }

    pub(crate) fn encode(&self, shared: &SharedConfig) -> anyhow::Result<Value> {
        (self.encode)(shared)
    }

    pub(crate) fn decode(&self, value: &Value) -> anyhow::Result<SharedConfig> {
        (self.decode)(value)
    }
}

impl fmt::Debug for BuilderRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderRegistration")
            .field("fragment_filename", &self.fragment_filename)
            .finish_non_exhaustive()
    }
}
