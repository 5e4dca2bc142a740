//! Layered configuration aggregation.
//!
//! Configuration "fragments" live in weighted source directories. The
//! [`ConfigAggregator`] discovers fragments across those directories in
//! stable weight order, folds them into a per-identifier [`ConfigBuilder`]
//! (or merges them directly in named-synthesis mode), and memoizes the
//! finished value both in memory and in an optional external [`Storage`]
//! backend. Cache keys carry a fingerprint of the path set, so registering
//! another directory transparently invalidates everything.

pub mod aggregator;
pub mod builder;
pub mod error;
pub mod fragment;
pub mod paths;
pub mod storage;
pub mod synthesis;

pub use aggregator::ConfigAggregator;
pub use builder::{BuilderRegistration, ConfigBuilder, Mutation, SharedConfig};
pub use error::{ConfigError, ConfigResult};
pub use fragment::{Fragment, FragmentLoader, StaticFragmentLoader, YamlFragmentLoader};
pub use paths::{PathEntry, PathRegistry};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use synthesis::{MergeStrategy, SynthesizerRegistration};
