//! Error taxonomy for configuration aggregation.
//!
//! Every error here is fail-fast: each one signals either a wiring bug or a
//! deterministic failure, so nothing is retried internally.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for aggregation operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors surfaced by [`crate::ConfigAggregator`] and [`crate::PathRegistry`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An empty path or empty path batch was passed to `add`/`extend`.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A configuration was requested with no builder (or synthesizer)
    /// registered for its identifier.
    #[error("no builder defined for configuration `{0}`")]
    NoBuilderDefined(String),

    /// Named synthesis was requested with no synthesizer registered.
    #[error("no synthesizer defined for configuration `{0}`")]
    NoSynthesizerDefined(String),

    /// Named synthesis found zero matching fragment files.
    #[error("no `{0}` fragment defined in any registered path")]
    NoFragmentDefined(String),

    /// A fragment failed to load or apply. The in-progress build is
    /// aborted and nothing is cached.
    #[error("configuration fragment failed: {path}")]
    FragmentApplicationFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The typed accessor asked for an output type that does not match
    /// what the registered builder produces.
    #[error("configuration `{id}` has a different type than requested")]
    TypeMismatch { id: String },
}

impl ConfigError {
    pub(crate) fn fragment_failed(
        path: impl Into<PathBuf>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::FragmentApplicationFailed {
            path: path.into(),
            source: source.into(),
        }
    }
}
