//! Error types for the builder crate.

use gateway_lb_core::CoreError;
use thiserror::Error;

/// Errors returned by external collaborators (AWS and Kubernetes lookups).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The looked-up object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote API call failed.
    #[error("API error: {0}")]
    Api(String),
}

impl ProviderError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Api(_))
    }
}

/// A specialized Result type for collaborator calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors that abort the compilation of a Gateway.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Invalid or inconsistent user configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A user-supplied tag collides with an externally managed tag key.
    #[error("Configuration error: tag key {0:?} is reserved for externally managed tags")]
    ReservedTagKey(String),

    /// An external collaborator failed.
    #[error("{context}: {source}")]
    Provider {
        /// What was being resolved.
        context: String,
        /// Underlying failure.
        #[source]
        source: ProviderError,
    },

    /// The resource graph rejected an operation.
    #[error("Stack error: {0}")]
    Core(#[from] CoreError),
}

impl BuildError {
    /// Build a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this error was caused by user configuration.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ReservedTagKey(_))
    }

    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Provider { source, .. } => source.is_retriable(),
            _ => false,
        }
    }
}

/// A specialized Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Attach context to collaborator failures.
pub trait ProviderContext<T> {
    /// Wrap a provider error with a description of the failed lookup.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::Provider` if `self` is an error.
    fn context<F: FnOnce() -> String>(self, context: F) -> Result<T>;
}

impl<T> ProviderContext<T> for ProviderResult<T> {
    fn context<F: FnOnce() -> String>(self, context: F) -> Result<T> {
        self.map_err(|source| BuildError::Provider {
            context: context(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(BuildError::config("bad").is_configuration_error());
        assert!(BuildError::ReservedTagKey("k".into()).is_configuration_error());

        let err: Result<()> =
            Err(ProviderError::Api("throttled".into())).context(|| "discovering certificates for port 443".into());
        let err = err.unwrap_err();
        assert!(err.is_retriable());
        assert!(!err.is_configuration_error());
        assert_eq!(
            err.to_string(),
            "discovering certificates for port 443: API error: throttled"
        );

        let err: Result<()> = Err(ProviderError::NotFound("sg-1".into())).context(|| "x".into());
        assert!(!err.unwrap_err().is_retriable());
    }
}
