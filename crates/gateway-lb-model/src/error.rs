//! Error types for the resource model.

use thiserror::Error;

/// A result type using `ParseError`.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors raised while parsing configuration strings into model types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The protocol name is not a known ELBv2 protocol.
    #[error("unknown protocol: {0:?}")]
    UnknownProtocol(String),

    /// A `PROTOCOL:PORT` key is malformed.
    #[error("invalid protocol:port key {0:?}, expected e.g. HTTPS:443")]
    InvalidProtocolPort(String),
}
