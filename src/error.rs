//! Error types. The header parser's own error is hand-rolled to stay
//! panic-free and allocation-light on the hot path; everything else (init,
//! config, the publish boundary) uses [`thiserror`] the way the rest of
//! this codebase's glue code does.

use thiserror::Error;

/// Why the header parser could not produce a [`crate::header::ParsedPacket`].
///
/// Never propagated as a failure: the parser's public entry point is
/// infallible and downgrades any `ParseError` into an unparseable record
/// (see [`crate::header::parse_packet`]). Kept around for logging, not for
/// control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer bytes were available than the header being parsed requires.
    Truncated {
        needed: usize,
        available: usize,
        context: &'static str,
    },
    /// EtherType was not 0x0800 (IPv4).
    UnsupportedEtherType(u16),
    /// The IPv4 version nibble was not 4.
    NotIpv4(u8),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Truncated {
                needed,
                available,
                context,
            } => write!(
                f,
                "truncated {context}: needed {needed} bytes, had {available}"
            ),
            ParseError::UnsupportedEtherType(ethertype) => {
                write!(f, "unsupported ethertype 0x{ethertype:04x}")
            }
            ParseError::NotIpv4(version) => write!(f, "unsupported IP version {version}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Fatal errors raised while bringing the capture loop up.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("driver environment initialization failed: {0}")]
    EnvInit(String),
    #[error("no ethernet ports found")]
    NoPorts,
    #[error("failed to configure port {port}: {reason}")]
    PortConfig { port: u16, reason: String },
    #[error("capture loop is not in the required state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Errors raised while handing a feature vector to the message bus.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("bus client rejected the message: {0}")]
    Rejected(String),
    #[error("failed to serialize feature vector: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
