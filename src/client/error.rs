use thiserror::Error;

use crate::bucket::BucketError;

/// Failure taxonomy of the HTTP client.
///
/// Transport establishment, protocol framing violations, and
/// redirect-budget exhaustion are deliberately distinct: a caller can
/// tell "the network broke" from "the peer spoke nonsense" from "the
/// redirect chain never settled".
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid request target: {0}")]
    InvalidTarget(String),

    #[error("failed to connect to {origin}: {source}")]
    Connect {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("https requested but no TLS connector is configured")]
    TlsUnavailable,

    #[error("malformed status line: {0:?}")]
    InvalidStatusLine(String),

    #[error("redirect response carries no target location")]
    MissingRedirectTarget,

    #[error("redirect limit of {0} exhausted")]
    TooManyRedirects(u32),

    #[error("streaming request body cannot be replayed for a second hop")]
    BodyConsumed,

    #[error(transparent)]
    Bucket(#[from] BucketError),
}
