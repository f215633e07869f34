//! Unified error type.

use thiserror::Error;

/// The error type returned by vetted's fallible operations.
///
/// Validation failures are *not* `Error`s. A request whose params, query or
/// body fail their schema is answered with a `400` [`Response`](crate::Response)
/// or forwarded down the chain as data. This type surfaces infrastructure
/// failures: binding a port, accepting a connection, or compiling a schema
/// document that is itself invalid.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    Address {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("invalid schema: {0}")]
    Schema(String),
}
