use thiserror::Error;

/// Errors surfaced at module boundaries. Handlers translate these into the
/// right wire-level response (400/411/503) or a stale-cache fallback; a
/// `ProxyError` itself is never written back to a client socket.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("malformed request: {0}")]
    MalformedRequest(&'static str),

    #[error("missing or malformed Content-Length")]
    MissingContentLength,

    #[error("upstream connect failed for {host}:{port}: {source}")]
    UpstreamConnect {
        host: String,
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upstream I/O failed: {0}")]
    UpstreamIo(#[source] std::io::Error),

    #[error("client I/O failed: {0}")]
    ClientIo(#[source] std::io::Error),

    #[error("failed to open log file {path}: {source}")]
    LogOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ProxyError>;
