//! Error definitions shared by every crate in the plugin-inventory workspace.

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the discovery, cache, and sync subsystems.
///
/// Variant set matches the error kinds enumerated in the component design:
/// one kind per externally observable failure mode, independent of how any
/// particular discovery variant or transport happens to fail underneath.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[allow(unused)]
pub enum Error {
    #[error("unknown discovery source: {0}")]
    UnknownSource(String),

    #[error("no configured discovery named `{0}`")]
    ContextNotFound(String),

    #[error("discovery `{0}` is unavailable: {1}")]
    SourceUnavailable(String, String),

    #[error("could not resolve image digest for `{0}`: {1}")]
    ImageResolveFailed(String, String),

    #[error("signature verification failed for `{0}`: {1}")]
    SignatureVerificationFailed(String, String),

    #[error("inventory for discovery `{0}` is corrupt: {1}")]
    InventoryCorrupt(String, String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("version `{expr}` is not resolvable for {name}/{target}")]
    VersionNotResolvable {
        expr: String,
        name: String,
        target: String,
    },

    #[error("install failed for {name}/{target}@{version}: {reason}")]
    InstallFailed {
        name: String,
        target: String,
        version: String,
        reason: String,
    },

    #[error("reading recommendations failed: {0}")]
    RecommendationReadFailed(String),

    #[error("operation cancelled or deadline exceeded")]
    CancelledOrDeadline,

    #[error("operation not supported by this discovery variant: {0}")]
    NotSupported(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0} {1}")]
    Wrapped(String, Box<Error>),
}

impl Error {
    /// Attaches a human-readable context string, preserving the underlying
    /// error kind for callers that need to match on it.
    #[inline]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Wrapped(context.into(), Box::new(self))
    }
}

/// Extension trait letting call sites attach context without losing the
/// original error kind, e.g. `conn.query(..).context(&discovery_name)?`.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    #[inline]
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<semver::Error> for Error {
    fn from(err: semver::Error) -> Self {
        Error::Parse(format!("invalid version: {err}"))
    }
}
