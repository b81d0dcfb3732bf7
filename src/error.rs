use thiserror::Error;

/// Library-wide error type
///
/// Every variant carries the path or entity name it refers to, so a message
/// printed on its own is enough to locate the problem in the configfs tree.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configfs unavailable: {0}")]
    ConfigfsUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("malformed name: {0}")]
    MalformedName(String),

    #[error("invalid attribute value: {0}")]
    InvalidAttributeValue(String),

    #[error("path too long: {0}")]
    PathTooLong(String),

    #[error("has children: {0}")]
    HasChildren(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("dangling binding: {0}")]
    DanglingBinding(String),

    #[error("incompatible type: {0}")]
    IncompatibleType(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Classification of an [`Error`], used for matching without payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigfsUnavailable,
    NotFound,
    AlreadyExists,
    MalformedName,
    InvalidAttributeValue,
    PathTooLong,
    HasChildren,
    NotEmpty,
    DanglingBinding,
    IncompatibleType,
    Busy,
    NotConfigured,
    PermissionDenied,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConfigfsUnavailable(_) => ErrorKind::ConfigfsUnavailable,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::MalformedName(_) => ErrorKind::MalformedName,
            Error::InvalidAttributeValue(_) => ErrorKind::InvalidAttributeValue,
            Error::PathTooLong(_) => ErrorKind::PathTooLong,
            Error::HasChildren(_) => ErrorKind::HasChildren,
            Error::NotEmpty(_) => ErrorKind::NotEmpty,
            Error::DanglingBinding(_) => ErrorKind::DanglingBinding,
            Error::IncompatibleType(_) => ErrorKind::IncompatibleType,
            Error::Busy(_) => ErrorKind::Busy,
            Error::NotConfigured(_) => ErrorKind::NotConfigured,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    /// Short stable name of the error kind (e.g. `"HasChildren"`)
    pub fn name(&self) -> &'static str {
        match self.kind() {
            ErrorKind::ConfigfsUnavailable => "ConfigfsUnavailable",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::MalformedName => "MalformedName",
            ErrorKind::InvalidAttributeValue => "InvalidAttributeValue",
            ErrorKind::PathTooLong => "PathTooLong",
            ErrorKind::HasChildren => "HasChildren",
            ErrorKind::NotEmpty => "NotEmpty",
            ErrorKind::DanglingBinding => "DanglingBinding",
            ErrorKind::IncompatibleType => "IncompatibleType",
            ErrorKind::Busy => "Busy",
            ErrorKind::NotConfigured => "NotConfigured",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::Io => "IOError",
        }
    }

    /// Whether the kernel refused the request as an invalid argument (EINVAL).
    ///
    /// Only meaningful for [`Error::Io`]; the filesystem layer leaves EINVAL
    /// unclassified and lets the caller decide what it means in context.
    pub fn is_rejected_argument(&self) -> bool {
        matches!(
            self,
            Error::Io { source, .. } if source.kind() == std::io::ErrorKind::InvalidInput
        )
    }

    /// Re-tag a kernel EINVAL as a type incompatibility, keep everything else.
    pub(crate) fn into_incompatible(self, what: impl std::fmt::Display) -> Self {
        if self.is_rejected_argument() {
            Error::IncompatibleType(format!("kernel rejected {}: {}", what, self))
        } else {
            self
        }
    }
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
