//! Error kinds shared by every filesystem in this crate.

/// The result type returned by every [`crate::Filesystem`] operation.
pub type VfsResult<T> = Result<T, VfsError>;

/// Failure kinds a [`crate::Filesystem`] operation can signal.
///
/// Propagation follows one rule throughout the crate: a leaf filesystem's
/// error propagates untouched through decorations. A [composition][crate::compose]
/// categorizes each child's error as it fans a call out — `FileNotFound` and
/// `DirectoryNotFound` are recorded but do not abort the fan-out,
/// `NotSupported` is recorded as "not supported here", and anything else
/// aborts the fan-out and propagates as-is.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    /// A required argument was null, empty where that is disallowed, or
    /// otherwise malformed (e.g. a path containing an illegal character).
    #[error("invalid argument: {0}")]
    ArgumentInvalid(String),
    /// No component of a composition advertises the requested capability.
    #[error("operation not supported")]
    NotSupported,
    /// A path names a file that does not exist where one was required.
    #[error("file not found: {0}")]
    FileNotFound(String),
    /// A path's parent does not exist, or a file was encountered where a
    /// directory was expected along the path.
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),
    /// Attempted to create a directory that already exists under a mode that
    /// forbids it.
    #[error("directory already exists: {0}")]
    DirectoryExists(String),
    /// Attempted to create a file that already exists under a mode that
    /// forbids it.
    #[error("file already exists: {0}")]
    FileExists(String),
    /// A stream's access mask does not permit reading.
    #[error("stream has no read access")]
    NoReadAccess,
    /// A stream's access mask does not permit writing.
    #[error("stream has no write access")]
    NoWriteAccess,
    /// A structural violation: creating a file under a file, deleting a
    /// non-empty directory non-recursively, moving onto an existing path.
    #[error("io error: {0}")]
    Io(String),
    /// The filesystem, stream, or observer this operation targets has
    /// already been torn down.
    #[error("object disposed")]
    ObjectDisposed,
    /// Multiple underlying failures, collected from observer teardown or
    /// fan-out delivery.
    #[error("{} underlying errors: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<VfsError>),
}

fn join_errors(errors: &[VfsError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl VfsError {
    /// True for the two "not found" kinds a composition's fan-out tolerates
    /// without aborting (see [`VfsError`] propagation rule above).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::FileNotFound(_) | VfsError::DirectoryNotFound(_))
    }

    /// True for [`VfsError::NotSupported`].
    #[must_use]
    pub fn is_not_supported(&self) -> bool {
        matches!(self, VfsError::NotSupported)
    }

    /// Combine a list of errors collected during fan-out teardown into a
    /// single result: no errors is `Ok`, one error is returned as-is, more
    /// than one is wrapped in [`VfsError::Aggregate`].
    pub fn aggregate(mut errors: Vec<VfsError>) -> VfsResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(VfsError::Aggregate(errors)),
        }
    }
}
