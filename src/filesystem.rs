//! The programmatic surface every filesystem value implements.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::entry::Entry;
use crate::error::VfsResult;
use crate::event::EventSink;
use crate::dispatcher::Dispatcher;
use crate::observer::{GlobFilter, ObserverHandle};
use crate::options::{Capabilities, PathFacets};

bitflags! {
    /// What I/O a [`Stream`] may perform.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    pub struct AccessMode: u8 {
        /// The stream may be read from.
        const READ = 1 << 0;
        /// The stream may be written to.
        const WRITE = 1 << 1;
    }
}

bitflags! {
    /// What access *other*, concurrently-open streams over the same
    /// [`crate::memory::MemoryByteFile`] are permitted to hold
    /// (the share-compatibility rule enforced by a byte file's stream
    /// registry).
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    pub struct ShareMode: u8 {
        /// Other streams may read concurrently.
        const READ = 1 << 0;
        /// Other streams may write concurrently.
        const WRITE = 1 << 1;
    }
}

/// How `open` should treat an existing (or missing) file at the target
/// path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Fail with `FileNotFound` if the file does not already exist.
    Open,
    /// Create the file, truncating it to zero length if it already exists.
    Create,
    /// Fail with `FileExists` if the file already exists.
    CreateNew,
    /// Open the file if it exists, otherwise create it.
    OpenOrCreate,
    /// Fail with `FileNotFound` if missing; truncate to zero length if
    /// present.
    Truncate,
}

impl OpenMode {
    /// True for the modes that may bring a new file into existence.
    #[must_use]
    pub fn may_create(self) -> bool {
        matches!(self, OpenMode::Create | OpenMode::CreateNew | OpenMode::OpenOrCreate)
    }
}

/// A seek origin, as in `std::io::SeekFrom` but expressed over `i64` so a
/// `Stream` impl can apply the conventional `End` semantics uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    /// Offset from the start of the stream.
    Start(u64),
    /// Offset from the current position.
    Current(i64),
    /// Offset from the end of the stream. `position = length + offset`
    /// (the conventional meaning).
    End(i64),
}

/// A mutable view over a file's bytes, with its own position and
/// access/share flags.
pub trait Stream: Send {
    /// Read up to `buf.len()` bytes at the current position, advancing it.
    /// Returns the number of bytes actually read (`0` at EOF).
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize>;

    /// Read a single byte, advancing the position by one. Returns `None` at
    /// EOF.
    fn read_byte(&mut self) -> VfsResult<Option<u8>> {
        let mut byte = [0u8; 1];
        let n = self.read(&mut byte)?;
        Ok((n == 1).then_some(byte[0]))
    }

    /// Write `buf` at the current position, advancing it. Overwrites
    /// in-range bytes and appends any remainder.
    fn write(&mut self, buf: &[u8]) -> VfsResult<usize>;

    /// Write a single byte at the current position.
    fn write_byte(&mut self, byte: u8) -> VfsResult<()> {
        self.write(&[byte]).map(|_| ())
    }

    /// Reposition the stream.
    fn seek(&mut self, from: SeekFrom) -> VfsResult<u64>;

    /// Current position.
    fn position(&self) -> u64;

    /// The file's current length.
    fn len(&self) -> VfsResult<u64>;

    /// True if the file's current length is zero.
    fn is_empty(&self) -> VfsResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Truncate or zero-extend the file to exactly `length` bytes, clamping
    /// the position to `length` if it now exceeds it.
    fn set_length(&mut self, length: u64) -> VfsResult<()>;
}

/// The operation and capability surface every filesystem value implements.
pub trait Filesystem: Send + Sync {
    /// Advertised boolean capabilities.
    fn capabilities(&self) -> Capabilities;

    /// Advertised path-shaped facets.
    fn path_facets(&self) -> PathFacets;

    /// List a directory's children, or the single file at `path`.
    fn browse(&self, path: &str) -> VfsResult<Vec<Entry>>;

    /// Snapshot a single entry, or `Ok(None)` if it does not exist.
    /// `path = ""` always returns a synthetic root directory entry.
    fn get_entry(&self, path: &str) -> VfsResult<Option<Entry>>;

    /// Open a byte stream over the file at `path`.
    fn open(
        &self,
        path: &str,
        mode: OpenMode,
        access: AccessMode,
        share: ShareMode,
    ) -> VfsResult<Box<dyn Stream>>;

    /// Create a directory at `path`, including any missing intermediate
    /// components. Succeeds silently if it already exists.
    fn create_directory(&self, path: &str) -> VfsResult<()>;

    /// Remove the entry at `path`. `recursive` governs whether a non-empty
    /// directory may be removed.
    fn delete(&self, path: &str, recursive: bool) -> VfsResult<()>;

    /// Relocate the entry at `old_path` to `new_path`.
    fn move_entry(&self, old_path: &str, new_path: &str) -> VfsResult<()>;

    /// Subscribe to change events whose path matches the glob `filter`. When
    /// `dispatcher` is `None`, the filesystem's currently installed default
    /// (set via [`Filesystem::set_event_dispatcher`], inline unless
    /// overridden) is used. Implementations must deliver a synthetic
    /// `Start` event synchronously before returning.
    fn observe(
        &self,
        filter: &str,
        sink: Arc<dyn EventSink>,
        dispatcher: Option<Dispatcher>,
    ) -> VfsResult<Arc<ObserverHandle>>;

    /// Install (or, with `None`, clear) the dispatcher used for future
    /// subscriptions that don't specify their own.
    fn set_event_dispatcher(&self, dispatcher: Option<Dispatcher>) -> VfsResult<()>;
}

/// Compile a [`GlobFilter`], mapping a compile failure onto
/// [`crate::error::VfsError::ArgumentInvalid`] — the common first step of
/// every `observe` implementation in this crate.
pub(crate) fn compile_filter(pattern: &str) -> VfsResult<GlobFilter> {
    GlobFilter::compile(pattern)
        .map_err(|e| crate::error::VfsError::ArgumentInvalid(format!("invalid filter {pattern:?}: {e}")))
}

impl fmt::Debug for dyn Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filesystem")
            .field("capabilities", &self.capabilities())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for dyn Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").field("position", &self.position()).finish_non_exhaustive()
    }
}
