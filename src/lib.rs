//! A uniform, in-process virtual filesystem abstraction.
//!
//! A [`Filesystem`] is a single trait that an in-memory tree, a compiled-in
//! resource table, or a composition of several other filesystems can all
//! implement the same way, so that code walking a tree of files doesn't need
//! to know which of those it is actually talking to. Three things build on
//! top of that trait:
//!
//! - [`memory`]: an in-memory tree of directories and byte-buffer files,
//!   with change notifications and advisory file sharing.
//! - [`compose`]: mounts several filesystems into one, fanning out reads,
//!   writes and change notifications across the mounted components.
//! - [`embedded`]: a minimal read-only filesystem over a compiled-in table
//!   of paths to byte slices.
//!
//! [`event`] and [`observer`] provide the change-notification subsystem
//! shared by all three; [`dispatcher`] controls whether notifications run
//! inline on the thread that caused them or on a background worker.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod compose;
pub mod config;
pub mod dispatcher;
pub mod dispose;
pub mod embedded;
pub mod entry;
pub mod error;
pub mod event;
pub mod filesystem;
pub mod memory;
pub mod observer;
pub mod options;
pub mod path;

pub use crate::compose::{CompositeFilesystem, Component};
pub use crate::config::{FilesystemOptions, MAX_DEBOUNCE_WINDOW};
pub use crate::dispatcher::{Dispatcher, ThreadDispatcher};
pub use crate::dispose::{Disposable, DisposeBag};
pub use crate::embedded::{EmbeddedFs, EmbeddedStream};
pub use crate::entry::{Entry, EntryKind};
pub use crate::error::{VfsError, VfsResult};
pub use crate::event::{Envelope, Event, EventSink, FnSink};
pub use crate::filesystem::{AccessMode, Filesystem, OpenMode, SeekFrom, ShareMode, Stream};
pub use crate::memory::{MemoryByteFile, MemoryFilesystem, MemoryFilesystemConfig, MemoryStream, NodeId};
pub use crate::observer::{GlobFilter, ObserverHandle, ObserverId, ObserverList};
pub use crate::options::{CaseSensitivity, Capabilities, PathFacets};
pub use crate::path::{PathError, TrailingSlashPolicy, VfsPath};
