//! The in-memory filesystem: a byte buffer per file, a node arena for the
//! directory hierarchy, and the [`Filesystem`][crate::filesystem::Filesystem]
//! implementation tying the two together.

mod byte_file;
mod tree;

pub use byte_file::{MemoryByteFile, MemoryStream, MAX_FILE_SIZE};
pub use tree::{MemoryFilesystem, MemoryFilesystemConfig, NodeId};
