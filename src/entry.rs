//! Immutable entry snapshots.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::filesystem::Filesystem;

/// The variant discriminator of an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file of the given byte length.
    File {
        /// Length in bytes.
        length: u64,
    },
    /// A directory.
    Directory,
    /// A drive/volume root.
    Drive {
        /// A free-form drive type label (e.g. `"fixed"`, `"removable"`).
        drive_type: String,
        /// Free space in bytes, if known.
        free: Option<u64>,
        /// Total space in bytes, if known.
        total: Option<u64>,
        /// Volume label.
        label: Option<String>,
        /// Filesystem format name (e.g. `"ext4"`).
        format: Option<String>,
    },
    /// A mount point, naming the children assigned under it.
    Mount {
        /// Names of the filesystems mounted at this point.
        assignments: Vec<String>,
    },
}

/// An immutable snapshot of a node at a point in time.
///
/// `filesystem` is the filesystem that produced this entry — a
/// [composition][crate::compose] rewrites it to itself before handing the
/// entry back to the caller, so callers never see an inner child's
/// reference.
#[derive(Clone)]
pub struct Entry {
    /// The filesystem that produced (or, after decoration, re-exposed) this
    /// entry.
    pub filesystem: Arc<dyn Filesystem>,
    /// Normalized path of this entry within `filesystem`.
    pub path: String,
    /// The final path segment. Empty for the root.
    pub name: String,
    /// Time of last modification.
    pub last_modified: SystemTime,
    /// Time of last access. Equal to `last_modified` for backends that don't
    /// separately track access time.
    pub last_access: SystemTime,
    /// The variant-specific payload.
    pub kind: EntryKind,
}

impl Entry {
    /// True if this entry is a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// True if this entry is a regular file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File { .. })
    }

    /// The file length, or `None` for non-file entries.
    #[must_use]
    pub fn length(&self) -> Option<u64> {
        match &self.kind {
            EntryKind::File { length } => Some(*length),
            _ => None,
        }
    }

    /// Return a copy of this entry with `filesystem` and `path` rewritten —
    /// used by a composition to re-home an entry produced by a child.
    #[must_use]
    pub fn rehomed(&self, filesystem: Arc<dyn Filesystem>, path: String, name: String) -> Entry {
        Entry {
            filesystem,
            path,
            name,
            last_modified: self.last_modified,
            last_access: self.last_access,
            kind: self.kind.clone(),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("last_modified", &self.last_modified)
            .finish()
    }
}
