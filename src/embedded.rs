//! A minimal read-only filesystem backed by a flat, compiled-in resource
//! table: the one concrete, in-tree conformance example of the disk/
//! foreign-provider adapter boundary the [`Filesystem`] trait describes.

use std::sync::{Arc, OnceLock, Weak};
use std::time::SystemTime;

use crate::entry::{Entry, EntryKind};
use crate::error::{VfsError, VfsResult};
use crate::event::EventSink;
use crate::dispatcher::Dispatcher;
use crate::filesystem::{AccessMode, Filesystem, OpenMode, ShareMode, Stream};
use crate::observer::ObserverHandle;
use crate::options::{CaseSensitivity, Capabilities, PathFacets};
use crate::path::{self, TrailingSlashPolicy};

/// A read-only view over a single embedded resource.
pub struct EmbeddedStream {
    data: &'static [u8],
    position: u64,
}

impl Stream for EmbeddedStream {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let position = self.position as usize;
        if position >= self.data.len() {
            return Ok(0);
        }
        let available = self.data.len() - position;
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&self.data[position..position + n]);
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, _buf: &[u8]) -> VfsResult<usize> {
        Err(VfsError::NoWriteAccess)
    }

    fn seek(&mut self, from: crate::filesystem::SeekFrom) -> VfsResult<u64> {
        let length = self.data.len() as i64;
        let new_position = match from {
            crate::filesystem::SeekFrom::Start(offset) => offset as i64,
            crate::filesystem::SeekFrom::Current(offset) => self.position as i64 + offset,
            crate::filesystem::SeekFrom::End(offset) => length + offset,
        };
        self.position = new_position.max(0) as u64;
        Ok(self.position)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn len(&self) -> VfsResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_length(&mut self, _length: u64) -> VfsResult<()> {
        Err(VfsError::NoWriteAccess)
    }
}

/// A read-only filesystem over a `&'static [(&'static str, &'static [u8])]`
/// table of resource names to file contents. Resource names form a flat
/// namespace: a name may contain `/`, but no directory structure is
/// synthesized from it, and there is no way to create one.
pub struct EmbeddedFs {
    entries: &'static [(&'static str, &'static [u8])],
    self_handle: OnceLock<Weak<EmbeddedFs>>,
}

impl EmbeddedFs {
    /// Build a filesystem over `entries`. Paths must already be normalized
    /// (no leading/trailing `/`, `/`-separated).
    #[must_use]
    pub fn new(entries: &'static [(&'static str, &'static [u8])]) -> Arc<Self> {
        let fs = Arc::new(Self { entries, self_handle: OnceLock::new() });
        fs.self_handle.set(Arc::downgrade(&fs)).ok();
        fs
    }

    fn self_arc(&self) -> Arc<EmbeddedFs> {
        self.self_handle.get().and_then(Weak::upgrade).expect("self handle initialized in EmbeddedFs::new")
    }

    fn as_dyn(&self) -> Arc<dyn Filesystem> {
        self.self_arc() as Arc<dyn Filesystem>
    }

    fn find_file(&self, normalized: &str) -> Option<&'static [u8]> {
        self.entries.iter().find(|(path, _)| *path == normalized).map(|(_, data)| *data)
    }

    /// The whole flat namespace, each resource as a top-level file entry.
    fn all_entries(&self) -> Vec<Entry> {
        self.entries
            .iter()
            .map(|(name, data)| Entry {
                filesystem: self.as_dyn(),
                path: (*name).to_string(),
                name: (*name).to_string(),
                last_modified: SystemTime::UNIX_EPOCH,
                last_access: SystemTime::UNIX_EPOCH,
                kind: EntryKind::File { length: data.len() as u64 },
            })
            .collect()
    }
}

impl Filesystem for EmbeddedFs {
    fn capabilities(&self) -> Capabilities {
        Capabilities::BROWSE | Capabilities::GET_ENTRY | Capabilities::OPEN | Capabilities::READ
    }

    fn path_facets(&self) -> PathFacets {
        PathFacets { case_sensitivity: CaseSensitivity::CaseSensitive, empty_directory_name: false, mount_path: None }
    }

    fn browse(&self, path: &str) -> VfsResult<Vec<Entry>> {
        let normalized = path::VfsPath::normalize(path, TrailingSlashPolicy::Ignore)
            .map_err(|e| VfsError::ArgumentInvalid(e.0))?
            .to_string();
        if normalized.is_empty() {
            return Ok(self.all_entries());
        }
        if let Some(data) = self.find_file(&normalized) {
            return Ok(vec![Entry {
                filesystem: self.as_dyn(),
                path: normalized.clone(),
                name: normalized,
                last_modified: SystemTime::UNIX_EPOCH,
                last_access: SystemTime::UNIX_EPOCH,
                kind: EntryKind::File { length: data.len() as u64 },
            }]);
        }
        Err(VfsError::DirectoryNotFound(normalized))
    }

    fn get_entry(&self, path: &str) -> VfsResult<Option<Entry>> {
        let normalized = path::VfsPath::normalize(path, TrailingSlashPolicy::Ignore)
            .map_err(|e| VfsError::ArgumentInvalid(e.0))?
            .to_string();
        if normalized.is_empty() {
            return Ok(Some(Entry {
                filesystem: self.as_dyn(),
                path: String::new(),
                name: String::new(),
                last_modified: SystemTime::UNIX_EPOCH,
                last_access: SystemTime::UNIX_EPOCH,
                kind: EntryKind::Directory,
            }));
        }
        Ok(self.find_file(&normalized).map(|data| Entry {
            filesystem: self.as_dyn(),
            path: normalized.clone(),
            name: normalized,
            last_modified: SystemTime::UNIX_EPOCH,
            last_access: SystemTime::UNIX_EPOCH,
            kind: EntryKind::File { length: data.len() as u64 },
        }))
    }

    fn open(&self, path: &str, mode: OpenMode, access: AccessMode, _share: ShareMode) -> VfsResult<Box<dyn Stream>> {
        let normalized = path::VfsPath::normalize(path, TrailingSlashPolicy::Ignore)
            .map_err(|e| VfsError::ArgumentInvalid(e.0))?
            .to_string();
        if mode.may_create() {
            return Err(VfsError::NotSupported);
        }
        if access.contains(AccessMode::WRITE) {
            return Err(VfsError::NoWriteAccess);
        }
        let data = self.find_file(&normalized).ok_or_else(|| VfsError::FileNotFound(normalized))?;
        Ok(Box::new(EmbeddedStream { data, position: 0 }))
    }

    fn create_directory(&self, _path: &str) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    fn delete(&self, _path: &str, _recursive: bool) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    fn move_entry(&self, _old_path: &str, _new_path: &str) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }

    fn observe(&self, _filter: &str, _sink: Arc<dyn EventSink>, _dispatcher: Option<Dispatcher>) -> VfsResult<Arc<ObserverHandle>> {
        Err(VfsError::NotSupported)
    }

    fn set_event_dispatcher(&self, _dispatcher: Option<Dispatcher>) -> VfsResult<()> {
        Err(VfsError::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[(&str, &[u8])] = &[("docs/readme.txt", b"hello"), ("docs/license.txt", b"mit")];

    #[test]
    fn browse_root_lists_flat_resource_names() {
        let fs = EmbeddedFs::new(TABLE);
        let mut names: Vec<_> = fs.browse("").unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["docs/license.txt", "docs/readme.txt"]);
        assert!(fs.browse("").unwrap().iter().all(|e| !e.is_directory()));
    }

    #[test]
    fn browse_into_a_resource_name_prefix_is_not_a_directory() {
        let fs = EmbeddedFs::new(TABLE);
        assert!(matches!(fs.browse("docs").unwrap_err(), VfsError::DirectoryNotFound(_)));
        assert!(matches!(fs.get_entry("docs").unwrap(), None));
    }

    #[test]
    fn open_reads_full_contents() {
        let fs = EmbeddedFs::new(TABLE);
        let mut stream = fs.open("docs/readme.txt", OpenMode::Open, AccessMode::READ, ShareMode::READ).unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 16];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn open_for_write_fails() {
        let fs = EmbeddedFs::new(TABLE);
        let err = fs.open("docs/readme.txt", OpenMode::Open, AccessMode::WRITE, ShareMode::empty()).unwrap_err();
        assert!(matches!(err, VfsError::NoWriteAccess));
    }

    #[test]
    fn open_missing_fails_not_found() {
        let fs = EmbeddedFs::new(TABLE);
        assert!(matches!(
            fs.open("docs/missing.txt", OpenMode::Open, AccessMode::READ, ShareMode::READ).unwrap_err(),
            VfsError::FileNotFound(_)
        ));
    }

    #[test]
    fn create_directory_is_not_supported() {
        let fs = EmbeddedFs::new(TABLE);
        assert!(matches!(fs.create_directory("x").unwrap_err(), VfsError::NotSupported));
    }
}
