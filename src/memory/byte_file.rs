//! The shared byte buffer backing a memory file, and the `Stream` views
//! multiplexed over it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Mutex, RwLock};

use crate::error::{VfsError, VfsResult};
use crate::filesystem::{AccessMode, SeekFrom, ShareMode};

/// Maximum file size: 2 GiB minus one byte.
pub const MAX_FILE_SIZE: u64 = (1u64 << 31) - 1;

/// Something a [`MemoryByteFile`] notifies (after debouncing) when its
/// contents change. Implemented by the owning tree's per-node adapter; kept
/// as a trait object here so this module doesn't need to know about
/// [`crate::memory::tree`] at all, which in turn is what lets the
/// `MemoryByteFile -> Weak<dyn ModificationSink>` edge avoid an ownership
/// cycle back to the tree.
pub(crate) trait ModificationSink: Send + Sync {
    fn on_modified(&self);
}

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

struct OpenStream {
    id: u64,
    access: AccessMode,
    share: ShareMode,
}

#[derive(Default)]
struct StreamRegistry {
    open: Vec<OpenStream>,
}

impl StreamRegistry {
    /// Accept a new stream requesting `access` only if every currently open
    /// stream's `share` mask permits it. One-directional by design: a new
    /// stream's requested access is checked against the shares already
    /// granted, but an existing stream's own share mask is never revisited
    /// once it has been admitted.
    fn check_compatible(&self, access: AccessMode) -> VfsResult<()> {
        for existing in &self.open {
            let allowed = ShareMode::from_bits_truncate(access.bits());
            if !existing.share.contains(allowed) {
                return if access.contains(AccessMode::WRITE) && !existing.share.contains(ShareMode::WRITE) {
                    Err(VfsError::NoWriteAccess)
                } else {
                    Err(VfsError::NoReadAccess)
                };
            }
        }
        Ok(())
    }
}

/// A reference-counted, mutable byte buffer backing a file node, shared by
/// every [`MemoryStream`] opened against it.
pub struct MemoryByteFile {
    contents: RwLock<Vec<u8>>,
    last_modified: Mutex<SystemTime>,
    streams: Mutex<StreamRegistry>,
    modification_sink: RwLock<Option<Weak<dyn ModificationSink>>>,
    last_notified: Mutex<Option<Instant>>,
    debounce_window: Duration,
    /// Set while a trailing-edge fire is scheduled on a background thread,
    /// so a burst of signals inside one debounce window schedules at most
    /// one of them.
    pending: AtomicBool,
    deleted: AtomicBool,
}

impl MemoryByteFile {
    /// A new, empty byte file.
    #[must_use]
    pub fn new(debounce_window: Duration) -> Arc<Self> {
        Arc::new(Self {
            contents: RwLock::new(Vec::new()),
            last_modified: Mutex::new(SystemTime::now()),
            streams: Mutex::new(StreamRegistry::default()),
            modification_sink: RwLock::new(None),
            last_notified: Mutex::new(None),
            debounce_window,
            pending: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
        })
    }

    /// Mark this file as removed from its owning tree. Existing and future
    /// streams over it start failing with [`VfsError::FileNotFound`]; the
    /// underlying buffer stays alive until the last `Arc` drops.
    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Install the weak back-reference to whatever should be notified of
    /// modifications (the owning tree node). Called once, right after
    /// construction.
    pub(crate) fn set_modification_sink(&self, sink: Weak<dyn ModificationSink>) {
        *self.modification_sink.write() = Some(sink);
    }

    /// Current length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.contents.read().len() as u64
    }

    /// True if length is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time of last modification.
    #[must_use]
    pub fn last_modified(&self) -> SystemTime {
        *self.last_modified.lock()
    }

    /// Open a new [`MemoryStream`] view, enforcing the share-mode rule
    /// under the stream-registry critical section.
    pub fn open_stream(
        self: &Arc<Self>,
        access: AccessMode,
        share: ShareMode,
    ) -> VfsResult<MemoryStream> {
        let mut registry = self.streams.lock();
        registry.check_compatible(access)?;
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        registry.open.push(OpenStream { id, access, share });
        drop(registry);
        Ok(MemoryStream {
            byte_file: self.clone(),
            id,
            position: 0,
            access,
            disposed: AtomicBool::new(false),
        })
    }

    fn unregister(&self, id: u64) {
        self.streams.lock().open.retain(|s| s.id != id);
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> usize {
        let contents = self.contents.read();
        let position = position as usize;
        if position >= contents.len() {
            return 0;
        }
        let available = contents.len() - position;
        let to_copy = buf.len().min(available);
        buf[..to_copy].copy_from_slice(&contents[position..position + to_copy]);
        log::trace!("read_at({position}) returned {to_copy} byte(s)");
        to_copy
    }

    fn write_at(&self, position: u64, buf: &[u8]) -> VfsResult<()> {
        if position.saturating_add(buf.len() as u64) > MAX_FILE_SIZE {
            return Err(VfsError::Io(format!(
                "write would exceed the {MAX_FILE_SIZE} byte file size limit"
            )));
        }
        let mut contents = self.contents.write();
        let position = position as usize;
        if position > contents.len() {
            contents.resize(position, 0);
        }
        let end = position + buf.len();
        if end > contents.len() {
            contents.resize(end, 0);
        }
        contents[position..end].copy_from_slice(buf);
        drop(contents);
        *self.last_modified.lock() = SystemTime::now();
        log::trace!("write_at({position}) wrote {} byte(s)", buf.len());
        Ok(())
    }

    pub(crate) fn set_length(&self, length: u64) -> VfsResult<()> {
        if length > MAX_FILE_SIZE {
            return Err(VfsError::Io(format!(
                "length {length} exceeds the {MAX_FILE_SIZE} byte file size limit"
            )));
        }
        let mut contents = self.contents.write();
        contents.resize(length as usize, 0);
        drop(contents);
        *self.last_modified.lock() = SystemTime::now();
        Ok(())
    }

    /// Signal a modification, subject to the debounce window: a signal
    /// landing at least `debounce_window` after the last delivered one
    /// fires immediately; one landing inside the window is coalesced into a
    /// single trailing fire scheduled for when the window elapses, so a
    /// burst of writes still guarantees exactly one delivery after it goes
    /// quiet.
    fn signal_modified(self: &Arc<Self>) {
        let now = Instant::now();
        let remaining = {
            let mut last = self.last_notified.lock();
            match *last {
                Some(previous) if now.duration_since(previous) < self.debounce_window => {
                    Some(self.debounce_window - now.duration_since(previous))
                }
                _ => {
                    *last = Some(now);
                    None
                }
            }
        };
        match remaining {
            None => self.fire(),
            Some(remaining) => {
                if !self.pending.swap(true, Ordering::AcqRel) {
                    let this = self.clone();
                    std::thread::spawn(move || {
                        std::thread::sleep(remaining);
                        *this.last_notified.lock() = Some(Instant::now());
                        this.pending.store(false, Ordering::Release);
                        this.fire();
                    });
                }
            }
        }
    }

    fn fire(&self) {
        if let Some(sink) = self.modification_sink.read().as_ref().and_then(Weak::upgrade) {
            sink.on_modified();
        }
    }
}

/// A mutable view over a [`MemoryByteFile`] with its own position,
/// declared access, and disposed flag.
pub struct MemoryStream {
    byte_file: Arc<MemoryByteFile>,
    id: u64,
    position: u64,
    access: AccessMode,
    disposed: AtomicBool,
}

impl std::fmt::Debug for MemoryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStream")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

impl MemoryStream {
    fn check_live(&self) -> VfsResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(VfsError::ObjectDisposed);
        }
        if self.byte_file.is_deleted() {
            return Err(VfsError::FileNotFound("<deleted>".to_string()));
        }
        Ok(())
    }

    /// Remove this stream from its byte file's registry. Idempotent;
    /// further operations on a disposed stream fail with
    /// [`VfsError::ObjectDisposed`].
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.byte_file.unregister(self.id);
        }
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl crate::filesystem::Stream for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        self.check_live()?;
        if !self.access.contains(AccessMode::READ) {
            return Err(VfsError::NoReadAccess);
        }
        let n = self.byte_file.read_at(self.position, buf);
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> VfsResult<usize> {
        self.check_live()?;
        if !self.access.contains(AccessMode::WRITE) {
            return Err(VfsError::NoWriteAccess);
        }
        self.byte_file.write_at(self.position, buf)?;
        self.position += buf.len() as u64;
        self.byte_file.signal_modified();
        Ok(buf.len())
    }

    fn seek(&mut self, from: SeekFrom) -> VfsResult<u64> {
        self.check_live()?;
        let length = self.byte_file.len();
        let new_position = match from {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => length as i64 + offset,
        };
        // Position may exceed current length: a subsequent write zero-fills
        // the gap. It may not go negative.
        let new_position = new_position.max(0) as u64;
        self.position = new_position;
        Ok(self.position)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn len(&self) -> VfsResult<u64> {
        self.check_live()?;
        Ok(self.byte_file.len())
    }

    fn set_length(&mut self, length: u64) -> VfsResult<()> {
        self.check_live()?;
        if !self.access.contains(AccessMode::WRITE) {
            return Err(VfsError::NoWriteAccess);
        }
        self.byte_file.set_length(length)?;
        self.position = self.position.min(length);
        self.byte_file.signal_modified();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::Stream as _;

    fn share_rw() -> ShareMode {
        ShareMode::READ | ShareMode::WRITE
    }

    #[test]
    fn write_then_read_round_trips_bytes() {
        let file = MemoryByteFile::new(Duration::from_millis(500));
        let mut writer = file.open_stream(AccessMode::WRITE, share_rw()).unwrap();
        writer.write(&[0x48, 0x65, 0x6c, 0x6c, 0x6f]).unwrap();
        drop(writer);

        let mut reader = file.open_stream(AccessMode::READ, share_rw()).unwrap();
        let mut buf = [0u8; 5];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(buf, [0x48, 0x65, 0x6c, 0x6c, 0x6f]);
        assert_eq!(file.len(), 5);
    }

    #[test]
    fn share_mode_blocks_incompatible_access() {
        let file = MemoryByteFile::new(Duration::from_millis(500));
        let _reader = file.open_stream(AccessMode::READ, ShareMode::READ).unwrap();
        let err = file.open_stream(AccessMode::WRITE, share_rw()).unwrap_err();
        assert!(matches!(err, VfsError::NoWriteAccess));
        // A second reader is still fine.
        assert!(file.open_stream(AccessMode::READ, share_rw()).is_ok());
    }

    #[test]
    fn disposed_stream_rejects_operations() {
        let file = MemoryByteFile::new(Duration::from_millis(500));
        let mut stream = file.open_stream(AccessMode::READ, share_rw()).unwrap();
        stream.dispose();
        let mut buf = [0u8; 1];
        assert!(matches!(stream.read(&mut buf), Err(VfsError::ObjectDisposed)));
    }

    #[test]
    fn seek_past_end_then_write_zero_fills() {
        let file = MemoryByteFile::new(Duration::from_millis(500));
        let mut stream = file.open_stream(AccessMode::READ | AccessMode::WRITE, share_rw()).unwrap();
        stream.seek(SeekFrom::Start(4)).unwrap();
        stream.write(&[0xff]).unwrap();
        assert_eq!(file.len(), 5);
        let mut buf = [0u8; 5];
        stream.seek(SeekFrom::Start(0)).unwrap();
        stream.read(&mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0, 0xff]);
    }

    #[test]
    fn seek_from_end_uses_conventional_meaning() {
        let file = MemoryByteFile::new(Duration::from_millis(500));
        let mut stream = file.open_stream(AccessMode::READ | AccessMode::WRITE, share_rw()).unwrap();
        stream.write(&[1, 2, 3, 4, 5]).unwrap();
        stream.seek(SeekFrom::End(-2)).unwrap();
        assert_eq!(stream.position(), 3);
    }

    #[test]
    fn set_length_truncates_and_clamps_position() {
        let file = MemoryByteFile::new(Duration::from_millis(500));
        let mut stream = file.open_stream(AccessMode::READ | AccessMode::WRITE, share_rw()).unwrap();
        stream.write(&[1, 2, 3, 4, 5]).unwrap();
        stream.set_length(2).unwrap();
        assert_eq!(file.len(), 2);
        assert_eq!(stream.position(), 2);
    }
}
