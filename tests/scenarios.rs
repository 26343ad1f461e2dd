//! End-to-end scenarios exercising the in-memory filesystem, composition,
//! and embedded-resource filesystem through the public [`vfscore::Filesystem`]
//! trait, rather than through each module's own unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vfscore::{
    AccessMode, Capabilities, CompositeFilesystem, Component, EmbeddedFs, Entry, Envelope,
    Event, Filesystem, FnSink, MemoryFilesystem, MemoryFilesystemConfig, OpenMode, ShareMode,
    Stream, VfsError,
};

fn mem() -> Arc<MemoryFilesystem> {
    MemoryFilesystem::new(MemoryFilesystemConfig::default())
}

fn read_all(stream: &mut dyn Stream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 64];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    out
}

fn entry_named<'a>(entries: &'a [Entry], name: &str) -> &'a Entry {
    entries.iter().find(|e| e.name == name).unwrap_or_else(|| panic!("no entry named {name}"))
}

/// S1: creating nested directories emits one Create event per segment and
/// leaves the tree browsable at every level.
#[test]
fn s1_nested_directory_creation() {
    let fs = mem();
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();
    let sink = Arc::new(FnSink(move |envelope: &Envelope| {
        recorded.lock().unwrap().push(format!("{:?}", envelope.event));
    }));
    let handle = fs.observe("**", sink, None).unwrap();

    fs.create_directory("a/b/c").unwrap();

    let root = fs.browse("").unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].name, "a");

    let ab = fs.browse("a/b").unwrap();
    assert_eq!(ab.len(), 1);
    assert_eq!(ab[0].name, "c");
    assert!(ab[0].is_directory());

    handle.dispose();
    let recorded = events.lock().unwrap();
    let creates: Vec<_> = recorded.iter().filter(|e| e.starts_with("Create")).collect();
    assert_eq!(creates.len(), 3);
}

/// S2: a written file reads back exactly and reports the written length.
#[test]
fn s2_write_then_read_back() {
    let fs = mem();
    let bytes = [0x48, 0x65, 0x6c, 0x6c, 0x6f];
    {
        let mut stream = fs.open("doc.txt", OpenMode::CreateNew, AccessMode::WRITE, ShareMode::empty()).unwrap();
        assert_eq!(stream.write(&bytes).unwrap(), bytes.len());
    }
    let mut stream = fs.open("doc.txt", OpenMode::Open, AccessMode::READ, ShareMode::READ).unwrap();
    let data = read_all(stream.as_mut());
    assert_eq!(data, bytes);

    let entry = fs.get_entry("doc.txt").unwrap().unwrap();
    assert_eq!(entry.length(), Some(5));
}

/// S3: a writer excludes a second writer, but a second reader is fine
/// alongside an existing reader-share.
#[test]
fn s3_share_mode_excludes_incompatible_access() {
    let fs = mem();
    let _first = fs.open("f", OpenMode::CreateNew, AccessMode::READ, ShareMode::READ).unwrap();

    let write_attempt = fs.open("f", OpenMode::Open, AccessMode::WRITE, ShareMode::empty());
    assert!(matches!(write_attempt.unwrap_err(), VfsError::NoWriteAccess));

    let second_reader = fs.open("f", OpenMode::Open, AccessMode::READ, ShareMode::READ);
    assert!(second_reader.is_ok());
}

/// S4: create, modify, then recursively delete a subtree, observing events
/// in the order they were generated.
#[test]
fn s4_observer_sees_create_change_delete_in_order() {
    let fs = mem();
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();
    let sink = Arc::new(FnSink(move |envelope: &Envelope| {
        recorded.lock().unwrap().push(envelope.event.clone());
    }));
    let handle = fs.observe("**", sink, None).unwrap();

    fs.create_directory("x").unwrap();
    {
        let mut stream = fs.open("x/y", OpenMode::CreateNew, AccessMode::WRITE, ShareMode::empty()).unwrap();
        stream.write(b"hi").unwrap();
    }
    fs.delete("x", true).unwrap();

    let recorded = events.lock().unwrap();
    assert!(matches!(recorded[0], Event::Start));
    assert!(matches!(&recorded[1], Event::Create { path } if path == "x"));
    assert!(matches!(&recorded[2], Event::Create { path } if path == "x/y"));
    assert!(recorded.iter().any(|e| matches!(e, Event::Change { path } if path == "x/y")));
    assert!(recorded.iter().any(|e| matches!(e, Event::Delete { path } if path == "x/y")));
    assert!(recorded.iter().any(|e| matches!(e, Event::Delete { path } if path == "x")));
    handle.dispose();
}

/// S5: composing two memory filesystems merges their roots by name.
#[test]
fn s5_composition_merges_roots_by_name() {
    let a = mem();
    a.create_directory("a").unwrap();
    let b = mem();
    b.create_directory("a").unwrap();
    b.create_directory("b").unwrap();

    let composite =
        CompositeFilesystem::new(vec![Component::new(a, Capabilities::all()), Component::new(b, Capabilities::all())]);
    let entries = composite.browse("").unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entry_named(&entries, "a").is_directory());
    assert!(entry_named(&entries, "b").is_directory());
}

/// S6: an embedded-resource filesystem lists its entries, rejects unknown
/// paths with FileNotFound, and rejects creation with NotSupported.
#[test]
fn s6_embedded_filesystem_is_read_only() {
    const TABLE: &[(&str, &[u8])] = &[("res1", b"one"), ("res2", b"two")];
    let fs = EmbeddedFs::new(TABLE);

    let entries = fs.browse("").unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(Entry::is_file));

    assert!(matches!(
        fs.open("res3", OpenMode::Open, AccessMode::READ, ShareMode::READ).unwrap_err(),
        VfsError::FileNotFound(_)
    ));
    assert!(matches!(
        fs.open("res1", OpenMode::Create, AccessMode::WRITE, ShareMode::empty()).unwrap_err(),
        VfsError::NotSupported
    ));
}

/// Invariant 3: a second CreateNew against the same path fails with
/// FileExists.
#[test]
fn create_new_twice_fails_with_file_exists() {
    let fs = mem();
    drop(fs.open("f", OpenMode::CreateNew, AccessMode::WRITE, ShareMode::empty()).unwrap());
    let err = fs.open("f", OpenMode::CreateNew, AccessMode::WRITE, ShareMode::empty()).unwrap_err();
    assert!(matches!(err, VfsError::FileExists(_)));
}

/// Invariant 5: moving a subtree and moving it back restores the original
/// layout.
#[test]
fn move_and_move_back_restores_layout() {
    let fs = mem();
    fs.create_directory("a/b").unwrap();
    fs.move_entry("a", "z").unwrap();
    assert!(fs.get_entry("a").unwrap().is_none());
    assert!(fs.get_entry("z/b").unwrap().is_some());

    fs.move_entry("z", "a").unwrap();
    assert!(fs.get_entry("z").unwrap().is_none());
    assert!(fs.get_entry("a/b").unwrap().is_some());
}

/// Invariant 6: recursive delete emits exactly one Delete event per node in
/// the subtree, including the root of the deletion.
#[test]
fn recursive_delete_emits_one_event_per_node() {
    let fs = mem();
    fs.create_directory("x/y/z").unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let counted = count.clone();
    let sink = Arc::new(FnSink(move |envelope: &Envelope| {
        if matches!(envelope.event, Event::Delete { .. }) {
            counted.fetch_add(1, Ordering::SeqCst);
        }
    }));
    let handle = fs.observe("**", sink, None).unwrap();
    fs.delete("x", true).unwrap();
    handle.dispose();
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

/// Invariant 7: composition browse never reports a duplicate name, and
/// returned entries are attributed to the composition, not a child.
#[test]
fn composition_browse_entries_are_attributed_to_composite() {
    let a = mem();
    a.create_directory("shared").unwrap();
    let b = mem();
    b.create_directory("shared").unwrap();
    let composite =
        CompositeFilesystem::new(vec![Component::new(a, Capabilities::all()), Component::new(b, Capabilities::all())]);
    let entries = composite.browse("").unwrap();
    assert_eq!(entries.len(), 1);
    assert!(Arc::ptr_eq(&entries[0].filesystem, &(composite as Arc<dyn Filesystem>)));
}

/// Invariant 10: disposing a filesystem completes every attached observer
/// exactly once.
#[test]
fn dropping_filesystem_completes_observers() {
    let completed = Arc::new(AtomicUsize::new(0));

    struct CountingSink(Arc<AtomicUsize>);
    impl vfscore::EventSink for CountingSink {
        fn on_next(&self, _envelope: &Envelope) -> Result<(), VfsError> {
            Ok(())
        }
        fn on_completed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let fs = mem();
    let sink = Arc::new(CountingSink(completed.clone()));
    let _handle = fs.observe("**", sink, None).unwrap();
    drop(fs);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}
