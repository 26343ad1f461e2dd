//! The in-memory filesystem tree: an arena of nodes addressed by `NodeId`,
//! and `MemoryFilesystem`, the `Filesystem` implementation over it.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;

use crate::dispatcher::Dispatcher;
use crate::dispose::DisposeBag;
use crate::entry::{Entry, EntryKind};
use crate::error::{VfsError, VfsResult};
use crate::event::{Event, EventSink};
use crate::filesystem::{AccessMode, Filesystem, OpenMode, ShareMode, Stream};
use crate::memory::byte_file::{MemoryByteFile, ModificationSink};
use crate::observer::ObserverHandle;
use crate::options::{CaseSensitivity, Capabilities, PathFacets};
use crate::path::{self, TrailingSlashPolicy};

/// Opaque arena handle for a node. Never reused within a given tree's
/// lifetime, so a stale `NodeId` simply fails to resolve rather than
/// silently addressing an unrelated node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

struct NodeMeta {
    parent: Option<NodeId>,
    name: String,
    last_modified: SystemTime,
}

struct DirectoryNode {
    meta: NodeMeta,
    /// Child ids in insertion order.
    order: Vec<NodeId>,
    by_name: HashMap<String, NodeId>,
}

struct FileNode {
    meta: NodeMeta,
    byte_file: Arc<MemoryByteFile>,
    /// Keeps the [`NodeModificationSink`] alive for as long as this node is
    /// in the arena; `byte_file` only holds a `Weak` to it.
    _modification_sink: Arc<dyn ModificationSink>,
}

enum Node {
    Directory(DirectoryNode),
    File(FileNode),
}

impl Node {
    fn meta(&self) -> &NodeMeta {
        match self {
            Node::Directory(d) => &d.meta,
            Node::File(f) => &f.meta,
        }
    }

    fn meta_mut(&mut self) -> &mut NodeMeta {
        match self {
            Node::Directory(d) => &mut d.meta,
            Node::File(f) => &mut f.meta,
        }
    }
}

struct TreeState {
    arena: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: u64,
}

impl TreeState {
    fn new() -> Self {
        let root = NodeId(0);
        let mut arena = HashMap::new();
        arena.insert(
            root,
            Node::Directory(DirectoryNode {
                meta: NodeMeta { parent: None, name: String::new(), last_modified: SystemTime::now() },
                order: Vec::new(),
                by_name: HashMap::new(),
            }),
        );
        Self { arena, root, next_id: 1 }
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn path_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = id;
        loop {
            let node = self.arena.get(&current).expect("node id from this tree always resolves");
            if current == self.root {
                break;
            }
            segments.push(node.meta().name.as_str());
            current = node.meta().parent.expect("non-root node always has a parent");
        }
        segments.reverse();
        path::join(segments)
    }

    /// Resolve a normalized path to a node id, honoring `case_sensitivity`
    /// for name comparisons along the way.
    fn resolve(&self, normalized: &str, case_sensitivity: CaseSensitivity) -> Option<NodeId> {
        if normalized.is_empty() {
            return Some(self.root);
        }
        let mut current = self.root;
        for segment in normalized.split('/') {
            let Node::Directory(dir) = self.arena.get(&current)? else {
                return None;
            };
            current = match case_sensitivity {
                CaseSensitivity::CaseInsensitive => dir
                    .order
                    .iter()
                    .copied()
                    .find(|child| self.arena[child].meta().name.eq_ignore_ascii_case(segment))?,
                _ => *dir.by_name.get(segment)?,
            };
        }
        Some(current)
    }

    fn children_of(&self, id: NodeId) -> Option<&[NodeId]> {
        match self.arena.get(&id)? {
            Node::Directory(dir) => Some(&dir.order),
            Node::File(_) => None,
        }
    }

    fn touch(&mut self, id: NodeId) {
        if let Some(node) = self.arena.get_mut(&id) {
            node.meta_mut().last_modified = SystemTime::now();
        }
    }

    fn unlink(&mut self, id: NodeId) {
        let parent = self.arena.get(&id).and_then(|n| n.meta().parent);
        if let Some(parent_id) = parent {
            let name = self.arena[&id].meta().name.clone();
            if let Some(Node::Directory(dir)) = self.arena.get_mut(&parent_id) {
                dir.order.retain(|c| *c != id);
                dir.by_name.remove(&name);
            }
            self.touch(parent_id);
        }
    }

    /// Collect `id` and every descendant, pre-order (parent before children).
    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut frontier = vec![id];
        while let Some(current) = frontier.pop() {
            if let Some(children) = self.children_of(current) {
                for &child in children {
                    out.push(child);
                    frontier.push(child);
                }
            }
        }
        out
    }
}

/// Wire a [`MemoryByteFile`]'s debounced modification signal back into a
/// `Change` event on the owning tree's observer list, without the byte file
/// holding a strong (cyclic) reference back to the tree.
struct NodeModificationSink {
    tree: Weak<MemoryFilesystem>,
    node: NodeId,
}

impl ModificationSink for NodeModificationSink {
    fn on_modified(&self) {
        if let Some(fs) = self.tree.upgrade() {
            fs.notify_modified(self.node);
        }
    }
}

/// Construction-time knobs for a [`MemoryFilesystem`].
#[derive(Debug, Clone)]
pub struct MemoryFilesystemConfig {
    /// How a trailing slash in a supplied path is treated.
    pub trailing_slash_policy: TrailingSlashPolicy,
    /// Declared case sensitivity advertised via `path_facets`.
    pub case_sensitivity: CaseSensitivity,
    /// Debounce window applied to each file's modification notifications.
    pub debounce_window: Duration,
    /// Dispatcher used for subscriptions that don't specify their own.
    pub default_dispatcher: Dispatcher,
}

impl Default for MemoryFilesystemConfig {
    fn default() -> Self {
        Self {
            trailing_slash_policy: TrailingSlashPolicy::Ignore,
            case_sensitivity: CaseSensitivity::CaseSensitive,
            debounce_window: Duration::from_millis(500),
            default_dispatcher: Dispatcher::Inline,
        }
    }
}

/// An in-memory, hierarchical filesystem: directories and files held
/// entirely in process memory, addressed by path.
pub struct MemoryFilesystem {
    tree: RwLock<TreeState>,
    observers: crate::observer::ObserverList,
    dispose: DisposeBag,
    trailing_slash_policy: TrailingSlashPolicy,
    case_sensitivity: CaseSensitivity,
    debounce_window: Duration,
    dispatcher: RwLock<Option<Dispatcher>>,
    self_handle: OnceLock<Weak<MemoryFilesystem>>,
}

impl MemoryFilesystem {
    /// Build a new, empty filesystem rooted at `""`.
    #[must_use]
    pub fn new(config: MemoryFilesystemConfig) -> Arc<Self> {
        let fs = Arc::new(Self {
            tree: RwLock::new(TreeState::new()),
            observers: crate::observer::ObserverList::new(),
            dispose: DisposeBag::new(),
            trailing_slash_policy: config.trailing_slash_policy,
            case_sensitivity: config.case_sensitivity,
            debounce_window: config.debounce_window,
            dispatcher: RwLock::new(Some(config.default_dispatcher)),
            self_handle: OnceLock::new(),
        });
        fs.self_handle.set(Arc::downgrade(&fs)).ok();
        fs
    }

    fn self_arc(&self) -> Arc<MemoryFilesystem> {
        self.self_handle
            .get()
            .and_then(Weak::upgrade)
            .expect("self handle is always initialized in MemoryFilesystem::new")
    }

    fn as_dyn(&self) -> Arc<dyn Filesystem> {
        self.self_arc() as Arc<dyn Filesystem>
    }

    fn normalize(&self, raw: &str) -> VfsResult<String> {
        path::VfsPath::normalize(raw, self.trailing_slash_policy)
            .map(String::from)
            .map_err(|e| VfsError::ArgumentInvalid(e.0))
    }

    fn snapshot(&self, tree: &TreeState, id: NodeId, path: String) -> Entry {
        let node = &tree.arena[&id];
        let meta = node.meta();
        let kind = match node {
            Node::Directory(_) => EntryKind::Directory,
            Node::File(file) => EntryKind::File { length: file.byte_file.len() },
        };
        let name = if id == tree.root { String::new() } else { meta.name.clone() };
        Entry {
            filesystem: self.as_dyn(),
            path,
            name,
            last_modified: meta.last_modified,
            last_access: meta.last_modified,
            kind,
        }
    }

    fn notify_modified(&self, node: NodeId) {
        let tree = self.tree.read();
        if !tree.arena.contains_key(&node) {
            return;
        }
        let path = tree.path_of(node);
        drop(tree);
        self.observers.deliver_all(self.as_dyn(), Event::Change { path });
    }

    fn emit_all(&self, events: Vec<Event>) {
        for event in events {
            self.observers.deliver_all(self.as_dyn(), event);
        }
    }

    fn make_modification_sink(self: &Arc<Self>, node: NodeId, byte_file: &Arc<MemoryByteFile>) -> Arc<dyn ModificationSink> {
        let sink: Arc<dyn ModificationSink> = Arc::new(NodeModificationSink { tree: Arc::downgrade(self), node });
        byte_file.set_modification_sink(Arc::downgrade(&sink));
        sink
    }
}

impl Filesystem for MemoryFilesystem {
    fn capabilities(&self) -> Capabilities {
        Capabilities::BROWSE
            | Capabilities::GET_ENTRY
            | Capabilities::OPEN
            | Capabilities::READ
            | Capabilities::WRITE
            | Capabilities::CREATE_FILE
            | Capabilities::DELETE
            | Capabilities::MOVE
            | Capabilities::CREATE_DIRECTORY
            | Capabilities::OBSERVE
            | Capabilities::SET_EVENT_DISPATCHER
    }

    fn path_facets(&self) -> PathFacets {
        PathFacets { case_sensitivity: self.case_sensitivity, empty_directory_name: false, mount_path: None }
    }

    fn browse(&self, path: &str) -> VfsResult<Vec<Entry>> {
        let normalized = self.normalize(path)?;
        let tree = self.tree.read();
        let id = tree
            .resolve(&normalized, self.case_sensitivity)
            .ok_or_else(|| VfsError::DirectoryNotFound(normalized.clone()))?;
        match &tree.arena[&id] {
            Node::File(_) => Ok(vec![self.snapshot(&tree, id, normalized)]),
            Node::Directory(dir) => Ok(dir
                .order
                .iter()
                .map(|&child| {
                    let child_path = if normalized.is_empty() {
                        tree.arena[&child].meta().name.clone()
                    } else {
                        path::join([normalized.as_str(), tree.arena[&child].meta().name.as_str()])
                    };
                    self.snapshot(&tree, child, child_path)
                })
                .collect()),
        }
    }

    fn get_entry(&self, path: &str) -> VfsResult<Option<Entry>> {
        let normalized = self.normalize(path)?;
        let tree = self.tree.read();
        Ok(tree
            .resolve(&normalized, self.case_sensitivity)
            .map(|id| self.snapshot(&tree, id, normalized)))
    }

    fn open(&self, path: &str, mode: OpenMode, access: AccessMode, share: ShareMode) -> VfsResult<Box<dyn Stream>> {
        let normalized = self.normalize(path)?;
        let tree = self.tree.read();
        if let Some(id) = tree.resolve(&normalized, self.case_sensitivity) {
            return match &tree.arena[&id] {
                Node::Directory(_) => Err(VfsError::Io(format!("{normalized} is a directory"))),
                Node::File(file) => {
                    if mode == OpenMode::CreateNew {
                        return Err(VfsError::FileExists(normalized));
                    }
                    let byte_file = file.byte_file.clone();
                    drop(tree);
                    if matches!(mode, OpenMode::Create | OpenMode::Truncate) {
                        byte_file.set_length(0)?;
                    }
                    Ok(Box::new(byte_file.open_stream(access, share)?))
                }
            };
        }
        drop(tree);

        if !mode.may_create() {
            return Err(VfsError::FileNotFound(normalized));
        }

        let (parent_path, name) =
            path::split_parent(&normalized).ok_or_else(|| VfsError::Io("cannot create a file at the root".into()))?;

        let mut tree = self.tree.write();
        // Re-resolve under the write lock: another writer may have created
        // this path (or its parent may no longer exist) since we dropped
        // the read lock above.
        if let Some(id) = tree.resolve(&normalized, self.case_sensitivity) {
            return match &tree.arena[&id] {
                Node::Directory(_) => Err(VfsError::Io(format!("{normalized} is a directory"))),
                Node::File(file) => {
                    if mode == OpenMode::CreateNew {
                        return Err(VfsError::FileExists(normalized));
                    }
                    let byte_file = file.byte_file.clone();
                    drop(tree);
                    if matches!(mode, OpenMode::Create | OpenMode::Truncate) {
                        byte_file.set_length(0)?;
                    }
                    Ok(Box::new(byte_file.open_stream(access, share)?))
                }
            };
        }

        let parent_id = tree
            .resolve(&parent_path, self.case_sensitivity)
            .ok_or_else(|| VfsError::DirectoryNotFound(parent_path.clone()))?;
        if !matches!(tree.arena[&parent_id], Node::Directory(_)) {
            return Err(VfsError::DirectoryNotFound(parent_path));
        }

        let byte_file = MemoryByteFile::new(self.debounce_window);
        let id = tree.alloc_id();
        let self_arc = self.self_arc();
        let modification_sink = self_arc.make_modification_sink(id, &byte_file);
        tree.arena.insert(
            id,
            Node::File(FileNode {
                meta: NodeMeta { parent: Some(parent_id), name: name.to_string(), last_modified: SystemTime::now() },
                byte_file: byte_file.clone(),
                _modification_sink: modification_sink,
            }),
        );
        if let Node::Directory(dir) = tree.arena.get_mut(&parent_id).expect("parent resolved above") {
            dir.order.push(id);
            dir.by_name.insert(name.to_string(), id);
        }
        tree.touch(parent_id);
        drop(tree);

        self.emit_all(vec![Event::Create { path: normalized }]);
        Ok(Box::new(byte_file.open_stream(access, share)?))
    }

    fn create_directory(&self, path: &str) -> VfsResult<()> {
        let normalized = self.normalize(path)?;
        if normalized.is_empty() {
            return Ok(());
        }
        let mut tree = self.tree.write();
        let mut current = tree.root;
        let mut created = Vec::new();
        let mut built = String::new();
        for segment in normalized.split('/') {
            let existing = match &tree.arena[&current] {
                Node::Directory(dir) => match self.case_sensitivity {
                    CaseSensitivity::CaseInsensitive => dir
                        .order
                        .iter()
                        .copied()
                        .find(|child| tree.arena[child].meta().name.eq_ignore_ascii_case(segment)),
                    _ => dir.by_name.get(segment).copied(),
                },
                Node::File(_) => {
                    return Err(VfsError::Io(format!("{built} is a file, not a directory")));
                }
            };
            built = if built.is_empty() { segment.to_string() } else { path::join([built.as_str(), segment]) };
            current = match existing {
                Some(id) => id,
                None => {
                    let id = tree.alloc_id();
                    tree.arena.insert(
                        id,
                        Node::Directory(DirectoryNode {
                            meta: NodeMeta {
                                parent: Some(current),
                                name: segment.to_string(),
                                last_modified: SystemTime::now(),
                            },
                            order: Vec::new(),
                            by_name: HashMap::new(),
                        }),
                    );
                    let parent = current;
                    if let Node::Directory(dir) = tree.arena.get_mut(&parent).expect("parent just resolved") {
                        dir.order.push(id);
                        dir.by_name.insert(segment.to_string(), id);
                    }
                    tree.touch(parent);
                    created.push(built.clone());
                    id
                }
            };
        }
        drop(tree);
        log::debug!("create_directory({normalized}) created {} segment(s)", created.len());
        self.emit_all(created.into_iter().map(|path| Event::Create { path }).collect());
        Ok(())
    }

    fn delete(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let normalized = self.normalize(path)?;
        if normalized.is_empty() {
            return Err(VfsError::Io("cannot delete the root directory".into()));
        }
        let mut tree = self.tree.write();
        let id = tree
            .resolve(&normalized, self.case_sensitivity)
            .ok_or_else(|| VfsError::FileNotFound(normalized.clone()))?;
        if let Node::Directory(dir) = &tree.arena[&id] {
            if !dir.order.is_empty() && !recursive {
                return Err(VfsError::Io(format!("{normalized} is not empty")));
            }
        }

        let victims = tree.subtree(id);
        let mut events = Vec::with_capacity(victims.len());
        for &victim in &victims {
            events.push(Event::Delete { path: tree.path_of(victim) });
        }
        tree.unlink(id);
        for &victim in &victims {
            if let Some(Node::File(file)) = tree.arena.remove(&victim) {
                file.byte_file.mark_deleted();
            }
        }
        drop(tree);
        log::debug!("delete({normalized}, recursive={recursive}) removed {} node(s)", events.len());
        self.emit_all(events);
        Ok(())
    }

    fn move_entry(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        let old_normalized = self.normalize(old_path)?;
        let new_normalized = self.normalize(new_path)?;
        if old_normalized.is_empty() {
            return Err(VfsError::Io("cannot move the root directory".into()));
        }
        if old_normalized == new_normalized {
            return Ok(());
        }

        let mut tree = self.tree.write();
        let id = tree
            .resolve(&old_normalized, self.case_sensitivity)
            .ok_or_else(|| VfsError::FileNotFound(old_normalized.clone()))?;
        if tree.resolve(&new_normalized, self.case_sensitivity).is_some() {
            return Err(VfsError::Io(format!("{new_normalized} already exists")));
        }
        let (new_parent_path, new_name) =
            path::split_parent(&new_normalized).ok_or_else(|| VfsError::Io("cannot move onto the root".into()))?;
        let new_parent_id = tree
            .resolve(&new_parent_path, self.case_sensitivity)
            .ok_or_else(|| VfsError::FileNotFound(new_parent_path.clone()))?;
        if !matches!(tree.arena[&new_parent_id], Node::Directory(_)) {
            return Err(VfsError::FileNotFound(new_parent_path));
        }
        if new_parent_id == id || tree.subtree(id).contains(&new_parent_id) {
            return Err(VfsError::Io("cannot move a directory into its own subtree".into()));
        }

        let victims = tree.subtree(id);
        let old_paths: Vec<String> = victims.iter().map(|&v| tree.path_of(v)).collect();

        tree.unlink(id);
        if let Some(node) = tree.arena.get_mut(&id) {
            node.meta_mut().parent = Some(new_parent_id);
            node.meta_mut().name = new_name.to_string();
        }
        if let Node::Directory(dir) = tree.arena.get_mut(&new_parent_id).expect("resolved above") {
            dir.order.push(id);
            dir.by_name.insert(new_name.to_string(), id);
        }
        tree.touch(new_parent_id);

        let new_paths: Vec<String> = victims.iter().map(|&v| tree.path_of(v)).collect();
        drop(tree);

        log::debug!("move_entry({old_normalized} -> {new_normalized}) relocated {} node(s)", victims.len());
        let events = old_paths
            .into_iter()
            .zip(new_paths)
            .map(|(old_path, new_path)| Event::Rename { old_path, new_path })
            .collect();
        self.emit_all(events);
        Ok(())
    }

    fn observe(&self, filter: &str, sink: Arc<dyn EventSink>, dispatcher: Option<Dispatcher>) -> VfsResult<Arc<ObserverHandle>> {
        let compiled = crate::filesystem::compile_filter(filter)?;
        let dispatcher = dispatcher.or_else(|| self.dispatcher.read().clone()).unwrap_or(Dispatcher::Inline);
        let handle = ObserverHandle::new(compiled, sink, dispatcher);
        self.observers.add(handle.clone());
        handle.set_on_dispose({
            let this = self.self_handle.get().cloned().unwrap_or_else(Weak::new);
            move |observer_id| {
                if let Some(fs) = this.upgrade() {
                    fs.observers.remove(observer_id);
                }
            }
        });
        handle.deliver(self.as_dyn(), Event::Start);
        Ok(handle)
    }

    fn set_event_dispatcher(&self, dispatcher: Option<Dispatcher>) -> VfsResult<()> {
        *self.dispatcher.write() = dispatcher;
        Ok(())
    }
}

impl Drop for MemoryFilesystem {
    fn drop(&mut self) {
        let _ = self.dispose.dispose_all();
        self.observers.dispose_all();
    }
}
