//! The composition/decoration engine: a filesystem built from an ordered
//! list of child filesystems, each wrapped in a [`Component`] that declares
//! the capability mask it forwards and an optional path-prefix translation.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;

use crate::dispatcher::Dispatcher;
use crate::dispose::DisposeBag;
use crate::entry::{Entry, EntryKind};
use crate::error::{VfsError, VfsResult};
use crate::event::{Envelope, Event, EventSink};
use crate::filesystem::{compile_filter, AccessMode, Filesystem, OpenMode, ShareMode, Stream};
use crate::observer::ObserverHandle;
use crate::options::{Capabilities, PathFacets};

/// One child filesystem mounted into a [`CompositeFilesystem`]: the
/// capability mask the composition is willing to forward to it, the
/// resulting effective mask once intersected with what the child actually
/// advertises, and an optional path-prefix translation.
pub struct Component {
    child: Arc<dyn Filesystem>,
    effective: Capabilities,
    /// Prefix of the composition's own path space this component answers
    /// for. Empty means "the whole namespace".
    parent_prefix: String,
    /// Prefix the child expects in its place.
    child_prefix: String,
}

impl Component {
    /// Mount `child`, forwarding at most `declared` capabilities (narrowed
    /// to what `child` actually advertises), with no path translation.
    #[must_use]
    pub fn new(child: Arc<dyn Filesystem>, declared: Capabilities) -> Self {
        let effective = declared.intersect(child.capabilities());
        Self { child, effective, parent_prefix: String::new(), child_prefix: String::new() }
    }

    /// Mount `child` under a parent-path prefix: operations under
    /// `parent_prefix` in the composition's namespace are rewritten to
    /// `child_prefix` before reaching `child`.
    #[must_use]
    pub fn with_path_translation(mut self, parent_prefix: impl Into<String>, child_prefix: impl Into<String>) -> Self {
        self.parent_prefix = parent_prefix.into();
        self.child_prefix = child_prefix.into();
        self
    }

    fn to_child_path(&self, path: &str) -> Option<String> {
        let stripped = strip_prefix(path, &self.parent_prefix)?;
        Some(join_prefix(&self.child_prefix, &stripped))
    }

    fn from_child_path(&self, child_path: &str) -> Option<String> {
        let stripped = strip_prefix(child_path, &self.child_prefix)?;
        Some(join_prefix(&self.parent_prefix, &stripped))
    }
}

fn strip_prefix(path: &str, prefix: &str) -> Option<String> {
    if prefix.is_empty() {
        return Some(path.to_string());
    }
    if path == prefix {
        return Some(String::new());
    }
    path.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('/')).map(str::to_string)
}

fn join_prefix(prefix: &str, rest: &str) -> String {
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{rest}"),
    }
}

/// Translate `event`'s path(s) from a component's child namespace back into
/// the composition's own, dropping the event if any of its paths cannot be
/// re-expressed under the parent prefix.
fn translate_event(parent_prefix: &str, child_prefix: &str, event: &Event) -> Option<Event> {
    let back = |p: &str| strip_prefix(p, child_prefix).map(|rest| join_prefix(parent_prefix, &rest));
    match event {
        Event::Start => Some(Event::Start),
        Event::Create { path } => back(path).map(|path| Event::Create { path }),
        Event::Change { path } => back(path).map(|path| Event::Change { path }),
        Event::Delete { path } => back(path).map(|path| Event::Delete { path }),
        Event::Rename { old_path, new_path } => {
            let old_path = back(old_path)?;
            let new_path = back(new_path)?;
            Some(Event::Rename { old_path, new_path })
        }
        Event::Error { cause, path } => Some(Event::Error { cause: cause.clone(), path: path.as_deref().and_then(back) }),
    }
}

/// Forwards a child's events into the composite-level [`ObserverHandle`]
/// after rewriting their path(s) out of the child's namespace.
struct RelaySink {
    composite: Weak<CompositeFilesystem>,
    parent_prefix: String,
    child_prefix: String,
    handle: Arc<ObserverHandle>,
}

impl EventSink for RelaySink {
    fn on_next(&self, envelope: &Envelope) -> Result<(), VfsError> {
        if let (Some(translated), Some(composite)) = (
            translate_event(&self.parent_prefix, &self.child_prefix, &envelope.event),
            self.composite.upgrade(),
        ) {
            self.handle.deliver(composite as Arc<dyn Filesystem>, translated);
        }
        Ok(())
    }
}

/// A filesystem that fans operations out over an ordered sequence of
/// mounted [`Component`]s, unifying them into a single virtual namespace.
pub struct CompositeFilesystem {
    components: Vec<Component>,
    observers: crate::observer::ObserverList,
    dispose: DisposeBag,
    dispatcher: RwLock<Option<Dispatcher>>,
    self_handle: OnceLock<Weak<CompositeFilesystem>>,
}

impl CompositeFilesystem {
    /// Build a composition over `components`, evaluated in order: earlier
    /// components win name collisions and are consulted first for
    /// single-result operations like `open`.
    #[must_use]
    pub fn new(components: Vec<Component>) -> Arc<Self> {
        let fs = Arc::new(Self {
            components,
            observers: crate::observer::ObserverList::new(),
            dispose: DisposeBag::new(),
            dispatcher: RwLock::new(None),
            self_handle: OnceLock::new(),
        });
        fs.self_handle.set(Arc::downgrade(&fs)).ok();
        fs
    }

    fn self_arc(&self) -> Arc<CompositeFilesystem> {
        self.self_handle.get().and_then(Weak::upgrade).expect("self handle initialized in CompositeFilesystem::new")
    }

    fn as_dyn(&self) -> Arc<dyn Filesystem> {
        self.self_arc() as Arc<dyn Filesystem>
    }

    /// Fan a mutating, no-return-value operation (`delete`/`move`/
    /// `createDirectory`) out over capable components: the first success
    /// wins, a not-found from a capable component doesn't abort the
    /// fan-out, and anything else does.
    fn fan_out_mutation(
        &self,
        cap: Capabilities,
        not_found: impl Fn(&str) -> VfsError,
        path_for_not_found: &str,
        mut call: impl FnMut(&Component) -> Option<VfsResult<()>>,
    ) -> VfsResult<()> {
        let mut supported = false;
        let mut last_not_found: Option<VfsError> = None;
        for component in &self.components {
            if !component.effective.contains(cap) {
                continue;
            }
            let Some(result) = call(component) else { continue };
            supported = true;
            match result {
                Ok(()) => return Ok(()),
                Err(err) if err.is_not_found() => last_not_found = Some(err),
                Err(err) => return Err(err),
            }
        }
        if !supported {
            return Err(VfsError::NotSupported);
        }
        Err(last_not_found.unwrap_or_else(|| not_found(path_for_not_found)))
    }
}

impl Filesystem for CompositeFilesystem {
    fn capabilities(&self) -> Capabilities {
        self.components.iter().fold(Capabilities::empty(), |acc, c| acc.union_with(c.effective))
    }

    fn path_facets(&self) -> PathFacets {
        self.components
            .iter()
            .map(|c| c.child.path_facets())
            .fold(PathFacets::default(), |acc, facets| acc.union(&facets))
    }

    fn browse(&self, path: &str) -> VfsResult<Vec<Entry>> {
        let mut supported = false;
        let mut any_ok = false;
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for component in &self.components {
            if !component.effective.contains(Capabilities::BROWSE) {
                continue;
            }
            let Some(child_path) = component.to_child_path(path) else { continue };
            supported = true;
            match component.child.browse(&child_path) {
                Ok(entries) => {
                    any_ok = true;
                    for entry in entries {
                        let Some(full_path) = component.from_child_path(&entry.path) else { continue };
                        if !seen.insert(entry.name.clone()) {
                            continue;
                        }
                        out.push(entry.rehomed(self.as_dyn(), full_path, entry.name.clone()));
                    }
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        if !supported {
            return Err(VfsError::NotSupported);
        }
        if !any_ok {
            return Err(VfsError::DirectoryNotFound(path.to_string()));
        }
        Ok(out)
    }

    fn get_entry(&self, path: &str) -> VfsResult<Option<Entry>> {
        if path.is_empty() {
            return Ok(Some(Entry {
                filesystem: self.as_dyn(),
                path: String::new(),
                name: String::new(),
                last_modified: std::time::SystemTime::now(),
                last_access: std::time::SystemTime::now(),
                kind: EntryKind::Directory,
            }));
        }
        let mut supported = false;
        for component in &self.components {
            if !component.effective.contains(Capabilities::GET_ENTRY) {
                continue;
            }
            let Some(child_path) = component.to_child_path(path) else { continue };
            supported = true;
            match component.child.get_entry(&child_path) {
                Ok(Some(entry)) => {
                    if let Some(full_path) = component.from_child_path(&entry.path) {
                        let name = entry.name.clone();
                        return Ok(Some(entry.rehomed(self.as_dyn(), full_path, name)));
                    }
                }
                Ok(None) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        if !supported {
            return Err(VfsError::NotSupported);
        }
        Ok(None)
    }

    fn open(&self, path: &str, mode: OpenMode, access: AccessMode, share: ShareMode) -> VfsResult<Box<dyn Stream>> {
        let mut supported = false;
        for component in &self.components {
            if !component.effective.contains(Capabilities::OPEN) {
                continue;
            }
            let Some(child_path) = component.to_child_path(path) else { continue };
            supported = true;
            match component.child.open(&child_path, mode, access, share) {
                Ok(stream) => return Ok(stream),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        if !supported {
            return Err(VfsError::NotSupported);
        }
        Err(VfsError::FileNotFound(path.to_string()))
    }

    fn create_directory(&self, path: &str) -> VfsResult<()> {
        self.fan_out_mutation(Capabilities::CREATE_DIRECTORY, |p| VfsError::FileNotFound(p.to_string()), path, |component| {
            let child_path = component.to_child_path(path)?;
            Some(component.child.create_directory(&child_path))
        })
    }

    fn delete(&self, path: &str, recursive: bool) -> VfsResult<()> {
        self.fan_out_mutation(Capabilities::DELETE, |p| VfsError::FileNotFound(p.to_string()), path, |component| {
            let child_path = component.to_child_path(path)?;
            Some(component.child.delete(&child_path, recursive))
        })
    }

    fn move_entry(&self, old_path: &str, new_path: &str) -> VfsResult<()> {
        self.fan_out_mutation(Capabilities::MOVE, |p| VfsError::FileNotFound(p.to_string()), old_path, |component| {
            let old_child = component.to_child_path(old_path)?;
            let new_child = component.to_child_path(new_path)?;
            Some(component.child.move_entry(&old_child, &new_child))
        })
    }

    fn observe(&self, filter: &str, sink: Arc<dyn EventSink>, dispatcher: Option<Dispatcher>) -> VfsResult<Arc<ObserverHandle>> {
        let compiled = compile_filter(filter)?;
        let dispatcher = dispatcher.or_else(|| self.dispatcher.read().clone()).unwrap_or(Dispatcher::Inline);
        let handle = ObserverHandle::new(compiled, sink, dispatcher);

        let mut supported = false;
        let mut child_handles = Vec::new();
        for component in &self.components {
            if !component.effective.contains(Capabilities::OBSERVE) {
                continue;
            }
            supported = true;
            let relay: Arc<dyn EventSink> = Arc::new(RelaySink {
                composite: self.self_handle.get().cloned().unwrap_or_else(Weak::new),
                parent_prefix: component.parent_prefix.clone(),
                child_prefix: component.child_prefix.clone(),
                handle: handle.clone(),
            });
            match component.child.observe("**", relay, Some(Dispatcher::Inline)) {
                Ok(child_handle) => child_handles.push(child_handle),
                Err(err) if err.is_not_supported() => {}
                Err(err) => log::warn!("component failed to observe during composite subscription: {err}"),
            }
        }
        if !supported {
            return Err(VfsError::NotSupported);
        }

        self.observers.add(handle.clone());
        handle.set_on_dispose({
            let this = self.self_handle.get().cloned().unwrap_or_else(Weak::new);
            let observer_id_holder = handle.id();
            move |_id| {
                for child in child_handles {
                    child.dispose();
                }
                if let Some(fs) = this.upgrade() {
                    fs.observers.remove(observer_id_holder);
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

impl Drop for CompositeFilesystem {
    fn drop(&mut self) {
        let _ = self.dispose.dispose_all();
        self.observers.dispose_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryFilesystem, MemoryFilesystemConfig};

    fn mem() -> Arc<MemoryFilesystem> {
        MemoryFilesystem::new(MemoryFilesystemConfig::default())
    }

    #[test]
    fn browse_merges_children_by_name_first_wins() {
        let a = mem();
        a.create_directory("shared").unwrap();
        a.create_directory("only_a").unwrap();
        let b = mem();
        b.create_directory("shared").unwrap();
        b.create_directory("only_b").unwrap();

        let composite = CompositeFilesystem::new(vec![
            Component::new(a, Capabilities::all()),
            Component::new(b, Capabilities::all()),
        ]);
        let mut names: Vec<_> = composite.browse("").unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["only_a", "only_b", "shared"]);
    }

    #[test]
    fn browse_with_no_component_supporting_fails_not_supported() {
        let a = mem();
        let composite = CompositeFilesystem::new(vec![Component::new(a, Capabilities::empty())]);
        assert!(matches!(composite.browse("").unwrap_err(), VfsError::NotSupported));
    }

    #[test]
    fn get_entry_root_is_synthetic_directory() {
        let composite = CompositeFilesystem::new(vec![Component::new(mem(), Capabilities::all())]);
        let entry = composite.get_entry("").unwrap().unwrap();
        assert!(entry.is_directory());
        assert_eq!(entry.path, "");
    }

    #[test]
    fn open_skips_components_that_report_file_not_found() {
        let a = mem();
        let b = mem();
        drop(b.open("file.txt", OpenMode::CreateNew, AccessMode::WRITE, ShareMode::empty()).unwrap());
        let composite = CompositeFilesystem::new(vec![
            Component::new(a, Capabilities::all()),
            Component::new(b, Capabilities::all()),
        ]);
        assert!(composite.open("file.txt", OpenMode::Open, AccessMode::READ, ShareMode::READ).is_ok());
    }

    #[test]
    fn path_translation_rewrites_into_and_out_of_child_namespace() {
        let child = mem();
        child.create_directory("inner").unwrap();
        let composite =
            CompositeFilesystem::new(vec![Component::new(child, Capabilities::all()).with_path_translation("mnt", "")]);
        assert!(composite.get_entry("mnt/inner").unwrap().is_some());
        assert!(composite.get_entry("inner").unwrap().is_none());
        let entries = composite.browse("mnt").unwrap();
        assert_eq!(entries[0].path, "mnt/inner");
    }

    #[test]
    fn delete_any_capable_child_succeeding_is_success() {
        let a = mem();
        let b = mem();
        b.create_directory("x").unwrap();
        let composite = CompositeFilesystem::new(vec![
            Component::new(a, Capabilities::all()),
            Component::new(b, Capabilities::all()),
        ]);
        assert!(composite.delete("x", false).is_ok());
    }

    #[test]
    fn observe_forwards_translated_events_and_start() {
        let child = mem();
        let composite = CompositeFilesystem::new(vec![Component::new(child.clone(), Capabilities::all())]);
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = received.clone();
        let sink = Arc::new(crate::event::FnSink(move |envelope: &Envelope| {
            recorded.lock().unwrap().push(format!("{:?}", envelope.event));
        }));
        let handle = composite.observe("**", sink, None).unwrap();
        child.create_directory("a").unwrap();
        handle.dispose();
        let recorded = received.lock().unwrap();
        assert_eq!(recorded[0], "Start");
        assert!(recorded[1].contains("Create"));
    }
}
