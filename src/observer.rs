//! Subscription handles and the copy-on-write observer list.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use globset::{Glob, GlobMatcher};
use parking_lot::RwLock;

use crate::dispatcher::Dispatcher;
use crate::event::{Envelope, Event, EventSink};
use crate::filesystem::Filesystem;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// A compiled filter over `/`-separated event paths.
///
/// The filter pattern `"**"` is the universal acceptor and is special-cased
/// to avoid compiling a glob for what is, in practice, the overwhelmingly
/// common subscription.
#[derive(Clone)]
pub struct GlobFilter {
    pattern: String,
    matcher: Option<GlobMatcher>,
}

impl GlobFilter {
    /// Compile `pattern` once, at subscription time.
    pub fn compile(pattern: &str) -> Result<Self, globset::Error> {
        if pattern == "**" {
            return Ok(GlobFilter { pattern: pattern.to_string(), matcher: None });
        }
        let matcher = Glob::new(pattern)?.compile_matcher();
        Ok(GlobFilter { pattern: pattern.to_string(), matcher: Some(matcher) })
    }

    /// True if `path` matches this filter. A `None` path (e.g. `Event::Start`)
    /// always matches, since such events are not subject to path filtering.
    #[must_use]
    pub fn accepts(&self, path: Option<&str>) -> bool {
        match (path, &self.matcher) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(p), Some(matcher)) => matcher.is_match(p),
        }
    }

    /// The source pattern this filter was compiled from.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for GlobFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobFilter").field(&self.pattern).finish()
    }
}

/// Opaque identifier for a live subscription.
pub type ObserverId = u64;

/// A live subscription: the filter it was registered with, the sink events
/// are delivered to, and the dispatcher strategy used to deliver them.
pub struct ObserverHandle {
    id: ObserverId,
    filter: GlobFilter,
    sink: Arc<dyn EventSink>,
    dispatcher: Dispatcher,
    disposed: std::sync::atomic::AtomicBool,
    on_dispose: RwLock<Option<Box<dyn FnOnce(ObserverId) + Send + Sync>>>,
}

impl ObserverHandle {
    pub(crate) fn new(
        filter: GlobFilter,
        sink: Arc<dyn EventSink>,
        dispatcher: Dispatcher,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed),
            filter,
            sink,
            dispatcher,
            disposed: std::sync::atomic::AtomicBool::new(false),
            on_dispose: RwLock::new(None),
        })
    }

    /// This subscription's opaque id.
    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// The compiled filter this subscription was registered with.
    #[must_use]
    pub fn filter(&self) -> &GlobFilter {
        &self.filter
    }

    /// True once [`ObserverHandle::dispose`] has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn set_on_dispose(&self, callback: impl FnOnce(ObserverId) + Send + Sync + 'static) {
        *self.on_dispose.write() = Some(Box::new(callback));
    }

    /// Deliver `event`, tagged as coming from `filesystem`, if it passes
    /// this observer's filter.
    pub(crate) fn deliver(&self, filesystem: Arc<dyn Filesystem>, event: Event) {
        if self.is_disposed() {
            return;
        }
        if !self.filter.accepts(event.path()) {
            return;
        }
        let envelope = Envelope {
            filesystem,
            observer: self.id,
            event_time: SystemTime::now(),
            event,
        };
        self.dispatcher.dispatch(self.sink.clone(), envelope);
    }

    /// Unsubscribe: removes this observer from its owning filesystem's
    /// active set and invokes `on_completed` on the sink, exactly once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sink.on_completed();
        if let Some(callback) = self.on_dispose.write().take() {
            callback(self.id);
        }
    }
}

impl fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A copy-on-write list of active observers: readers clone
/// the current `Arc<Vec<..>>` snapshot and iterate it without holding any
/// lock; writers replace the whole snapshot under a short-held write lock.
/// This keeps event delivery from ever blocking on concurrent
/// subscribe/unsubscribe calls.
#[derive(Default)]
pub struct ObserverList {
    snapshot: RwLock<Arc<Vec<Arc<ObserverHandle>>>>,
}

impl ObserverList {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self { snapshot: RwLock::new(Arc::new(Vec::new())) }
    }

    /// Add `observer`, replacing the snapshot.
    pub fn add(&self, observer: Arc<ObserverHandle>) {
        let mut guard = self.snapshot.write();
        let mut next = (**guard).clone();
        next.push(observer);
        *guard = Arc::new(next);
    }

    /// Remove the observer with the given id, replacing the snapshot.
    pub fn remove(&self, id: ObserverId) {
        let mut guard = self.snapshot.write();
        if !guard.iter().any(|o| o.id() == id) {
            return;
        }
        let next: Vec<_> = guard.iter().filter(|o| o.id() != id).cloned().collect();
        *guard = Arc::new(next);
    }

    /// Take a consistent snapshot of the currently active observers for
    /// iteration.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<ObserverHandle>>> {
        self.snapshot.read().clone()
    }

    /// Dispose every currently-attached observer. Used on filesystem
    /// teardown. Errors from individual sinks during `on_completed` are not
    /// currently surfaced by [`EventSink`]; this only exists to give
    /// teardown a single call site to extend if that changes.
    pub fn dispose_all(&self) {
        let observers = self.snapshot();
        for observer in observers.iter() {
            observer.dispose();
        }
        *self.snapshot.write() = Arc::new(Vec::new());
    }

    /// Deliver `event` to every observer in the current snapshot whose
    /// filter accepts its path.
    pub fn deliver_all(&self, filesystem: Arc<dyn Filesystem>, event: Event) {
        let observers = self.snapshot();
        for observer in observers.iter() {
            observer.deliver(filesystem.clone(), event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_filter_accepts_every_path() {
        let filter = GlobFilter::compile("**").unwrap();
        assert!(filter.accepts(Some("a/b/c")));
        assert!(filter.accepts(None));
    }

    #[test]
    fn glob_filter_matches_segment_wildcards() {
        let filter = GlobFilter::compile("a/*.txt").unwrap();
        assert!(filter.accepts(Some("a/b.txt")));
        assert!(!filter.accepts(Some("a/b/c.txt")));
        assert!(!filter.accepts(Some("x/b.txt")));
    }

    #[test]
    fn glob_filter_double_star_crosses_segments() {
        let filter = GlobFilter::compile("a/**/z").unwrap();
        assert!(filter.accepts(Some("a/b/c/z")));
        assert!(filter.accepts(Some("a/z")));
    }
}
