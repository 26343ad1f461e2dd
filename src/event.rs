//! Event kinds and the sink trait observers implement.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::VfsError;
use crate::filesystem::Filesystem;

/// A change-notification payload: a tagged union carrying
/// `{observer, eventTime, path}` plus variant data. The shared fields live
/// on [`Envelope`] and this enum holds only the variant-specific payload.
#[derive(Debug, Clone)]
pub enum Event {
    /// Emitted exactly once, synchronously, when a subscription is
    /// established.
    Start,
    /// A new entry was created at `path`.
    Create {
        /// Path of the created entry.
        path: String,
    },
    /// The contents or metadata of `path` changed.
    Change {
        /// Path of the changed entry.
        path: String,
    },
    /// The entry at `path` was removed.
    Delete {
        /// Path of the deleted entry.
        path: String,
    },
    /// An entry moved from `old_path` to `new_path`.
    Rename {
        /// Path before the move.
        old_path: String,
        /// Path after the move.
        new_path: String,
    },
    /// Delivery failed for some other event.
    Error {
        /// The failure.
        cause: Arc<VfsError>,
        /// The path the failed event concerned, if known.
        path: Option<String>,
    },
}

impl Event {
    /// The path this event concerns, for glob matching against an
    /// observer's filter. `Start` and a pathless `Error` have no path and
    /// are delivered to every observer regardless of filter (path-based
    /// filtering only applies to events that carry a path).
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Event::Start => None,
            Event::Create { path } | Event::Change { path } | Event::Delete { path } => Some(path),
            Event::Rename { old_path, .. } => Some(old_path),
            Event::Error { path, .. } => path.as_deref(),
        }
    }
}

/// The shared envelope wrapping every delivered [`Event`]: which observer it
/// was matched against, when the producing operation generated it, and the
/// filesystem reference the receiving sink should see. A
/// [composition][crate::compose] rewrites `filesystem` to itself and
/// `observer` to its multiplexing adapter before re-delivering a child's
/// event, exactly as it rewrites [`crate::Entry::filesystem`].
#[derive(Clone)]
pub struct Envelope {
    /// The filesystem (or composition) this event is reported against.
    pub filesystem: Arc<dyn Filesystem>,
    /// Opaque identifier of the observer this delivery targets.
    pub observer: u64,
    /// Time the producing operation generated this event.
    pub event_time: SystemTime,
    /// The event payload.
    pub event: Event,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("observer", &self.observer)
            .field("event_time", &self.event_time)
            .field("event", &self.event)
            .finish()
    }
}

/// A subscriber's event sink.
///
/// `on_next` is called once per delivered [`Envelope`], in generation order
/// for a given observer. If `on_next` itself
/// fails, the failure is reported back via `on_error` on the same sink; if
/// that also fails, both are captured as a [`VfsError::Aggregate`] by the
/// delivering dispatcher. `on_completed` is called exactly once, when the
/// observer is torn down (disposed directly, or because its owning
/// filesystem tore down).
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn on_next(&self, envelope: &Envelope) -> Result<(), VfsError>;

    /// Report a delivery failure.
    fn on_error(&self, error: &VfsError) {
        log::warn!("observer sink reported an unhandled on_error: {error}");
    }

    /// Signal that no further events will be delivered.
    fn on_completed(&self) {}
}

/// An [`EventSink`] built from a plain closure, for the common case of a
/// subscriber that doesn't need `on_error`/`on_completed` hooks.
pub struct FnSink<F: Fn(&Envelope) + Send + Sync>(pub F);

impl<F: Fn(&Envelope) + Send + Sync> EventSink for FnSink<F> {
    fn on_next(&self, envelope: &Envelope) -> Result<(), VfsError> {
        (self.0)(envelope);
        Ok(())
    }
}
