//! In-process publish/subscribe event emitter (§4.8).
//!
//! Fixed event names (`ready`, `refresh`, `update`, `activation`) plus generic
//! listener registration. Listeners for the same event fire in registration order,
//! synchronously on the caller's thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::evaluation::VariationEvaluation;
use crate::types::Context;

/// The fixed set of lifecycle/activation events this emitter dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Ready,
    Refresh,
    Update,
    Activation,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Ready => "ready",
            Event::Refresh => "refresh",
            Event::Update => "update",
            Event::Activation => "activation",
        }
    }
}

/// The argument payload passed to listeners, one variant per [`Event`].
#[derive(Debug, Clone)]
pub enum EventArgs {
    Ready,
    Refresh { revision: String },
    Update { revision: String },
    Activation {
        feature_key: String,
        variation: Option<String>,
        /// The context bucketing/targeting actually ran against (post-`interceptContext`).
        final_context: Context,
        /// Only the attributes whose datafile `capture` flag is true.
        captured_context: Context,
        evaluation: VariationEvaluation,
    },
}

pub type Listener = Arc<dyn Fn(&EventArgs) + Send + Sync>;

/// An in-process pub/sub bus. Cheap to clone (internally reference-counted) so an
/// `Instance` can share one between its synchronous API and its background refresher.
#[derive(Clone, Default)]
pub struct Emitter {
    listeners: Arc<Mutex<HashMap<Event, Vec<Listener>>>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `event`, appended after any existing listeners.
    pub fn add_listener(&self, event: Event, listener: Listener) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.entry(event).or_default().push(listener);
    }

    /// Removes every listener registered for `event`.
    pub fn remove_all_listeners(&self, event: Event) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.remove(&event);
    }

    /// Dispatches `args` to every listener registered for `event`, in registration
    /// order. Listener panics are not caught; a panicking listener is a programming
    /// error in the embedder, not something the emitter can recover from.
    pub fn emit(&self, event: Event, args: EventArgs) {
        let snapshot = {
            let listeners = self
                .listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            listeners.get(&event).cloned().unwrap_or_default()
        };
        for listener in snapshot {
            listener(&args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn listeners_fire_in_registration_order() {
        let emitter = Emitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_a = order.clone();
        emitter.add_listener(
            Event::Ready,
            Arc::new(move |_| order_a.lock().unwrap().push('a')),
        );
        let order_b = order.clone();
        emitter.add_listener(
            Event::Ready,
            Arc::new(move |_| order_b.lock().unwrap().push('b')),
        );

        emitter.emit(Event::Ready, EventArgs::Ready);
        assert_eq!(*order.lock().unwrap(), vec!['a', 'b']);
    }

    #[test]
    fn only_matching_event_listeners_fire() {
        let emitter = Emitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        emitter.add_listener(
            Event::Refresh,
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        emitter.emit(Event::Ready, EventArgs::Ready);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        emitter.emit(
            Event::Refresh,
            EventArgs::Refresh {
                revision: "r1".into(),
            },
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_all_listeners_clears_event() {
        let emitter = Emitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        emitter.add_listener(
            Event::Ready,
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        emitter.remove_all_listeners(Event::Ready);
        emitter.emit(Event::Ready, EventArgs::Ready);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
