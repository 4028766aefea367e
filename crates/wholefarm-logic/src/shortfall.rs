//! Shortfall notification: one synchronous event per unmet request.
//!
//! Each activity node owns a [`ShortfallNotifier`]. Any number of observers
//! (loggers, other activities) subscribe to it. The engine emits after the
//! transmutation phase and before it evaluates the execution gate; every
//! subscriber runs to completion before the engine carries on. Subscribers
//! observe only: nothing they do changes the resolution.
//!
//! A panicking subscriber is caught and logged. It does not reach the engine
//! and the remaining subscribers still receive the event.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::request::{AllocationPassId, ResourceKind, ResourceRequest};

/// A request that was still unmet after probing and transmutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortfallEvent {
    pub pass_id: AllocationPassId,
    pub activity_label: String,
    /// Snapshot of the request at emission time.
    pub request: ResourceRequest,
    /// `required - available`.
    pub deficit: f64,
}

impl ShortfallEvent {
    pub fn from_request(pass_id: AllocationPassId, request: &ResourceRequest) -> Self {
        Self {
            pass_id,
            activity_label: request.activity_label.clone(),
            request: request.clone(),
            deficit: request.shortfall(),
        }
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.request.kind
    }
}

/// Handle returned by [`ShortfallNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&ShortfallEvent)>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

/// Synchronous fan-out of shortfall events, in subscription order.
#[derive(Default)]
pub struct ShortfallNotifier {
    subscribers: Vec<Subscriber>,
    next_id: u64,
    emitted: u64,
}

impl ShortfallNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ShortfallEvent) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Returns false if the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Total events emitted through this notifier, with or without subscribers.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn notify(&mut self, event: &ShortfallEvent) {
        self.emitted += 1;
        for sub in &mut self.subscribers {
            let callback = &mut sub.callback;
            if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                log::warn!(
                    "shortfall subscriber {:?} panicked on {} for '{}'",
                    sub.id,
                    event.kind(),
                    event.activity_label
                );
            }
        }
    }
}

impl std::fmt::Debug for ShortfallNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShortfallNotifier")
            .field("subscribers", &self.subscribers.len())
            .field("emitted", &self.emitted)
            .finish()
    }
}

/// Shared recorder that can be attached to many notifiers.
#[derive(Debug, Clone, Default)]
pub struct ShortfallLog {
    events: Rc<RefCell<Vec<ShortfallEvent>>>,
}

impl ShortfallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, notifier: &mut ShortfallNotifier) -> SubscriptionId {
        let events = Rc::clone(&self.events);
        notifier.subscribe(move |e| events.borrow_mut().push(e.clone()))
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Copy of everything recorded so far, in emission order.
    pub fn events(&self) -> Vec<ShortfallEvent> {
        self.events.borrow().clone()
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&self) -> Vec<ShortfallEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}
