//! Device message router.
//!
//! Maps a [`DeviceId`] to the callbacks that show text on that device's surface
//! and, optionally, push it out over the device's link. Registration is
//! last-writer-wins and routing to an unknown id is dropped without complaint;
//! both are relied on by the surfaces, which re-register freely as screens open.
//!
//! A surface that only borrows an id for a while uses [`MessageRouter::overlay`]:
//! its registration shadows the current one until [`MessageRouter::release`]
//! hands the id back, in whatever order overlapping screens close.
//!
//! Handlers are cloned out of the table and invoked with the lock released, so a
//! handler may call back into the router. Delivery handlers are expected to post
//! into a presentation queue rather than render inline.

#[cfg(test)]
mod tests;

use crate::device::DeviceId;
use crate::lock_or_recover;
use crate::log_debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Callback receiving one text message.
pub type TextHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// The deliver/send pair installed for one device.
#[derive(Clone)]
pub struct Registration {
    deliver: TextHandler,
    send: Option<TextHandler>,
}

impl Registration {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
            send: None,
        }
    }

    /// Attach the outbound sender invoked after delivery.
    pub fn with_sender<F>(mut self, send: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.send = Some(Arc::new(send));
        self
    }

    pub fn has_sender(&self) -> bool {
        self.send.is_some()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("has_sender", &self.has_sender())
            .finish()
    }
}

/// Handle returned by [`MessageRouter::overlay`] and redeemed by [`MessageRouter::release`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegistrationToken(u64);

struct Entry {
    token: RegistrationToken,
    registration: Registration,
}

/// Concurrent table of device registrations.
///
/// Each id maps to a stack; the top entry is the one routed to.
#[derive(Default)]
pub struct MessageRouter {
    table: Mutex<HashMap<DeviceId, Vec<Entry>>>,
    next_token: AtomicU64,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `registration` for `id`, replacing any previous one.
    pub fn register(&self, id: impl Into<DeviceId>, registration: Registration) {
        let id = id.into();
        let entry = self.entry(registration);
        let replaced = {
            let mut table = lock_or_recover(&self.table, "router register");
            table.insert(id.clone(), vec![entry]).is_some()
        };
        if replaced {
            log_debug(&format!("router: replaced registration for {id}"));
        } else {
            log_debug(&format!("router: registered {id}"));
        }
    }

    /// Install `registration` on top of whatever `id` has now.
    ///
    /// Routing goes to it until it is released; the shadowed entry then takes over again.
    pub fn overlay(&self, id: impl Into<DeviceId>, registration: Registration) -> RegistrationToken {
        let id = id.into();
        let entry = self.entry(registration);
        let token = entry.token;
        let depth = {
            let mut table = lock_or_recover(&self.table, "router overlay");
            let stack = table.entry(id.clone()).or_default();
            stack.push(entry);
            stack.len()
        };
        if depth > 1 {
            log_debug(&format!("router: {id} overlaid ({depth} deep)"));
        } else {
            log_debug(&format!("router: registered {id}"));
        }
        token
    }

    /// Drop the entry `token` installed for `id`. Returns false if it was already gone.
    pub fn release(&self, id: &str, token: RegistrationToken) -> bool {
        let (released, remaining) = {
            let mut table = lock_or_recover(&self.table, "router release");
            let Some(stack) = table.get_mut(id) else {
                return false;
            };
            let before = stack.len();
            stack.retain(|entry| entry.token != token);
            let released = stack.len() != before;
            let remaining = stack.len();
            if remaining == 0 {
                table.remove(id);
            }
            (released, remaining)
        };
        if released {
            log_debug(&format!("router: released {id} ({remaining} left)"));
        }
        released
    }

    /// Remove every registration for `id`, if any.
    pub fn unregister(&self, id: &str) {
        let removed = lock_or_recover(&self.table, "router unregister")
            .remove(id)
            .is_some();
        if removed {
            log_debug(&format!("router: unregistered {id}"));
        }
    }

    /// Deliver `text` to the device's surface, then hand it to its sender.
    ///
    /// Returns whether a registration existed. An unknown id is not an error.
    pub fn route(&self, id: &str, text: &str) -> bool {
        let Some(registration) = self.lookup(id) else {
            return false;
        };
        (registration.deliver)(text);
        if let Some(send) = &registration.send {
            send(text);
        }
        true
    }

    /// Display-only path: deliver `text` to the device's surface without sending it.
    pub fn deliver(&self, id: &str, text: &str) -> bool {
        let Some(registration) = self.lookup(id) else {
            return false;
        };
        (registration.deliver)(text);
        true
    }

    pub fn is_registered(&self, id: &str) -> bool {
        lock_or_recover(&self.table, "router is_registered").contains_key(id)
    }

    /// Snapshot of registered ids, sorted for stable output.
    pub fn registered_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = lock_or_recover(&self.table, "router registered_ids")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    fn entry(&self, registration: Registration) -> Entry {
        Entry {
            token: RegistrationToken(self.next_token.fetch_add(1, Ordering::Relaxed)),
            registration,
        }
    }

    fn lookup(&self, id: &str) -> Option<Registration> {
        lock_or_recover(&self.table, "router lookup")
            .get(id)
            .and_then(|stack| stack.last())
            .map(|entry| entry.registration.clone())
    }
}
