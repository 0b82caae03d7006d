//! Listener registration handles

use parking_lot::Mutex;
use std::sync::Weak;

use super::types::Listener;

#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

impl ListenerSet {
    pub(crate) fn add(&mut self, listener: Listener) -> u64 {
        self.next_id += 1;
        self.listeners.push((self.next_id, listener));
        self.next_id
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
    }

    pub(crate) fn snapshot(&self) -> Vec<Listener> {
        self.listeners.iter().map(|(_, l)| l.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }
}

/// Handle returned by `subscribe`; the listener is removed when it is dropped
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    pub(crate) id: u64,
    pub(crate) listeners: Weak<Mutex<ListenerSet>>,
}

impl Subscription {
    /// Remove the listener now
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
