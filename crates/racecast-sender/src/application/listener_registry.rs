//! Ordered, identity-deduplicated set of callbacks for one kind of value.
//!
//! Used for status listeners: every listener sees every change in the order
//! listeners were added, and a listener added late is told the current value
//! straight away so it never has to poll.

use std::sync::Arc;

/// A shared callback.  Identity is the `Arc` allocation, so the same `Arc`
/// added twice is one listener, while two separately created closures are
/// two listeners even if their code is identical.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct ListenerRegistry<T> {
    listeners: Vec<Listener<T>>,
    current: Option<T>,
}

impl<T: Clone> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            current: None,
        }
    }

    /// Creates a registry that already holds `initial` as its current value.
    pub fn with_value(initial: T) -> Self {
        Self {
            listeners: Vec::new(),
            current: Some(initial),
        }
    }

    /// Adds `listener` and, if a current value exists, invokes it once with
    /// that value.
    ///
    /// Returns `false` (and does not notify) when the listener is already
    /// registered.
    pub fn add(&mut self, listener: Listener<T>) -> bool {
        if self.contains(&listener) {
            return false;
        }
        if let Some(value) = &self.current {
            listener(value);
        }
        self.listeners.push(listener);
        true
    }

    /// Removes `listener`.  Returns `false` if it was not registered.
    pub fn remove(&mut self, listener: &Listener<T>) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        self.listeners.len() != before
    }

    /// Stores `value` as current and invokes every listener with it, in
    /// registration order.
    pub fn notify(&mut self, value: T) {
        for listener in &self.listeners {
            listener(&value);
        }
        self.current = Some(value);
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn contains(&self, listener: &Listener<T>) -> bool {
        self.listeners.iter().any(|l| Arc::ptr_eq(l, listener))
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<T: Clone> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
