//! Value-holding label control.
//!
//! Stands in for the numeric input box of a GUI host: it holds the current
//! label value and notifies registered observers whenever the value changes.
//! The explorer routes all programmatic edits through it, so an embedding
//! host only has to mirror this one control to stay in sync.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::callback::CallbackId;

type Observer = Arc<dyn Fn(f64) + Send + Sync>;

/// Numeric label input with change observers.
pub struct LabelInput {
    value: f64,
    observers: Mutex<HashMap<CallbackId, Observer>>,
    next_observer_id: Mutex<CallbackId>,
}

impl LabelInput {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            observers: Mutex::new(HashMap::new()),
            next_observer_id: Mutex::new(0),
        }
    }

    /// Current value of the control.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Sets the value, notifying observers only when it actually changed.
    pub fn set(&mut self, value: f64) {
        if value == self.value {
            return;
        }
        self.value = value;
        let observers = self.observers.lock().unwrap();
        for observer in observers.values() {
            observer(value);
        }
    }

    /// Registers an observer called with each new value.
    ///
    /// Returns an ID that can be used to unregister the observer later.
    pub fn observe<F>(&self, observer: F) -> CallbackId
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        let mut observers = self.observers.lock().unwrap();
        let mut next_id = self.next_observer_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        observers.insert(id, Arc::new(observer));
        id
    }

    /// Removes an observer by ID. Returns true if it was registered.
    pub fn unobserve(&self, id: CallbackId) -> bool {
        self.observers.lock().unwrap().remove(&id).is_some()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }
}

impl Default for LabelInput {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl std::fmt::Debug for LabelInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelInput")
            .field("value", &self.value)
            .field("observers", &self.observer_count())
            .finish()
    }
}
