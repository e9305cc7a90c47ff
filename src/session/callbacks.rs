//! Event callback registry.
//!
//! Callbacks are stored per event name in registration order. A
//! [`Callback`] is a shared handle, so registering a clone of a handle that
//! is already present for the same event is skipped.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Callback
// ============================================================================

/// Callback function type.
///
/// Receives the first argument of the event. An `Err` stops the
/// keepalive loop.
type CallbackFn = dyn Fn(&Value) -> Result<()> + Send + Sync;

/// Shared handle to an event callback.
///
/// Cloning the handle keeps its identity.
#[derive(Clone)]
pub struct Callback(Arc<CallbackFn>);

impl Callback {
    /// Wraps a closure in a new callback handle.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invokes the callback.
    #[inline]
    pub fn call(&self, data: &Value) -> Result<()> {
        (self.0)(data)
    }

    /// Returns `true` if both handles point at the same callback.
    #[inline]
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

// ============================================================================
// CallbackRegistry
// ============================================================================

/// Event name to ordered callbacks.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    callbacks: FxHashMap<String, Vec<Callback>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `event`.
    ///
    /// Returns `false` if the same handle was already registered for it.
    pub fn register(&mut self, event: impl Into<String>, callback: Callback) -> bool {
        let entries = self.callbacks.entry(event.into()).or_default();
        if entries.iter().any(|existing| existing.same_as(&callback)) {
            return false;
        }
        entries.push(callback);
        true
    }

    /// Returns the callbacks registered for `event`.
    #[must_use]
    pub fn get(&self, event: &str) -> &[Callback] {
        self.callbacks.get(event).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the number of callbacks registered for `event`.
    #[inline]
    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.get(event).len()
    }

    /// Invokes every callback for `event` in registration order.
    ///
    /// Stops at the first failing callback and returns its error.
    /// Returns the number of callbacks invoked.
    pub fn dispatch(&self, event: &str, data: &Value) -> Result<usize> {
        let callbacks = self.get(event);
        for callback in callbacks {
            callback.call(data)?;
        }
        Ok(callbacks.len())
    }
}

// ============================================================================
// Tests
// ============================================================================
