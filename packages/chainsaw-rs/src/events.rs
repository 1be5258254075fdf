//! Lifecycle events - observe the chain without steering it.
//!
//! Listeners are told when dispatch begins and when the root frame drains.
//! They cannot veto anything: a failing listener is logged and the remaining
//! listeners still run.
//!
//! # Example
//!
//! ```ignore
//! let chain = chainsaw(|saw, harness| {
//!     saw.on(Lifecycle::End, |_| {
//!         tracing::info!("all done");
//!         Ok(())
//!     });
//!     harness.define("x", |saw, _, _| saw.next());
//!     Ok(())
//! })?;
//! ```

use std::fmt;
use std::rc::Rc;

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use crate::engine::Saw;

/// Engine lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Right before the first dispatch turn of the root frame.
    Begin,
    /// The root frame drained. Fires at most once.
    End,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Begin => write!(f, "begin"),
            Lifecycle::End => write!(f, "end"),
        }
    }
}

/// Lifecycle listener.
pub type Listener = Rc<dyn Fn(&Saw) -> Result<()>>;

// =============================================================================
// Listener Registry
// =============================================================================

/// Listeners in registration order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Vec<(Lifecycle, Listener)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn register(&mut self, event: Lifecycle, listener: Listener) {
        self.listeners.push((event, listener));
    }

    /// Listeners for `event`, cloned so none are borrowed while they run.
    pub fn listeners_for(&self, event: Lifecycle) -> Vec<Listener> {
        self.listeners
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, l)| l.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listener_count", &self.len())
            .finish()
    }
}

impl Saw {
    /// Subscribe to a lifecycle event.
    pub fn on<F>(&self, event: Lifecycle, listener: F) -> &Self
    where
        F: Fn(&Saw) -> Result<()> + 'static,
    {
        self.inner
            .listeners
            .borrow_mut()
            .register(event, Rc::new(listener));
        self
    }

    /// Run every listener for `event` in registration order.
    pub(crate) fn emit(&self, event: Lifecycle) {
        let listeners = self.inner.listeners.borrow().listeners_for(event);
        for (index, listener) in listeners.iter().enumerate() {
            if let Err(e) = listener(self) {
                warn!(%event, listener = index, error = %e, "listener failed");
            }
        }
    }
}
