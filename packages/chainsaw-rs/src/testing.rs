//! Testing utilities for chains.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! chainsaw = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ## Recording what handlers saw
//!
//! ```ignore
//! use chainsaw::testing::Recorder;
//!
//! let seen = Recorder::new();
//! let chain = chainsaw({
//!     let seen = seen.clone();
//!     move |_, harness| {
//!         harness.define("x", move |saw, _, args| {
//!             seen.push(*args.get::<i64>(0)?);
//!             saw.next()
//!         });
//!         Ok(())
//!     }
//! })?;
//!
//! chain.call("x", (1_i64,)).call("x", (2_i64,));
//! chain.finished().await?;
//! assert_eq!(seen.snapshot(), vec![1, 2]);
//! ```
//!
//! ## Waiting for a number of signals
//!
//! ```ignore
//! use chainsaw::testing::Latch;
//!
//! let latch = Latch::new(2);
//! saw.trap("result", {
//!     let latch = latch.clone();
//!     move |_, _| {
//!         latch.dec();
//!         Ok(())
//!     }
//! })?;
//!
//! latch.await_zero().await;
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tokio::sync::Notify;

// =============================================================================
// Recorder
// =============================================================================

/// Shared, append-only log for handlers to write into.
///
/// Clones share the same log.
pub struct Recorder<T> {
    items: Rc<RefCell<Vec<T>>>,
}

impl<T> Recorder<T> {
    pub fn new() -> Self {
        Self {
            items: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn push(&self, item: T) {
        self.items.borrow_mut().push(item);
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.borrow_mut())
    }
}

impl<T: Clone> Recorder<T> {
    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.borrow().clone()
    }
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Recorder").field(&self.items.borrow()).finish()
    }
}

// =============================================================================
// Latch
// =============================================================================

/// Count-down latch for single-threaded tests.
///
/// Tests should wait for meaning, not time. For tests that might hang, wrap
/// `await_zero` in `tokio::time::timeout`.
///
/// Clones share the same count.
#[derive(Clone)]
pub struct Latch {
    inner: Rc<LatchInner>,
}

struct LatchInner {
    remaining: Cell<usize>,
    notify: Notify,
}

impl Latch {
    /// Create a new latch expecting `expected` decrements.
    pub fn new(expected: usize) -> Self {
        Self {
            inner: Rc::new(LatchInner {
                remaining: Cell::new(expected),
                notify: Notify::new(),
            }),
        }
    }

    /// Decrement the remaining count, waking waiters when it reaches zero.
    ///
    /// # Panics
    ///
    /// Panics if called more times than expected.
    pub fn dec(&self) {
        let prev = self.inner.remaining.get();
        if prev == 0 {
            panic!("Latch decremented below zero - more signals than expected");
        }
        self.inner.remaining.set(prev - 1);
        if prev == 1 {
            self.inner.notify.notify_waiters();
        }
    }

    /// Wait for the count to reach zero. Returns at once if it already has.
    pub async fn await_zero(&self) {
        loop {
            // Register for notification before checking the count.
            let notified = self.inner.notify.notified();

            if self.inner.remaining.get() == 0 {
                return;
            }

            notified.await;
        }
    }

    pub fn remaining(&self) -> usize {
        self.inner.remaining.get()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}

impl fmt::Debug for Latch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Latch")
            .field("remaining", &self.remaining())
            .finish()
    }
}
