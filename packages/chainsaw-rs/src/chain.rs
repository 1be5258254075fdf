//! The fluent handle.
//!
//! A `Chain` is a view bound to one frame. Calling an operation appends a
//! queued call to that frame and hands back a chain for the next link:
//!
//! ```ignore
//! chain
//!     .call("x", (1_i64,))
//!     .call("y", (0_i64,))
//!     .at("h").call("x", ())
//!     .at("h").call("y", ());
//! ```
//!
//! `call` panics on an unknown operation, like `with_effect` panics on a
//! duplicate registration; `try_call` is the non-panicking version.

use std::fmt;
use std::rc::Rc;

use anyhow::Result;
use tracing::trace;

use crate::call::{IntoArgs, QueuedCall};
use crate::engine::Saw;
use crate::error::ChainsawError;
use crate::frame::FrameId;
use crate::harness::Entry;

/// Fluent handle bound to one frame (and optionally a harness group).
#[derive(Clone)]
pub struct Chain {
    saw: Saw,
    frame: FrameId,
    prefix: Vec<String>,
}

impl Chain {
    pub(crate) fn new(saw: Saw, frame: FrameId) -> Self {
        Self {
            saw,
            frame,
            prefix: Vec::new(),
        }
    }

    /// The engine this chain belongs to.
    pub fn saw(&self) -> &Saw {
        &self.saw
    }

    /// The frame this chain enqueues onto.
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Group path of this sub-chain (empty for a frame's top-level chain).
    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    /// Enqueue `name` with `args` and return the frame's chain.
    ///
    /// # Panics
    ///
    /// Panics if the operation is unknown at this chain's prefix or the frame
    /// has already drained. Use [`Chain::try_call`] to handle those cases.
    pub fn call(&self, name: &str, args: impl IntoArgs) -> Chain {
        self.try_call(name, args).unwrap_or_else(|e| {
            panic!("{}", e);
        })
    }

    /// Enqueue `name` with `args`, returning an error instead of panicking.
    pub fn try_call(&self, name: &str, args: impl IntoArgs) -> Result<Chain> {
        let path = self.path_to(name);
        match self.saw.harness()?.lookup(path.iter().map(String::as_str)) {
            Some(Entry::Operation(_)) => {}
            _ => {
                return Err(ChainsawError::UnknownOperation {
                    name: path.join("."),
                }
                .into())
            }
        }

        let call = QueuedCall::from_path(path, args.into_args());
        trace!(frame = %self.frame, op = %call.name(), "enqueue");
        self.saw
            .inner
            .stack
            .borrow_mut()
            .enqueue(self.frame, call)?;

        Ok(Chain::new(self.saw.clone(), self.frame))
    }

    /// Sub-chain for the operation group `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a group at this prefix.
    pub fn at(&self, name: &str) -> Chain {
        self.try_at(name).unwrap_or_else(|e| {
            panic!("{}", e);
        })
    }

    /// Sub-chain for the operation group `name`, or `NotAGroup`.
    pub fn try_at(&self, name: &str) -> Result<Chain> {
        let path = self.path_to(name);
        self.saw.harness()?.group_at(&path)?;
        Ok(Self {
            saw: self.saw.clone(),
            frame: self.frame,
            prefix: path,
        })
    }

    /// Whether `name` exists (operation or group) at this prefix.
    pub fn has(&self, name: &str) -> bool {
        let path = self.path_to(name);
        match self.saw.harness() {
            Ok(harness) => harness.lookup(path.iter().map(String::as_str)).is_some(),
            Err(_) => false,
        }
    }

    /// Names available at this prefix, sorted.
    pub fn operations(&self) -> Vec<String> {
        self.saw
            .harness()
            .ok()
            .and_then(|h| h.group_at(&self.prefix).ok())
            .map(|g| g.names().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Locals of the bound frame, if it has locals of type `T`.
    pub fn locals<T: 'static>(&self) -> Option<Rc<T>> {
        let stack = self.saw.inner.stack.borrow();
        let locals = stack.get(self.frame)?.locals.clone()?;
        locals.downcast::<T>().ok()
    }

    /// Wait for the whole engine to finish. See [`Saw::finished`].
    pub async fn finished(&self) -> Result<()> {
        self.saw.finished().await
    }

    fn path_to(&self, name: &str) -> Vec<String> {
        let mut path = self.prefix.clone();
        path.push(name.to_string());
        path
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("frame", &self.frame)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
