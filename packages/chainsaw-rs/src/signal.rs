//! Signal routing: `trap` and `down`.
//!
//! A signal is a name plus an optional payload. `down(name)` resolves it in
//! this order:
//!
//! 1. a trap registered under `name` (active frame, or enclosing frames too
//!    with [`TrapScope::Enclosing`]);
//! 2. the first downstream call named `name` in the active frame, skipping
//!    everything in between;
//! 3. nothing, which fails the chain with `UnresolvedSignal`.
//!
//! A trap runs with a handle scoped to the frame that registered it, so its
//! `next()` finishes that frame's call even when the signal came from a
//! frame nested below it.
//!
//! # Example
//!
//! ```ignore
//! harness.define("raise", |saw, _, args| saw.down_with("catch", args.clone()));
//! harness.define("catch", |saw, _, args| {
//!     let err = args.get::<String>(0)?;
//!     tracing::warn!(%err, "caught");
//!     saw.next()
//! });
//! ```

use std::rc::Rc;

use anyhow::Result;
use tracing::debug;

use crate::call::{Args, IntoArgs};
use crate::config::TrapScope;
use crate::engine::Saw;
use crate::error::ChainsawError;
use crate::frame::{Frame, FrameId};

/// Handler invoked when a trapped signal arrives, with the signal payload.
pub type TrapHandler = Rc<dyn Fn(&Saw, &Args) -> Result<()>>;

/// Where a signal goes.
pub(crate) enum Resolution {
    Trap { frame: FrameId, handler: TrapHandler },
    Label { index: usize, skipped: usize },
    Unresolved,
}

/// Resolve `name` against `frames` (root first, the signalling frame last).
pub(crate) fn resolve(frames: &[Frame], name: &str, scope: TrapScope) -> Resolution {
    let searched = match scope {
        TrapScope::Frame => 1,
        TrapScope::Enclosing => frames.len(),
    };
    for frame in frames.iter().rev().take(searched) {
        if let Some(handler) = frame.traps.get(name) {
            return Resolution::Trap {
                frame: frame.id,
                handler: handler.clone(),
            };
        }
    }

    let Some(top) = frames.last() else {
        return Resolution::Unresolved;
    };
    // The in-flight call never matches itself.
    let start = if top.is_waiting() {
        top.cursor + 1
    } else {
        top.cursor
    };
    top.queue
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, call)| call.name() == name)
        .map(|(index, _)| Resolution::Label {
            index,
            skipped: index - start,
        })
        .unwrap_or(Resolution::Unresolved)
}

impl Saw {
    /// Register `handler` for signal `name` on the steered frame.
    ///
    /// Re-registering a name on the same frame replaces the old handler. The
    /// trap disappears with its frame.
    pub fn trap<F>(&self, name: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(&Saw, &Args) -> Result<()> + 'static,
    {
        let name = name.into();
        let mut stack = self.inner.stack.borrow_mut();
        let frame = match self.scope {
            Some(id) => stack.frame_mut(id)?,
            None => stack.top_mut()?,
        };
        let replaced = frame.traps.insert(name.clone(), Rc::new(handler)).is_some();
        debug!(frame = %frame.id, signal = %name, replaced, "trap registered");
        Ok(())
    }

    /// Raise signal `name` with no payload.
    pub fn down(&self, name: &str) -> Result<()> {
        self.down_with(name, Args::new())
    }

    /// Raise signal `name` carrying `payload`.
    ///
    /// A trap receives the payload directly. A downstream call receives its
    /// queued arguments followed by the payload.
    pub fn down_with(&self, name: &str, payload: impl IntoArgs) -> Result<()> {
        let payload = payload.into_args();
        let resolution = {
            let mut stack = self.inner.stack.borrow_mut();
            self.steered(&mut stack)?;
            let frames = match self.scope {
                Some(id) => stack.frames_to(id)?,
                None => stack.frames(),
            };
            resolve(frames, name, self.inner.config.trap_scope)
        };

        match resolution {
            Resolution::Trap { frame, handler } => {
                debug!(signal = name, %frame, "signal trapped");
                let result = handler(&self.scoped(frame), &payload);
                self.escalate(result)
            }
            Resolution::Label { index, skipped } => {
                debug!(signal = name, cursor = index, skipped, "signal resolved downstream");
                {
                    let mut stack = self.inner.stack.borrow_mut();
                    self.unwind_steered(&mut stack)?
                        .reposition(index, Some(payload));
                }
                self.pump()
            }
            Resolution::Unresolved => {
                let err = anyhow::Error::from(ChainsawError::UnresolvedSignal {
                    name: name.to_string(),
                });
                self.fail(&err);
                Err(err)
            }
        }
    }
}
