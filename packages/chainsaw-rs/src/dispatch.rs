//! Dispatcher: the pump that drives queued calls through their handlers.
//!
//! The dispatcher is responsible for:
//! 1. Taking one step at a time off the frame stack
//! 2. Running the handler for each dispatched call
//! 3. Turning handler failures (and panics) into the chain's failure outcome
//!
//! Dispatch is trampolined. Exactly one `pump` loop runs at a time; a
//! primitive called while it runs (`next`, `nest`, `down`, `jump`) only
//! changes frame state and returns, and the loop picks the change up on its
//! next step. A queue of any length therefore runs in constant stack depth.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, error, info, trace};

use crate::call::IntoArgs;
use crate::chain::Chain;
use crate::engine::{Outcome, Saw};
use crate::error::ChainsawError;
use crate::events::Lifecycle;
use crate::frame::{Advance, FrameId, Locals, Step};

// =============================================================================
// Drive Guard
// =============================================================================

/// RAII guard for the "pump is running" flag.
///
/// Set on creation, cleared on drop, so a panicking handler cannot leave the
/// engine believing it is still being driven.
struct DriveGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> DriveGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for DriveGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

// =============================================================================
// Nest Options
// =============================================================================

/// How a nested frame is set up.
#[derive(Clone, Default)]
pub struct NestOptions {
    pub locals: Option<Locals>,
    pub advance: Advance,
}

impl NestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a frame whose parent must be advanced explicitly.
    pub fn manual() -> Self {
        Self::default().with_advance(Advance::Manual)
    }

    pub fn with_locals<T: 'static>(mut self, locals: Rc<T>) -> Self {
        self.locals = Some(locals);
        self
    }

    pub fn with_advance(mut self, advance: Advance) -> Self {
        self.advance = advance;
        self
    }
}

impl std::fmt::Debug for NestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestOptions")
            .field("locals", &self.locals.is_some())
            .field("advance", &self.advance)
            .finish()
    }
}

// =============================================================================
// Continuations
// =============================================================================

/// One-shot continuation for a single dispatch turn of one frame.
///
/// Obtained from [`Saw::resume`] inside a handler. Calling [`Resume::next`]
/// advances that frame exactly once, even if frames nested under it have not
/// drained (they are abandoned). Once the frame has moved on, the handle is
/// stale.
#[must_use = "a continuation does nothing until `next` is called"]
pub struct Resume {
    saw: Saw,
    frame: FrameId,
    turn: u64,
}

impl Resume {
    /// The frame this continuation advances.
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Advance the captured frame and continue dispatching.
    pub fn next(self) -> Result<()> {
        let abandoned = self
            .saw
            .inner
            .stack
            .borrow_mut()
            .resume(self.frame, self.turn)?;
        if abandoned > 0 {
            debug!(frame = %self.frame, abandoned, "resumed past nested frames");
        }
        self.saw.pump()
    }
}

impl std::fmt::Debug for Resume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resume")
            .field("frame", &self.frame)
            .field("turn", &self.turn)
            .finish()
    }
}

// =============================================================================
// Dispatch primitives
// =============================================================================

impl Saw {
    /// Finish the in-flight call of the steered frame and dispatch the next
    /// one.
    ///
    /// Fails with `OutOfTurn` if the frame has no call in flight (for example
    /// a second `next()` for the same call). The state is left as is.
    pub fn next(&self) -> Result<()> {
        {
            let mut stack = self.inner.stack.borrow_mut();
            match self.scope {
                Some(frame) => {
                    let abandoned = stack.advance_frame(frame)?;
                    trace!(%frame, abandoned, "next");
                }
                None => {
                    let frame = stack.advance()?;
                    trace!(%frame, "next");
                }
            }
        }
        self.pump()
    }

    /// Run `body` against a fresh nested frame; the parent advances once the
    /// nested frame drains.
    pub fn nest<F>(&self, body: F) -> Result<()>
    where
        F: FnOnce(&Chain) -> Result<()>,
    {
        self.nest_with_options(NestOptions::default(), body)
    }

    /// Like [`Saw::nest`], sharing `locals` with the nested frame.
    pub fn nest_with<T, F>(&self, locals: Rc<T>, body: F) -> Result<()>
    where
        T: 'static,
        F: FnOnce(&Chain, Rc<T>) -> Result<()>,
    {
        let options = NestOptions::default().with_locals(locals.clone());
        self.nest_with_options(options, move |chain| body(chain, locals))
    }

    /// Push a nested frame configured by `options` and run `body` against it.
    ///
    /// The body runs synchronously and only enqueues; dispatch of the nested
    /// frame starts after it returns.
    pub fn nest_with_options<F>(&self, options: NestOptions, body: F) -> Result<()>
    where
        F: FnOnce(&Chain) -> Result<()>,
    {
        let advance = options.advance;
        let child = {
            let mut stack = self.inner.stack.borrow_mut();
            if let Some(frame) = self.scope {
                stack.expect_top(frame)?;
            }
            stack.push_child(options.locals, advance)?
        };
        debug!(frame = %child, ?advance, "nest");

        let chain = Chain::new(self.unscoped(), child);
        self.escalate(body(&chain))?;
        self.pump()
    }

    /// Continuation for the in-flight call of the steered frame.
    pub fn resume(&self) -> Result<Resume> {
        let (frame, turn) = {
            let mut stack = self.inner.stack.borrow_mut();
            match self.scope {
                Some(frame) => stack.turn_of(frame)?,
                None => stack.current_turn()?,
            }
        };
        Ok(Resume {
            saw: self.unscoped(),
            frame,
            turn,
        })
    }

    /// Call the top-level harness operation `name` directly, without
    /// queueing it.
    ///
    /// The handler runs with this handle and the steered frame's chain, as if
    /// it were part of the call currently in flight there.
    pub fn invoke(&self, name: &str, args: impl IntoArgs) -> Result<()> {
        let handler = self.harness()?.handler(&[name.to_string()])?;
        let chain = self.chain().ok_or(ChainsawError::NotRunning)?;
        trace!(op = name, frame = %chain.frame(), "invoke");
        let result = handler(self, &chain, &args.into_args());
        self.escalate(result)
    }

    // -------------------------------------------------------------------------
    // Pump
    // -------------------------------------------------------------------------

    /// Start the root frame. Called once from the scheduled start task.
    pub(crate) fn start(&self) -> Result<()> {
        if !self.inner.stack.borrow_mut().begin() {
            return Ok(());
        }
        info!(
            operations = self.harness().map(|h| h.len()).unwrap_or(0),
            "starting chain"
        );
        self.emit(Lifecycle::Begin);
        self.pump()
    }

    /// Drive dispatch until nothing is runnable, unless a pump is already
    /// running further up the stack.
    pub(crate) fn pump(&self) -> Result<()> {
        if self.inner.driving.get() {
            return Ok(());
        }
        let _guard = DriveGuard::enter(&self.inner.driving);
        if let Err(e) = self.drive() {
            self.fail(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Record `result`'s error as the chain's failure unless a pump is
    /// running, in which case it will record it when the error reaches it.
    pub(crate) fn escalate(&self, result: Result<()>) -> Result<()> {
        if let Err(e) = &result {
            if !self.inner.driving.get() {
                self.fail(e);
            }
        }
        result
    }

    fn drive(&self) -> Result<()> {
        // Handlers always follow the active frame, whichever handle pumps.
        let engine = self.unscoped();
        loop {
            let step = engine.inner.stack.borrow_mut().step();
            match step {
                Step::Dispatch(dispatch) => {
                    let handler = engine.harness()?.handler(&dispatch.path)?;
                    let chain = Chain::new(engine.clone(), dispatch.frame);
                    trace!(
                        frame = %dispatch.frame,
                        cursor = dispatch.cursor,
                        op = %dispatch.name,
                        "dispatch"
                    );
                    run_handler(&dispatch.name, || handler(&engine, &chain, &dispatch.args))
                        .with_context(|| format!("operation {} failed", dispatch.name))?;
                }
                Step::Popped {
                    frame,
                    parent,
                    advance,
                } => {
                    debug!(%frame, %parent, ?advance, "nested frame drained");
                }
                Step::Finished => {
                    engine.inner.outcome.send_replace(Outcome::Ended);
                    info!("chain finished");
                    engine.emit(Lifecycle::End);
                }
                Step::Idle => return Ok(()),
            }
        }
    }
}

/// Run a handler, converting a panic into an error.
fn run_handler<F>(name: &str, handler: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    // AssertUnwindSafe: frame state is only touched through RefCell borrows
    // that are released before any handler runs.
    match catch_unwind(AssertUnwindSafe(handler)) {
        Ok(result) => result,
        Err(panic_info) => {
            let panic_msg = extract_panic_message(&panic_info);
            error!(op = name, panic = %panic_msg, "operation panicked");
            Err(anyhow!("operation panicked: {}", panic_msg))
        }
    }
}

fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
