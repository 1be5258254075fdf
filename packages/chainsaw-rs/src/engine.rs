//! Chainsaw engine - construction and the shared engine handle.
//!
//! A builder callback declares the operations; the engine returns the root
//! chain synchronously and starts dispatching on the next turn of the local
//! task set:
//!
//! ```text
//! chain.call(..) ─► Frame queue ─► pump ─► handler ─► next / nest / down / jump
//!                        ▲                                     │
//!                        └─────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use chainsaw::{chainsaw, Lifecycle};
//!
//! let local = tokio::task::LocalSet::new();
//! local
//!     .run_until(async {
//!         let chain = chainsaw(|saw, harness| {
//!             harness.define("wait", |saw, _, args| {
//!                 let ms = *args.get::<u64>(0)?;
//!                 let resume = saw.resume()?;
//!                 tokio::task::spawn_local(async move {
//!                     tokio::time::sleep(Duration::from_millis(ms)).await;
//!                     let _ = resume.next();
//!                 });
//!                 Ok(())
//!             });
//!             saw.on(Lifecycle::End, |_| Ok(()));
//!             Ok(())
//!         })?;
//!
//!         chain.call("wait", (50_u64,)).call("wait", (10_u64,));
//!         chain.finished().await
//!     })
//!     .await?;
//! ```
//!
//! # Threading
//!
//! The engine is single-threaded: `Saw` and `Chain` are `!Send` and every
//! engine must be built inside a [`tokio::task::LocalSet`].

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::chain::Chain;
use crate::config::{ChainsawConfig, CursorUnderflow, TrapScope};
use crate::error::ChainsawError;
use crate::events::ListenerRegistry;
use crate::frame::{Frame, FrameId, FrameStack};
use crate::harness::{settle, Harness, IntoHarness};

// =============================================================================
// Outcome
// =============================================================================

/// Completion state published to `finished()` waiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Running,
    Ended,
    Failed(String),
}

// =============================================================================
// Saw
// =============================================================================

pub(crate) struct Inner {
    pub(crate) harness: OnceCell<Harness>,
    pub(crate) stack: RefCell<FrameStack>,
    pub(crate) listeners: RefCell<ListenerRegistry>,
    pub(crate) config: ChainsawConfig,
    /// Set while a pump loop is running.
    pub(crate) driving: Cell<bool>,
    pub(crate) outcome: watch::Sender<Outcome>,
}

/// Handle to one engine.
///
/// Cheap to clone. Handlers, traps and listeners receive it as an argument;
/// deferred work (timers, spawned tasks) keeps a clone or a [`Resume`].
///
/// Handlers get a handle that follows the active frame. A trap gets one
/// scoped to the frame that registered it: `next`, `jump`, `skip` and `down`
/// act on that frame and drop any frames nested above it, while `trap`,
/// `chain` and `locals` read and write it directly.
///
/// [`Resume`]: crate::Resume
#[derive(Clone)]
pub struct Saw {
    pub(crate) inner: Rc<Inner>,
    /// Frame this handle steers; `None` follows the active frame.
    pub(crate) scope: Option<FrameId>,
}

impl Saw {
    /// An engine with a pending root frame and no harness.
    pub(crate) fn new(config: ChainsawConfig) -> Self {
        let (outcome, _) = watch::channel(Outcome::Running);
        Self {
            inner: Rc::new(Inner {
                harness: OnceCell::new(),
                stack: RefCell::new(FrameStack::new()),
                listeners: RefCell::new(ListenerRegistry::new()),
                config,
                driving: Cell::new(false),
                outcome,
            }),
            scope: None,
        }
    }

    /// Handle steering frame `frame`.
    pub(crate) fn scoped(&self, frame: FrameId) -> Saw {
        Saw {
            inner: self.inner.clone(),
            scope: Some(frame),
        }
    }

    /// Handle following the active frame.
    pub(crate) fn unscoped(&self) -> Saw {
        Saw {
            inner: self.inner.clone(),
            scope: None,
        }
    }

    /// The frame this handle steers: its scope frame, or the active frame.
    pub(crate) fn steered<'a>(
        &self,
        stack: &'a mut FrameStack,
    ) -> Result<&'a mut Frame, ChainsawError> {
        match self.scope {
            Some(frame) => stack.frame_mut(frame),
            None => stack.active_mut(),
        }
    }

    /// Like [`Saw::steered`], first dropping every frame above the scope
    /// frame so that it becomes the active one.
    pub(crate) fn unwind_steered<'a>(
        &self,
        stack: &'a mut FrameStack,
    ) -> Result<&'a mut Frame, ChainsawError> {
        if let Some(frame) = self.scope {
            let abandoned = stack.unwind_to(frame)?;
            if abandoned > 0 {
                debug!(%frame, abandoned, "dropped frames nested above scope");
            }
        }
        stack.active_mut()
    }

    pub(crate) fn harness(&self) -> Result<&Harness, ChainsawError> {
        self.inner.harness.get().ok_or(ChainsawError::NotStarted)
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &ChainsawConfig {
        &self.inner.config
    }

    /// Chain bound to the frame this handle steers.
    ///
    /// `None` once that frame has been popped, which for the active frame
    /// means the chain has ended or failed.
    pub fn chain(&self) -> Option<Chain> {
        let frame = {
            let stack = self.inner.stack.borrow();
            match self.scope {
                Some(id) => stack.get(id)?.id,
                None => stack.top()?.id,
            }
        };
        Some(Chain::new(self.unscoped(), frame))
    }

    /// Locals of the steered frame, if it has locals of type `T`.
    pub fn locals<T: 'static>(&self) -> Option<Rc<T>> {
        let locals = {
            let stack = self.inner.stack.borrow();
            let frame = match self.scope {
                Some(id) => stack.get(id)?,
                None => stack.top()?,
            };
            frame.locals.clone()?
        };
        locals.downcast::<T>().ok()
    }

    /// Number of frames on the stack (0 once finished or failed).
    pub fn depth(&self) -> usize {
        self.inner.stack.borrow().depth()
    }

    /// Whether the root frame has drained.
    pub fn is_finished(&self) -> bool {
        *self.inner.outcome.borrow() == Outcome::Ended
    }

    /// Wait until the chain ends or fails.
    ///
    /// Resolves `Ok(())` once `end` fired and `Err(ChainsawError::Failed)` if
    /// a dispatch turn failed. A chain that stalls never resolves; wrap the
    /// call in `tokio::time::timeout` when that matters.
    pub async fn finished(&self) -> Result<()> {
        let mut rx = self.inner.outcome.subscribe();
        let outcome = rx
            .wait_for(|o| *o != Outcome::Running)
            .await
            .map(|o| o.clone())?;
        match outcome {
            Outcome::Failed(message) => Err(ChainsawError::Failed { message }.into()),
            _ => Ok(()),
        }
    }

    /// Record `err` as the chain's failure and drop every frame.
    ///
    /// Only the first failure is kept.
    pub(crate) fn fail(&self, err: &anyhow::Error) {
        let message = format!("{:#}", err);
        let recorded = self.inner.outcome.send_if_modified(|o| {
            if *o == Outcome::Running {
                *o = Outcome::Failed(message.clone());
                true
            } else {
                false
            }
        });
        if recorded {
            error!(error = %message, "chain failed");
            self.inner.stack.borrow_mut().clear();
        }
    }
}

impl fmt::Debug for Saw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Saw")
            .field("scope", &self.scope)
            .field("depth", &self.depth())
            .field("outcome", &*self.inner.outcome.borrow())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for configuring and constructing an engine.
#[derive(Debug, Clone, Default)]
pub struct SawBuilder {
    config: ChainsawConfig,
}

impl SawBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder using [`ChainsawConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Ok(Self::new().with_config(ChainsawConfig::from_env()?))
    }

    pub fn with_config(mut self, config: ChainsawConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_trap_scope(mut self, scope: TrapScope) -> Self {
        self.config = self.config.with_trap_scope(scope);
        self
    }

    pub fn with_cursor_underflow(mut self, policy: CursorUnderflow) -> Self {
        self.config = self.config.with_cursor_underflow(policy);
        self
    }

    /// Run `builder` once and return the root chain.
    ///
    /// `builder` receives the engine and an empty harness to fill in. If it
    /// returns a non-empty harness of its own, that one is used instead.
    /// Errors from `builder` are returned unchanged.
    ///
    /// # Panics
    ///
    /// Panics if called outside a [`tokio::task::LocalSet`], because the first
    /// dispatch turn is scheduled with `spawn_local`.
    pub fn build<B, R>(self, builder: B) -> Result<Chain>
    where
        B: FnOnce(&Saw, &mut Harness) -> Result<R>,
        R: IntoHarness,
    {
        let saw = Saw::new(self.config);
        let mut receiver = Harness::new();
        let returned = builder(&saw, &mut receiver)?.into_harness();
        let harness = settle(receiver, returned);
        debug!(operations = harness.len(), config = ?self.config, "harness ready");
        let _ = saw.inner.harness.set(harness);

        let start = saw.clone();
        tokio::task::spawn_local(async move {
            if let Err(e) = start.start() {
                debug!(error = %e, "first dispatch turn failed");
            }
        });

        Ok(Chain::new(saw, FrameId::ROOT))
    }
}

/// Build an engine with the default configuration and return its root chain.
///
/// See [`SawBuilder::build`].
pub fn chainsaw<B, R>(builder: B) -> Result<Chain>
where
    B: FnOnce(&Saw, &mut Harness) -> Result<R>,
    R: IntoHarness,
{
    SawBuilder::new().build(builder)
}
