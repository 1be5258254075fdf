//! # Chainsaw
//!
//! A fluent, deferred call chain engine. Calls made on a [`Chain`] are not run
//! right away: they are queued, and a dispatcher runs them one at a time,
//! each waiting for its handler to say it is done.
//!
//! ## Core Concepts
//!
//! - **Harness**: the operations a chain offers, declared once by a builder.
//! - **Chain**: the fluent handle. `chain.call("x", args)` queues a call.
//! - **Saw**: the engine handle handlers use to steer dispatch.
//!
//! Handlers control progress with a handful of primitives:
//!
//! | Primitive      | Effect                                                   |
//! |----------------|----------------------------------------------------------|
//! | `next()`       | finish the current call, dispatch the following one       |
//! | `nest(body)`   | run a nested chain, then continue                         |
//! | `down(name)`   | raise a signal: trap, or skip ahead to a call named so    |
//! | `trap(name,f)` | handle a signal on the current frame                      |
//! | `jump(i)`      | restart the current frame from queue index `i`            |
//! | `resume()`     | take a one-shot continuation for the current call         |
//!
//! ## Architecture
//!
//! ```text
//! chainsaw(builder) ─► root Chain (returned synchronously)
//!                          │
//!                          ▼ call()
//!                 ┌── Frame Stack ──┐
//!                 │ root  [a b c]   │ ◄── nest() pushes, drain pops
//!                 │ child [x y]     │
//!                 └────────┬────────┘
//!                          ▼ pump (next turn of the LocalSet)
//!                      handler(saw, chain, args)
//!                          │
//!                          └─► next / nest / down / jump
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One active frame** - only the top of the frame stack dispatches
//! 2. **One call in flight per frame** - a second `next()` is rejected
//! 3. **Deferred start** - nothing runs until the builder's caller yields
//! 4. **`end` fires once** - and never for a chain that stalls
//!
//! ## Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use chainsaw::{chainsaw, Lifecycle};
//!
//! let local = tokio::task::LocalSet::new();
//! local.run_until(async {
//!     let chain = chainsaw(|saw, harness| {
//!         harness.define("x", |saw, _, args| {
//!             println!("x({})", args.get::<i64>(0)?);
//!             saw.next()
//!         });
//!         harness.define("y", |saw, _, args| {
//!             if *args.get::<bool>(0)? {
//!                 saw.jump(0)
//!             } else {
//!                 saw.next()
//!             }
//!         });
//!         saw.on(Lifecycle::End, |_| Ok(()));
//!         Ok(())
//!     })?;
//!
//!     chain.call("x", (1_i64,)).call("y", (false,)).call("x", (2_i64,));
//!     chain.finished().await
//! }).await?;
//! ```
//!
//! ## Threading
//!
//! Engines are single-threaded (`Rc`/`RefCell`) and schedule their first
//! dispatch turn with `tokio::task::spawn_local`, so they must be built inside
//! a `tokio::task::LocalSet`. Separate engines share nothing.

// Core modules
mod call;
mod chain;
mod config;
mod dispatch;
mod engine;
mod error;
mod events;
mod frame;
mod harness;
mod jump;
mod signal;
mod snapshot;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;



// Re-export call types
pub use call::{Arg, Args, IntoArgs, QueuedCall};

// Re-export chain and harness types
pub use chain::Chain;
pub use harness::{Entry, Handler, Harness, IntoHarness};

// Re-export configuration
pub use config::{ChainsawConfig, CursorUnderflow, TrapScope};

// Re-export error types
pub use error::ChainsawError;

// Re-export frame types
pub use frame::{Advance, FrameId, FrameState, Locals};

// Re-export dispatch types
pub use dispatch::{NestOptions, Resume};

// Re-export signal and event types
pub use events::{Lifecycle, Listener};
pub use signal::TrapHandler;

// Re-export diagnostics
pub use snapshot::{FrameSnapshot, Snapshot};

// Re-export engine types (primary entry point)
pub use engine::{chainsaw, Saw, SawBuilder};
