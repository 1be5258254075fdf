//! Structured error type for chainsaw.
//!
//! `ChainsawError` provides pattern-matchable errors instead of generic
//! `anyhow::Error`. Public engine methods return `anyhow::Result` because user
//! handlers run inside them and report failures through `anyhow`; engine
//! failures travel inside that error and can be recovered with `downcast_ref`.
//!
//! # Error Example
//!
//! ```ignore
//! use chainsaw::ChainsawError;
//!
//! match saw.down("catch") {
//!     Ok(()) => {}
//!     Err(e) => match e.downcast_ref::<ChainsawError>() {
//!         Some(ChainsawError::UnresolvedSignal { name }) => {
//!             eprintln!("nothing handles {}", name);
//!         }
//!         _ => return Err(e),
//!     },
//! }
//! ```

use thiserror::Error;

use crate::frame::{FrameId, FrameState};

/// Structured error type for chainsaw operations.
///
/// Each variant includes context about what went wrong.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainsawError {
    /// `down(name)` found neither a trap nor a downstream call named `name`.
    ///
    /// This is fatal: the chain is marked failed and the error is returned.
    #[error("unresolved signal {name}: no trap and no downstream operation with that name")]
    UnresolvedSignal {
        /// The signal name.
        name: String,
    },

    /// `next()` was called while the active frame had no call in flight.
    #[error("out-of-turn next() on frame {frame} while it is {state}")]
    OutOfTurn {
        /// The active frame.
        frame: FrameId,
        /// Its state at the time of the call.
        state: FrameState,
    },

    /// A continuation was used after the turn it was captured on ended.
    #[error("stale continuation for frame {frame}")]
    StaleResume {
        /// The frame the continuation was bound to.
        frame: FrameId,
    },

    /// A primitive was used before the first dispatch turn.
    #[error("chain has not started dispatching yet")]
    NotStarted,

    /// A primitive was used after the root frame drained.
    #[error("chain is no longer running")]
    NotRunning,

    /// No harness entry exists at the given path.
    #[error("unknown operation {name}")]
    UnknownOperation {
        /// Dotted operation path.
        name: String,
    },

    /// The path names an operation, not a group, so it has no sub-chain.
    #[error("{name} is not an operation group")]
    NotAGroup {
        /// Dotted path.
        name: String,
    },

    /// The frame a chain is bound to has already been popped.
    #[error("frame {frame} is closed")]
    FrameClosed {
        /// The closed frame.
        frame: FrameId,
    },

    /// A handler asked for an argument past the end of the list.
    #[error("missing argument {index} (call has {len})")]
    MissingArgument {
        /// Requested index.
        index: usize,
        /// Number of arguments present.
        len: usize,
    },

    /// A handler asked for an argument with the wrong type.
    #[error("argument {index} is {found}, expected {expected}")]
    ArgumentType {
        /// Requested index.
        index: usize,
        /// Requested type name.
        expected: &'static str,
        /// Stored type name.
        found: &'static str,
    },

    /// `skip` moved the cursor before the start of the queue.
    #[error("cursor underflow: {cursor} {delta:+} is before the first call")]
    CursorUnderflow {
        /// Cursor before the skip.
        cursor: usize,
        /// Requested delta.
        delta: isize,
    },

    /// A configuration value could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidConfig {
        /// Setting name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// A dispatch turn failed; reported by `finished()`.
    #[error("chain failed: {message}")]
    Failed {
        /// Rendered error chain of the original failure.
        message: String,
    },
}
