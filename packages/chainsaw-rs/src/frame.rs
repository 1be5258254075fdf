//! Frames and the frame stack.
//!
//! The frame stack is the engine's only mutable structure. The top frame is the
//! active one; everything below it is waiting on a nested chain. All state
//! transitions of the dispatcher live here so they can be reasoned about (and
//! tested) without running any handlers:
//!
//! ```text
//! Pending ─► Active ─► Suspended ─► Active ─► ... ─► Drained (popped)
//!               │          │
//!               │          └─► Nested ─► Active   (child drained, auto)
//!               │                   └──► Suspended (child drained, manual)
//!               └─► Drained when cursor == queue length
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::call::{Args, QueuedCall};
use crate::error::ChainsawError;
use crate::signal::TrapHandler;

/// Opaque state shared by reference between a parent and its nested frames.
pub type Locals = Rc<dyn Any>;

/// Identifier of a frame within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FrameId(u64);

impl FrameId {
    /// The root frame of every engine.
    pub const ROOT: FrameId = FrameId(0);

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameState {
    /// Root frame before the first dispatch turn.
    Pending,
    /// Ready to dispatch the call at the cursor.
    Active,
    /// The call at the cursor is in flight and owes a `next()`.
    Suspended,
    /// Waiting on a child frame.
    Nested,
    /// Cursor reached the end of the queue.
    Drained,
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FrameState::Pending => "pending",
            FrameState::Active => "active",
            FrameState::Suspended => "suspended",
            FrameState::Nested => "nested",
            FrameState::Drained => "drained",
        };
        f.write_str(s)
    }
}

/// What happens to the parent when a nested frame drains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Advance {
    /// The parent's cursor moves past the nesting call (implicit `next()`).
    #[default]
    Auto,
    /// The parent is left suspended until something calls its continuation.
    Manual,
}

/// One nesting level: a call queue, a cursor, locals and a trap table.
pub(crate) struct Frame {
    pub(crate) id: FrameId,
    pub(crate) queue: Vec<QueuedCall>,
    pub(crate) cursor: usize,
    pub(crate) state: FrameState,
    /// Bumped on every dispatch so continuations can tell turns apart.
    pub(crate) turn: u64,
    pub(crate) locals: Option<Locals>,
    pub(crate) traps: HashMap<String, TrapHandler>,
    pub(crate) advance: Advance,
    /// Signal payload appended to the args of the next dispatched call.
    pub(crate) payload: Option<Args>,
}

impl Frame {
    fn new(id: FrameId, state: FrameState, locals: Option<Locals>, advance: Advance) -> Self {
        Self {
            id,
            queue: Vec::new(),
            cursor: 0,
            state,
            turn: 0,
            locals,
            traps: HashMap::new(),
            advance,
            payload: None,
        }
    }

    fn begin_turn(&mut self) -> Dispatch {
        self.turn += 1;
        self.state = FrameState::Suspended;
        let call = &self.queue[self.cursor];
        let mut args = call.args().clone();
        if let Some(payload) = self.payload.take() {
            args.extend(payload);
        }
        Dispatch {
            frame: self.id,
            cursor: self.cursor,
            name: call.name().to_string(),
            path: call.path().to_vec(),
            args,
        }
    }

    /// Whether the call at the cursor is in flight, directly or through a
    /// nested frame.
    pub(crate) fn is_waiting(&self) -> bool {
        matches!(self.state, FrameState::Suspended | FrameState::Nested)
    }

    /// Move the cursor and make the frame dispatch from there.
    pub(crate) fn reposition(&mut self, cursor: usize, payload: Option<Args>) {
        self.cursor = cursor;
        self.state = FrameState::Active;
        self.payload = payload;
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("queue", &self.queue)
            .field("traps", &self.traps.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// A call taken off a frame, ready for its handler.
#[derive(Debug)]
pub(crate) struct Dispatch {
    pub(crate) frame: FrameId,
    pub(crate) cursor: usize,
    pub(crate) name: String,
    pub(crate) path: Vec<String>,
    pub(crate) args: Args,
}

/// Result of one dispatcher step.
#[derive(Debug)]
pub(crate) enum Step {
    /// Run the handler for this call.
    Dispatch(Dispatch),
    /// A nested frame drained and was popped.
    Popped {
        frame: FrameId,
        parent: FrameId,
        advance: Advance,
    },
    /// The root frame drained; the stack is empty.
    Finished,
    /// Nothing runnable: the top frame is waiting on an external event.
    Idle,
}

/// Ordered stack of frames; the top is active.
#[derive(Debug)]
pub(crate) struct FrameStack {
    frames: Vec<Frame>,
    next_id: u64,
}

impl FrameStack {
    /// A stack holding only the pending root frame.
    pub(crate) fn new() -> Self {
        Self {
            frames: vec![Frame::new(
                FrameId::ROOT,
                FrameState::Pending,
                None,
                Advance::Auto,
            )],
            next_id: 1,
        }
    }

    pub(crate) fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| f.id == id)
    }

    fn position(&self, id: FrameId) -> Option<usize> {
        self.frames.iter().rposition(|f| f.id == id)
    }

    /// Frame `id` in any state, or `FrameClosed` once it was popped.
    pub(crate) fn frame_mut(&mut self, id: FrameId) -> Result<&mut Frame, ChainsawError> {
        self.frames
            .iter_mut()
            .rev()
            .find(|f| f.id == id)
            .ok_or(ChainsawError::FrameClosed { frame: id })
    }

    /// Frames from the root up to and including `id`.
    pub(crate) fn frames_to(&self, id: FrameId) -> Result<&[Frame], ChainsawError> {
        let pos = self
            .position(id)
            .ok_or(ChainsawError::FrameClosed { frame: id })?;
        Ok(&self.frames[..=pos])
    }

    /// Fails with `OutOfTurn` unless `id` is the top frame.
    pub(crate) fn expect_top(&self, id: FrameId) -> Result<(), ChainsawError> {
        match self.frames.last() {
            Some(top) if top.id == id => Ok(()),
            _ => match self.get(id) {
                Some(frame) => Err(ChainsawError::OutOfTurn {
                    frame: id,
                    state: frame.state,
                }),
                None => Err(ChainsawError::FrameClosed { frame: id }),
            },
        }
    }

    /// Pop every frame above `id`. Returns how many were dropped.
    pub(crate) fn unwind_to(&mut self, id: FrameId) -> Result<usize, ChainsawError> {
        let pos = self
            .position(id)
            .ok_or(ChainsawError::FrameClosed { frame: id })?;
        let abandoned = self.frames.len() - pos - 1;
        self.frames.truncate(pos + 1);
        Ok(abandoned)
    }

    /// Top frame in any state; only `NotRunning` once the stack is empty.
    pub(crate) fn top_mut(&mut self) -> Result<&mut Frame, ChainsawError> {
        self.frames.last_mut().ok_or(ChainsawError::NotRunning)
    }

    /// Drop every frame. Used when the chain fails.
    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }

    /// Active frame for cursor and signal control.
    ///
    /// Errors with `NotRunning` once the root drained and `NotStarted` before
    /// the first turn.
    pub(crate) fn active_mut(&mut self) -> Result<&mut Frame, ChainsawError> {
        let top = self.frames.last_mut().ok_or(ChainsawError::NotRunning)?;
        if top.state == FrameState::Pending {
            return Err(ChainsawError::NotStarted);
        }
        Ok(top)
    }

    /// Active frame, which must have a call in flight.
    pub(crate) fn suspended_mut(&mut self) -> Result<&mut Frame, ChainsawError> {
        let top = self.frames.last_mut().ok_or(ChainsawError::NotRunning)?;
        if top.state != FrameState::Suspended {
            return Err(ChainsawError::OutOfTurn {
                frame: top.id,
                state: top.state,
            });
        }
        Ok(top)
    }

    /// Start the root frame. Returns false if it was already started.
    pub(crate) fn begin(&mut self) -> bool {
        match self.frames.first_mut() {
            Some(root) if root.state == FrameState::Pending => {
                root.state = FrameState::Active;
                true
            }
            _ => false,
        }
    }

    /// Append a call to the queue of frame `id`.
    pub(crate) fn enqueue(&mut self, id: FrameId, call: QueuedCall) -> Result<(), ChainsawError> {
        let frame = self
            .frames
            .iter_mut()
            .rev()
            .find(|f| f.id == id)
            .ok_or(ChainsawError::FrameClosed { frame: id })?;
        frame.queue.push(call);
        Ok(())
    }

    /// `next()`: move the suspended top frame past its in-flight call.
    pub(crate) fn advance(&mut self) -> Result<FrameId, ChainsawError> {
        let top = self.suspended_mut()?;
        let cursor = top.cursor + 1;
        top.reposition(cursor, None);
        Ok(top.id)
    }

    /// Push a child of the suspended top frame, which becomes `Nested`.
    pub(crate) fn push_child(
        &mut self,
        locals: Option<Locals>,
        advance: Advance,
    ) -> Result<FrameId, ChainsawError> {
        let parent = self.suspended_mut()?;
        parent.state = FrameState::Nested;

        let id = FrameId(self.next_id);
        self.next_id += 1;
        self.frames
            .push(Frame::new(id, FrameState::Active, locals, advance));
        Ok(id)
    }

    /// `next()` for frame `id`: move it past its in-flight call, abandoning
    /// any frames nested above it. Returns the number abandoned.
    pub(crate) fn advance_frame(&mut self, id: FrameId) -> Result<usize, ChainsawError> {
        let frame = self.frame_mut(id)?;
        if !frame.is_waiting() {
            return Err(ChainsawError::OutOfTurn {
                frame: id,
                state: frame.state,
            });
        }
        let abandoned = self.unwind_to(id)?;
        let frame = self.frame_mut(id)?;
        let cursor = frame.cursor + 1;
        frame.reposition(cursor, None);
        Ok(abandoned)
    }

    /// Current `(frame, turn)` of the suspended top frame.
    pub(crate) fn current_turn(&mut self) -> Result<(FrameId, u64), ChainsawError> {
        let top = self.suspended_mut()?;
        Ok((top.id, top.turn))
    }

    /// Current turn of frame `id`, which must have a call in flight.
    pub(crate) fn turn_of(&self, id: FrameId) -> Result<(FrameId, u64), ChainsawError> {
        let frame = self.get(id).ok_or(ChainsawError::FrameClosed { frame: id })?;
        if !frame.is_waiting() {
            return Err(ChainsawError::OutOfTurn {
                frame: id,
                state: frame.state,
            });
        }
        Ok((id, frame.turn))
    }

    /// Advance frame `id` if it is still on `turn`, abandoning frames above it.
    ///
    /// Returns the number of abandoned frames.
    pub(crate) fn resume(&mut self, id: FrameId, turn: u64) -> Result<usize, ChainsawError> {
        let current = self
            .get(id)
            .is_some_and(|f| f.turn == turn && f.is_waiting());
        if !current {
            return Err(ChainsawError::StaleResume { frame: id });
        }
        self.advance_frame(id)
    }

    /// Take one dispatcher step.
    pub(crate) fn step(&mut self) -> Step {
        let Some(top) = self.frames.last_mut() else {
            return Step::Idle;
        };
        if top.state != FrameState::Active {
            return Step::Idle;
        }
        if top.cursor < top.queue.len() {
            return Step::Dispatch(top.begin_turn());
        }

        let Some(mut done) = self.frames.pop() else {
            return Step::Idle;
        };
        done.state = FrameState::Drained;

        match self.frames.last_mut() {
            None => Step::Finished,
            Some(parent) => {
                match done.advance {
                    Advance::Auto => {
                        let cursor = parent.cursor + 1;
                        parent.reposition(cursor, None);
                    }
                    Advance::Manual => parent.state = FrameState::Suspended,
                }
                Step::Popped {
                    frame: done.id,
                    parent: parent.id,
                    advance: done.advance,
                }
            }
        }
    }
}
