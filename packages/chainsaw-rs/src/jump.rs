//! Cursor control: `jump` and `skip`.
//!
//! Both reposition the steered frame (the active one, or a trap's own frame)
//! and dispatch from the new position at once, without the in-flight call
//! calling `next()`. Landing at or past the end of the queue drains the frame.

use anyhow::Result;
use tracing::{trace, warn};

use crate::config::CursorUnderflow;
use crate::engine::Saw;
use crate::error::ChainsawError;

impl Saw {
    /// Continue the steered frame from queue index `index`.
    pub fn jump(&self, index: usize) -> Result<()> {
        {
            let mut stack = self.inner.stack.borrow_mut();
            let frame = self.unwind_steered(&mut stack)?;
            trace!(frame = %frame.id, from = frame.cursor, to = index, "jump");
            frame.reposition(index, None);
        }
        self.pump()
    }

    /// Move the steered frame's cursor by `delta` and continue from there.
    ///
    /// A cursor that would go negative is handled per
    /// [`ChainsawConfig::cursor_underflow`](crate::ChainsawConfig).
    pub fn skip(&self, delta: isize) -> Result<()> {
        {
            let mut stack = self.inner.stack.borrow_mut();
            let frame = self.steered(&mut stack)?;
            let cursor = match offset(frame.cursor, delta) {
                Some(cursor) => cursor,
                None => match self.inner.config.cursor_underflow {
                    CursorUnderflow::Reject => {
                        warn!(frame = %frame.id, cursor = frame.cursor, delta, "skip rejected");
                        return Err(ChainsawError::CursorUnderflow {
                            cursor: frame.cursor,
                            delta,
                        }
                        .into());
                    }
                    CursorUnderflow::Clamp => 0,
                },
            };
            trace!(frame = %frame.id, from = frame.cursor, to = cursor, "skip");
            self.unwind_steered(&mut stack)?.reposition(cursor, None);
        }
        self.pump()
    }
}

/// `cursor + delta`, or `None` if that is negative.
fn offset(cursor: usize, delta: isize) -> Option<usize> {
    if delta < 0 {
        cursor.checked_sub(delta.unsigned_abs())
    } else {
        Some(cursor.saturating_add(delta.unsigned_abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainsawConfig;

    #[test]
    fn test_offset() {
        assert_eq!(offset(3, -3), Some(0));
        assert_eq!(offset(3, -4), None);
        assert_eq!(offset(3, 2), Some(5));
        assert_eq!(offset(usize::MAX, 1), Some(usize::MAX));
    }

    #[test]
    fn test_jump_before_start_is_not_started() {
        let saw = Saw::new(ChainsawConfig::default());
        let err = saw.jump(0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ChainsawError>(),
            Some(&ChainsawError::NotStarted)
        );
        let err = saw.skip(-1).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ChainsawError>(),
            Some(&ChainsawError::NotStarted)
        );
    }
}
