//! Serializable view of the frame stack for diagnostics.

use serde::Serialize;

use crate::engine::Saw;
use crate::frame::{Advance, Frame, FrameId, FrameState};

/// Point-in-time view of one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameSnapshot {
    pub id: FrameId,
    pub state: FrameState,
    pub cursor: usize,
    /// Operation names, in queue order.
    pub queue: Vec<String>,
    /// Registered trap names, sorted.
    pub traps: Vec<String>,
    pub advance: Advance,
    pub has_locals: bool,
}

impl FrameSnapshot {
    fn capture(frame: &Frame) -> Self {
        let mut traps: Vec<String> = frame.traps.keys().cloned().collect();
        traps.sort();
        Self {
            id: frame.id,
            state: frame.state,
            cursor: frame.cursor,
            queue: frame.queue.iter().map(|c| c.name().to_string()).collect(),
            traps,
            advance: frame.advance,
            has_locals: frame.locals.is_some(),
        }
    }
}

/// Point-in-time view of an engine. Frames are listed root first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub frames: Vec<FrameSnapshot>,
    pub finished: bool,
}

impl Snapshot {
    /// The active frame, if any.
    pub fn active(&self) -> Option<&FrameSnapshot> {
        self.frames.last()
    }
}

impl Saw {
    /// Capture the current frame stack.
    pub fn snapshot(&self) -> Snapshot {
        let frames = self
            .inner
            .stack
            .borrow()
            .frames()
            .iter()
            .map(FrameSnapshot::capture)
            .collect();
        Snapshot {
            frames,
            finished: self.is_finished(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainsawConfig;

    #[test]
    fn test_snapshot_of_fresh_engine() {
        let saw = Saw::new(ChainsawConfig::default());
        saw.trap("b", |_, _| Ok(())).unwrap();
        saw.trap("a", |_, _| Ok(())).unwrap();

        let snapshot = saw.snapshot();
        assert!(!snapshot.finished);
        let root = snapshot.active().unwrap();
        assert_eq!(root.id, FrameId::ROOT);
        assert_eq!(root.state, FrameState::Pending);
        assert_eq!(root.traps, vec!["a", "b"]);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["frames"][0]["state"], "pending");
        assert_eq!(json["frames"][0]["advance"], "auto");
        assert_eq!(json["frames"][0]["id"], 0);
    }
}
