use serde::{Deserialize, Serialize};

use crate::step::StepMap;

/// An anchor/head pair of flat positions into one document version. A
/// cursor is the degenerate case where both coincide.
///
/// Selections are always expressed relative to the state they were
/// produced from; mapping through step maps carries them across edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn cursor(pos: usize) -> Self {
        Self {
            anchor: pos,
            head: pos,
        }
    }

    pub fn range(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    pub fn is_cursor(&self) -> bool {
        self.anchor == self.head
    }

    /// Lower end of the selection.
    pub fn from(&self) -> usize {
        self.anchor.min(self.head)
    }

    /// Upper end of the selection.
    pub fn to(&self) -> usize {
        self.anchor.max(self.head)
    }

    /// Projects the selection through a sequence of step maps, then
    /// clamps it into the new document's position range.
    pub fn map(&self, maps: &[StepMap], max: usize) -> Self {
        let mut anchor = self.anchor;
        let mut head = self.head;
        for map in maps {
            anchor = map.map_pos(anchor);
            head = map.map_pos(head);
        }
        Self {
            anchor: anchor.min(max),
            head: head.min(max),
        }
    }
}
