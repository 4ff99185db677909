//! Message identifier allocation.

/// Hands out message ids for packets that expect an acknowledgement.
///
/// Ids are 16-bit, start at 1, increase by one per call and wrap from 65535
/// back to 1. Zero is never issued.
#[derive(Debug)]
pub struct MessageIdAllocator {
    next_id: u16,
}

impl Default for MessageIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageIdAllocator {
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Allocate the next message id.
    pub fn allocate(&mut self) -> u16 {
        let id = self.next_id;
        self.advance_next();
        id
    }

    /// Advance next_id, skipping 0.
    fn advance_next(&mut self) {
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
    }
}
