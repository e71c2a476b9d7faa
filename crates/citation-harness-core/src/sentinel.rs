//! Scroll-sentinel subscriptions as an arena of handles.
//!
//! The viewer arms a sentinel at the end of the result list; when the
//! sentinel scrolls into view the next page is requested. Instead of
//! registering callbacks, each armed sentinel is a slot in a
//! [`SentinelArena`] and the viewer holds a [`SentinelHandle`]. Handles
//! carry the epoch they were armed in, so once a slot is disarmed (or the
//! whole arena disconnected) an old handle stays inert even if the slot is
//! reused.

/// Reference to one armed sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SentinelHandle {
    slot: u32,
    epoch: u64,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    epoch: u64,
    armed: bool,
}

#[derive(Debug, Default)]
pub struct SentinelArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_epoch: u64,
}

impl SentinelArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a new sentinel and return its handle.
    pub fn arm(&mut self) -> SentinelHandle {
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Slot { epoch, armed: true };
                slot
            }
            None => {
                self.slots.push(Slot { epoch, armed: true });
                (self.slots.len() - 1) as u32
            }
        };
        SentinelHandle { slot, epoch }
    }

    /// Disarm one sentinel. Returns false if the handle was already stale.
    pub fn disarm(&mut self, handle: SentinelHandle) -> bool {
        if !self.is_live(handle) {
            return false;
        }
        self.slots[handle.slot as usize].armed = false;
        self.free.push(handle.slot);
        true
    }

    pub fn is_live(&self, handle: SentinelHandle) -> bool {
        self.slots
            .get(handle.slot as usize)
            .is_some_and(|s| s.armed && s.epoch == handle.epoch)
    }

    /// Disarm every sentinel. All outstanding handles become stale.
    pub fn disconnect_all(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.armed {
                slot.armed = false;
                self.free.push(index as u32);
            }
        }
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.armed).count()
    }
}
