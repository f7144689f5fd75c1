//! Stable object-to-channel slot allocation.
//!
//! Maps live object ids onto a fixed pool of rendering channels. An object
//! keeps its channel for as long as it stays in the scene; channels of
//! vanished objects are released and handed to newcomers, most recently
//! released first.

use std::collections::HashMap;

/// Slot allocator over `capacity` rendering channels.
#[derive(Debug, Clone)]
pub struct ObjectChannelAllocator {
    capacity: usize,
    assignments: HashMap<u32, usize>,
    /// Stack of free channels; initialised descending so the lowest index is
    /// handed out first.
    free: Vec<usize>,
}

impl ObjectChannelAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            assignments: HashMap::with_capacity(capacity),
            free: (0..capacity).rev().collect(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.assignments.len()
    }

    /// Update the allocation to exactly the given set of object ids.
    ///
    /// Returns an error naming the overflow count if more objects are alive
    /// than there are channels; the allocation is left unchanged in that
    /// case.
    pub fn set_objects(&mut self, ids: &[u32]) -> Result<(), usize> {
        if ids.len() > self.capacity {
            return Err(ids.len() - self.capacity);
        }
        // Release channels of objects that disappeared.
        let released: Vec<u32> = self
            .assignments
            .keys()
            .copied()
            .filter(|id| !ids.contains(id))
            .collect();
        for id in released {
            if let Some(channel) = self.assignments.remove(&id) {
                self.free.push(channel);
            }
        }
        // Assign channels to newcomers.
        for &id in ids {
            if !self.assignments.contains_key(&id) {
                // Cannot be empty: len(ids) <= capacity and every live
                // object holds exactly one channel.
                let channel = self.free.pop().expect("free channel available");
                self.assignments.insert(id, channel);
            }
        }
        Ok(())
    }

    /// Channel currently held by an object id.
    #[inline]
    pub fn channel_for_object(&self, id: u32) -> Option<usize> {
        self.assignments.get(&id).copied()
    }

    /// Object currently occupying a channel.
    pub fn object_for_channel(&self, channel: usize) -> Option<u32> {
        self.assignments
            .iter()
            .find(|&(_, &ch)| ch == channel)
            .map(|(&id, _)| id)
    }

    /// Release everything.
    pub fn clear(&mut self) {
        self.assignments.clear();
        self.free = (0..self.capacity).rev().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_stable_and_reused() {
        let mut alloc = ObjectChannelAllocator::new(4);
        alloc.set_objects(&[10]).unwrap(); // A
        alloc.set_objects(&[10, 11]).unwrap(); // A, B
        let slot_a = alloc.channel_for_object(10).unwrap();
        let slot_b = alloc.channel_for_object(11).unwrap();
        assert_ne!(slot_a, slot_b);

        alloc.set_objects(&[11]).unwrap(); // remove A
        assert_eq!(alloc.channel_for_object(11), Some(slot_b));
        assert_eq!(alloc.channel_for_object(10), None);

        alloc.set_objects(&[11, 12]).unwrap(); // add C
        assert_eq!(alloc.channel_for_object(11), Some(slot_b));
        assert_eq!(alloc.channel_for_object(12), Some(slot_a));
    }

    #[test]
    fn lowest_channel_first() {
        let mut alloc = ObjectChannelAllocator::new(3);
        alloc.set_objects(&[1]).unwrap();
        assert_eq!(alloc.channel_for_object(1), Some(0));
        alloc.set_objects(&[1, 2]).unwrap();
        assert_eq!(alloc.channel_for_object(2), Some(1));
    }

    #[test]
    fn overflow_is_rejected_without_change() {
        let mut alloc = ObjectChannelAllocator::new(2);
        alloc.set_objects(&[1, 2]).unwrap();
        let err = alloc.set_objects(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, 1);
        assert_eq!(alloc.used(), 2);
        assert!(alloc.channel_for_object(1).is_some());
        assert!(alloc.channel_for_object(3).is_none());
    }

    #[test]
    fn reverse_lookup() {
        let mut alloc = ObjectChannelAllocator::new(2);
        alloc.set_objects(&[7]).unwrap();
        assert_eq!(alloc.object_for_channel(0), Some(7));
        assert_eq!(alloc.object_for_channel(1), None);
    }
}
