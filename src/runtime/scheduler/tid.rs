// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::collections::BTreeSet;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Identifier of the main thread. Bound at initialization and never recycled.
pub const MAIN_TID: Tid = Tid(0);

//======================================================================================================================
// Structures
//======================================================================================================================

/// Externally visible thread identifier.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Tid(pub i32);

/// Issues the lowest free non-negative thread identifier, recycling released
/// ones so that identifiers compact toward zero over time.
pub struct TidAllocator {
    /// Highest identifier ever handed out and not since retired.
    last_id: i32,
    /// Released identifiers below the high-water mark.
    recycled: BTreeSet<i32>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Tid Allocators
impl TidAllocator {
    /// Creates an allocator with no identifiers outstanding.
    pub fn new() -> Self {
        Self {
            last_id: -1,
            recycled: BTreeSet::new(),
        }
    }

    /// Returns the smallest non-negative identifier not currently allocated.
    pub fn allocate(&mut self) -> Tid {
        match self.recycled.iter().next().copied() {
            Some(lowest) if lowest <= self.last_id => {
                self.recycled.remove(&lowest);
                Tid(lowest)
            },
            _ => {
                self.last_id += 1;
                Tid(self.last_id)
            },
        }
    }

    /// Returns an identifier to the pool. Releasing an identifier twice has no
    /// effect.
    pub fn release(&mut self, tid: Tid) {
        let Tid(id) = tid;
        debug_assert!((0..=self.last_id).contains(&id), "released id {} was never allocated", id);
        if self.recycled.contains(&id) {
            return;
        }
        if id == self.last_id {
            self.last_id -= 1;
        } else {
            self.recycled.insert(id);
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl From<i32> for Tid {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<Tid> for i32 {
    fn from(value: Tid) -> Self {
        value.0
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        Tid,
        TidAllocator,
    };
    use ::anyhow::Result;

    #[test]
    fn allocate_counts_up_from_zero() -> Result<()> {
        let mut tids: TidAllocator = TidAllocator::new();
        crate::ensure_eq!(tids.allocate(), Tid(0));
        crate::ensure_eq!(tids.allocate(), Tid(1));
        crate::ensure_eq!(tids.allocate(), Tid(2));
        Ok(())
    }

    #[test]
    fn allocate_reissues_the_lowest_released_id() -> Result<()> {
        let mut tids: TidAllocator = TidAllocator::new();
        for _ in 0..4 {
            tids.allocate();
        }
        tids.release(Tid(2));
        tids.release(Tid(1));
        crate::ensure_eq!(tids.allocate(), Tid(1));
        crate::ensure_eq!(tids.allocate(), Tid(2));
        crate::ensure_eq!(tids.allocate(), Tid(4));
        Ok(())
    }

    #[test]
    fn releasing_the_high_water_mark_retires_it() -> Result<()> {
        let mut tids: TidAllocator = TidAllocator::new();
        for _ in 0..3 {
            tids.allocate();
        }
        tids.release(Tid(2));
        crate::ensure_eq!(tids.allocate(), Tid(2));
        Ok(())
    }

    #[test]
    fn double_release_is_a_no_op() -> Result<()> {
        let mut tids: TidAllocator = TidAllocator::new();
        for _ in 0..3 {
            tids.allocate();
        }
        tids.release(Tid(1));
        tids.release(Tid(1));
        crate::ensure_eq!(tids.allocate(), Tid(1));
        crate::ensure_eq!(tids.allocate(), Tid(3));
        Ok(())
    }
}
