// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    pal,
    runtime::fail::Fail,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Critical section protecting the scheduler tables: the preemption signal is
/// blocked from construction until drop, so the timer handler cannot re-enter
/// the scheduler underneath the holder.
///
/// The gate is the scheduler's only lock. It is not reentrant; public
/// operations hold it once and do not nest. A voluntary switch may suspend a
/// holder mid-scope: the thread then resumes with the signal still blocked and
/// unblocks it on its ordinary return path.
pub struct PreemptGate;

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Preempt Gates
impl PreemptGate {
    /// Blocks the preemption signal until the returned guard drops.
    pub fn enter() -> Result<Self, Fail> {
        pal::block_preempt_signal()?;
        Ok(Self)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for PreemptGate {
    fn drop(&mut self) {
        // a drop has nowhere to report failure
        let _ = pal::unblock_preempt_signal();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
