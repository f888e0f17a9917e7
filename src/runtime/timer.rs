// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Preemption driver: the virtual-time interval timer and its signal handler.
//!
//! The timer is single-shot and re-armed at each quantum commencement, so a
//! quantum always measures the running thread's own CPU time. The handler is
//! the one asynchronous entry into the scheduler; everything else reaches it
//! through the gate.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    pal,
    runtime::{
        self,
        fail::Fail,
        scheduler::scheduler,
    },
};
use ::libc::c_int;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Installs the preemption signal handler. Called once, at initialization.
pub fn install() -> Result<(), Fail> {
    pal::install_preempt_handler(preempt_handler)
}

/// Arms the timer to end the current quantum `quantum_usecs` microseconds of
/// CPU time from now.
pub fn arm(quantum_usecs: i64) -> Result<(), Fail> {
    pal::arm_virtual_timer(quantum_usecs)
}

/// Cancels any pending quantum expiry. Used during teardown.
pub fn disarm() -> Result<(), Fail> {
    pal::disarm_virtual_timer()
}

/// Expiry of the running thread's quantum. Blocks the preemption signal for
/// the duration (the handler is installed with `SA_NODEFER`, so the kernel
/// does not), then re-enters the scheduler for an involuntary switch.
///
/// A preempted thread is resumed back into this frame by a later switch; it
/// then leaves through the kernel's signal return, which restores the signal
/// mask it was interrupted with.
extern "C" fn preempt_handler(_signum: c_int) {
    if let Err(e) = pal::block_preempt_signal() {
        runtime::fatal(&e.cause);
    }
    // SAFETY: the signal is blocked, and a handler only ever interrupts code
    // outside the gate, which holds no reference into the scheduler.
    if let Some(sched) = unsafe { scheduler::instance() } {
        sched.preempt();
    }
}
