// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    pal,
    runtime::fail::Fail,
};
use ::libc::ucontext_t;
use ::std::mem;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Saved machine context of a thread: program counter, stack pointer,
/// callee-saved registers, and signal mask.
///
/// The blob is boxed once and never moved afterwards: on this host the
/// floating-point state pointer inside the context aims back into the same
/// allocation.
pub struct Context {
    ucp: Box<ucontext_t>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Contexts
impl Context {
    /// Creates an empty context. It must be filled by [Self::capture] or
    /// [Self::prime], or by the save side of [Self::swap], before it may be
    /// activated.
    pub fn new() -> Self {
        Self {
            ucp: Box::new(unsafe { mem::zeroed() }),
        }
    }

    /// Captures the current machine state into this context.
    pub fn capture(&mut self) -> Result<(), Fail> {
        pal::context_capture(&mut self.ucp)
    }

    /// Points this context at `entry`, running on `stack` with an empty signal
    /// mask, so that activating it starts a fresh thread of control.
    pub fn prime(&mut self, entry: extern "C" fn(), stack: &mut [u8]) -> Result<(), Fail> {
        pal::context_prime(&mut self.ucp, entry, stack)
    }

    /// Saves the current machine state into `save` and activates `resume`.
    /// Returns when a later switch activates `save` again.
    ///
    /// # Safety
    ///
    /// Both contexts must outlive the switch, and `resume` must hold a context
    /// that is valid to activate (captured, primed, or saved by an earlier
    /// swap). The preemption signal must be blocked across the call.
    pub unsafe fn swap(save: *mut Context, resume: *const Context) -> Result<(), Fail> {
        pal::context_swap(&mut *(*save).ucp, &*(*resume).ucp)
    }

    /// Activates this context, discarding the current machine state. Returns
    /// only on failure.
    ///
    /// # Safety
    ///
    /// Same requirements as the `resume` side of [Self::swap].
    pub unsafe fn resume(&self) -> Fail {
        pal::context_resume(&*self.ucp)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::Context;
    use crate::runtime::limits::STACK_SIZE;
    use ::anyhow::Result;
    use ::std::{
        ptr,
        sync::atomic::{
            AtomicBool,
            Ordering,
        },
    };

    static VISITED: AtomicBool = AtomicBool::new(false);
    static mut HOME: Option<Context> = None;

    extern "C" fn visit() {
        VISITED.store(true, Ordering::SeqCst);
        let home: &Context = unsafe { (*ptr::addr_of!(HOME)).as_ref().expect("home context is set") };
        let fail = unsafe { home.resume() };
        panic!("resume() returned: {:?}", fail);
    }

    #[test]
    fn primed_context_runs_and_switches_back() -> Result<()> {
        let mut stack: Box<[u8]> = vec![0u8; STACK_SIZE].into_boxed_slice();
        let mut target: Context = Context::new();
        target.prime(visit, &mut stack)?;

        unsafe { *ptr::addr_of_mut!(HOME) = Some(Context::new()) };
        let home: *mut Context = unsafe { (*ptr::addr_of_mut!(HOME)).as_mut().expect("just set") };

        // Saves this test into HOME and runs visit() on the private stack;
        // visit() switches straight back here.
        unsafe { Context::swap(home, &target)? };

        crate::ensure_eq!(VISITED.load(Ordering::SeqCst), true);
        Ok(())
    }
}
