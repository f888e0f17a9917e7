// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::libc::{
    c_int,
    itimerval,
    sigset_t,
    timeval,
    ucontext_t,
};
use ::std::{
    mem,
    ptr,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Signal that ends the running thread's quantum. `ITIMER_VIRTUAL` counts
/// process CPU time, so an idle process is never preempted.
pub const PREEMPT_SIGNAL: c_int = libc::SIGVTALRM;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Installs `handler` for [PREEMPT_SIGNAL]. The handler is installed with
/// `SA_NODEFER`: the scheduler blocks and unblocks the signal itself.
pub fn install_preempt_handler(handler: extern "C" fn(c_int)) -> Result<(), Fail> {
    let mut sa: libc::sigaction = unsafe { mem::zeroed() };
    sa.sa_sigaction = handler as usize;
    sa.sa_flags = libc::SA_NODEFER;
    if unsafe { libc::sigemptyset(&mut sa.sa_mask) } != 0 {
        return Err(Fail::last_os_error("sigemptyset"));
    }
    match unsafe { libc::sigaction(PREEMPT_SIGNAL, &sa, ptr::null_mut()) } {
        0 => Ok(()),
        _ => Err(Fail::last_os_error("sigaction")),
    }
}

/// Blocks [PREEMPT_SIGNAL] for the calling kernel thread.
pub fn block_preempt_signal() -> Result<(), Fail> {
    mask_preempt_signal(libc::SIG_BLOCK)
}

/// Unblocks [PREEMPT_SIGNAL] for the calling kernel thread.
pub fn unblock_preempt_signal() -> Result<(), Fail> {
    mask_preempt_signal(libc::SIG_UNBLOCK)
}

/// Queries whether [PREEMPT_SIGNAL] is currently blocked.
#[cfg(test)]
pub fn preempt_signal_is_blocked() -> Result<bool, Fail> {
    let mut current: sigset_t = unsafe { mem::zeroed() };
    if unsafe { libc::sigprocmask(libc::SIG_BLOCK, ptr::null(), &mut current) } != 0 {
        return Err(Fail::last_os_error("sigprocmask"));
    }
    match unsafe { libc::sigismember(&current, PREEMPT_SIGNAL) } {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Fail::last_os_error("sigismember")),
    }
}

/// Arms the virtual-time interval timer to deliver [PREEMPT_SIGNAL] once,
/// `quantum_usecs` microseconds of CPU time from now.
pub fn arm_virtual_timer(quantum_usecs: i64) -> Result<(), Fail> {
    set_virtual_timer(quantum_usecs)
}

/// Cancels any pending expiration of the virtual-time interval timer.
pub fn disarm_virtual_timer() -> Result<(), Fail> {
    set_virtual_timer(0)
}

fn set_virtual_timer(usecs: i64) -> Result<(), Fail> {
    let timer: itimerval = itimerval {
        // zero interval: the timer fires once and is re-armed at each quantum start
        it_interval: timeval { tv_sec: 0, tv_usec: 0 },
        it_value: timeval {
            tv_sec: usecs / 1_000_000,
            tv_usec: usecs % 1_000_000,
        },
    };
    match unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, &timer, ptr::null_mut()) } {
        0 => Ok(()),
        _ => Err(Fail::last_os_error("setitimer")),
    }
}

fn mask_preempt_signal(how: c_int) -> Result<(), Fail> {
    let mut set: sigset_t = unsafe { mem::zeroed() };
    if unsafe { libc::sigemptyset(&mut set) } != 0 {
        return Err(Fail::last_os_error("sigemptyset"));
    }
    if unsafe { libc::sigaddset(&mut set, PREEMPT_SIGNAL) } != 0 {
        return Err(Fail::last_os_error("sigaddset"));
    }
    match unsafe { libc::sigprocmask(how, &set, ptr::null_mut()) } {
        0 => Ok(()),
        _ => Err(Fail::last_os_error("sigprocmask")),
    }
}

/// Captures the calling thread's machine state into `ucp`.
pub fn context_capture(ucp: &mut ucontext_t) -> Result<(), Fail> {
    match unsafe { libc::getcontext(ucp) } {
        0 => Ok(()),
        _ => Err(Fail::last_os_error("getcontext")),
    }
}

/// Points `ucp` at `entry`, running on `stack`, with an empty signal mask, so
/// that activating it starts a fresh thread of control.
pub fn context_prime(ucp: &mut ucontext_t, entry: extern "C" fn(), stack: &mut [u8]) -> Result<(), Fail> {
    if unsafe { libc::getcontext(ucp) } != 0 {
        return Err(Fail::last_os_error("getcontext"));
    }
    ucp.uc_link = ptr::null_mut();
    ucp.uc_stack.ss_sp = stack.as_mut_ptr() as *mut libc::c_void;
    ucp.uc_stack.ss_size = stack.len();
    ucp.uc_stack.ss_flags = 0;
    if unsafe { libc::sigemptyset(&mut ucp.uc_sigmask) } != 0 {
        return Err(Fail::last_os_error("sigemptyset"));
    }
    unsafe { libc::makecontext(ucp, entry, 0) };
    Ok(())
}

/// Saves the calling thread's machine state into `save` and activates `resume`.
/// Returns when a later switch activates `save` again.
///
/// # Safety
///
/// Both contexts must be valid, pinned, and `resume` must have been produced by
/// [context_capture], [context_prime], or an earlier swap.
pub unsafe fn context_swap(save: *mut ucontext_t, resume: *const ucontext_t) -> Result<(), Fail> {
    match libc::swapcontext(save, resume) {
        0 => Ok(()),
        _ => Err(Fail::last_os_error("swapcontext")),
    }
}

/// Activates `ucp`, discarding the calling thread's machine state. Returns only
/// on failure.
///
/// # Safety
///
/// Same requirements on `ucp` as the `resume` side of [context_swap].
pub unsafe fn context_resume(ucp: *const ucontext_t) -> Fail {
    libc::setcontext(ucp);
    Fail::last_os_error("setcontext")
}
