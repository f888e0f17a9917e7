// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Public operations of the threading library.
//!
//! Each operation enters the signal-mask gate, validates its arguments, calls
//! into the scheduler core, and reports user errors on the diagnostic channel.
//! User errors leave the scheduler untouched; host-facility failures do not
//! return (see [crate::runtime::fatal]).

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    self,
    fail::Fail,
    logging,
    scheduler::{
        scheduler::{
            self,
            Scheduler,
        },
        PreemptGate,
        ThreadEntryPoint,
        Tid,
        MAIN_TID,
    },
    timer,
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Initializes the threading library. The caller becomes the main thread
/// (id 0), RUNNING, in its first quantum; the preemption timer is armed for
/// `quantum_usecs` microseconds of virtual time. Must be called before any
/// other operation.
pub fn init(quantum_usecs: i32) -> Result<(), Fail> {
    logging::initialize();
    trace!("init(): quantum_usecs={:?}", quantum_usecs);
    let _gate: PreemptGate = enter_gate();
    if quantum_usecs <= 0 {
        return Err(reject(libc::EINVAL, "non-positive quantum length"));
    }
    // SAFETY: the gate is held.
    if unsafe { scheduler::instance() }.is_some() {
        return Err(reject(libc::EPERM, "thread library already initialized"));
    }
    // failures below are host-facility failures, and those do not return
    if let Err(e) = timer::install() {
        runtime::fatal(&e.cause);
    }
    let mut sched: Scheduler = match Scheduler::new(i64::from(quantum_usecs)) {
        Ok(sched) => sched,
        Err(e) => runtime::fatal(&e.cause),
    };
    if let Err(e) = sched.start() {
        runtime::fatal(&e.cause);
    }
    // SAFETY: the gate is held.
    unsafe { scheduler::set_instance(sched) };
    Ok(())
}

/// Creates a thread whose entry point is `entry` and appends it to the ready
/// queue. Returns the new thread's identifier.
pub fn spawn(entry: ThreadEntryPoint) -> Result<Tid, Fail> {
    trace!("spawn()");
    let _gate: PreemptGate = enter_gate();
    let sched: &mut Scheduler = require_init()?;
    sched.spawn(entry).map_err(report)
}

/// Terminates thread `tid`. Terminating the main thread (id 0) tears the
/// library down and exits the process with status 0; terminating the calling
/// thread does not return.
pub fn terminate(tid: Tid) -> Result<(), Fail> {
    trace!("terminate(): tid={:?}", tid);
    let _gate: PreemptGate = enter_gate();
    if tid == MAIN_TID {
        require_init()?;
        shutdown();
    }
    let sched: &mut Scheduler = require_init()?;
    sched.terminate(tid).map_err(report)
}

/// Blocks thread `tid` until a matching [resume]. The main thread may not be
/// blocked. Blocking the calling thread switches away immediately.
pub fn block(tid: Tid) -> Result<(), Fail> {
    trace!("block(): tid={:?}", tid);
    let _gate: PreemptGate = enter_gate();
    let sched: &mut Scheduler = require_init()?;
    if tid == MAIN_TID {
        return Err(reject(libc::EPERM, "the main thread may not be blocked"));
    }
    sched.block(tid).map_err(report)
}

/// Resumes thread `tid`. Resuming a thread that is not blocked has no effect
/// and is not an error.
pub fn resume(tid: Tid) -> Result<(), Fail> {
    trace!("resume(): tid={:?}", tid);
    let _gate: PreemptGate = enter_gate();
    let sched: &mut Scheduler = require_init()?;
    sched.resume(tid).map_err(report)
}

/// Puts the calling thread to sleep for `num_quantums` quanta. The main
/// thread may not sleep, and the quantum in which the call is made does not
/// count.
pub fn sleep(num_quantums: i32) -> Result<(), Fail> {
    trace!("sleep(): num_quantums={:?}", num_quantums);
    let _gate: PreemptGate = enter_gate();
    let sched: &mut Scheduler = require_init()?;
    if sched.current() == MAIN_TID {
        return Err(reject(libc::EPERM, "the main thread may not sleep"));
    }
    if num_quantums <= 0 {
        return Err(reject(libc::EINVAL, "non-positive sleep length"));
    }
    sched.sleep(num_quantums as u64).map_err(report)
}

/// Identifier of the calling thread.
pub fn get_tid() -> Result<Tid, Fail> {
    let _gate: PreemptGate = enter_gate();
    let sched: &mut Scheduler = require_init()?;
    Ok(sched.current())
}

/// Total quanta commenced since [init], the current one included. Reads 1
/// right after initialization.
pub fn get_total_quantums() -> Result<u64, Fail> {
    let _gate: PreemptGate = enter_gate();
    let sched: &mut Scheduler = require_init()?;
    Ok(sched.total_quantums())
}

/// Number of quanta during which thread `tid` has run, the current one
/// included if it is running now. Reads 0 until the thread first runs.
pub fn get_quantums(tid: Tid) -> Result<u64, Fail> {
    let _gate: PreemptGate = enter_gate();
    let sched: &mut Scheduler = require_init()?;
    sched.quantums(tid).map_err(report)
}

/// Tears the library down and exits the process: the fate of the main thread
/// is the fate of the process.
fn shutdown() -> ! {
    let _ = timer::disarm();
    // SAFETY: the gate is held by the caller.
    if let Some(mut sched) = unsafe { scheduler::take_instance() } {
        // the stack under our feet must survive the teardown
        sched.leak_running();
        drop(sched);
    }
    ::std::process::exit(0);
}

/// Enters the signal-mask gate. Failing to block a signal is a host-facility
/// failure, so this does not return on error.
fn enter_gate() -> PreemptGate {
    match PreemptGate::enter() {
        Ok(gate) => gate,
        Err(e) => runtime::fatal(&e.cause),
    }
}

/// The process-wide scheduler, or the not-initialized user error.
fn require_init() -> Result<&'static mut Scheduler, Fail> {
    // SAFETY: the gate is held by the caller.
    match unsafe { scheduler::instance() } {
        Some(sched) => Ok(sched),
        None => Err(reject(libc::EPERM, "thread library not initialized")),
    }
}

/// Reports a user error on the diagnostic channel and builds the failure.
fn reject(errno: i32, cause: &str) -> Fail {
    report(Fail::new(errno, cause))
}

/// Reports a user error on the diagnostic channel. The line is part of the
/// library's interface and is emitted regardless of the log configuration.
fn report(fail: Fail) -> Fail {
    eprintln!("thread library error: {}", fail.cause);
    warn!("{}", fail.cause);
    fail
}
