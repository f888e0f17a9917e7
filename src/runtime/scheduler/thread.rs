// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits::STACK_SIZE,
    scheduler::{
        context::Context,
        tid::Tid,
    },
};

//======================================================================================================================
// Types
//======================================================================================================================

/// Entry point of a spawned thread.
pub type ThreadEntryPoint = extern "C" fn();

//======================================================================================================================
// Enumerations
//======================================================================================================================

/// Execution state of a thread.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadState {
    /// In the ready queue, waiting for its turn on the CPU.
    Ready,
    /// Currently executing. Exactly one live thread is in this state.
    Running,
    /// Suspended until explicitly resumed.
    Blocked,
    /// Suspended until a quantum deadline passes. A sleeping thread that is
    /// also explicitly blocked carries [Self::Blocked] instead, and its
    /// sleeping-map entry records the pending expiry.
    Sleeping,
    /// Destroyed. Storage may outlive this state briefly when parked for a
    /// deferred reap.
    Terminated,
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Per-thread control block: identifier, state, quantum accounting, private
/// stack, and saved machine context.
pub struct Thread {
    /// Identifier, stable for the thread's lifetime.
    tid: Tid,
    /// Execution state.
    state: ThreadState,
    /// Number of distinct quanta during which this thread has run, the current
    /// one included while it is running.
    quantums: u64,
    /// Entry point. The main thread has none.
    entry: Option<ThreadEntryPoint>,
    /// Private stack. The main thread runs on the host stack instead.
    stack: Option<Box<[u8]>>,
    /// Saved machine context, valid whenever the thread is off the CPU.
    context: Context,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Thread States
impl ThreadState {
    /// Whether a transition from `self` to `next` appears in the thread
    /// lifecycle graph.
    pub fn can_become(self, next: ThreadState) -> bool {
        use ThreadState::*;
        matches!(
            (self, next),
            (Ready, Running)
                | (Ready, Blocked)
                | (Ready, Terminated)
                | (Running, Ready)
                | (Running, Blocked)
                | (Running, Sleeping)
                | (Running, Terminated)
                | (Blocked, Ready)
                | (Blocked, Sleeping)
                | (Blocked, Terminated)
                | (Sleeping, Blocked)
                | (Sleeping, Terminated)
        )
    }
}

/// Associate Functions for Threads
impl Thread {
    /// Creates the control block of a spawned thread: a fresh [STACK_SIZE]
    /// stack and a context primed to start at `trampoline`. The thread is
    /// READY and has run for zero quanta.
    pub fn new(tid: Tid, entry: ThreadEntryPoint, trampoline: ThreadEntryPoint) -> Result<Self, Fail> {
        let mut stack: Box<[u8]> = vec![0u8; STACK_SIZE].into_boxed_slice();
        let mut context: Context = Context::new();
        context.prime(trampoline, &mut stack)?;
        Ok(Self {
            tid,
            state: ThreadState::Ready,
            quantums: 0,
            entry: Some(entry),
            stack: Some(stack),
            context,
        })
    }

    /// Creates the control block of the main thread by capturing the machine
    /// state in use at the call site. No stack is allocated; the main thread
    /// keeps the host stack. The thread is RUNNING.
    pub fn main(tid: Tid) -> Result<Self, Fail> {
        let mut context: Context = Context::new();
        context.capture()?;
        Ok(Self {
            tid,
            state: ThreadState::Running,
            quantums: 0,
            entry: None,
            stack: None,
            context,
        })
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Moves this thread to `next`, which must be reachable from the current
    /// state in the lifecycle graph.
    pub fn set_state(&mut self, next: ThreadState) {
        debug_assert!(
            self.state.can_become(next),
            "invalid transition {:?} -> {:?} for thread {:?}",
            self.state,
            next,
            self.tid
        );
        self.state = next;
    }

    pub fn entry(&self) -> Option<ThreadEntryPoint> {
        self.entry
    }

    /// Number of distinct quanta during which this thread has run.
    pub fn quantums(&self) -> u64 {
        self.quantums
    }

    /// Accounts the start of one more quantum to this thread.
    pub fn increment_quantum(&mut self) {
        self.quantums += 1;
    }

    /// This thread's private stack, if it has one.
    pub fn stack(&self) -> Option<&[u8]> {
        self.stack.as_deref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        Thread,
        ThreadState,
    };
    use crate::runtime::{
        limits::STACK_SIZE,
        scheduler::tid::Tid,
    };
    use ::anyhow::Result;

    extern "C" fn noop() {}

    #[test]
    fn spawned_thread_starts_ready_with_a_fresh_stack() -> Result<()> {
        let thread: Thread = Thread::new(Tid(1), noop, noop)?;
        crate::ensure_eq!(thread.tid(), Tid(1));
        crate::ensure_eq!(thread.state(), ThreadState::Ready);
        crate::ensure_eq!(thread.quantums(), 0);
        crate::ensure_eq!(thread.stack().map(|stack| stack.len()), Some(STACK_SIZE));
        crate::ensure_eq!(thread.entry().is_some(), true);
        Ok(())
    }

    #[test]
    fn main_thread_starts_running_on_the_host_stack() -> Result<()> {
        let thread: Thread = Thread::main(Tid(0))?;
        crate::ensure_eq!(thread.state(), ThreadState::Running);
        crate::ensure_eq!(thread.quantums(), 0);
        crate::ensure_eq!(thread.stack().is_none(), true);
        crate::ensure_eq!(thread.entry().is_none(), true);
        Ok(())
    }

    #[test]
    fn lifecycle_graph_admits_the_scheduler_transitions() -> Result<()> {
        use ThreadState::*;
        // the transitions each scheduler operation performs
        for (from, to) in [
            (Ready, Running),
            (Running, Ready),
            (Running, Blocked),
            (Running, Sleeping),
            (Running, Terminated),
            (Ready, Blocked),
            (Blocked, Ready),
            (Blocked, Sleeping),
            (Sleeping, Blocked),
            (Sleeping, Terminated),
        ] {
            crate::ensure_eq!(from.can_become(to), true);
        }
        // and rejects the ones none performs
        for (from, to) in [
            (Sleeping, Running),
            (Sleeping, Ready),
            (Blocked, Running),
            (Terminated, Ready),
            (Terminated, Running),
            (Ready, Sleeping),
        ] {
            crate::ensure_eq!(from.can_become(to), false);
        }
        Ok(())
    }

    #[test]
    fn quantum_accounting_counts_up() -> Result<()> {
        let mut thread: Thread = Thread::new(Tid(2), noop, noop)?;
        thread.increment_quantum();
        thread.increment_quantum();
        crate::ensure_eq!(thread.quantums(), 2);
        Ok(())
    }
}
