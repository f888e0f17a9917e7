// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Implementation of our preemptive round-robin thread scheduler.
//!
//! A single process-wide [Scheduler] owns every live thread control block and
//! the tables that drive scheduling: the FIFO ready queue, the blocked set,
//! the sleeping map, and the id index. Every entry point below runs with the
//! preemption signal blocked (see [crate::runtime::scheduler::gate]); the
//! timer handler in [crate::runtime::timer] is the only other party that
//! touches these tables.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    self,
    fail::Fail,
    limits::MAX_THREAD_NUM,
    scheduler::{
        context::Context,
        gate::PreemptGate,
        thread::{
            Thread,
            ThreadEntryPoint,
            ThreadState,
        },
        tid::{
            Tid,
            TidAllocator,
        },
    },
    timer,
};
use ::std::{
    collections::{
        HashMap,
        HashSet,
        VecDeque,
    },
    ptr,
};

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// The process-wide scheduler. The timer handler needs unambiguous access to
/// it, so it cannot live anywhere but a static.
static mut SCHEDULER: Option<Scheduler> = None;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Scheduler for user-level threads multiplexed onto one kernel thread.
pub struct Scheduler {
    /// Identifier of the thread currently on the CPU.
    running: Tid,
    /// READY threads, in dispatch order.
    ready: VecDeque<Tid>,
    /// BLOCKED and SLEEPING threads.
    blocked: HashSet<Tid>,
    /// SLEEPING threads and the absolute quantum count at which each must be
    /// reconsidered for wake-up.
    sleeping: HashMap<Tid, u64>,
    /// Canonical owner of every live thread control block.
    threads: HashMap<Tid, Box<Thread>>,
    /// Issues the lowest free thread identifier.
    tids: TidAllocator,
    /// Quantum length, in microseconds of virtual time.
    quantum_usecs: i64,
    /// Total quanta commenced since initialization, the current one included.
    total_quantums: u64,
    /// Earliest deadline in the sleeping map, 0 when the map is empty.
    next_sleep_check: u64,
    /// Storage of a self-terminated thread, parked until its stack is off the
    /// CPU. Holds at most one thread.
    reap_slot: Option<Box<Thread>>,
    /// The parked stack stays in use until the parking switch completes, so
    /// exactly one quantum commencement must skip the reap.
    reap_skip: bool,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Schedulers
impl Scheduler {
    /// Creates a scheduler whose main thread is the caller, bound to the
    /// machine state and stack in use at the call site. The first quantum has
    /// not commenced yet; see [Self::start].
    pub fn new(quantum_usecs: i64) -> Result<Self, Fail> {
        let mut tids: TidAllocator = TidAllocator::new();
        let main_tid: Tid = tids.allocate();
        let main: Thread = Thread::main(main_tid)?;
        let mut threads: HashMap<Tid, Box<Thread>> = HashMap::with_capacity(MAX_THREAD_NUM);
        threads.insert(main_tid, Box::new(main));
        Ok(Self {
            running: main_tid,
            // sized up front so enqueues in the timer handler never grow it
            ready: VecDeque::with_capacity(MAX_THREAD_NUM),
            blocked: HashSet::with_capacity(MAX_THREAD_NUM),
            sleeping: HashMap::with_capacity(MAX_THREAD_NUM),
            threads,
            tids,
            quantum_usecs,
            total_quantums: 0,
            next_sleep_check: 0,
            reap_slot: None,
            reap_skip: false,
        })
    }

    /// Commences the main thread's first quantum and arms the timer. After
    /// this returns, the total-quantum counter reads 1.
    pub fn start(&mut self) -> Result<(), Fail> {
        self.begin_quantum();
        timer::arm(self.quantum_usecs)
    }

    /// Identifier of the running thread.
    pub fn current(&self) -> Tid {
        self.running
    }

    /// Total quanta commenced since initialization, the current one included.
    pub fn total_quantums(&self) -> u64 {
        self.total_quantums
    }

    /// Number of quanta during which thread `tid` has run.
    pub fn quantums(&self, tid: Tid) -> Result<u64, Fail> {
        match self.threads.get(&tid) {
            Some(thread) => Ok(thread.quantums()),
            None => Err(no_such_thread(tid)),
        }
    }

    /// Creates a thread running `entry` and appends it to the ready queue.
    pub fn spawn(&mut self, entry: ThreadEntryPoint) -> Result<Tid, Fail> {
        if self.threads.len() >= MAX_THREAD_NUM {
            let cause: String = format!("thread limit reached ({})", MAX_THREAD_NUM);
            return Err(Fail::new(libc::EAGAIN, &cause));
        }
        let tid: Tid = self.tids.allocate();
        let thread: Thread = match Thread::new(tid, entry, thread_trampoline) {
            Ok(thread) => thread,
            Err(e) => {
                self.tids.release(tid);
                return Err(e);
            },
        };
        self.threads.insert(tid, Box::new(thread));
        self.ready.push_back(tid);
        Ok(tid)
    }

    /// Blocks thread `tid` until it is explicitly resumed. Blocking the
    /// running thread switches away; blocking a blocked thread has no effect;
    /// blocking a sleeping thread records the block on top of the sleep, so
    /// that expiry alone no longer readies it.
    pub fn block(&mut self, tid: Tid) -> Result<(), Fail> {
        let state: ThreadState = match self.threads.get(&tid) {
            Some(thread) => thread.state(),
            None => return Err(no_such_thread(tid)),
        };
        match state {
            ThreadState::Running => {
                if self.ready.is_empty() {
                    return Err(Fail::new(libc::EAGAIN, "cannot block the only runnable thread"));
                }
                self.blocked.insert(tid);
                self.thread_mut(tid).set_state(ThreadState::Blocked);
                self.switch_from_running()
            },
            ThreadState::Ready => {
                self.ready.retain(|&queued| queued != tid);
                self.blocked.insert(tid);
                self.thread_mut(tid).set_state(ThreadState::Blocked);
                Ok(())
            },
            ThreadState::Blocked => Ok(()),
            ThreadState::Sleeping => {
                // already in the blocked set; the state tag records the overlay
                self.thread_mut(tid).set_state(ThreadState::Blocked);
                Ok(())
            },
            ThreadState::Terminated => Err(no_such_thread(tid)),
        }
    }

    /// Resumes thread `tid`. A blocked thread goes READY; a sleeping thread
    /// that was also explicitly blocked drops the block and keeps sleeping;
    /// anything else is left alone.
    pub fn resume(&mut self, tid: Tid) -> Result<(), Fail> {
        let state: ThreadState = match self.threads.get(&tid) {
            Some(thread) => thread.state(),
            None => return Err(no_such_thread(tid)),
        };
        match state {
            ThreadState::Blocked if self.sleeping.contains_key(&tid) => {
                self.thread_mut(tid).set_state(ThreadState::Sleeping);
                Ok(())
            },
            ThreadState::Blocked => {
                self.blocked.remove(&tid);
                self.make_ready(tid);
                Ok(())
            },
            ThreadState::Running | ThreadState::Ready | ThreadState::Sleeping => Ok(()),
            ThreadState::Terminated => Err(no_such_thread(tid)),
        }
    }

    /// Puts the running thread to sleep for `num_quantums` quanta and switches
    /// away. The quantum in which the call is made does not count.
    pub fn sleep(&mut self, num_quantums: u64) -> Result<(), Fail> {
        if self.ready.is_empty() {
            return Err(Fail::new(libc::EAGAIN, "cannot sleep the only runnable thread"));
        }
        self.enter_sleep(num_quantums);
        self.switch_from_running()
    }

    /// Destroys thread `tid` and releases its identifier. Terminating the
    /// running thread parks its storage for a deferred reap and does not
    /// return.
    pub fn terminate(&mut self, tid: Tid) -> Result<(), Fail> {
        if !self.threads.contains_key(&tid) {
            return Err(no_such_thread(tid));
        }
        if tid == self.running {
            self.terminate_running()
        } else {
            self.unlink(tid);
            self.threads.remove(&tid);
            self.tids.release(tid);
            Ok(())
        }
    }

    /// Detaches the running thread's control block from the tables without
    /// freeing it. Teardown runs on that thread's stack and must not reclaim
    /// it.
    pub fn leak_running(&mut self) {
        if let Some(thread) = self.threads.remove(&self.running) {
            Box::leak(thread);
        }
    }

    /// Involuntary switch at quantum expiry: the running thread goes to the
    /// tail of the ready queue and the queue head takes the CPU. When the
    /// running thread is the only runnable one, a fresh quantum commences with
    /// no switch.
    pub fn preempt(&mut self) {
        // free any parked victim before touching the queue; the reap folded
        // into dispatch() below then has nothing left to do
        self.reap();
        let prev: Tid = self.running;
        self.thread_mut(prev).set_state(ThreadState::Ready);
        self.ready.push_back(prev);
        let next: Tid = self.ready.pop_front().expect("queue cannot be empty, a thread was just enqueued");
        self.dispatch(next);
        if next == prev {
            return;
        }
        let prev_ctx: *mut Context = self.thread_mut(prev).context_mut();
        let next_ctx: *const Context = self.thread(next).context();
        // returns when `prev` is next dispatched; until then control is elsewhere
        if let Err(e) = unsafe { Context::swap(prev_ctx, next_ctx) } {
            runtime::fatal(&e.cause);
        }
    }

    /// Records the running thread into the sleeping map and the blocked set.
    fn enter_sleep(&mut self, num_quantums: u64) {
        let tid: Tid = self.running;
        let deadline: u64 = self.total_quantums + num_quantums;
        if self.next_sleep_check == 0 || deadline < self.next_sleep_check {
            self.next_sleep_check = deadline;
        }
        self.sleeping.insert(tid, deadline);
        self.blocked.insert(tid);
        self.thread_mut(tid).set_state(ThreadState::Sleeping);
    }

    /// Terminates the running thread. Its stack is the one this very call
    /// executes on, so the control block is parked rather than freed, and the
    /// switch to the next thread discards the current context instead of
    /// saving it.
    fn terminate_running(&mut self) -> Result<(), Fail> {
        // the slot holds at most one victim: empty it before parking another.
        // The previous victim's stack is long off the CPU; this thread's is
        // not, which is what reap_skip tells the reap in dispatch() below.
        self.reap();
        let tid: Tid = self.running;
        self.unlink(tid);
        let mut victim: Box<Thread> = self.threads.remove(&tid).expect("running thread is live");
        victim.set_state(ThreadState::Terminated);
        self.tids.release(tid);
        self.reap_slot = Some(victim);
        self.reap_skip = true;
        let next: Tid = match self.ready.pop_front() {
            Some(next) => next,
            None => runtime::fatal("ready queue empty at a termination switch"),
        };
        self.dispatch(next);
        let next_ctx: *const Context = self.thread(next).context();
        let fail: Fail = unsafe { (*next_ctx).resume() };
        runtime::fatal(&fail.cause)
    }

    /// Saves the running thread's context and dispatches the ready-queue head.
    /// Returns after a later switch resumes the caller.
    fn switch_from_running(&mut self) -> Result<(), Fail> {
        let prev: Tid = self.running;
        let next: Tid = match self.ready.pop_front() {
            Some(next) => next,
            None => runtime::fatal("ready queue empty at a voluntary switch"),
        };
        self.dispatch(next);
        let prev_ctx: *mut Context = self.thread_mut(prev).context_mut();
        let next_ctx: *const Context = self.thread(next).context();
        match unsafe { Context::swap(prev_ctx, next_ctx) } {
            Ok(()) => Ok(()),
            Err(e) => runtime::fatal(&e.cause),
        }
    }

    /// Marks `next` as the running thread, commences its quantum, and arms the
    /// timer.
    fn dispatch(&mut self, next: Tid) {
        self.take_cpu(next);
        if let Err(e) = timer::arm(self.quantum_usecs) {
            runtime::fatal(&e.cause);
        }
    }

    /// Table half of [Self::dispatch]: running-thread bookkeeping without
    /// touching the timer.
    fn take_cpu(&mut self, next: Tid) {
        self.running = next;
        self.thread_mut(next).set_state(ThreadState::Running);
        self.begin_quantum();
    }

    /// Bookkeeping at every quantum commencement: deferred reap, quantum
    /// counters, and the wake scan when a sleep deadline has arrived.
    fn begin_quantum(&mut self) {
        self.reap();
        let running: Tid = self.running;
        self.thread_mut(running).increment_quantum();
        self.total_quantums += 1;
        if self.total_quantums == self.next_sleep_check {
            self.wake_sleepers();
        }
    }

    /// Frees the parked control block of a self-terminated thread, unless its
    /// stack may still be in use by the switch that parked it.
    fn reap(&mut self) {
        if self.reap_skip {
            self.reap_skip = false;
            return;
        }
        self.reap_slot = None;
    }

    /// Quantum-boundary pass over the sleeping map. Due entries leave the map;
    /// a pure sleeper goes READY, while a sleeper that was explicitly blocked
    /// stays blocked until resumed. Recomputes the next deadline to watch for.
    fn wake_sleepers(&mut self) {
        let due: Vec<Tid> = self
            .sleeping
            .iter()
            .filter(|(_, &deadline)| deadline == self.next_sleep_check)
            .map(|(&tid, _)| tid)
            .collect();
        for tid in due {
            self.sleeping.remove(&tid);
            if self.thread(tid).state() == ThreadState::Sleeping {
                self.thread_mut(tid).set_state(ThreadState::Blocked);
                self.blocked.remove(&tid);
                self.make_ready(tid);
            }
        }
        self.next_sleep_check = self.sleeping.values().copied().min().unwrap_or(0);
    }

    /// Appends `tid` to the ready queue.
    fn make_ready(&mut self, tid: Tid) {
        self.thread_mut(tid).set_state(ThreadState::Ready);
        self.ready.push_back(tid);
    }

    /// Removes `tid` from the ready queue, the blocked set, and the sleeping
    /// map, keeping the next-deadline watermark honest.
    fn unlink(&mut self, tid: Tid) {
        self.ready.retain(|&queued| queued != tid);
        self.blocked.remove(&tid);
        if self.sleeping.remove(&tid).is_some() {
            self.next_sleep_check = self.sleeping.values().copied().min().unwrap_or(0);
        }
    }

    fn thread(&self, tid: Tid) -> &Thread {
        self.threads.get(&tid).expect("live thread missing from the index")
    }

    fn thread_mut(&mut self, tid: Tid) -> &mut Thread {
        self.threads.get_mut(&tid).expect("live thread missing from the index")
    }
}

#[cfg(test)]
impl Scheduler {
    /// Asserts the scheduler-table invariants. Test support.
    pub(crate) fn check_invariants(&self) {
        use ThreadState::*;

        // exactly one RUNNING thread, and it is the one on record
        let running: &Thread = self.threads.get(&self.running).expect("running thread is live");
        assert_eq!(running.state(), Running);
        assert_eq!(self.threads.values().filter(|t| t.state() == Running).count(), 1);

        // the ready queue holds precisely the READY threads, each once
        let mut queued: HashSet<Tid> = HashSet::new();
        for &tid in &self.ready {
            assert!(queued.insert(tid), "thread {:?} queued twice", tid);
            assert_eq!(self.threads[&tid].state(), Ready);
        }
        assert_eq!(queued.len(), self.threads.values().filter(|t| t.state() == Ready).count());

        // the blocked set holds precisely the BLOCKED and SLEEPING threads
        for (tid, thread) in &self.threads {
            assert_eq!(
                self.blocked.contains(tid),
                matches!(thread.state(), Blocked | Sleeping),
                "blocked-set membership out of sync for {:?}",
                tid
            );
        }
        for tid in &self.blocked {
            assert!(self.threads.contains_key(tid));
        }

        // sleeping-map entries are suspended threads with future-or-due deadlines,
        // and every pure sleeper has one
        for (tid, &deadline) in &self.sleeping {
            assert!(matches!(self.threads[tid].state(), Sleeping | Blocked));
            assert!(self.blocked.contains(tid));
            assert!(deadline > 0);
        }
        for (tid, thread) in &self.threads {
            if thread.state() == Sleeping {
                assert!(self.sleeping.contains_key(tid), "sleeper {:?} has no deadline", tid);
            }
        }

        // the watermark is the minimum outstanding deadline
        assert_eq!(self.next_sleep_check, self.sleeping.values().copied().min().unwrap_or(0));

        // the index is keyed by the identifiers the control blocks carry
        for (tid, thread) in &self.threads {
            assert_eq!(thread.tid(), *tid);
        }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// The process-wide scheduler, if initialized.
///
/// # Safety
///
/// The caller must hold the preemption signal blocked (the gate) and must be
/// the process's only kernel thread, so that no timer handler and no other
/// caller can alias the returned reference.
pub(crate) unsafe fn instance() -> Option<&'static mut Scheduler> {
    (*ptr::addr_of_mut!(SCHEDULER)).as_mut()
}

/// Installs the process-wide scheduler.
///
/// # Safety
///
/// Same contract as [instance].
pub(crate) unsafe fn set_instance(sched: Scheduler) {
    *ptr::addr_of_mut!(SCHEDULER) = Some(sched);
}

/// Removes and returns the process-wide scheduler.
///
/// # Safety
///
/// Same contract as [instance].
pub(crate) unsafe fn take_instance() -> Option<Scheduler> {
    (*ptr::addr_of_mut!(SCHEDULER)).take()
}

/// First frame of every spawned thread: runs the user entry point, and tears
/// the thread down if the entry point returns instead of terminating itself.
extern "C" fn thread_trampoline() {
    let (tid, entry): (Tid, ThreadEntryPoint) = {
        let _gate: PreemptGate = match PreemptGate::enter() {
            Ok(gate) => gate,
            Err(e) => runtime::fatal(&e.cause),
        };
        // SAFETY: the gate is held and user code holds no scheduler reference.
        match unsafe { instance() } {
            Some(sched) => {
                let tid: Tid = sched.current();
                let entry: ThreadEntryPoint = sched
                    .thread(tid)
                    .entry()
                    .expect("spawned thread has an entry point");
                (tid, entry)
            },
            None => runtime::fatal("thread dispatched with no scheduler"),
        }
    };
    entry();
    let _ = crate::catwheel::libos::terminate(tid);
    unreachable!("terminated thread kept running");
}

fn no_such_thread(tid: Tid) -> Fail {
    let cause: String = format!("no live thread with id {}", i32::from(tid));
    Fail::new(libc::ESRCH, &cause)
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
