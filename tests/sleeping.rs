// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Sleep bookkeeping end to end: a sleeper is off the CPU until its deadline,
//! an explicit block outlives the sleep, and resuming a blocked sleeper
//! cancels the block without cancelling the sleep.

mod common;

use ::catwheel::{
    libos,
    Tid,
};
use ::std::sync::atomic::{
    AtomicBool,
    AtomicU64,
    Ordering,
};

const QUANTUM_USECS: i32 = 10_000;

static STARTED: [AtomicBool; 3] = [AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)];
static SLEPT_AT: [AtomicU64; 3] = [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)];
static WOKE_AT: [AtomicU64; 3] = [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)];
static WOKE: [AtomicBool; 3] = [AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false)];

fn sleeper_body(slot: usize, num_quantums: i32) {
    STARTED[slot].store(true, Ordering::SeqCst);
    SLEPT_AT[slot].store(common::total(), Ordering::SeqCst);
    libos::sleep(num_quantums).expect("sleep");
    WOKE_AT[slot].store(common::total(), Ordering::SeqCst);
    WOKE[slot].store(true, Ordering::SeqCst);
    loop {
        ::std::hint::spin_loop();
    }
}

extern "C" fn plain_sleeper() {
    sleeper_body(0, 3);
}

extern "C" fn overlaid_sleeper() {
    sleeper_body(1, 5);
}

extern "C" fn downgraded_sleeper() {
    sleeper_body(2, 4);
}

fn main() {
    libos::init(QUANTUM_USECS).expect("init");

    // a plain sleeper misses its quanta and comes back at the deadline
    let first: Tid = libos::spawn(plain_sleeper).expect("spawn");
    common::spin_until(|| STARTED[0].load(Ordering::SeqCst), 16);
    common::spin_until(|| WOKE[0].load(Ordering::SeqCst), 32);
    let deadline: u64 = SLEPT_AT[0].load(Ordering::SeqCst) + 3;
    assert!(
        WOKE_AT[0].load(Ordering::SeqCst) >= deadline,
        "sleeper ran before its deadline"
    );
    libos::terminate(first).expect("terminate");

    // an explicit block keeps a sleeper suspended past its expired deadline
    let second: Tid = libos::spawn(overlaid_sleeper).expect("spawn");
    common::spin_until(|| STARTED[1].load(Ordering::SeqCst), 16);
    libos::block(second).expect("block");
    let deadline: u64 = SLEPT_AT[1].load(Ordering::SeqCst) + 5;
    common::spin_until(|| common::total() >= deadline + 2, 16);
    assert!(
        !WOKE[1].load(Ordering::SeqCst),
        "blocked sleeper woke although never resumed"
    );
    libos::resume(second).expect("resume");
    common::spin_until(|| WOKE[1].load(Ordering::SeqCst), 16);
    assert!(WOKE_AT[1].load(Ordering::SeqCst) > deadline);
    libos::terminate(second).expect("terminate");

    // resuming a blocked sleeper cancels the block; the sleep still runs out
    let third: Tid = libos::spawn(downgraded_sleeper).expect("spawn");
    common::spin_until(|| STARTED[2].load(Ordering::SeqCst), 16);
    libos::block(third).expect("block");
    libos::resume(third).expect("resume");
    common::spin_until(|| WOKE[2].load(Ordering::SeqCst), 32);
    let deadline: u64 = SLEPT_AT[2].load(Ordering::SeqCst) + 4;
    assert!(
        WOKE_AT[2].load(Ordering::SeqCst) >= deadline,
        "cancelling the block cancelled the sleep"
    );
    libos::terminate(third).expect("terminate");

    libos::terminate(Tid(0)).expect("terminate(0) exits the process");
    unreachable!("terminate(0) returned");
}
