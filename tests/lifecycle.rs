// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Thread lifecycle end to end: argument validation, the spawn cap, identifier
//! recycling, self-termination with its deferred reap, and the final
//! terminate(0) that takes the process down with status 0.

mod common;

use ::catwheel::{
    libos,
    Tid,
    MAX_THREAD_NUM,
};
use ::std::sync::atomic::{
    AtomicBool,
    Ordering,
};

const QUANTUM_USECS: i32 = 10_000;

static STARTED: AtomicBool = AtomicBool::new(false);
static RETURNED: AtomicBool = AtomicBool::new(false);

extern "C" fn busy() {
    loop {
        ::std::hint::spin_loop();
    }
}

extern "C" fn self_terminator() {
    STARTED.store(true, Ordering::SeqCst);
    let tid: Tid = libos::get_tid().expect("get_tid");
    let _ = libos::terminate(tid);
    // terminate(self) must never return
    RETURNED.store(true, Ordering::SeqCst);
}

fn main() {
    // nothing works before init
    assert!(libos::get_tid().is_err());
    assert!(libos::block(Tid(1)).is_err());

    // and init itself validates its argument
    assert!(libos::init(0).is_err());
    assert!(libos::init(-7).is_err());
    libos::init(QUANTUM_USECS).expect("init");
    assert!(libos::init(QUANTUM_USECS).is_err());
    assert_eq!(common::total(), 1);

    // user errors leave no trace
    assert!(libos::block(Tid(0)).is_err());
    assert!(libos::block(Tid(42)).is_err());
    assert!(libos::resume(Tid(9)).is_err());
    assert!(libos::sleep(2).is_err());
    assert!(libos::terminate(Tid(5)).is_err());
    assert!(libos::get_quantums(Tid(3)).is_err());
    assert_eq!(libos::get_tid().expect("get_tid"), Tid(0));

    // a thread may terminate itself; its id vanishes and its code never resumes
    let first: Tid = libos::spawn(self_terminator).expect("spawn");
    assert_eq!(first, Tid(1));
    common::spin_until(
        || STARTED.load(Ordering::SeqCst) && libos::get_quantums(first).is_err(),
        16,
    );
    common::spin_quanta(2); // outlive the deferred reap of its stack
    assert!(!RETURNED.load(Ordering::SeqCst));

    // released identifiers are reissued lowest-first
    assert_eq!(libos::spawn(busy).expect("spawn"), Tid(1));
    let second: Tid = libos::spawn(busy).expect("spawn");
    let third: Tid = libos::spawn(busy).expect("spawn");
    assert_eq!((second, third), (Tid(2), Tid(3)));
    libos::terminate(second).expect("terminate");
    assert_eq!(libos::spawn(busy).expect("spawn"), Tid(2));

    // the cap counts live threads, the main thread included
    let mut extras: Vec<Tid> = Vec::new();
    for _ in 4..MAX_THREAD_NUM {
        extras.push(libos::spawn(busy).expect("spawn"));
    }
    assert!(libos::spawn(busy).is_err());

    // tearing the herd down frees ids and capacity again
    for tid in extras {
        libos::terminate(tid).expect("terminate");
    }
    for tid in [Tid(1), Tid(2), Tid(3)] {
        libos::terminate(tid).expect("terminate");
    }
    assert_eq!(libos::spawn(busy).expect("spawn"), Tid(1));
    libos::terminate(Tid(1)).expect("terminate");

    libos::terminate(Tid(0)).expect("terminate(0) exits the process");
    unreachable!("terminate(0) returned");
}
