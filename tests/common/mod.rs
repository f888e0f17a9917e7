// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Shared plumbing for the end-to-end scenario programs. Everything here
//! burns CPU on purpose: the preemption timer counts virtual time, so a
//! waiting thread has to keep the clock moving.

#![allow(dead_code)]

use ::catwheel::libos;

/// Total quanta commenced so far.
pub fn total() -> u64 {
    libos::get_total_quantums().expect("library is initialized")
}

/// Spins until `cond` holds, panicking if more than `max_quanta` quanta
/// commence first. The bound turns a scheduling bug into a test failure
/// instead of a hang.
pub fn spin_until<F: Fn() -> bool>(cond: F, max_quanta: u64) {
    let start: u64 = total();
    while !cond() {
        assert!(
            total() - start <= max_quanta,
            "condition not reached within {} quanta",
            max_quanta
        );
        ::std::hint::spin_loop();
    }
}

/// Spins until at least `n` further quanta have commenced.
pub fn spin_quanta(n: u64) {
    let start: u64 = total();
    spin_until(|| total() - start >= n, n + 16);
}

/// Evaluates `f` within a single quantum: retries until no quantum boundary
/// interleaves with the read, then returns the quantum count and the value.
/// This is what makes multi-counter assertions exact under preemption.
pub fn at_stable_quantum<T, F: Fn() -> T>(f: F) -> (u64, T) {
    loop {
        let before: u64 = total();
        let value: T = f();
        if total() == before {
            return (before, value);
        }
    }
}
