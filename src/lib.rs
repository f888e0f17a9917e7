// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Catwheel: a preemptive user-level threading library.
//!
//! Catwheel multiplexes many lightweight threads of control onto the single
//! kernel thread of the host process. Each thread owns a private stack and a
//! saved machine context; a switch is a direct register save/restore, and
//! preemption is driven by a virtual-time interval timer whose signal ends the
//! running thread's quantum. Scheduling is FIFO round-robin.

mod pal;

pub mod runtime;

pub mod catwheel;

#[macro_use]
extern crate log;

pub use crate::{
    catwheel::{
        bindings,
        libos,
    },
    runtime::{
        fail::Fail,
        limits::{
            MAX_THREAD_NUM,
            STACK_SIZE,
        },
        scheduler::{
            ThreadEntryPoint,
            Tid,
        },
    },
};

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, bailing out with an [anyhow::Error] otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    ::anyhow::bail!(
                        "ensure_eq!({}, {}) failed: {:?} != {:?}",
                        stringify!($left),
                        stringify!($right),
                        left_val,
                        right_val
                    );
                }
            },
        }
    };
}

/// Ensures that two expressions are not equal, bailing out with an [anyhow::Error] otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    ::anyhow::bail!(
                        "ensure_neq!({}, {}) failed: both are {:?}",
                        stringify!($left),
                        stringify!($right),
                        left_val
                    );
                }
            },
        }
    };
}
