// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! C bindings for the threading library, following the classic `uthread_*`
//! interface: operations return 0 (or an identifier) on success and -1 on
//! failure, with the cause reported on the diagnostic channel.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    catwheel::libos,
    runtime::scheduler::{
        ThreadEntryPoint,
        Tid,
    },
};
use ::libc::c_int;

//======================================================================================================================
// init
//======================================================================================================================

#[no_mangle]
pub extern "C" fn uthread_init(quantum_usecs: c_int) -> c_int {
    match libos::init(quantum_usecs) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

//======================================================================================================================
// spawn
//======================================================================================================================

#[no_mangle]
pub extern "C" fn uthread_spawn(entry: Option<ThreadEntryPoint>) -> c_int {
    let entry: ThreadEntryPoint = match entry {
        Some(entry) => entry,
        None => {
            eprintln!("thread library error: null entry point");
            return -1;
        },
    };
    match libos::spawn(entry) {
        Ok(tid) => tid.into(),
        Err(_) => -1,
    }
}

//======================================================================================================================
// terminate
//======================================================================================================================

#[no_mangle]
pub extern "C" fn uthread_terminate(tid: c_int) -> c_int {
    match libos::terminate(Tid::from(tid)) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

//======================================================================================================================
// block
//======================================================================================================================

#[no_mangle]
pub extern "C" fn uthread_block(tid: c_int) -> c_int {
    match libos::block(Tid::from(tid)) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

//======================================================================================================================
// resume
//======================================================================================================================

#[no_mangle]
pub extern "C" fn uthread_resume(tid: c_int) -> c_int {
    match libos::resume(Tid::from(tid)) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

//======================================================================================================================
// sleep
//======================================================================================================================

#[no_mangle]
pub extern "C" fn uthread_sleep(num_quantums: c_int) -> c_int {
    match libos::sleep(num_quantums) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

//======================================================================================================================
// get_tid
//======================================================================================================================

#[no_mangle]
pub extern "C" fn uthread_get_tid() -> c_int {
    match libos::get_tid() {
        Ok(tid) => tid.into(),
        Err(_) => -1,
    }
}

//======================================================================================================================
// get_total_quantums
//======================================================================================================================

#[no_mangle]
pub extern "C" fn uthread_get_total_quantums() -> c_int {
    match libos::get_total_quantums() {
        Ok(total) => total as c_int,
        Err(_) => -1,
    }
}

//======================================================================================================================
// get_quantums
//======================================================================================================================

#[no_mangle]
pub extern "C" fn uthread_get_quantums(tid: c_int) -> c_int {
    match libos::get_quantums(Tid::from(tid)) {
        Ok(quantums) => quantums as c_int,
        Err(_) => -1,
    }
}
