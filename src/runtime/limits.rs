// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

/// Number of bytes in a spawned thread's private stack. The main thread keeps
/// the host stack and ignores this. Stack overflow is not detected.
pub const STACK_SIZE: usize = 64 * 1024;

/// Inclusive upper bound on simultaneously live threads, the main thread
/// included.
pub const MAX_THREAD_NUM: usize = 100;

const _: () = assert!(STACK_SIZE % 16 == 0);
const _: () = assert!(MAX_THREAD_NUM >= 2);
