// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// PAL: Platform Abstraction Layer
//======================================================================================================================

// This layer hides the platform-specific plumbing that the scheduler stands on: the preemption signal, the
// virtual-time interval timer, and the machine-context save/restore primitives. Everything above it deals in
// [crate::runtime::fail::Fail] results rather than raw return codes and errno.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use self::linux::*;
