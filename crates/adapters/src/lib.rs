// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! holon-adapters: host-side process and transport adapters.
//!
//! - [`runner`] — sandboxed runtime container lifecycle (docker CLI)
//! - [`rpc`] — HTTP-over-Unix-socket channel to the in-container runtime,
//!   with a docker-exec fallback
//! - [`subprocess`] — timeout-guarded external command execution

pub mod rpc;
pub mod runner;
pub mod subprocess;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use rpc::{RpcClient, RpcError, RuntimeClient, RuntimeResponse};
pub use runner::{DockerSessionRunner, RunnerError, RunnerExit, SessionConfig, SessionHandle, SessionRunner};
