// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake runner and RPC client for tests.
//!
//! Both record their calls and play back scripted results so scheduler and
//! dispatcher tests can run without Docker or a live runtime.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use holon_core::EventEnvelope;

use crate::rpc::{RpcError, RuntimeClient, RuntimeResponse};
use crate::runner::{RunnerError, RunnerExit, SessionConfig, SessionHandle, SessionRunner};

/// Scripted outcome for a fake RPC call.
#[derive(Debug, Clone)]
pub enum FakeRpcResult {
    Ok(RuntimeResponse),
    /// Connection-refused style transport failure (retryable).
    RetryableTransport,
    NotFound,
    Fail(String),
}

impl FakeRpcResult {
    fn into_result(self) -> Result<RuntimeResponse, RpcError> {
        match self {
            Self::Ok(response) => Ok(response),
            Self::RetryableTransport => Err(RpcError::Transport {
                context: "connect".into(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "fake refuse"),
            }),
            Self::NotFound => Err(RpcError::Http { status: 404, body: String::new() }),
            Self::Fail(message) => Err(RpcError::Protocol(message)),
        }
    }
}

/// Convenience constructor for scripted responses.
pub fn response(status: &str) -> RuntimeResponse {
    RuntimeResponse { status: status.into(), ..Default::default() }
}

/// Fake [`RuntimeClient`] with scripted per-endpoint queues.
///
/// When a queue is empty: posts succeed as `accepted` (echoing the
/// envelope's turn metadata and minting `event_id = "rt-" + envelope.id`),
/// status polls return `completed`, cancels return `interrupted`, and
/// health follows the `healthy` flag.
#[derive(Default)]
pub struct FakeRuntimeClient {
    pub posts: Mutex<Vec<(EventEnvelope, Option<String>)>>,
    pub status_calls: Mutex<Vec<String>>,
    pub cancel_calls: Mutex<Vec<(String, String)>>,
    post_script: Mutex<VecDeque<FakeRpcResult>>,
    status_script: Mutex<VecDeque<FakeRpcResult>>,
    cancel_script: Mutex<VecDeque<FakeRpcResult>>,
    healthy: AtomicBool,
}

impl FakeRuntimeClient {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.healthy.store(true, Ordering::SeqCst);
        fake
    }

    pub fn script_post(&self, result: FakeRpcResult) {
        self.post_script.lock().push_back(result);
    }

    pub fn script_status(&self, result: FakeRpcResult) {
        self.status_script.lock().push_back(result);
    }

    pub fn script_cancel(&self, result: FakeRpcResult) {
        self.cancel_script.lock().push_back(result);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntimeClient {
    async fn post_event(
        &self,
        envelope: &EventEnvelope,
        session_key: Option<&str>,
    ) -> Result<RuntimeResponse, RpcError> {
        self.posts.lock().push((envelope.clone(), session_key.map(str::to_string)));
        if let Some(scripted) = self.post_script.lock().pop_front() {
            return scripted.into_result();
        }
        Ok(RuntimeResponse {
            status: "accepted".into(),
            event_id: Some(format!("rt-{}", envelope.id)),
            turn_id: envelope.turn_id().map(str::to_string),
            thread_id: envelope.thread_id().map(str::to_string),
            ..Default::default()
        })
    }

    async fn event_status(&self, event_id: &str) -> Result<RuntimeResponse, RpcError> {
        self.status_calls.lock().push(event_id.to_string());
        if let Some(scripted) = self.status_script.lock().pop_front() {
            return scripted.into_result();
        }
        Ok(response("completed"))
    }

    async fn cancel_event(
        &self,
        event_id: &str,
        reason: &str,
    ) -> Result<RuntimeResponse, RpcError> {
        self.cancel_calls.lock().push((event_id.to_string(), reason.to_string()));
        if let Some(scripted) = self.cancel_script.lock().pop_front() {
            return scripted.into_result();
        }
        Ok(response("interrupted"))
    }

    async fn health(&self) -> Result<(), RpcError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RpcError::Transport {
                context: "connect".into(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "unhealthy"),
            })
        }
    }
}

/// Fake [`SessionRunner`] recording starts/stops; `wait` blocks until the
/// test calls [`FakeSessionRunner::trigger_exit`].
#[derive(Default)]
pub struct FakeSessionRunner {
    pub starts: Mutex<Vec<SessionConfig>>,
    pub stops: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    exit: Mutex<Option<RunnerExit>>,
    exit_notify: tokio::sync::Notify,
    fail_next_start: AtomicBool,
}

impl FakeSessionRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `start` call fail.
    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    /// Unblock pending `wait` calls with the given exit.
    pub fn trigger_exit(&self, exit: RunnerExit) {
        *self.exit.lock() = Some(exit);
        self.exit_notify.notify_waiters();
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().len()
    }
}

#[async_trait]
impl SessionRunner for FakeSessionRunner {
    async fn start(&self, config: SessionConfig) -> Result<SessionHandle, RunnerError> {
        if self.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(RunnerError::StartFailed("fake start failure".into()));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let name = config.name.clone();
        self.starts.lock().push(config);
        Ok(SessionHandle::for_tests(format!("{:012x}", n + 0xabc), name))
    }

    async fn wait(&self, _handle: &SessionHandle) -> Result<RunnerExit, RunnerError> {
        loop {
            let notified = self.exit_notify.notified();
            if let Some(exit) = self.exit.lock().take() {
                return Ok(exit);
            }
            notified.await;
        }
    }

    async fn stop(&self, handle: &SessionHandle) -> Result<(), RunnerError> {
        self.stops.lock().push(handle.container_id.clone());
        Ok(())
    }
}
