// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription bridge: ingress adapters producing event envelopes.
//!
//! Each ingress mode is a producer strategy behind the [`EnvelopeSource`]
//! trait, feeding normalized envelopes into an [`EnvelopeSink`] (the serve
//! handler). Modes are mutually exclusive; any of them may additionally
//! run the tick emitter.

pub mod stdin;
pub mod subscription;
pub mod tick;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use holon_core::envelope::EventEnvelope;

use crate::scheduler::EnqueueError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind webhook port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Accepts normalized envelopes for scheduling.
#[async_trait]
pub trait EnvelopeSink: Send + Sync + 'static {
    async fn accept(&self, envelope: EventEnvelope) -> Result<(), EnqueueError>;
}

/// A producer of envelopes (stdin/file, webhook, subscriptions, ticks).
#[async_trait]
pub trait EnvelopeSource: Send + 'static {
    fn name(&self) -> &'static str;

    /// Run until exhausted (EOF, max events) or cancelled.
    async fn run(
        self: Box<Self>,
        sink: Arc<dyn EnvelopeSink>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError>;
}

/// Enqueue with source-loop error handling: backpressure failures are
/// logged and dropped (the source's durability is upstream), a closed
/// handler ends the loop.
pub(crate) async fn feed(
    sink: &Arc<dyn EnvelopeSink>,
    source: &'static str,
    envelope: EventEnvelope,
) -> bool {
    let event_id = envelope.id.clone();
    match sink.accept(envelope).await {
        Ok(()) => true,
        Err(EnqueueError::QueueFull { .. }) => {
            tracing::warn!(source, event_id = %event_id, "enqueue rejected by backpressure");
            true
        }
        Err(EnqueueError::Closed) => {
            tracing::info!(source, "handler closed, stopping source");
            false
        }
    }
}
