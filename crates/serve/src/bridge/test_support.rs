// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared sink fake for bridge tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use holon_core::envelope::EventEnvelope;

use super::EnvelopeSink;
use crate::scheduler::EnqueueError;

#[derive(Default)]
pub(crate) struct CollectingSink {
    pub envelopes: Mutex<Vec<EventEnvelope>>,
    pub closed: std::sync::atomic::AtomicBool,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn ids(&self) -> Vec<String> {
        self.envelopes.lock().iter().map(|e| e.id.clone()).collect()
    }
}

#[async_trait]
impl EnvelopeSink for CollectingSink {
    async fn accept(&self, envelope: EventEnvelope) -> Result<(), EnqueueError> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(EnqueueError::Closed);
        }
        self.envelopes.lock().push(envelope);
        Ok(())
    }
}
