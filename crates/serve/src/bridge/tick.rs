// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic tick emitter: synthetic `timer.tick` envelopes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use holon_core::envelope::EventEnvelope;
use holon_core::mint_id;

use super::{feed, BridgeError, EnvelopeSink, EnvelopeSource};

/// Emits one synthetic tick per interval.
pub struct TickSource {
    pub interval: Duration,
}

impl TickSource {
    /// Dedupe key derived from the truncated time bucket, so a tick
    /// delivered twice (restart inside one interval) carries the same
    /// idempotency token.
    pub(crate) fn dedupe_key(interval: Duration, epoch_secs: i64) -> String {
        let bucket_len = interval.as_secs().max(1) as i64;
        let bucket = epoch_secs - epoch_secs.rem_euclid(bucket_len);
        format!("timer.tick:{}", bucket)
    }

    fn envelope(&self) -> EventEnvelope {
        let envelope = EventEnvelope::new(mint_id("tick-"), "timer", "timer.tick");
        let dedupe = Self::dedupe_key(self.interval, envelope.at.timestamp());
        envelope.dedupe_key(dedupe)
    }
}

#[async_trait]
impl EnvelopeSource for TickSource {
    fn name(&self) -> &'static str {
        "timer"
    }

    async fn run(
        self: Box<Self>,
        sink: Arc<dyn EnvelopeSink>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The immediate first tick is skipped; ticks mark elapsed time.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }
            if !feed(&sink, "timer", self.envelope()).await {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
#[path = "tick_tests.rs"]
mod tests;
