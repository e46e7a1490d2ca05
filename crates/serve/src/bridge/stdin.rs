// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stdin/file ingress: one JSON envelope per line, EOF stops the service.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use holon_core::envelope::EventEnvelope;

use super::{feed, BridgeError, EnvelopeSink, EnvelopeSource};

/// Reads envelopes line-by-line from a file or standard input.
pub struct StdinFileSource {
    /// `None` reads standard input.
    pub path: Option<PathBuf>,
    /// Bound on total processed envelopes.
    pub max_events: Option<u64>,
}

impl StdinFileSource {
    async fn pump<R>(
        &self,
        reader: R,
        sink: Arc<dyn EnvelopeSink>,
        cancel: CancellationToken,
    ) -> Result<u64, BridgeError>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        let mut processed: u64 = 0;

        loop {
            if let Some(max) = self.max_events {
                if processed >= max {
                    tracing::info!(max, "max events reached, stopping input");
                    break;
                }
            }

            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let envelope: EventEnvelope = match serde_json::from_str(line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed input line");
                    continue;
                }
            };

            processed += 1;
            if !feed(&sink, "stdin-file", envelope).await {
                break;
            }
        }
        Ok(processed)
    }
}

#[async_trait]
impl EnvelopeSource for StdinFileSource {
    fn name(&self) -> &'static str {
        "stdin-file"
    }

    async fn run(
        self: Box<Self>,
        sink: Arc<dyn EnvelopeSink>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        let processed = match &self.path {
            Some(path) => {
                let file = tokio::fs::File::open(path).await?;
                self.pump(file, sink, cancel).await?
            }
            None => self.pump(tokio::io::stdin(), sink, cancel).await?,
        };
        tracing::info!(processed, "input exhausted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "stdin_tests.rs"]
mod tests;
