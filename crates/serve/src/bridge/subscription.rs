// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription ingress: the default mode when no `--input` is given.
//!
//! Loads the agent's repo subscriptions and, when a webhook port is
//! configured, opens the listener that feeds normalized envelopes in.
//! Without a port the mode is passive (diagnostics carries the warning).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{webhook::WebhookSource, BridgeError, EnvelopeSink, EnvelopeSource};

/// One repo subscription from `subscriptions.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub repo: String,
    #[serde(default)]
    pub reason: String,
}

/// Load subscriptions from `<agent_home>/subscriptions.json`.
/// Missing file → empty list; malformed file → error.
pub fn load_subscriptions(agent_home: &Path) -> std::io::Result<Vec<Subscription>> {
    let path = agent_home.join("subscriptions.json");
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    serde_json::from_str(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Subscription-manager source.
pub struct SubscriptionSource {
    pub agent_home: PathBuf,
    pub webhook_port: Option<u16>,
}

#[async_trait]
impl EnvelopeSource for SubscriptionSource {
    fn name(&self) -> &'static str {
        "subscription"
    }

    async fn run(
        self: Box<Self>,
        sink: Arc<dyn EnvelopeSink>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        let subscriptions = load_subscriptions(&self.agent_home)?;
        tracing::info!(count = subscriptions.len(), "subscriptions loaded");

        match self.webhook_port {
            Some(port) => Box::new(WebhookSource { port }).run(sink, cancel).await,
            None => {
                // Passive: nothing to ingest until a webhook is configured.
                cancel.cancelled().await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
