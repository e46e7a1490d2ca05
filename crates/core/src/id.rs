// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID minting for synthetic envelopes.
//!
//! Envelope and turn ids are normally caller-provided (webhook delivery
//! ids, RPC turn ids); minting is only needed for events the controller
//! fabricates itself (timer ticks, warmup probes).

/// Mint a random id with a type prefix, e.g. `mint_id("tick-")`.
///
/// Format is `{prefix}{nanoid}` with a 19-character nanoid suffix.
pub fn mint_id(prefix: &str) -> String {
    format!("{}{}", prefix, nanoid::nanoid!(19))
}

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[..n]
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
