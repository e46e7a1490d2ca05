// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use holon_core::FakeClock;
use std::time::Duration;

#[test]
fn duplicate_within_window_is_seen() {
    let cache = DedupeCache::new(FakeClock::new());
    assert!(!cache.seen("timer.tick:120"));
    assert!(cache.seen("timer.tick:120"));
}

#[test]
fn empty_keys_never_dedupe() {
    let cache = DedupeCache::new(FakeClock::new());
    assert!(!cache.seen(""));
    assert!(!cache.seen(""));
}

#[test]
fn keys_expire_after_the_window() {
    let clock = FakeClock::new();
    let cache = DedupeCache::new(clock.clone());
    assert!(!cache.seen("k1"));
    clock.advance(Duration::from_secs(11 * 60));
    assert!(!cache.seen("k1"), "expired key is accepted again");
    assert!(cache.seen("k1"));
}

#[test]
fn expired_entries_are_swept_past_the_cap() {
    let clock = FakeClock::new();
    let cache = DedupeCache::new(clock.clone());
    for i in 0..4096 {
        assert!(!cache.seen(&format!("k{i}")));
    }
    clock.advance(Duration::from_secs(11 * 60));
    assert!(!cache.seen("fresh"));
    assert_eq!(cache.len(), 1, "stale entries swept on insert past the cap");
}
