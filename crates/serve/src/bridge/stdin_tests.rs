// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bridge::test_support::CollectingSink;
use std::io::Write;

fn envelope_line(id: &str) -> String {
    format!(
        "{{\"id\":\"{id}\",\"source\":\"github\",\"type\":\"issues.opened\",\"at\":\"2026-01-01T00:00:00Z\"}}"
    )
}

#[tokio::test]
async fn reads_envelopes_until_eof() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{}", envelope_line("e1")).unwrap();
    writeln!(file).unwrap();
    writeln!(file, "not json at all").unwrap();
    writeln!(file, "{}", envelope_line("e2")).unwrap();

    let sink = CollectingSink::new();
    let source = Box::new(StdinFileSource {
        path: Some(file.path().to_path_buf()),
        max_events: None,
    });
    source.run(sink.clone() as Arc<dyn EnvelopeSink>, CancellationToken::new()).await.unwrap();

    assert_eq!(sink.ids(), vec!["e1", "e2"]);
}

#[tokio::test]
async fn max_events_bounds_processing() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..5 {
        writeln!(file, "{}", envelope_line(&format!("e{i}"))).unwrap();
    }

    let sink = CollectingSink::new();
    let source = Box::new(StdinFileSource {
        path: Some(file.path().to_path_buf()),
        max_events: Some(2),
    });
    source.run(sink.clone() as Arc<dyn EnvelopeSink>, CancellationToken::new()).await.unwrap();

    assert_eq!(sink.ids(), vec!["e0", "e1"]);
}

#[tokio::test]
async fn closed_sink_stops_the_source() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..5 {
        writeln!(file, "{}", envelope_line(&format!("e{i}"))).unwrap();
    }

    let sink = CollectingSink::new();
    sink.close();
    let source = Box::new(StdinFileSource { path: Some(file.path().to_path_buf()), max_events: None });
    source.run(sink.clone() as Arc<dyn EnvelopeSink>, CancellationToken::new()).await.unwrap();

    assert!(sink.ids().is_empty());
}

#[tokio::test]
async fn missing_file_is_an_error() {
    let sink = CollectingSink::new();
    let source = Box::new(StdinFileSource {
        path: Some(std::path::PathBuf::from("/definitely/missing.ndjson")),
        max_events: None,
    });
    assert!(source
        .run(sink as Arc<dyn EnvelopeSink>, CancellationToken::new())
        .await
        .is_err());
}
