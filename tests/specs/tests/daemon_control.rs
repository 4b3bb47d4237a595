// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exercises the daemon's control surface over its Unix socket, driving
//! `run()` in-process (no subprocess) against a scratch project root.

use std::time::Duration;

use teleclaude_daemon::Config;
use teleclaude_specs::{scratch_socket_path, unix_http_get, unix_http_post_json, Fixture};

fn test_config(fx: &Fixture, socket: &std::path::Path) -> Config {
    Config {
        socket: socket.to_string_lossy().into_owned(),
        project_root: fx.root().to_path_buf(),
        max_review_rounds: 3,
        poll_interval_ms: 500,
        idle_threshold_samples: 10,
        ring_size: 1 << 16,
        heartbeat_secs: 30,
        staleness_secs: None,
        human_tail_bound: 3_400,
        peer_max_message_length: 4_096,
        log_format: "text".to_owned(),
        log_level: "error".to_owned(),
    }
}

async fn wait_for_socket(path: &std::path::Path) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !path.exists() {
        if tokio::time::Instant::now() > deadline {
            panic!("control socket never appeared at {}", path.display());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn sessions_endpoint_starts_empty() {
    let fx = Fixture::new();
    fx.write_roadmap("# Roadmap\n");
    let socket = scratch_socket_path();

    let handles = teleclaude_daemon::run::run(test_config(&fx, &socket)).await.unwrap();
    wait_for_socket(&socket).await;

    let body = unix_http_get(&socket, "/v1/sessions").await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["sessions"].as_array().unwrap().len(), 0);

    handles.shutdown.cancel();
}

#[tokio::test]
async fn next_prepare_over_control_socket_matches_empty_roadmap_error() {
    let fx = Fixture::new();
    fx.write_roadmap("# Roadmap\n");
    let socket = scratch_socket_path();

    let handles = teleclaude_daemon::run::run(test_config(&fx, &socket)).await.unwrap();
    wait_for_socket(&socket).await;

    let body = unix_http_post_json(&socket, "/v1/next_prepare", &serde_json::json!({})).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["kind"], "Error");
    assert_eq!(parsed["code"], "NO_WORK");

    handles.shutdown.cancel();
}

#[tokio::test]
async fn verify_endpoint_reports_missing_artifacts() {
    let fx = Fixture::new();
    fx.write_roadmap("### [>] alpha — first thing\n");
    let socket = scratch_socket_path();

    let handles = teleclaude_daemon::run::run(test_config(&fx, &socket)).await.unwrap();
    wait_for_socket(&socket).await;

    let body = unix_http_post_json(&socket, "/v1/verify", &serde_json::json!({ "slug": "alpha", "phase": "build" }))
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["passed"], false);
    assert!(!parsed["failures"].as_array().unwrap().is_empty());

    handles.shutdown.cancel();
}

#[tokio::test]
async fn ending_an_unknown_session_is_accepted_idempotently() {
    let fx = Fixture::new();
    fx.write_roadmap("# Roadmap\n");
    let socket = scratch_socket_path();

    let handles = teleclaude_daemon::run::run(test_config(&fx, &socket)).await.unwrap();
    wait_for_socket(&socket).await;

    for _ in 0..2 {
        let body = unix_http_post_json(&socket, "/v1/sessions/does-not-exist/end", &serde_json::json!({}))
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["accepted"], true);
    }

    handles.shutdown.cancel();
}
