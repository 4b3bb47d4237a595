// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for end-to-end tests: a scratch `todos/` tree on disk
//! and a thin Unix-socket HTTP client for the daemon's control surface.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// A scratch work-item tree: `todos/roadmap.md`, `todos/{slug}/`,
/// `trees/{slug}/`, `done/`.
pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        std::fs::create_dir_all(dir.path().join("todos")).unwrap();
        std::fs::create_dir_all(dir.path().join("trees")).unwrap();
        std::fs::create_dir_all(dir.path().join("done")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_roadmap(&self, content: &str) {
        self.write("todos/roadmap.md", content);
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.dir.path().join(rel).exists()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends a raw HTTP/1.1 GET over a Unix socket and returns the response
/// body. No keep-alive; one request per connection.
pub async fn unix_http_get(socket_path: &Path, path: &str) -> anyhow::Result<String> {
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    unix_http_raw(socket_path, &request).await
}

/// Sends a raw HTTP/1.1 POST with a JSON body over a Unix socket.
pub async fn unix_http_post_json(socket_path: &Path, path: &str, body: &serde_json::Value) -> anyhow::Result<String> {
    let payload = body.to_string();
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        payload.len(),
        payload
    );
    unix_http_raw(socket_path, &request).await
}

async fn unix_http_raw(socket_path: &Path, request: &str) -> anyhow::Result<String> {
    let mut stream = tokio::net::UnixStream::connect(socket_path).await?;
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await.ok();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf).into_owned();
    let body = response.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("").to_string();
    Ok(body)
}

/// Picks a scratch socket path under the system tempdir, unique per test
/// process.
pub fn scratch_socket_path() -> PathBuf {
    std::env::temp_dir().join(format!("teleclaude-specs-{}-{}.sock", std::process::id(), uuid_like()))
}

fn uuid_like() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    RandomState::new().build_hasher().finish()
}
