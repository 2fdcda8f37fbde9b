//! Shared helpers for integration tests.

use std::path::{Path, PathBuf};

use axum::{
    Router,
    body::{Body, Bytes},
    http::{Request, Response},
};
use tempfile::TempDir;
use tower::ServiceExt;

use treeserve::{AppState, Config, routes};

pub const BOUNDARY: &str = "treeserve-test-boundary";

/// A router serving a fresh temporary directory.
pub struct TestApp {
    pub app: Router,
    root: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a file below the served root, creating parents.
    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn mkdir(&self, relative: &str) {
        std::fs::create_dir_all(self.root.join(relative)).unwrap();
    }

    pub fn read(&self, relative: &str) -> Vec<u8> {
        std::fs::read(self.root.join(relative)).unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

pub fn test_app() -> TestApp {
    test_app_with_config(Config::default())
}

pub fn test_app_with_config(config: Config) -> TestApp {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let state = AppState::with_config(root.clone(), config).unwrap();

    TestApp {
        app: routes::app(&state),
        root,
        _dir: dir,
    }
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap()
}

/// A multipart/form-data body with a single file field.
pub fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
