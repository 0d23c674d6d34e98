//! Test utilities and common setup.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, Response, header},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use dirshare::auth::{PermissionLevel, UserStore};
use dirshare::{AppState, Config, RootRegistry, StaticPolicy, routes};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "dirshare-test-boundary";

/// A served temp directory plus the state built on it.
pub struct TestServer {
    _dir: TempDir,
    pub root: PathBuf,
    pub state: AppState,
}

impl TestServer {
    pub fn new(level: PermissionLevel) -> Self {
        Self::build(level, None, Config::default())
    }

    pub fn with_logins(level: PermissionLevel, logins: &str) -> Self {
        Self::build(level, Some(UserStore::parse(logins)), Config::default())
    }

    pub fn with_config(level: PermissionLevel, config: Config) -> Self {
        Self::build(level, None, config)
    }

    pub fn build(level: PermissionLevel, users: Option<UserStore>, config: Config) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let registry = RootRegistry::new(&root).unwrap();
        let state = AppState::new(registry, config, StaticPolicy::from_level(level), users);
        Self {
            _dir: dir,
            root,
            state,
        }
    }

    pub fn app(&self) -> Router {
        routes::app(self.state.clone())
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn mkdir(&self, relative: &str) {
        std::fs::create_dir_all(self.root.join(relative)).unwrap();
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.app().oneshot(req).await.unwrap()
    }
}

pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn with_basic_auth(mut req: Request<Body>, user: &str, password: &str) -> Request<Body> {
    let value = format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)));
    req.headers_mut()
        .insert(header::AUTHORIZATION, value.parse().unwrap());
    req
}

pub fn with_peer(mut req: Request<Body>, addr: &str) -> Request<Body> {
    let addr: SocketAddr = addr.parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

/// Multipart upload of `(filename, content)` pairs as `files` fields.
pub fn upload_request(uri: &str, files: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, content) in files {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{content}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn json_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 64 * 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn list_dir(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
