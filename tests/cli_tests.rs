//! The `wastems` binary against a mock backend, with the session file on disk.

mod common;

use std::path::Path;
use std::process::Output;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::process::Command;

use common::spawn_backend;
use wastems::identity::{FileStorage, SessionStorage, SessionStore, REFRESH_TOKEN_KEY, TOKEN_KEY};

async fn login(Json(body): Json<Value>) -> impl IntoResponse {
    if body == json!({"email": "admin@wastems.com", "password": "admin123"}) {
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "user": {"id": "1", "displayName": "System Admin", "email": "admin@wastems.com", "role": "admin"},
                "token": "abc",
                "refreshToken": "r-abc"
            })),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"success": false, "message": "Invalid credentials"})))
    }
}

async fn run_cli(base: &str, session: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_wastems"));
    cmd.arg("--url").arg(base).arg("--session").arg(session).args(args);
    for var in ["HTTP_PROXY", "HTTPS_PROXY", "ALL_PROXY", "http_proxy", "https_proxy", "all_proxy"] {
        cmd.env_remove(var);
    }
    for var in ["WASTEMS_API_URL", "WASTEMS_API_PREFIX", "WASTEMS_SESSION_FILE", "RUST_LOG"] {
        cmd.env_remove(var);
    }
    cmd.env("NO_PROXY", "127.0.0.1,localhost");
    cmd.output().await.expect("run wastems binary")
}

#[tokio::test]
async fn login_recovers_from_corrupt_session_file() {
    let base = spawn_backend(Router::new().route("/api/auth/login", post(login))).await;
    let dir = tempdir().unwrap();
    let path = dir.path().join("session.json");

    for garbage in ["not json", "{\"token\":\"ab"] {
        std::fs::write(&path, garbage).unwrap();

        let whoami = run_cli(&base, &path, &["whoami"]).await;
        assert!(!whoami.status.success(), "anonymous session has no user");
        assert!(String::from_utf8_lossy(&whoami.stderr).contains("not logged in"));

        let out = run_cli(&base, &path, &["login", "admin@wastems.com", "admin123"]).await;
        assert!(out.status.success(), "login failed: {}", String::from_utf8_lossy(&out.stderr));
        let printed: Value = serde_json::from_slice(&out.stdout).expect("user printed as JSON");
        assert_eq!(printed["role"], "admin");

        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("abc"));
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r-abc"));
        assert!(SessionStore::open(storage).is_authenticated());
    }
}

#[tokio::test]
async fn logout_over_corrupt_session_file_succeeds() {
    let base = spawn_backend(Router::new().route("/api/auth/login", post(login))).await;
    let dir = tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "not json").unwrap();

    let out = run_cli(&base, &path, &["logout"]).await;
    assert!(out.status.success(), "logout failed: {}", String::from_utf8_lossy(&out.stderr));
    let printed: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(printed["status"], "logged_out");
}
