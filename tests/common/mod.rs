#![allow(dead_code)]
//! Shared fixtures: an in-process axum backend on an ephemeral localhost port
//! and helpers wiring a session store and pipeline against it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::{header, HeaderMap};
use axum::Router;

use wastems::identity::{MemoryStorage, Role, SessionStore, User};
use wastems::{ApiClient, ClientConfig};

/// Start `router` on 127.0.0.1:0 and return its base URL. The server task
/// lives until the test runtime shuts down.
pub async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            eprintln!("mock backend error: {e:?}");
        }
    });
    format!("http://{}", addr)
}

pub fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().expect("http client")
}

pub fn fresh_session() -> Arc<SessionStore> {
    Arc::new(SessionStore::open(MemoryStorage::new()))
}

pub fn api(config: ClientConfig, session: Arc<SessionStore>) -> Arc<ApiClient> {
    Arc::new(ApiClient::with_http_client(&config, session, http()).expect("api client"))
}

pub fn supervisor() -> User {
    User::new("9", "Meera", "meera@wastems.com", Role::Supervisor)
}

pub fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Request counter shared between a handler and the test body.
#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn bump(&self) -> usize { self.0.fetch_add(1, Ordering::SeqCst) + 1 }
    pub fn get(&self) -> usize { self.0.load(Ordering::SeqCst) }
}
