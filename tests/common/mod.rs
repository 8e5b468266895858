// Shared fixtures: a scripted in-memory store, a recording pacer, and a
// local HTTP server that imitates the Discord channel message endpoints.
#![allow(dead_code)]

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use chatsweep::channel::MessageStore;
use chatsweep::error::StoreError;
use chatsweep::message::{Credential, RemoteMessage};
use chatsweep::pacing::Pacer;
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// --- Scripted store ---

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List { before: Option<String>, limit: u32 },
    Delete(String),
    Pause(Duration),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

type DeleteHook = Box<dyn Fn(usize) + Send + Sync>;

/// Serves queued list results in order (empty pages once the queue is
/// drained) and records every call.
pub struct ScriptedStore {
    pages: Mutex<VecDeque<Result<Vec<RemoteMessage>, StoreError>>>,
    log: CallLog,
    failing_deletes: HashSet<String>,
    delete_attempts: AtomicUsize,
    after_delete: Option<DeleteHook>,
}

impl ScriptedStore {
    pub fn new(pages: Vec<Vec<RemoteMessage>>) -> Self {
        Self::with_results(pages.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<Vec<RemoteMessage>, StoreError>>) -> Self {
        Self {
            pages: Mutex::new(results.into()),
            log: Arc::new(Mutex::new(Vec::new())),
            failing_deletes: HashSet::new(),
            delete_attempts: AtomicUsize::new(0),
            after_delete: None,
        }
    }

    /// Deleting any of these ids fails with a 403.
    pub fn failing_deletes(mut self, ids: &[&str]) -> Self {
        self.failing_deletes = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Called after each delete attempt with the number of attempts so far.
    pub fn after_delete(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.after_delete = Some(Box::new(hook));
        self
    }

    /// A pacer writing into the same call log.
    pub fn pacer(&self) -> RecordingPacer {
        RecordingPacer {
            log: Arc::clone(&self.log),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::List { before, .. } => Some(before),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

impl MessageStore for ScriptedStore {
    fn list_messages(
        &self,
        _credential: &Credential,
        _channel_id: &str,
        before: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RemoteMessage>, StoreError> {
        self.log.lock().unwrap().push(Call::List {
            before: before.map(str::to_string),
            limit,
        });
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn delete_message(
        &self,
        _credential: &Credential,
        _channel_id: &str,
        message_id: &str,
    ) -> Result<(), StoreError> {
        self.log
            .lock()
            .unwrap()
            .push(Call::Delete(message_id.to_string()));
        let attempts = self.delete_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = if self.failing_deletes.contains(message_id) {
            Err(StoreError::Api {
                status: 403,
                message: "Missing Permissions".to_string(),
            })
        } else {
            Ok(())
        };
        if let Some(hook) = &self.after_delete {
            hook(attempts);
        }
        outcome
    }
}

pub struct RecordingPacer {
    log: CallLog,
}

impl Pacer for RecordingPacer {
    fn pause(&self, delay: Duration) {
        self.log.lock().unwrap().push(Call::Pause(delay));
    }
}

/// `count` messages with descending numeric ids starting at `newest_id`.
/// Every `stride`-th message (starting with the first) is by `target`,
/// the rest by `other`.
pub fn page(newest_id: u64, count: u64, target: &str, other: &str, stride: u64) -> Vec<RemoteMessage> {
    (0..count)
        .map(|i| {
            let id = (newest_id - i).to_string();
            let author = if i % stride == 0 { target } else { other };
            RemoteMessage::new(&id, author, Some(&format!("message {id}")))
        })
        .collect()
}

// --- Fake Discord HTTP server ---

pub const FAKE_TOKEN: &str = "test-token";

#[derive(Default)]
pub struct FakeState {
    /// Newest first.
    pub messages: Mutex<Vec<RemoteMessage>>,
    pub requests: Mutex<Vec<String>>,
    pub forbidden_deletes: Mutex<HashSet<String>>,
    /// Number of 429 answers to give before serving list calls normally.
    pub rate_limit_lists: AtomicUsize,
    /// Number of 500 answers to give before serving delete calls normally.
    pub server_error_deletes: AtomicUsize,
}

pub struct FakeDiscord {
    pub base_url: String,
    pub state: Arc<FakeState>,
}

impl FakeDiscord {
    pub fn start(messages: Vec<RemoteMessage>) -> Self {
        let state = Arc::new(FakeState::default());
        *state.messages.lock().unwrap() = messages;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route("/api/v9/channels/{channel}/messages", get(list_messages))
            .route(
                "/api/v9/channels/{channel}/messages/{id}",
                delete(delete_message),
            )
            .with_state(Arc::clone(&state));

        std::thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });

        Self {
            base_url: format!("http://{addr}/api/v9"),
            state,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn remaining_ids(&self) -> Vec<String> {
        self.state
            .messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
    before: Option<String>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some(FAKE_TOKEN)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "401: Unauthorized", "code": 0})),
    )
        .into_response()
}

async fn list_messages(
    State(state): State<Arc<FakeState>>,
    Path(channel): Path<String>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Response {
    state.requests.lock().unwrap().push(format!(
        "GET {channel} limit={} before={}",
        query.limit.unwrap_or(50),
        query.before.as_deref().unwrap_or("-")
    ));
    if !authorized(&headers) {
        return unauthorized();
    }
    if state
        .rate_limit_lists
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"message": "You are being rate limited.", "retry_after": 0.0, "global": false})),
        )
            .into_response();
    }

    let before: Option<u64> = query.before.and_then(|b| b.parse().ok());
    let limit = query.limit.unwrap_or(50);
    let page: Vec<serde_json::Value> = state
        .messages
        .lock()
        .unwrap()
        .iter()
        .filter(|m| match before {
            Some(before) => m.id.parse::<u64>().unwrap() < before,
            None => true,
        })
        .take(limit)
        .map(|m| {
            json!({
                "id": m.id,
                "type": 0,
                "channel_id": channel,
                "author": {"id": m.author.id, "username": "someone"},
                "content": m.content,
                "timestamp": "2024-01-01T00:00:00+00:00",
            })
        })
        .collect();
    Json(page).into_response()
}

async fn delete_message(
    State(state): State<Arc<FakeState>>,
    Path((channel, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    state
        .requests
        .lock()
        .unwrap()
        .push(format!("DELETE {channel} {id}"));
    if !authorized(&headers) {
        return unauthorized();
    }
    if state.forbidden_deletes.lock().unwrap().contains(&id) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"message": "Missing Permissions", "code": 50013})),
        )
            .into_response();
    }
    if state
        .server_error_deletes
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "500: Internal Server Error", "code": 0})),
        )
            .into_response();
    }
    state.messages.lock().unwrap().retain(|m| m.id != id);
    StatusCode::NO_CONTENT.into_response()
}
