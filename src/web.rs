use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, Json,
    },
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info};

use crate::channel::MessageStore;
use crate::config::SweepConfig;
use crate::engine::{DeletionEngine, EngineSettings};
use crate::error::JobError;
use crate::job::{Job, JobEvent, JobRegistry, JobSnapshot};
use crate::message::{DeletionRequest, DeletionResult};
use crate::pacing::Pacer;

const INDEX_HTML: &str = include_str!("../templates/index.html");

pub type SharedEngine = DeletionEngine<Arc<dyn MessageStore>, Arc<dyn Pacer>>;

type ApiError = (StatusCode, Json<Value>);

pub struct AppState {
    pub engine: Arc<SharedEngine>,
    pub registry: Arc<JobRegistry>,
}

impl AppState {
    pub fn new(store: Arc<dyn MessageStore>, pacer: Arc<dyn Pacer>, config: &SweepConfig) -> Self {
        let settings = EngineSettings::from(config);
        Self {
            engine: Arc::new(DeletionEngine::new(store, pacer, settings)),
            registry: Arc::new(JobRegistry::new(config.job_history)),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/delete_messages", post(post_delete_messages))
        .route("/cancel", post(post_cancel))
        .route("/api/jobs", post(post_start_job))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/cancel", post(post_cancel_job))
        .route("/api/jobs/{id}/events", get(get_job_events))
        .with_state(state)
}

async fn get_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

fn error_body(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({ "error": message.to_string() }))
}

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, error_body(message))
}

fn result_body(result: &DeletionResult) -> Json<Value> {
    Json(json!({
        "deleted_messages": result.deleted_messages(),
        "total": result.total(),
    }))
}

/// Run a job to completion on the blocking pool and record its outcome.
async fn run_job(
    engine: Arc<SharedEngine>,
    job: Arc<Job>,
    request: DeletionRequest,
) -> Result<DeletionResult, String> {
    let worker_job = Arc::clone(&job);
    let handle = tokio::task::spawn_blocking(move || {
        let outcome = engine.run(&worker_job, &request);
        worker_job.finish(&outcome);
        outcome
    });
    match handle.await {
        Ok(outcome) => outcome.map_err(|e| e.to_string()),
        Err(e) => {
            error!(job = %job.id(), error = %e, "Deletion task aborted");
            job.abort(&format!("deletion task aborted: {e}"));
            Err(format!("deletion task aborted: {e}"))
        }
    }
}

/// Blocking form: answers once the run is over, with the result or an
/// `{error}` object.
async fn post_delete_messages(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DeletionRequest>, JsonRejection>,
) -> Json<Value> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return error_body(rejection.body_text()),
    };
    if let Err(e) = request.validate() {
        return error_body(e);
    }
    let job = match state
        .registry
        .start(&request.channel_id, &request.user_id)
    {
        Ok(job) => job,
        Err(e) => return error_body(e),
    };

    match run_job(Arc::clone(&state.engine), job, request).await {
        Ok(result) => result_body(&result),
        Err(message) => error_body(message),
    }
}

/// Fire-and-forget: flags the running job and returns at once.
async fn post_cancel(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.registry.cancel_running().is_none() {
        info!("Cancel requested with no running job");
    }
    StatusCode::NO_CONTENT
}

async fn post_start_job(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DeletionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) =
        body.map_err(|rejection| api_error(StatusCode::BAD_REQUEST, rejection.body_text()))?;
    request
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let job = state
        .registry
        .start(&request.channel_id, &request.user_id)
        .map_err(|e| api_error(StatusCode::CONFLICT, e))?;
    let job_id = job.id().clone();

    tokio::spawn(run_job(Arc::clone(&state.engine), job, request));

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

fn lookup(state: &AppState, id: &str) -> Result<Arc<Job>, ApiError> {
    state.registry.get(id).map_err(|e| match e {
        JobError::NotFound(_) => api_error(StatusCode::NOT_FOUND, e),
        JobError::Busy(_) => api_error(StatusCode::CONFLICT, e),
    })
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    Ok(Json(lookup(&state, &id)?.snapshot()))
}

async fn post_cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    lookup(&state, &id)?.request_cancel();
    Ok(StatusCode::NO_CONTENT)
}

fn to_sse(event: &JobEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(event.name()).data(data)
}

/// Progress stream of one job. Ends after its `finished` event.
async fn get_job_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job = lookup(&state, &id)?;
    let mut events = job.subscribe();
    let (tx, rx) = tokio::sync::mpsc::channel::<JobEvent>(64);

    tokio::spawn(async move {
        if !job.is_running() {
            let _ = tx
                .send(JobEvent::Finished {
                    status: job.status(),
                })
                .await;
            return;
        }
        loop {
            match events.recv().await {
                Ok(event) => {
                    let last = matches!(event, JobEvent::Finished { .. });
                    if tx.send(event).await.is_err() || last {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(to_sse(&event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn serve(
    config: SweepConfig,
    store: Arc<dyn MessageStore>,
    pacer: Arc<dyn Pacer>,
) -> anyhow::Result<()> {
    let addr = config.web_addr();
    let state = Arc::new(AppState::new(store, pacer, &config));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Web UI listening");
    println!("chatsweep web UI: http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
