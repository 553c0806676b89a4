//! Shared test fixtures: a bucket with random latency and an HTTP bucket
//! server backed by the in-memory store.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use rand::Rng;

use bucket_transfer::store::http::{
    BatchRequest, BatchResponse, FileInfoResponse, FileResponse, RegisteredResponse,
};
use bucket_transfer::transfer::{
    compute_hash, BatchArg, BatchId, Digest, FileInfo, GetChunkResponse, GetFileResponse,
};
use bucket_transfer::{BucketStore, MemoryBucketStore, StoreError};

// ============================================================================
// Latency
// ============================================================================

/// Wraps a bucket and sleeps a random time before every call. Records the
/// hash of every chunk pushed, in arrival order.
pub struct LatencyStore {
    inner: MemoryBucketStore,
    max_delay_ms: u64,
    pushed: Mutex<Vec<Digest>>,
}

impl LatencyStore {
    pub fn new(inner: MemoryBucketStore, max_delay_ms: u64) -> Self {
        Self {
            inner,
            max_delay_ms,
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// Hashes of pushed chunks, in the order the bucket received them
    pub fn pushed_hashes(&self) -> Vec<Digest> {
        self.pushed.lock().clone()
    }

    async fn pause(&self) {
        let ms = rand::thread_rng().gen_range(0..=self.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl BucketStore for LatencyStore {
    async fn create_batch(&self, arg: BatchArg) -> Result<BatchId, StoreError> {
        self.pause().await;
        self.inner.create_batch(arg).await
    }

    async fn upload_chunk(&self, batch_id: BatchId, chunk: &[u8]) -> Result<(), StoreError> {
        self.pause().await;
        self.pushed.lock().push(compute_hash(chunk));
        self.inner.upload_chunk(batch_id, chunk).await
    }

    async fn get(&self, file_name: &str) -> Result<GetFileResponse, StoreError> {
        self.pause().await;
        self.inner.get(file_name).await
    }

    async fn get_chunk(&self, file_name: &str, index: u64) -> Result<GetChunkResponse, StoreError> {
        self.pause().await;
        self.inner.get_chunk(file_name, index).await
    }

    async fn list(&self) -> Result<Vec<FileInfo>, StoreError> {
        self.pause().await;
        self.inner.list().await
    }

    async fn is_user_registered(&self) -> Result<bool, StoreError> {
        self.pause().await;
        self.inner.is_user_registered().await
    }
}

/// Random bytes of the given length
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill(&mut data[..]);
    data
}

// ============================================================================
// HTTP Bucket Server
// ============================================================================

#[derive(Clone)]
pub struct ServerState {
    pub store: MemoryBucketStore,
    pub token: Option<String>,
    /// Number of upcoming `GET /files/{name}` requests to answer with 503
    pub failing_gets: Arc<AtomicUsize>,
}

impl ServerState {
    pub fn new(store: MemoryBucketStore, token: Option<&str>) -> Self {
        Self {
            store,
            token: token.map(str::to_string),
            failing_gets: Arc::new(AtomicUsize::new(0)),
        }
    }
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

fn status_for(err: StoreError) -> (StatusCode, String) {
    let status = match &err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        StoreError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        StoreError::Rejected(_) => StatusCode::CONFLICT,
        StoreError::Decode(_) => StatusCode::BAD_REQUEST,
        StoreError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, err.to_string())
}

fn authorize(state: &ServerState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = &state.token else {
        return Ok(());
    };
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented == Some(expected.as_str()) {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "bad token".to_string()))
    }
}

async fn create_batch(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<BatchRequest>,
) -> ApiResult<Json<BatchResponse>> {
    authorize(&state, &headers)?;
    let arg = body.into_batch_arg().map_err(status_for)?;
    let batch_id = state.store.create_batch(arg).await.map_err(status_for)?;
    Ok(Json(BatchResponse { batch_id }))
}

async fn upload_chunk(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(batch_id): Path<BatchId>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    authorize(&state, &headers)?;
    state
        .store
        .upload_chunk(batch_id, &body)
        .await
        .map_err(status_for)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_files(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FileInfoResponse>>> {
    authorize(&state, &headers)?;
    let files = state.store.list().await.map_err(status_for)?;
    Ok(Json(files.iter().map(FileInfoResponse::from).collect()))
}

async fn get_file(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Json<FileResponse>> {
    authorize(&state, &headers)?;
    let failing = state
        .failing_gets
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return Err((StatusCode::SERVICE_UNAVAILABLE, "try again".to_string()));
    }

    let file = state.store.get(&name).await.map_err(status_for)?;
    Ok(Json(FileResponse::from(&file)))
}

async fn get_chunk(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path((name, index)): Path<(String, u64)>,
) -> ApiResult<Vec<u8>> {
    authorize(&state, &headers)?;
    let chunk = state
        .store
        .get_chunk(&name, index)
        .await
        .map_err(status_for)?;
    Ok(chunk.content)
}

async fn registered(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> ApiResult<Json<RegisteredResponse>> {
    authorize(&state, &headers)?;
    let registered = state.store.is_user_registered().await.map_err(status_for)?;
    Ok(Json(RegisteredResponse { registered }))
}

pub fn bucket_router(state: ServerState) -> Router {
    Router::new()
        .route("/batches", post(create_batch))
        .route("/batches/:id/chunks", post(upload_chunk))
        .route("/files", get(list_files))
        .route("/files/:name", get(get_file))
        .route("/files/:name/chunks/:index", get(get_chunk))
        .route("/users/me/registered", get(registered))
        .with_state(state)
}

/// Serve a bucket on an ephemeral local port
pub async fn spawn_bucket_server(state: ServerState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    let app = bucket_router(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test bucket");
    });

    addr
}
