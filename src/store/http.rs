//! HTTP bucket client
//!
//! Talks to a bucket exposing the batch protocol over HTTP:
//!
//! - `POST /batches` (JSON) -> `{ "batch_id": n }`
//! - `POST /batches/{id}/chunks` (octet-stream)
//! - `GET /files` -> JSON list
//! - `GET /files/{name}` -> JSON with chunk 0 base64-encoded
//! - `GET /files/{name}/chunks/{index}` -> octet-stream
//! - `GET /users/me/registered` -> `{ "registered": bool }`
//!
//! Digests travel as hex strings.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::BucketStore;
use crate::config::BucketConfig;
use crate::error::StoreError;
use crate::transfer::types::{
    BatchArg, BatchId, Digest, FileInfo, GetChunkResponse, GetFileResponse, MAX_PAYLOAD_SIZE,
};

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub content_type: String,
    pub chunks_sha256: Vec<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub batch_id: BatchId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResponse {
    /// Chunk 0, base64
    pub content: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub chunks_left: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfoResponse {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub modified: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub nos_chunks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredResponse {
    pub registered: bool,
}

impl From<&BatchArg> for BatchRequest {
    fn from(arg: &BatchArg) -> Self {
        Self {
            sha256: arg.sha256.map(|d| d.to_hex()),
            content_type: arg.content_type.clone(),
            chunks_sha256: arg.chunks_sha256.iter().map(Digest::to_hex).collect(),
            name: arg.name.clone(),
        }
    }
}

impl BatchRequest {
    /// Decode back into protocol types
    pub fn into_batch_arg(self) -> Result<BatchArg, StoreError> {
        Ok(BatchArg {
            sha256: self.sha256.as_deref().map(parse_digest).transpose()?,
            content_type: self.content_type,
            chunks_sha256: self
                .chunks_sha256
                .iter()
                .map(|h| parse_digest(h))
                .collect::<Result<_, _>>()?,
            name: self.name,
        })
    }
}

impl From<&GetFileResponse> for FileResponse {
    fn from(resp: &GetFileResponse) -> Self {
        Self {
            content: STANDARD.encode(&resp.content),
            content_type: resp.content_type.clone(),
            sha256: resp.sha256.map(|d| d.to_hex()),
            chunks_left: resp.chunks_left,
            modified: resp.modified,
        }
    }
}

impl FileResponse {
    pub fn into_get_file_response(self) -> Result<GetFileResponse, StoreError> {
        Ok(GetFileResponse {
            content: STANDARD
                .decode(self.content.as_bytes())
                .map_err(|e| StoreError::Decode(format!("chunk content: {}", e)))?,
            content_type: self.content_type,
            sha256: self.sha256.as_deref().map(parse_digest).transpose()?,
            chunks_left: self.chunks_left,
            modified: self.modified,
        })
    }
}

impl From<&FileInfo> for FileInfoResponse {
    fn from(info: &FileInfo) -> Self {
        Self {
            file_name: info.file_name.clone(),
            content_type: info.content_type.clone(),
            size: info.size,
            modified: info.modified,
            sha256: info.sha256.map(|d| d.to_hex()),
            nos_chunks: info.nos_chunks,
        }
    }
}

impl FileInfoResponse {
    pub fn into_file_info(self) -> Result<FileInfo, StoreError> {
        Ok(FileInfo {
            file_name: self.file_name,
            content_type: self.content_type,
            size: self.size,
            modified: self.modified,
            sha256: self.sha256.as_deref().map(parse_digest).transpose()?,
            nos_chunks: self.nos_chunks,
        })
    }
}

fn parse_digest(hex: &str) -> Result<Digest, StoreError> {
    Digest::from_hex(hex)
        .ok_or_else(|| StoreError::Decode(format!("invalid sha256 digest: {}", hex)))
}

// ============================================================================
// Client
// ============================================================================

/// Bucket reached over HTTP
#[derive(Clone)]
pub struct HttpBucketStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBucketStore {
    /// Create a client from configuration
    pub fn new(config: &BucketConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StoreError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn file_path(file_name: &str) -> String {
        format!("/files/{}", urlencoding::encode(file_name))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, StoreError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("{}: {}", what, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, what, &body))
    }

    async fn json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, StoreError> {
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(format!("{}: {}", what, e)))
    }

    async fn bytes(response: Response, what: &str) -> Result<Vec<u8>, StoreError> {
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| StoreError::Transport(format!("{}: {}", what, e)))
    }
}

/// Map an HTTP failure status onto the store error taxonomy
fn status_error(status: StatusCode, what: &str, body: &str) -> StoreError {
    let detail = if body.is_empty() {
        format!("{} ({})", what, status)
    } else {
        format!("{} ({}): {}", what, status, body)
    };

    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(detail),
        StatusCode::PAYLOAD_TOO_LARGE => StoreError::PayloadTooLarge {
            size: 0,
            max: MAX_PAYLOAD_SIZE,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Transport(detail)
        }
        s if s.is_server_error() => StoreError::Transport(detail),
        _ => StoreError::Rejected(detail),
    }
}

#[async_trait]
impl BucketStore for HttpBucketStore {
    async fn create_batch(&self, arg: BatchArg) -> Result<BatchId, StoreError> {
        let body = BatchRequest::from(&arg);
        let request = self.client.post(self.url("/batches")).json(&body);
        let response = self.send(request, "create_batch").await?;
        let batch: BatchResponse = Self::json(response, "create_batch").await?;
        Ok(batch.batch_id)
    }

    async fn upload_chunk(&self, batch_id: BatchId, chunk: &[u8]) -> Result<(), StoreError> {
        let request = self
            .client
            .post(self.url(&format!("/batches/{}/chunks", batch_id)))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(chunk.to_vec());
        match self.send(request, "upload_chunk").await {
            Ok(_) => Ok(()),
            Err(StoreError::PayloadTooLarge { max, .. }) => Err(StoreError::PayloadTooLarge {
                size: chunk.len(),
                max,
            }),
            Err(e) => Err(e),
        }
    }

    async fn get(&self, file_name: &str) -> Result<GetFileResponse, StoreError> {
        let request = self.client.get(self.url(&Self::file_path(file_name)));
        let response = self.send(request, "get").await?;
        let file: FileResponse = Self::json(response, "get").await?;
        file.into_get_file_response()
    }

    async fn get_chunk(&self, file_name: &str, index: u64) -> Result<GetChunkResponse, StoreError> {
        let path = format!("{}/chunks/{}", Self::file_path(file_name), index);
        let request = self.client.get(self.url(&path));
        let response = self.send(request, "get_chunk").await?;
        let content = Self::bytes(response, "get_chunk").await?;
        Ok(GetChunkResponse { content })
    }

    async fn list(&self) -> Result<Vec<FileInfo>, StoreError> {
        let request = self.client.get(self.url("/files"));
        let response = self.send(request, "list").await?;
        let files: Vec<FileInfoResponse> = Self::json(response, "list").await?;
        files.into_iter().map(FileInfoResponse::into_file_info).collect()
    }

    async fn is_user_registered(&self) -> Result<bool, StoreError> {
        let request = self.client.get(self.url("/users/me/registered"));
        let response = self.send(request, "is_user_registered").await?;
        let body: RegisteredResponse = Self::json(response, "is_user_registered").await?;
        Ok(body.registered)
    }
}
