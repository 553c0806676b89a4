//! Configuration management for bucket transfers

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::error::{Result, TransferError};
use crate::transfer::retry::RetryPolicy;
use crate::transfer::types::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_CACHE_CAPACITY, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS,
    MAX_PAYLOAD_SIZE,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub bucket: BucketConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    /// Base URL of the bucket's HTTP API
    pub url: String,
    /// Bearer token identifying the caller
    pub token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    pub chunk_size: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub cache_capacity: usize,
    pub verify_downloads: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        BucketConfig {
            url: "http://localhost:4943".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            verify_downloads: true,
        }
    }
}

impl Config {
    /// Read settings from the environment. `BUCKET_URL` is required.
    pub fn from_env() -> std::result::Result<Self, env::VarError> {
        Ok(Config {
            bucket: BucketConfig {
                url: env::var("BUCKET_URL")?,
                token: env::var("BUCKET_TOKEN").ok().filter(|t| !t.is_empty()),
                timeout_secs: parse_var("BUCKET_TIMEOUT_SECS", 30),
            },
            transfer: TransferConfig {
                chunk_size: parse_var("TRANSFER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
                max_attempts: parse_var("TRANSFER_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
                backoff_base_ms: parse_var("TRANSFER_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
                cache_capacity: parse_var("CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY),
                verify_downloads: env::var("TRANSFER_VERIFY_DOWNLOADS")
                    .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
                    .unwrap_or(true),
            },
        })
    }
}

impl BucketConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TransferConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_base_ms))
    }

    /// Reject settings the transfer layer cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(TransferError::InvalidConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_size > MAX_PAYLOAD_SIZE {
            return Err(TransferError::InvalidConfig(format!(
                "chunk size {} exceeds the bucket payload limit of {} bytes",
                self.chunk_size, MAX_PAYLOAD_SIZE
            )));
        }
        if self.max_attempts == 0 {
            return Err(TransferError::InvalidConfig(
                "max attempts must be at least 1".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(TransferError::InvalidConfig(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
