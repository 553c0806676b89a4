mod common;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bucket_transfer::{
    BucketConfig, BucketStore, FileStoreService, FileUpload, HttpBucketStore, MemoryBucketStore,
    StoreError, TransferConfig, TransferError,
};
use common::{random_bytes, spawn_bucket_server, ServerState};

fn client(addr: SocketAddr, token: Option<&str>) -> HttpBucketStore {
    HttpBucketStore::new(&BucketConfig {
        url: format!("http://{}/", addr),
        token: token.map(str::to_string),
        timeout_secs: 5,
    })
    .unwrap()
}

fn service(store: HttpBucketStore, chunk_size: usize) -> FileStoreService {
    let config = TransferConfig {
        chunk_size,
        backoff_base_ms: 0,
        ..TransferConfig::default()
    };
    FileStoreService::with_config(Arc::new(store), &config).unwrap()
}

#[tokio::test]
async fn test_round_trip_over_http() {
    let memory = MemoryBucketStore::new();
    let addr = spawn_bucket_server(ServerState::new(memory.clone(), Some("secret"))).await;
    let service = service(client(addr, Some("secret")), 64 * 1024);

    let data = random_bytes(64 * 1024 * 3 + 100);
    let receipt = service
        .upload_file(FileUpload::new("my report.pdf", "application/pdf", data.clone()), None)
        .await
        .unwrap();
    assert_eq!(receipt.chunk_count, 4);
    assert_eq!(memory.file_bytes("my report.pdf").unwrap(), data);

    let file = service.download_file("my report.pdf", None).await.unwrap();
    assert_eq!(file.data, data);
    assert_eq!(file.content_type, "application/pdf");
    assert_eq!(file.sha256, receipt.sha256);

    let files = service.list_files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name, "my report.pdf");
    assert_eq!(files[0].size, data.len() as u64);
    assert_eq!(files[0].nos_chunks, 4);
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let addr = spawn_bucket_server(ServerState::new(MemoryBucketStore::new(), None)).await;
    let store = client(addr, None);

    assert!(store.get("ghost.txt").await.unwrap_err().is_not_found());

    let err = service(store, 1024)
        .download_file("ghost.txt", None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::FileNotFound(ref name) if name == "ghost.txt"));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let memory = MemoryBucketStore::new();
    memory.insert_file("flaky.txt", "text/plain", b"eventually", 4);
    let state = ServerState::new(memory, None);
    let failing = state.failing_gets.clone();
    failing.store(2, Ordering::SeqCst);
    let addr = spawn_bucket_server(state).await;

    let file = service(client(addr, None), 1024)
        .download_file("flaky.txt", None)
        .await
        .unwrap();
    assert_eq!(file.data, b"eventually");
    assert_eq!(failing.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bad_token_blocks_upload() {
    let state = ServerState::new(MemoryBucketStore::new(), Some("secret"));
    let addr = spawn_bucket_server(state).await;
    let store = client(addr, Some("wrong"));

    assert!(matches!(
        store.is_user_registered().await,
        Err(StoreError::Unauthorized(_))
    ));

    let err = service(store, 1024)
        .upload_file(FileUpload::new("a.txt", "text/plain", b"a".to_vec()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::UserNotRegistered));
}

#[tokio::test]
async fn test_unregistered_caller() {
    let memory = MemoryBucketStore::new();
    memory.set_registered(false);
    let addr = spawn_bucket_server(ServerState::new(memory.clone(), None)).await;
    let service = service(client(addr, None), 1024);

    assert!(!service.check_user_registration().await);
    let err = service
        .upload_file(FileUpload::new("a.txt", "text/plain", b"a".to_vec()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::UserNotRegistered));
    assert_eq!(memory.open_batches(), 0);
}

#[tokio::test]
async fn test_unreachable_bucket_is_transport_error() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(addr, None).list().await.unwrap_err();
    assert!(err.is_transient());
}
