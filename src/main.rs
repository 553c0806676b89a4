//! Bucket Transfer CLI
//!
//! Uploads, downloads and lists files in a size-limited bucket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bucket_transfer::transfer::FileInfo;
use bucket_transfer::{Config, FileStoreService, HttpBucketStore};

#[derive(Parser)]
#[command(name = "bucket-transfer")]
#[command(about = "Chunked file transfers for size-limited buckets")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    bucket: BucketArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct BucketArgs {
    /// Bucket API URL (overrides BUCKET_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Bearer token (overrides BUCKET_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file
    Upload {
        /// File to upload
        path: PathBuf,
        /// Name to store the file under (default: the file's name)
        #[arg(long)]
        name: Option<String>,
        /// Content type (default: guessed from the extension)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download a file
    Download {
        /// Stored file name
        name: String,
        /// Where to write the file (default: ./<name>)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show metadata of one file
    Info {
        name: String,
    },
    /// List stored files
    List,
    /// Check whether the caller may upload
    Registered,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bucket_transfer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });
    if let Some(url) = cli.bucket.url {
        config.bucket.url = url;
    }
    if let Some(token) = cli.bucket.token {
        config.bucket.token = Some(token);
    }

    tracing::debug!("Bucket endpoint: {}", config.bucket.url);

    let store = HttpBucketStore::new(&config.bucket).context("Failed to create bucket client")?;
    let service = FileStoreService::with_config(Arc::new(store), &config.transfer)
        .context("Invalid transfer settings")?;

    match cli.command {
        Commands::Upload {
            path,
            name,
            content_type,
        } => {
            let progress = |pct: u8| tracing::info!("Upload {}%", pct);
            let receipt = service
                .upload_path(&path, name.as_deref(), content_type.as_deref(), Some(&progress))
                .await
                .with_context(|| format!("Failed to upload {}", path.display()))?;

            println!(
                "Uploaded {} ({} bytes, {} chunks, batch {})",
                receipt.name, receipt.size, receipt.chunk_count, receipt.batch_id
            );
            if let Some(sha256) = receipt.sha256 {
                println!("sha256 {}", sha256);
            }
        }
        Commands::Download { name, output } => {
            let progress = |pct: u8| tracing::info!("Download {}%", pct);
            let file = service
                .download_file(&name, Some(&progress))
                .await
                .with_context(|| format!("Failed to download {}", name))?;

            let output = output.unwrap_or_else(|| PathBuf::from(&file.name));
            tokio::fs::write(&output, &file.data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!(
                "Downloaded {} ({} bytes, {}) to {}",
                file.name,
                file.size(),
                file.content_type,
                output.display()
            );
        }
        Commands::Info { name } => {
            let info = service
                .file_info(&name)
                .await
                .with_context(|| format!("Failed to look up {}", name))?;
            print_info(&info);
        }
        Commands::List => {
            let files = service.list_files().await.context("Failed to list files")?;
            if files.is_empty() {
                println!("No files");
            }
            for info in &files {
                print_info(info);
            }
        }
        Commands::Registered => {
            if service.check_user_registration().await {
                println!("Registered");
            } else {
                println!("Not registered");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_info(info: &FileInfo) {
    let modified = info
        .modified_at()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let sha256 = info
        .sha256
        .map(|d| d.to_hex())
        .unwrap_or_else(|| "-".to_string());

    println!(
        "{}\t{}\t{} bytes\t{} chunks\t{}\t{}",
        info.file_name, info.content_type, info.size, info.nos_chunks, modified, sha256
    );
}
