use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use weedio_core::{ClientConfig, CreateRequest, WeedClient};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Parser)]
#[command(name = "weedio")]
#[command(about = "Store, fetch and remove objects in a needle-based object store")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Comma separated directory seeds, overriding the config file
    #[arg(short, long, global = true)]
    seeds: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file and print its fid
    Put {
        path: PathBuf,

        /// Stored name, defaults to the file name
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        collection: Option<String>,

        #[arg(long)]
        replication: Option<String>,

        /// TTL such as 3d or 26w, empty for none
        #[arg(long)]
        ttl: Option<String>,

        #[arg(long)]
        chunk_size: Option<u64>,

        #[arg(long)]
        mime_type: Option<String>,
    },
    /// Download an object to a file or stdout
    Get {
        fid: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove one object
    Rm { fid: String },
    /// Remove many objects, one request per volume server
    RmBatch {
        #[arg(required = true)]
        fids: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weedio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        tracing::error!("{:#}", error);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path))?,
        None => ClientConfig::default(),
    };

    let mut builder = WeedClient::builder().config(config);
    if let Some(seeds) = cli.seeds {
        builder = builder.seeds(seeds);
    }
    let client = builder.build().context("failed to build client")?;

    match cli.command {
        Commands::Put {
            path,
            name,
            collection,
            replication,
            ttl,
            chunk_size,
            mime_type,
        } => {
            let name = name.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let request = CreateRequest {
                name,
                collection,
                replication,
                ttl,
                chunk_size,
                mime_type,
                ..Default::default()
            };
            put(&client, &path, request).await
        }
        Commands::Get { fid, output } => get(&client, &fid, output).await,
        Commands::Rm { fid } => {
            let removed = client.remove(&fid).await?;
            println!("{}", json!({ "fid": fid, "removed": removed }));
            Ok(())
        }
        Commands::RmBatch { fids } => {
            let outcome = client.delete_files(fids).await?;
            println!(
                "{}",
                json!({ "results": outcome.results, "errors": outcome.errors })
            );
            if !outcome.is_clean() {
                anyhow::bail!("batch delete finished with errors");
            }
            Ok(())
        }
    }
}

async fn put(client: &WeedClient, path: &Path, request: CreateRequest) -> anyhow::Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut session = client.create(request).await?;
    let fid = session.fid().to_string();
    let name = session.real_name().to_string();

    let mut hasher = Sha256::new();
    let mut size = 0u64;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = match file.read(&mut buf).await {
            Ok(n) => n,
            Err(error) => {
                // a partial object must not be committed
                if let Err(cleanup) = session.abort().await {
                    tracing::warn!("failed to clean up {}: {}", fid, cleanup);
                }
                return Err(error).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
        if let Err(error) = session.write(&buf[..n]).await {
            session.close().await?;
            return Err(error.into());
        }
    }
    session.close().await?;

    println!(
        "{}",
        json!({
            "fid": fid,
            "name": name,
            "size": size,
            "sha256": hex::encode(hasher.finalize()),
        })
    );
    Ok(())
}

async fn get(client: &WeedClient, fid: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut session = client.open(fid).await?;
    let name = session.file_name().to_string();

    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = match &output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut hasher = Sha256::new();
    let mut size = 0u64;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = session.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
        writer.write_all(&buf[..n]).await?;
    }
    writer.flush().await?;
    session.close().await?;

    tracing::info!(
        "fetched {} ({}), {} bytes, sha256 {}",
        fid,
        name,
        size,
        hex::encode(hasher.finalize())
    );
    Ok(())
}
