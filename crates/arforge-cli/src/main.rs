//! Arforge CLI — drive one submission through the asset pipeline.
//!
//! Configuration comes from the environment (see `StorageConfig` and
//! `PipelineConfig`): DATABASE_URL, STORAGE_BACKEND plus backend settings,
//! MARKER_COMPILER_PATH, FFMPEG_PATH/FFPROBE_PATH.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use arforge_core::{PipelineConfig, StorageConfig, SubmissionMetadata};
use arforge_db::SubmissionRepository;
use arforge_pipeline::{PipelineOrchestrator, SubmissionRequest, TracingEventSink};
use arforge_processing::{CommandCompiler, CompilerService, FfmpegNormalizer};
use arforge_storage::{create_storage, Provisioner, RetryPolicy};

#[derive(Parser)]
#[command(name = "arforge", about = "AR marker pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit an image and a video for marker compilation and storage
    Submit {
        /// Path to the source image
        #[arg(long)]
        image: std::path::PathBuf,
        /// Path to the video
        #[arg(long)]
        video: std::path::PathBuf,
        /// Submission title
        #[arg(long)]
        title: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
        /// Owning principal identifier
        #[arg(long)]
        owner: String,
    },
    /// List an owner's submissions with freshly derived read URLs
    List {
        /// Owning principal identifier
        #[arg(long)]
        owner: String,
        /// Maximum number of items
        #[arg(long, default_value = "20")]
        limit: i64,
        /// Offset for pagination
        #[arg(long, default_value = "0")]
        offset: i64,
    },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Submit {
            image,
            video,
            title,
            description,
            owner,
        } => submit(image, video, title, description, owner).await,
        Commands::List {
            owner,
            limit,
            offset,
        } => list(owner, limit, offset).await,
    }
}

async fn connect_db() -> Result<sqlx::PgPool> {
    let url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .context("Failed to connect to database")
}

async fn build_provisioner(pipeline_config: &PipelineConfig) -> Result<Provisioner> {
    let storage_config = StorageConfig::from_env()?;
    let storage = create_storage(&storage_config)
        .await
        .context("Failed to initialize storage backend")?;
    Ok(Provisioner::new(
        storage,
        RetryPolicy {
            max_attempts: pipeline_config.provision_max_attempts,
            base_delay: pipeline_config.provision_base_delay,
        },
    ))
}

async fn submit(
    image: std::path::PathBuf,
    video: std::path::PathBuf,
    title: String,
    description: Option<String>,
    owner: String,
) -> Result<()> {
    let config = PipelineConfig::from_env()?;
    let pool = connect_db().await?;
    let provisioner = build_provisioner(&config).await?;

    let compiler_path =
        std::env::var("MARKER_COMPILER_PATH").unwrap_or_else(|_| "arforge-marker".to_string());
    let ffmpeg_path = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());
    let ffprobe_path = std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string());

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        Arc::new(SubmissionRepository::new(pool)),
        Arc::new(provisioner),
        CompilerService::new(
            Arc::new(CommandCompiler::new(compiler_path)),
            config.compile_timeout,
        ),
        Arc::new(FfmpegNormalizer::new(ffmpeg_path, ffprobe_path)),
        Arc::new(TracingEventSink),
        config,
    ));

    let image_filename = image
        .file_name()
        .and_then(|n| n.to_str())
        .context("Image path has no filename")?
        .to_string();
    let video_filename = video
        .file_name()
        .and_then(|n| n.to_str())
        .context("Video path has no filename")?
        .to_string();

    let request = SubmissionRequest {
        owner,
        metadata: SubmissionMetadata { title, description },
        image_filename,
        image: Bytes::from(tokio::fs::read(&image).await.context("Failed to read image")?),
        video_filename,
        video: Bytes::from(tokio::fs::read(&video).await.context("Failed to read video")?),
    };

    let run = orchestrator.start(request)?;

    let canceller = run.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling run");
            canceller.cancel();
        }
    });

    let mut progress = run.progress.clone();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = *progress.borrow();
            eprintln!(
                "[{:>18}] {:5.1}%  (video {:5.1}%)",
                snapshot.stage.to_string(),
                snapshot.overall,
                snapshot.video_percent
            );
        }
    });

    let outcome = run.join().await?;
    println!(
        "{}",
        serde_json::json!({
            "id": outcome.submission_id,
            "status": outcome.status.to_string(),
            "guidance": outcome.guidance,
            "marker": outcome.marker.map(|m| serde_json::json!({
                "feature_count": m.feature_count,
                "source_width": m.source_width,
                "source_height": m.source_height,
            })),
        })
    );
    Ok(())
}

async fn list(owner: String, limit: i64, offset: i64) -> Result<()> {
    let config = PipelineConfig::from_env()?;
    let pool = connect_db().await?;
    let provisioner = build_provisioner(&config).await?;
    let repository = SubmissionRepository::new(pool);

    let submissions = repository.list_for_owner(&owner, limit, offset).await?;
    for submission in submissions {
        let mut urls = serde_json::Map::new();
        for (name, key) in [
            ("image", &submission.image_key),
            ("video", &submission.video_key),
            ("marker", &submission.marker_key),
        ] {
            if let Some(key) = key {
                urls.insert(
                    name.to_string(),
                    provisioner
                        .read_url_or_key(key, config.read_grant_ttl)
                        .await
                        .into(),
                );
            }
        }
        println!(
            "{}",
            serde_json::json!({
                "id": submission.id,
                "title": submission.title,
                "status": submission.status.to_string(),
                "error_detail": submission.error_detail,
                "created_at": submission.created_at,
                "urls": urls,
            })
        );
    }
    Ok(())
}
