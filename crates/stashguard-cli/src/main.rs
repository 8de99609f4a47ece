//! stashguard: scan, validate and store files from the command line.
//!
//! Configuration comes from the environment (and `.env`), the same variables
//! a service deployment would use. Results are printed as JSON on stdout;
//! logs go to stderr.
//!
//! Usage:
//!   stashguard scan ./invoice.pdf
//!   stashguard validate ./photo.jpg --content-type image/jpeg
//!   stashguard upload ./photo.jpg --tag holiday --process
//!   stashguard health
//!
//! Exit status is 2 when a file is rejected or infected, 1 on other failures.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use stashguard_cli::{guess_content_type, read_input, App};
use stashguard_core::keys::generate_storage_key;
use stashguard_core::models::{ProcessingOptions, ScanOutcome, UploadRequest};
use stashguard_core::{AppError, Config};
use stashguard_services::VirusScanEngine;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "stashguard", about = "Secure file scanning and upload pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Virus scan a file without storing it
    Scan { path: PathBuf },
    /// Run the full security validation pipeline against a file
    Validate {
        path: PathBuf,
        /// Declared content type (detected from the file when omitted)
        #[arg(long)]
        content_type: Option<String>,
        /// Owner the upload is validated for (random when omitted)
        #[arg(long)]
        owner: Option<Uuid>,
    },
    /// Validate, store and record a file
    Upload {
        path: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
        #[arg(long)]
        owner: Option<Uuid>,
        /// Tag to attach; repeat for several
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Queue a processing job after storing
        #[arg(long)]
        process: bool,
    },
    /// Check the scanner and the storage backend
    Health,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

async fn build_request(
    path: &Path,
    content_type: Option<String>,
    owner: Option<Uuid>,
) -> anyhow::Result<UploadRequest> {
    let (filename, data) = read_input(path).await?;
    let content_type = content_type.unwrap_or_else(|| guess_content_type(path, &data));
    let owner = owner.unwrap_or_else(Uuid::new_v4);
    Ok(UploadRequest::new(owner, filename, content_type, data))
}

async fn scan(config: &Config, path: &Path) -> anyhow::Result<ExitCode> {
    let engine = VirusScanEngine::from_config(config.scan.clone())
        .context("Failed to create virus scan engine")?;
    let (_, data) = read_input(path).await?;
    let result = engine.scan(&data).await.context("Virus scan failed")?;
    print_json(&result)?;
    Ok(match result.outcome {
        _ if result.is_infected() => ExitCode::from(2),
        ScanOutcome::Timeout | ScanOutcome::Error => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

async fn validate(
    app: &App,
    path: &Path,
    content_type: Option<String>,
    owner: Option<Uuid>,
) -> anyhow::Result<ExitCode> {
    let request = build_request(path, content_type, owner).await?;
    let target_key = generate_storage_key(
        request.owner_id,
        Uuid::new_v4(),
        extension_of(path),
        Utc::now(),
    );

    match app.pipeline.validate(&request, &target_key).await {
        Ok(validation) => {
            print_json(&validation)?;
            Ok(if validation.passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Err(err) => rejected(err),
    }
}

async fn upload(
    app: &App,
    path: &Path,
    content_type: Option<String>,
    owner: Option<Uuid>,
    tags: Vec<String>,
    process: bool,
) -> anyhow::Result<ExitCode> {
    let mut request = build_request(path, content_type, owner).await?;
    request.tags = tags;
    if process {
        request.process = Some(ProcessingOptions::default());
    }

    match app.files.upload(request).await {
        Ok(outcome) => {
            print_json(&json!({
                "file": outcome.file,
                "validation": outcome.validation,
                "storage_key": outcome.stored.key,
                "multipart": outcome.stored.multipart,
                "processing": outcome.processing,
            }))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => rejected(err),
    }
}

/// Print a rejection as JSON. Security rejections exit with 2, anything else
/// is returned as an error.
fn rejected(err: AppError) -> anyhow::Result<ExitCode> {
    match &err {
        AppError::SecurityThreat { .. }
        | AppError::RateLimitExceeded { .. }
        | AppError::Quarantine { .. } => {
            print_json(&json!({
                "error": err.to_string(),
                "kind": format!("{:?}", err.kind()),
            }))?;
            Ok(ExitCode::from(2))
        }
        _ => Err(err.into()),
    }
}

async fn health(app: &App) -> anyhow::Result<ExitCode> {
    let scanner_healthy = !app.engine.is_enabled() || app.engine.health_check().await;
    let storage = app.gateway.ping().await;

    print_json(&json!({
        "scanner": {
            "enabled": app.engine.is_enabled(),
            "healthy": scanner_healthy,
            "version": app.engine.scanner_version(),
        },
        "storage": {
            "backend": app.gateway.backend_type().to_string(),
            "healthy": storage.is_ok(),
            "error": storage.as_ref().err().map(ToString::to_string),
        },
    }))?;

    Ok(if scanner_healthy && storage.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    stashguard_infra::init_telemetry("stashguard-cli")
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Scan { path } => scan(&config, &path).await,
        Commands::Validate {
            path,
            content_type,
            owner,
        } => {
            let app = App::build(&config).await?;
            validate(&app, &path, content_type, owner).await
        }
        Commands::Upload {
            path,
            content_type,
            owner,
            tags,
            process,
        } => {
            let app = App::build(&config).await?;
            upload(&app, &path, content_type, owner, tags, process).await
        }
        Commands::Health => {
            let app = App::build(&config).await?;
            health(&app).await
        }
    }
}
