mod cli;
mod deploy;
mod pipeline;
mod run_artifacts;
mod run_context;
mod video;
mod web;

use anyhow::Result;
use cli::{Args, Command, DispatchArgs, FolderArgs, ListKind};
use pipeline::orchestrator::dispatch;
use run_context::MarkerPolicy;
use serde::Serialize;
use web::server::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    let code = match args.command {
        Command::Serve(serve) => {
            run_server(serve).await?;
            0
        }
        Command::Deploy(deploy_args) => {
            blocking(move || Ok(deploy::execute(&deploy_args.to_config()))).await?
        }
        Command::Scan {
            folders,
            dispatch: dispatch_args,
        } => blocking(move || scan(&folders, &dispatch_args)).await?,
        Command::Results { folders, video } => {
            blocking(move || show_results(&folders, &video)).await?
        }
        Command::List {
            kind,
            folders,
            marker,
        } => blocking(move || list(kind, &folders, marker)).await?,
    };

    std::process::exit(code);
}

/// One-shot subcommands touch the filesystem and spawn processes, so they
/// run off the async workers. Returns the process exit code.
async fn blocking<F>(command: F) -> Result<i32>
where
    F: FnOnce() -> Result<i32> + Send + 'static,
{
    tokio::task::spawn_blocking(command).await?
}

fn scan(folders: &FolderArgs, dispatch_args: &DispatchArgs) -> Result<i32> {
    let processor = dispatch_args.processor()?;
    let config = dispatch_args.dispatch_config(true);
    let summary = dispatch(&folders.uploads, &folders.detections, &config, &processor)?;
    print_json(&summary)?;
    Ok(if summary.is_success() { 0 } else { 1 })
}

fn show_results(folders: &FolderArgs, video: &str) -> Result<i32> {
    let results = run_artifacts::read_scan_results(&folders.detections, video)?;
    print_json(&results)?;
    Ok(0)
}

fn list(kind: ListKind, folders: &FolderArgs, marker: MarkerPolicy) -> Result<i32> {
    let videos = match kind {
        ListKind::Scanned => run_context::list_scanned(&folders.detections)?,
        ListKind::Uploaded => run_context::list_uploaded(&folders.uploads)?,
        ListKind::Pending => run_context::pending_videos(&folders.uploads, &folders.detections, marker)?
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
    };
    print_json(&videos)?;
    Ok(0)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
