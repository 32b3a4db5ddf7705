use crate::deploy::{DbEnv, DeployConfig, DEFAULT_INTERPRETER, DEFAULT_SCRIPT_PATH};
use crate::pipeline::orchestrator::DispatchConfig;
use crate::run_context::MarkerPolicy;
use crate::video::processor::CommandProcessor;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load scan data into PostgreSQL by running the external deploy script
    Deploy(DeployArgs),
    /// Run motion detection on every video that has no results yet
    Scan {
        #[command(flatten)]
        folders: FolderArgs,
        #[command(flatten)]
        dispatch: DispatchArgs,
    },
    /// Print the stored scan results of one video as JSON
    Results {
        #[command(flatten)]
        folders: FolderArgs,
        /// Video name (file name without extension)
        video: String,
    },
    /// List scanned, uploaded or still pending videos as JSON
    List {
        #[arg(value_enum)]
        kind: ListKind,
        #[command(flatten)]
        folders: FolderArgs,
        /// How a finished video is recognised when listing pending videos
        #[arg(long, value_enum, env = "VIDEO_SCANNER_MARKER", default_value = "file")]
        marker: MarkerPolicy,
    },
    /// Serve the HTTP API
    Serve(ServeArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListKind {
    Scanned,
    Uploaded,
    /// Uploaded videos without results yet
    Pending,
}

#[derive(clap::Args, Debug, Clone)]
pub struct FolderArgs {
    /// Folder holding the source videos
    #[arg(
        long,
        visible_alias = "input",
        env = "VIDEO_SCANNER_UPLOADS_DIR",
        default_value = "uploads"
    )]
    pub uploads: PathBuf,

    /// Folder holding one results directory per processed video
    #[arg(
        long,
        visible_alias = "output",
        env = "VIDEO_SCANNER_DETECTIONS_DIR",
        default_value = "detections"
    )]
    pub detections: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DispatchArgs {
    /// Worker threads (defaults to the number of CPUs)
    #[arg(long, env = "VIDEO_SCANNER_WORKERS")]
    pub workers: Option<usize>,

    /// How a finished video is recognised in the output folder
    #[arg(long, value_enum, env = "VIDEO_SCANNER_MARKER", default_value = "file")]
    pub marker: MarkerPolicy,

    /// Delete leftover output of unfinished videos before reprocessing them
    #[arg(long, env = "VIDEO_SCANNER_CLEAN_PARTIAL")]
    pub clean_partial: bool,

    /// Motion detection command; the video path and output folder are appended
    #[arg(
        long,
        env = "VIDEO_SCANNER_PROCESSOR",
        default_value = "python3 -m motion_detection"
    )]
    pub processor: String,
}

impl DispatchArgs {
    pub fn dispatch_config(&self, show_progress: bool) -> DispatchConfig {
        let defaults = DispatchConfig::default();
        DispatchConfig {
            workers: self.workers.unwrap_or(defaults.workers),
            marker_policy: self.marker,
            clean_partial: self.clean_partial,
            show_progress,
        }
    }

    pub fn processor(&self) -> Result<CommandProcessor> {
        CommandProcessor::parse(&self.processor)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct DeployArgs {
    /// Path of the database deploy script
    #[arg(long, env = "VIDEO_SCANNER_DEPLOY_SCRIPT", default_value = DEFAULT_SCRIPT_PATH)]
    pub script: PathBuf,

    /// Interpreter used to run the deploy script
    #[arg(long, env = "VIDEO_SCANNER_INTERPRETER", default_value = DEFAULT_INTERPRETER)]
    pub interpreter: String,
}

impl DeployArgs {
    /// Reads the DB environment at call time, once per invocation.
    pub fn to_config(&self) -> DeployConfig {
        DeployConfig {
            script_path: self.script.clone(),
            interpreter: self.interpreter.clone(),
            env: DbEnv::from_env(),
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to bind to
    #[arg(long, env = "VIDEO_SCANNER_PORT", default_value_t = 3000)]
    pub port: u16,

    #[command(flatten)]
    pub folders: FolderArgs,

    #[command(flatten)]
    pub dispatch: DispatchArgs,

    #[command(flatten)]
    pub deploy: DeployArgs,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
