// Deployment runner: loads the videodata database by invoking the external
// deploy script with the DB connection settings of the current environment.

use std::io;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::{error, info, warn};

pub const DEFAULT_SCRIPT_PATH: &str = "/postgresql/data_cluster/deploy_postgres.py";
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Connection settings handed to the deploy script. These six variables are
/// the only environment the child process sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbEnv {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
    pub name: String,
    pub path: String,
}

impl DbEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the mapping from an arbitrary lookup, falling back to the
    /// documented default for every key the lookup does not know.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            host: get("DB_HOST", "postgres"),
            port: get("DB_PORT", "5432"),
            user: get("DB_USER", "postgres"),
            password: get("DB_PASSWORD", "postgres"),
            name: get("DB_NAME", "videodata"),
            // PATH is never inherited implicitly
            path: get("PATH", ""),
        }
    }

    pub fn vars(&self) -> [(&'static str, &str); 6] {
        [
            ("DB_HOST", self.host.as_str()),
            ("DB_PORT", self.port.as_str()),
            ("DB_USER", self.user.as_str()),
            ("DB_PASSWORD", self.password.as_str()),
            ("DB_NAME", self.name.as_str()),
            ("PATH", self.path.as_str()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub script_path: PathBuf,
    pub interpreter: String,
    pub env: DbEnv,
}

/// Captured output of a successful deploy run.
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("deploy script does not exist at {}", .0.display())]
    MissingScript(PathBuf),
    #[error("deploy script exited with {}", describe_status(.status))]
    SubprocessFailure { status: Option<i32>, stderr: String },
    #[error("unexpected error running deploy script: {0}")]
    Unexpected(#[from] io::Error),
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Runs the deploy script once and waits for it.
pub fn run_deploy(config: &DeployConfig) -> Result<DeployReport, DeployError> {
    if !config.script_path.exists() {
        return Err(DeployError::MissingScript(config.script_path.clone()));
    }

    info!(
        "Running {} {}",
        config.interpreter,
        config.script_path.display()
    );

    let output = Command::new(&config.interpreter)
        .arg(&config.script_path)
        .env_clear()
        .envs(config.env.vars())
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(DeployError::SubprocessFailure {
            status: output.status.code(),
            stderr,
        });
    }

    Ok(DeployReport { stdout, stderr })
}

/// CLI entry point: runs the deploy script and maps the outcome to a process
/// exit code (0 on success, 1 on any failure).
pub fn execute(config: &DeployConfig) -> i32 {
    info!("Starting data load into PostgreSQL");

    match run_deploy(config) {
        Ok(report) => {
            println!("{}", report.stdout);
            if !report.stderr.is_empty() {
                warn!("Deploy script reported warnings: {}", report.stderr);
            }
            info!("Data load completed successfully");
            0
        }
        Err(e) => {
            error!("{}", e);
            if let DeployError::SubprocessFailure { stderr, .. } = &e {
                error!("Deploy script stderr: {}", stderr);
            }
            1
        }
    }
}
