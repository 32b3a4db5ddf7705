use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::process::Command;

/// A trait for handling a single video. This separates the "how to process"
/// from the "which videos and on which worker" logic of the dispatcher.
pub trait VideoProcessor: Send + Sync {
    fn process(&self, video_path: &Path, output_folder: &Path) -> Result<()>;
}

/// Blanket implementation so any closure with the right signature
/// automatically implements VideoProcessor.
impl<F> VideoProcessor for F
where
    F: Fn(&Path, &Path) -> Result<()> + Send + Sync,
{
    fn process(&self, video_path: &Path, output_folder: &Path) -> Result<()> {
        self(video_path, output_folder)
    }
}

/// Runs motion detection as an external command:
/// `<program> <args..> <video_path> <output_folder>`.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
}

impl CommandProcessor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a whitespace-separated command line such as
    /// `python3 -m motion_detection`.
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("Processor command is empty"))?;
        Ok(Self::new(program, parts.collect()))
    }
}

impl VideoProcessor for CommandProcessor {
    fn process(&self, video_path: &Path, output_folder: &Path) -> Result<()> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(video_path)
            .arg(output_folder)
            .output()
            .with_context(|| format!("Failed to start processor '{}'", self.program))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!("{}: {}", video_path.display(), stdout.trim());
        }

        if !output.status.success() {
            bail!(
                "Processor '{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}
