use crate::video::is_video_name;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Reserved file name written inside `<output>/<stem>/` once a video is done.
/// When the processor leaves a plain file at `<output>/<stem>`, the marker is
/// the sibling `<output>/<stem>.processed` instead.
pub const MARKER_FILE_NAME: &str = ".processed";

/// Decides which output-folder entries count as "already processed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MarkerPolicy {
    /// The completion marker of `<stem>` must exist, see [`marker_path`]
    #[default]
    #[value(name = "file")]
    MarkerFile,
    /// Any entry named `<stem>` counts, whatever its type or contents
    #[value(name = "entry")]
    EntryName,
}

/// Contents of the completion marker file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompletionMarker {
    pub video_name: String,
    pub completed_at: DateTime<Utc>,
    /// `<output>/<stem>`, a directory or a file
    pub output_path: PathBuf,
}

/// Videos found in the input folder, split by whether they still need work.
#[derive(Debug, Default)]
pub struct ScanPlan {
    pub pending: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Name of a video without its extension; this is its identity in the
/// output folder.
pub fn video_stem(video_path: &Path) -> Option<&str> {
    video_path.file_stem().and_then(|s| s.to_str())
}

/// Immediate video files of `video_root`.
pub fn list_videos(video_root: &Path) -> Result<Vec<PathBuf>> {
    if !video_root.is_dir() {
        bail!("Video folder not found: {}", video_root.display());
    }

    let mut videos = Vec::new();
    for entry in WalkDir::new(video_root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            // Dangling symlinks and the like only cost their own entry
            Err(e) if e.depth() > 0 => {
                tracing::warn!("Skipping unreadable entry in {}: {}", video_root.display(), e);
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", video_root.display()))
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let is_video = entry.file_name().to_str().map(is_video_name).unwrap_or(false);
        if is_video {
            videos.push(entry.into_path());
        }
    }

    Ok(videos)
}

/// Stems of the videos the output folder already holds under `policy`.
/// A missing output folder means nothing has been processed yet.
pub fn completed_names(output_root: &Path, policy: MarkerPolicy) -> Result<HashSet<String>> {
    let mut names = HashSet::new();

    if !output_root.exists() {
        return Ok(names);
    }

    for entry in fs::read_dir(output_root)
        .with_context(|| format!("Failed to read output folder {}", output_root.display()))?
    {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let done = match policy {
            MarkerPolicy::EntryName => true,
            MarkerPolicy::MarkerFile => marker_path(output_root, &name).is_file(),
        };
        if done {
            names.insert(name);
        }
    }

    Ok(names)
}

/// Splits the input folder's videos into pending and already processed.
/// Both lists are sorted for stable output; callers must not read meaning
/// into the order.
pub fn plan_scan(input_root: &Path, output_root: &Path, policy: MarkerPolicy) -> Result<ScanPlan> {
    let completed = completed_names(output_root, policy)?;
    let mut plan = ScanPlan::default();

    for video in list_videos(input_root)? {
        let done = video_stem(&video)
            .map(|stem| completed.contains(stem))
            .unwrap_or(false);
        if done {
            plan.skipped.push(video);
        } else {
            plan.pending.push(video);
        }
    }

    plan.pending.sort();
    plan.skipped.sort();
    Ok(plan)
}

pub fn pending_videos(
    input_root: &Path,
    output_root: &Path,
    policy: MarkerPolicy,
) -> Result<Vec<PathBuf>> {
    Ok(plan_scan(input_root, output_root, policy)?.pending)
}

/// Where the completion marker of `stem` lives: inside `<output>/<stem>/`,
/// or next to it when the output entry is not a directory.
pub fn marker_path(output_root: &Path, stem: &str) -> PathBuf {
    let output_path = output_root.join(stem);
    if output_path.exists() && !output_path.is_dir() {
        output_root.join(format!("{}{}", stem, MARKER_FILE_NAME))
    } else {
        output_path.join(MARKER_FILE_NAME)
    }
}

/// Records `video_path` as done by writing its marker file, creating the
/// output directory if the processor left nothing behind.
pub fn write_marker(output_root: &Path, video_path: &Path) -> Result<CompletionMarker> {
    let stem = video_stem(video_path)
        .ok_or_else(|| anyhow::anyhow!("Invalid video name: {}", video_path.display()))?;

    let output_path = output_root.join(stem);
    if !output_path.exists() {
        fs::create_dir_all(&output_path)?;
    }

    let marker = CompletionMarker {
        video_name: video_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(stem)
            .to_string(),
        completed_at: Utc::now(),
        output_path,
    };

    let content = serde_json::to_string_pretty(&marker)?;
    fs::write(marker_path(output_root, stem), content)?;

    Ok(marker)
}

/// Deletes whatever a previous, unfinished run left at `<output>/<stem>`.
/// Returns whether anything was removed.
pub fn remove_partial_output(output_root: &Path, stem: &str) -> Result<bool> {
    let path = output_root.join(stem);
    let metadata = match fs::symlink_metadata(&path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let removed = if metadata.is_dir() {
        fs::remove_dir_all(&path)
    } else {
        fs::remove_file(&path)
    };
    removed.with_context(|| format!("Failed to remove partial output {}", path.display()))?;

    Ok(true)
}

/// Names of the videos that have a results directory, creating the
/// detections folder on first use.
pub fn list_scanned(detections_root: &Path) -> Result<Vec<String>> {
    fs::create_dir_all(detections_root)?;

    let mut names = Vec::new();
    for entry in fs::read_dir(detections_root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    Ok(names)
}

/// File names of the uploaded videos.
pub fn list_uploaded(uploads_root: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = list_videos(uploads_root)?
        .iter()
        .filter_map(|p| p.file_name().and_then(|s| s.to_str()).map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}
