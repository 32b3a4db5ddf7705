// Scan result artifacts
//
// Motion detection leaves one directory per video under the detections
// folder. This module reads the scene analysis JSON and the per-second
// detection lists back out of it.

use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SCENE_SUFFIX: &str = "escenario_analysis.json";
const DETECTIONS_SUFFIX: &str = ".txt";

/// One line of a detections file:
/// `object_name,x1,y1,x2,y2,color,proximity,second`
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DetectionRow {
    pub object_name: String,
    /// x1, y1, x2, y2 in pixels
    pub bounding_box: [f64; 4],
    pub color: String,
    pub proximity: String,
    pub second: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResultFile {
    Json {
        file_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Txt {
        file_name: String,
        content: Vec<DetectionRow>,
    },
}

#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("invalid video name: {0:?}")]
    InvalidName(String),
    #[error("no results found for video {0}")]
    NoResults(String),
    #[error("failed to read {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ResultsError + '_ {
    move |source| ResultsError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads every result file of `<detections_root>/<video_name>`.
/// Scene files come first, then detection lists, each sorted by name.
pub fn read_scan_results(
    detections_root: &Path,
    video_name: &str,
) -> Result<Vec<ResultFile>, ResultsError> {
    if video_name.is_empty()
        || video_name == "."
        || video_name == ".."
        || video_name.contains(['/', '\\'])
    {
        return Err(ResultsError::InvalidName(video_name.to_string()));
    }

    let video_dir = detections_root.join(video_name);
    let mut file_names = Vec::new();
    for entry in fs::read_dir(&video_dir).map_err(io_error(&video_dir))? {
        let entry = entry.map_err(io_error(&video_dir))?;
        if let Some(name) = entry.file_name().to_str() {
            file_names.push(name.to_string());
        }
    }
    file_names.sort();

    let scene_files: Vec<&String> = file_names
        .iter()
        .filter(|n| n.ends_with(SCENE_SUFFIX))
        .collect();
    let detection_files: Vec<&String> = file_names
        .iter()
        .filter(|n| n.ends_with(DETECTIONS_SUFFIX))
        .collect();

    if scene_files.is_empty() && detection_files.is_empty() {
        return Err(ResultsError::NoResults(video_name.to_string()));
    }

    let mut results = Vec::with_capacity(scene_files.len() + detection_files.len());

    for name in scene_files {
        let path = video_dir.join(name);
        let raw = fs::read_to_string(&path).map_err(io_error(&path))?;
        let entry = match parse_scene(&raw) {
            Ok(content) => ResultFile::Json {
                file_name: name.clone(),
                content: Some(content),
                error: None,
            },
            Err(e) => {
                tracing::error!("Error parsing JSON in file {}: {}", name, e);
                ResultFile::Json {
                    file_name: name.clone(),
                    content: None,
                    error: Some("Invalid or empty JSON file".to_string()),
                }
            }
        };
        results.push(entry);
    }

    for name in detection_files {
        let path = video_dir.join(name);
        let raw = fs::read_to_string(&path).map_err(io_error(&path))?;
        results.push(ResultFile::Txt {
            file_name: name.clone(),
            content: parse_detections(&raw, name),
        });
    }

    Ok(results)
}

/// Scene analysis is sometimes stored as a JSON string that itself holds
/// the JSON document, so a string at the top level is decoded once more.
pub fn parse_scene(raw: &str) -> Result<Value, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    match value {
        Value::String(inner) => serde_json::from_str(&inner),
        other => Ok(other),
    }
}

pub fn parse_detections(raw: &str, file_name: &str) -> Vec<DetectionRow> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let row = parse_detection_line(line);
            if row.is_none() {
                tracing::warn!("Invalid line in {}: {}", file_name, line);
            }
            row
        })
        .collect()
}

fn parse_detection_line(line: &str) -> Option<DetectionRow> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() != 8 {
        return None;
    }

    let coord = |s: &str| s.parse::<f64>().ok();

    Some(DetectionRow {
        object_name: parts[0].to_string(),
        bounding_box: [
            coord(parts[1])?,
            coord(parts[2])?,
            coord(parts[3])?,
            coord(parts[4])?,
        ],
        color: parts[5].to_string(),
        proximity: parts[6].to_string(),
        second: parts[7].parse().ok()?,
    })
}
