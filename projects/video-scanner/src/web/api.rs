use crate::cli::{DeployArgs, FolderArgs};
use crate::deploy::{run_deploy, DeployError};
use crate::pipeline::orchestrator::{dispatch, DispatchConfig, DispatchSummary};
use crate::run_artifacts::{read_scan_results, ResultFile, ResultsError};
use crate::run_context::{list_scanned, list_uploaded};
use crate::video::processor::CommandProcessor;
use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Shared state for all handlers
pub struct AppState {
    pub folders: FolderArgs,
    pub dispatch: DispatchConfig,
    pub processor: CommandProcessor,
    pub deploy: DeployArgs,
}

type ApiError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn bad_request(e: impl std::fmt::Display) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

#[derive(Serialize)]
pub struct VideoList {
    pub videos: Vec<String>,
}

#[derive(Serialize)]
pub struct ScanResults {
    pub results: Vec<ResultFile>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    #[serde(rename = "filePath")]
    pub file_path: PathBuf,
}

#[derive(Serialize)]
pub struct LoadDataResponse {
    pub success: bool,
    pub message: String,
}

pub async fn get_scanned_videos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VideoList>, ApiError> {
    let videos = tokio::task::spawn_blocking(move || list_scanned(&state.folders.detections))
        .await
        .map_err(internal)?
        .map_err(|e| {
            tracing::error!("Error reading scanned videos: {:#}", e);
            internal("Error reading videos")
        })?;
    Ok(Json(VideoList { videos }))
}

pub async fn get_uploaded_videos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VideoList>, ApiError> {
    let videos = tokio::task::spawn_blocking(move || list_uploaded(&state.folders.uploads))
        .await
        .map_err(internal)?
        .map_err(|e| {
            tracing::error!("Error reading uploads folder: {:#}", e);
            internal("Error reading uploaded videos")
        })?;
    Ok(Json(VideoList { videos }))
}

/// Keeps only the last path component of a client-supplied file name.
pub fn upload_file_name(raw: &str) -> Option<&str> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name)
    }
}

/// Stores the multipart `video` field in the uploads folder under the
/// client's file name.
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() != Some("video") {
            continue;
        }
        let file_name = field
            .file_name()
            .and_then(upload_file_name)
            .map(str::to_string)
            .ok_or_else(|| bad_request("Error uploading file"))?;

        let uploads = &state.folders.uploads;
        tokio::fs::create_dir_all(uploads).await.map_err(internal)?;

        // A scan only ever sees the finished file
        let partial = uploads.join(format!(".{}.part", file_name));
        if let Err(e) = stream_to_file(&partial, &mut field).await {
            tokio::fs::remove_file(&partial).await.ok();
            return Err(e);
        }
        let file_path = uploads.join(&file_name);
        tokio::fs::rename(&partial, &file_path)
            .await
            .map_err(internal)?;

        tracing::info!("File uploaded successfully: {}", file_path.display());
        return Ok(Json(UploadResponse {
            message: "File uploaded successfully".to_string(),
            file_path,
        }));
    }

    tracing::error!("File upload failed: no video field");
    Err(bad_request("Error uploading file"))
}

async fn stream_to_file(path: &std::path::Path, field: &mut Field<'_>) -> Result<(), ApiError> {
    let mut file = tokio::fs::File::create(path).await.map_err(internal)?;
    while let Some(chunk) = field.chunk().await.map_err(bad_request)? {
        file.write_all(&chunk).await.map_err(internal)?;
    }
    file.flush().await.map_err(internal)?;
    Ok(())
}

pub async fn scan_videos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DispatchSummary>, ApiError> {
    let summary = tokio::task::spawn_blocking(move || {
        dispatch(
            &state.folders.uploads,
            &state.folders.detections,
            &state.dispatch,
            &state.processor,
        )
    })
    .await
    .map_err(internal)?
    .map_err(|e| {
        tracing::error!("Video scan failed: {:#}", e);
        internal(format!("{:#}", e))
    })?;

    Ok(Json(summary))
}

pub fn results_status(e: &ResultsError) -> StatusCode {
    match e {
        ResultsError::InvalidName(_) | ResultsError::NoResults(_) => StatusCode::NOT_FOUND,
        ResultsError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn get_scan_results(
    State(state): State<Arc<AppState>>,
    Path(video_name): Path<String>,
) -> Result<Json<ScanResults>, ApiError> {
    let lookup = video_name.clone();
    let outcome =
        tokio::task::spawn_blocking(move || read_scan_results(&state.folders.detections, &lookup))
            .await
            .map_err(internal)?;

    match outcome {
        Ok(results) => Ok(Json(ScanResults { results })),
        Err(e) => {
            tracing::error!("Error reading results for {}: {}", video_name, e);
            Err((results_status(&e), e.to_string()))
        }
    }
}

pub async fn load_data(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LoadDataResponse>, ApiError> {
    let config = state.deploy.to_config();
    let outcome = tokio::task::spawn_blocking(move || run_deploy(&config))
        .await
        .map_err(internal)?;

    match outcome {
        Ok(report) => {
            tracing::info!("Deploy script finished: {}", report.stdout.trim());
            if !report.stderr.is_empty() {
                tracing::warn!("Deploy script reported warnings: {}", report.stderr);
            }
            Ok(Json(LoadDataResponse {
                success: true,
                message: "Data loaded successfully".to_string(),
            }))
        }
        Err(e) => {
            tracing::error!("Data load failed: {}", e);
            let message = match &e {
                DeployError::SubprocessFailure { stderr, .. } => {
                    format!("Error loading data: {}: {}", e, stderr.trim())
                }
                _ => format!("Error loading data: {}", e),
            };
            Err(internal(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_context::MarkerPolicy;
    use crate::web::server::router;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, Response};
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_state(root: &std::path::Path) -> Arc<AppState> {
        Arc::new(AppState {
            folders: FolderArgs {
                uploads: root.join("uploads"),
                detections: root.join("detections"),
            },
            dispatch: DispatchConfig {
                workers: 2,
                marker_policy: MarkerPolicy::MarkerFile,
                clean_partial: false,
                show_progress: false,
            },
            // Empty videos fail, anything else succeeds
            processor: CommandProcessor::new(
                "sh",
                vec!["-c".to_string(), "test -s \"$1\"".to_string(), "sh".to_string()],
            ),
            deploy: DeployArgs {
                script: root.join("deploy.sh"),
                interpreter: "/bin/sh".to_string(),
            },
        })
    }

    async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response: Response<Body> = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn as_json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[test]
    fn test_results_status() {
        assert_eq!(
            results_status(&ResultsError::NoResults("clip".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            results_status(&ResultsError::InvalidName("..".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            results_status(&ResultsError::Io {
                path: PathBuf::from("detections/clip"),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upload_file_name_keeps_last_component() {
        assert_eq!(upload_file_name("clip.mp4"), Some("clip.mp4"));
        assert_eq!(upload_file_name("../../etc/clip.mp4"), Some("clip.mp4"));
        assert_eq!(upload_file_name("C:\\videos\\street.avi"), Some("street.avi"));
        assert_eq!(upload_file_name("uploads/.."), None);
        assert_eq!(upload_file_name(""), None);
    }

    #[tokio::test]
    async fn test_video_listings() {
        let root = TempDir::new().unwrap();
        let state = test_state(root.path());
        let detections = root.path().join("detections");
        fs::create_dir_all(detections.join("beach")).unwrap();
        fs::create_dir_all(detections.join("alley")).unwrap();
        let uploads = root.path().join("uploads");
        fs::create_dir_all(&uploads).unwrap();
        fs::write(uploads.join("beach.mp4"), b"").unwrap();
        fs::write(uploads.join("notes.txt"), b"").unwrap();

        let (status, body) = send(state.clone(), get("/video/list-videos-scanned")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(as_json(&body), json!({"videos": ["alley", "beach"]}));

        let (status, body) = send(state, get("/video/list-videos-uploaded")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(as_json(&body), json!({"videos": ["beach.mp4"]}));
    }

    #[tokio::test]
    async fn test_uploads_listing_fails_without_folder() {
        let root = TempDir::new().unwrap();
        let (status, _) = send(test_state(root.path()), get("/video/list-videos-uploaded")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_scan_results_lookup() {
        let root = TempDir::new().unwrap();
        let state = test_state(root.path());
        let detections = root.path().join("detections");
        fs::create_dir_all(detections.join("empty")).unwrap();
        fs::create_dir_all(detections.join("street")).unwrap();
        fs::write(
            detections.join("street").join("detections_1.txt"),
            "person,1,2,3,4,red,near,1\n",
        )
        .unwrap();

        let (status, _) = send(state.clone(), get("/video/results/empty")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(state.clone(), get("/video/results/missing")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, body) = send(state, get("/video/results/street")).await;
        assert_eq!(status, StatusCode::OK);
        let results = as_json(&body);
        assert_eq!(results["results"][0]["type"], "txt");
        assert_eq!(results["results"][0]["content"][0]["object_name"], "person");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_returns_summary() {
        let root = TempDir::new().unwrap();
        let state = test_state(root.path());
        let uploads = root.path().join("uploads");
        fs::create_dir_all(&uploads).unwrap();
        fs::write(uploads.join("good.mp4"), b"frames").unwrap();
        fs::write(uploads.join("truncated.avi"), b"").unwrap();

        let (status, body) = send(state.clone(), post("/video/scan")).await;
        assert_eq!(status, StatusCode::OK);
        let summary = as_json(&body);
        assert_eq!(
            summary["succeeded"],
            json!([uploads.join("good.mp4").display().to_string()])
        );
        assert_eq!(summary["failed"].as_array().unwrap().len(), 1);
        assert_eq!(
            summary["failed"][0]["video"],
            uploads.join("truncated.avi").display().to_string()
        );

        let (_, body) = send(state, post("/video/scan")).await;
        let again = as_json(&body);
        assert_eq!(again["succeeded"], json!([]));
        assert_eq!(again["skipped"].as_array().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_load_data_success() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("deploy.sh"), "echo loaded\n").unwrap();

        let (status, body) = send(test_state(root.path()), post("/seeder/load-data")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            as_json(&body),
            json!({"success": true, "message": "Data loaded successfully"})
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_load_data_failure_carries_diagnostic() {
        let root = TempDir::new().unwrap();
        let state = test_state(root.path());

        let (status, body) = send(state.clone(), post("/seeder/load-data")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(String::from_utf8_lossy(&body).contains("does not exist"));

        fs::write(
            root.path().join("deploy.sh"),
            "echo 'relation videos missing' >&2\nexit 3\n",
        )
        .unwrap();
        let (status, body) = send(state, post("/seeder/load-data")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = String::from_utf8_lossy(&body).to_string();
        assert!(message.contains("exit code 3"), "{}", message);
        assert!(message.contains("relation videos missing"), "{}", message);
    }

    #[tokio::test]
    async fn test_upload_stores_video() {
        let root = TempDir::new().unwrap();
        let state = test_state(root.path());
        let body = "--XBOUNDARY\r\n\
                    Content-Disposition: form-data; name=\"video\"; filename=\"../clip.mp4\"\r\n\
                    Content-Type: video/mp4\r\n\
                    \r\n\
                    frames\r\n\
                    --XBOUNDARY--\r\n";
        let request = Request::builder()
            .method("POST")
            .uri("/video/upload")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap();

        let (status, body) = send(state.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        let stored = root.path().join("uploads").join("clip.mp4");
        assert_eq!(
            as_json(&body),
            json!({
                "message": "File uploaded successfully",
                "filePath": stored.display().to_string(),
            })
        );
        assert_eq!(fs::read(&stored).unwrap(), b"frames");
        assert!(!root.path().join("clip.mp4").exists());

        let (_, body) = send(state, get("/video/list-videos-uploaded")).await;
        assert_eq!(as_json(&body), json!({"videos": ["clip.mp4"]}));
    }

    #[tokio::test]
    async fn test_upload_without_video_field_is_rejected() {
        let root = TempDir::new().unwrap();
        let body = "--XBOUNDARY\r\n\
                    Content-Disposition: form-data; name=\"note\"\r\n\
                    \r\n\
                    hello\r\n\
                    --XBOUNDARY--\r\n";
        let request = Request::builder()
            .method("POST")
            .uri("/video/upload")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap();

        let (status, _) = send(test_state(root.path()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!root.path().join("uploads").join("note").exists());
    }
}
