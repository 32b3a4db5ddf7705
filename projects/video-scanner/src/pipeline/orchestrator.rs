// Batch orchestrator: finds the unprocessed videos of a folder and runs
// them through a VideoProcessor on a fixed-size pool of worker threads.

pub use crate::pipeline::types::{DispatchConfig, DispatchSummary};
use crate::pipeline::types::VideoOutcome;
use crate::run_context::{plan_scan, remove_partial_output, video_stem, write_marker, MarkerPolicy};
use crate::video::processor::VideoProcessor;
use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;

/// Process every video of `input_folder` that `output_folder` does not mark
/// as done. Each pending video is handed to `processor` exactly once; a
/// failing or panicking video is recorded and does not stop the others.
pub fn dispatch<P>(
    input_folder: &Path,
    output_folder: &Path,
    config: &DispatchConfig,
    processor: &P,
) -> Result<DispatchSummary>
where
    P: VideoProcessor + ?Sized,
{
    let plan = plan_scan(input_folder, output_folder, config.marker_policy)?;
    fs::create_dir_all(output_folder).with_context(|| {
        format!(
            "Failed to create output folder {}",
            output_folder.display()
        )
    })?;

    let queued: Vec<_> = plan
        .pending
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy())
        .collect();
    tracing::info!("New videos to process: {:?}", queued);

    let mut summary = DispatchSummary {
        skipped: plan.skipped,
        ..DispatchSummary::default()
    };

    if plan.pending.is_empty() {
        return Ok(summary);
    }

    if config.clean_partial {
        for video in &plan.pending {
            if let Some(stem) = video_stem(video) {
                if remove_partial_output(output_folder, stem)? {
                    tracing::info!("Removed partial output for {}", stem);
                }
            }
        }
    }

    let workers = config.workers.max(1).min(plan.pending.len());
    let pb = progress_bar(plan.pending.len(), config.show_progress)?;

    let (job_tx, job_rx) = channel::unbounded::<PathBuf>();
    let (result_tx, result_rx) = channel::unbounded::<VideoOutcome>();
    for video in plan.pending {
        job_tx.send(video).context("Video job queue closed")?;
    }
    drop(job_tx);

    thread::scope(|scope| {
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                tracing::debug!("Spawning video worker {}", worker_id);
                video_worker(
                    job_rx,
                    result_tx,
                    output_folder,
                    config.marker_policy,
                    processor,
                );
                tracing::debug!("Video worker {} finished", worker_id);
            });
        }
        drop(result_tx);

        for outcome in result_rx.iter() {
            match &outcome.error {
                None => tracing::info!("Processed {}", outcome.video.display()),
                Some(e) => tracing::error!("Processing {} failed: {}", outcome.video.display(), e),
            }
            pb.inc(1);
            summary.record(outcome);
        }
    });

    pb.finish_with_message("Done");
    summary.sort();

    tracing::info!(
        "Dispatch finished: {} submitted, {} succeeded, {} failed, {} skipped",
        summary.submitted(),
        summary.succeeded.len(),
        summary.failed.len(),
        summary.skipped.len()
    );

    Ok(summary)
}

/// Pulls videos off the job channel until it is drained.
fn video_worker<P>(
    rx: Receiver<PathBuf>,
    tx: Sender<VideoOutcome>,
    output_folder: &Path,
    policy: MarkerPolicy,
    processor: &P,
) where
    P: VideoProcessor + ?Sized,
{
    for video in rx {
        let error = run_one(&video, output_folder, policy, processor);
        if tx.send(VideoOutcome { video, error }).is_err() {
            break;
        }
    }
}

fn run_one<P>(video: &Path, output_folder: &Path, policy: MarkerPolicy, processor: &P) -> Option<String>
where
    P: VideoProcessor + ?Sized,
{
    let result = panic::catch_unwind(AssertUnwindSafe(|| processor.process(video, output_folder)));

    match result {
        Ok(Ok(())) => match policy {
            MarkerPolicy::MarkerFile => write_marker(output_folder, video)
                .err()
                .map(|e| format!("Failed to write completion marker: {:#}", e)),
            MarkerPolicy::EntryName => None,
        },
        Ok(Err(e)) => Some(format!("{:#}", e)),
        Err(payload) => Some(format!("Processor panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn progress_bar(len: usize, visible: bool) -> Result<ProgressBar> {
    if !visible {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} videos ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}
