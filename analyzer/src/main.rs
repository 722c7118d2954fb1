mod analysis;
mod export;
mod overlay;
mod source;

use std::path::PathBuf;
use std::sync::Arc;

use analysis::difference::FrameDifference;
use chrono::Utc;
use export::sequence::ImageSequenceExporter;
use export::{keys, report, ExportError};
use framedrop_common::config::Config;
use framedrop_engine::{
    Dispatch, EngineOpenError, EngineOptions, PipelineEngine, ReadError, SourceError,
};
use overlay::OverlayRenderer;
use source::ImageSequenceSource;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("capture source: {0}")]
    Source(#[from] SourceError),
    #[error("engine: {0}")]
    Engine(#[from] EngineOpenError),
    #[error("export: {0}")]
    Export(#[from] ExportError),
    #[error("analysis log poisoned by a panicking task")]
    LogPoisoned,
}

fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        source = %config.source.path.display(),
        video_fps = config.analysis.video_fps,
        parallel_pretasks = config.engine.parallel_pretasks,
        overlay = config.overlay.enabled,
        export_dir = %config.export.directory.display(),
        "starting framedrop analyzer"
    );

    if let Err(e) = run(&config) {
        error!(error = %e, "analysis failed");
        std::process::exit(1);
    }
}

fn engine_options(config: &Config) -> EngineOptions {
    let dispatch = if config.engine.parallel_pretasks {
        Dispatch::Parallel {
            worker_threads: config.engine.worker_threads,
        }
    } else {
        Dispatch::Sequential
    };
    EngineOptions { dispatch }
}

fn run(config: &Config) -> Result<(), AnalyzerError> {
    let started_at_ms = Utc::now().timestamp_millis();

    let source = ImageSequenceSource::open(&config.source)?;
    let total = source.frame_count();
    let mut engine = PipelineEngine::with_options(source, engine_options(config))?;

    let log = analysis::shared_log(config.analysis.video_fps, config.analysis.window_frames());
    engine.add_pre_task(FrameDifference::new(
        config.analysis.tolerance,
        config.analysis.threshold,
        Arc::clone(&log),
    ));
    // Post-task order matters: the exporter must see the finished overlay.
    if config.overlay.enabled {
        engine.add_post_task(OverlayRenderer::new(
            Arc::clone(&log),
            config.overlay.export_as_overlay,
        ));
    }
    if config.export.imagesequence_enabled {
        engine.add_post_task(ImageSequenceExporter::open(&config.export)?);
    }
    info!(
        pre_tasks = ?engine.registry().pre_task_names(),
        post_tasks = ?engine.registry().post_task_names(),
        "tasks registered"
    );

    drive(&mut engine, config.source.max_read_failures, total);

    let log = log.lock().map_err(|_| AnalyzerError::LogPoisoned)?;
    let summary = log.summary();
    info!(
        frames = summary.frames,
        unique = summary.unique_frames,
        duplicates = summary.duplicate_frames,
        average_framerate = format!("{:.2}", summary.average_framerate),
        max_frametime_ms = format!("{:.2}", summary.max_frametime_ms),
        "analysis finished"
    );

    if config.export.export_csv || config.export.export_summary {
        export::ensure_directory(&config.export.directory)?;
    }
    if config.export.export_csv {
        let path = config.export.directory.join(keys::csv_file_name(started_at_ms));
        report::write_csv(&path, log.stats())?;
    }
    if config.export.export_summary {
        let path = config
            .export
            .directory
            .join(keys::summary_file_name(started_at_ms));
        report::write_summary(&path, &summary)?;
    }
    Ok(())
}

/// Advance until the stream ends, skipping over up to `max_read_failures`
/// consecutive unreadable frames.
fn drive(engine: &mut PipelineEngine<ImageSequenceSource>, max_read_failures: u32, total: usize) {
    let mut consecutive_failures = 0u32;
    loop {
        match engine.try_advance() {
            Ok(index) => {
                consecutive_failures = 0;
                if index % 100 == 0 {
                    info!(index, total, "frames processed");
                } else {
                    debug!(index, "frame processed");
                }
            }
            Err(ReadError::EndOfStream) => break,
            Err(ReadError::Failure(reason)) => {
                consecutive_failures += 1;
                if consecutive_failures > max_read_failures {
                    warn!(
                        reason,
                        consecutive_failures, "too many unreadable frames, stopping"
                    );
                    break;
                }
                warn!(reason, "skipping unreadable frame");
            }
        }
    }
    info!(
        frames = engine.current_frame_index(),
        state = ?engine.state(),
        position = engine.active_source().position(),
        "capture drained"
    );
}
