use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use super::ExportError;
use crate::analysis::{AnalysisSummary, FrameStats};

const CSV_HEADER: &str = "frame,diff_ratio,unique,framerate,frametime_ms";

/// Write the per-frame analysis series as CSV.
pub fn write_csv(path: &Path, stats: &[FrameStats]) -> Result<(), ExportError> {
    let write_err = |e| ExportError::Write(path.display().to_string(), e);
    let file = File::create(path).map_err(write_err)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{CSV_HEADER}").map_err(write_err)?;
    for s in stats {
        writeln!(
            out,
            "{},{:.6},{},{:.3},{:.3}",
            s.index,
            s.diff_ratio,
            u8::from(s.unique),
            s.framerate,
            s.frametime_ms
        )
        .map_err(write_err)?;
    }
    out.flush().map_err(write_err)?;

    info!(path = %path.display(), rows = stats.len(), "wrote framerate csv");
    Ok(())
}

/// Write the run summary as pretty-printed JSON.
pub fn write_summary(path: &Path, summary: &AnalysisSummary) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|e| ExportError::Write(path.display().to_string(), e))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, summary)?;
    out.flush()
        .map_err(|e| ExportError::Write(path.display().to_string(), e))?;

    info!(path = %path.display(), "wrote run summary");
    Ok(())
}
