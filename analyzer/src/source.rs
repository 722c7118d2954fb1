use std::path::{Path, PathBuf};

use framedrop_common::config::SourceConfig;
use framedrop_engine::{Frame, FrameSource, ReadError, SourceError};
use tracing::{debug, info};

/// A capture stored as a directory of still images, one file per frame.
///
/// Files are ordered by file name, so zero-padded sequence numbers sort
/// correctly. A file that fails to decode is reported as a read failure and
/// skipped; the next read continues with the following file.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
}

impl ImageSequenceSource {
    pub fn open(config: &SourceConfig) -> Result<Self, SourceError> {
        let dir = config.path.clone();
        let unavailable = |reason: String| SourceError::Unavailable {
            descriptor: dir.display().to_string(),
            reason,
        };

        let entries = std::fs::read_dir(&dir).map_err(|e| unavailable(e.to_string()))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_extension(path, &config.extensions))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(unavailable(format!(
                "no files with extensions {:?}",
                config.extensions
            )));
        }

        info!(dir = %dir.display(), frames = files.len(), "opened image sequence");
        Ok(Self {
            dir,
            files,
            position: 0,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.files.len()
    }

    /// Index of the next file to be read.
    pub fn position(&self) -> usize {
        self.position
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn read_next(&mut self) -> Result<Frame, ReadError> {
        let Some(path) = self.files.get(self.position) else {
            return Err(ReadError::EndOfStream);
        };
        self.position += 1;

        let image = image::open(path)
            .map_err(|e| ReadError::Failure(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), position = self.position, "decoded frame");
        Ok(Frame::from_image(image))
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.dir.display())
    }
}
