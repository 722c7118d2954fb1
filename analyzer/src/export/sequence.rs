use std::path::PathBuf;

use framedrop_common::config::{ExportConfig, ImageFormatKind};
use framedrop_engine::{Frame, PostTask, TaskResult};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, info};

use super::keys::sequence_file_name;
use super::{ensure_directory, ExportError};

/// Post-task writing every result frame as one numbered image file.
///
/// Files are numbered by post-chain pass, starting at 0 for the frame-0 pass.
/// A pass whose save fails still consumes its number, so it leaves a gap
/// instead of shifting later files. Source frames the driver skips never reach
/// the post-chain and get no number.
pub struct ImageSequenceExporter {
    directory: PathBuf,
    prefix: String,
    format: ImageFormatKind,
    next_number: u64,
}

impl ImageSequenceExporter {
    pub fn open(config: &ExportConfig) -> Result<Self, ExportError> {
        ensure_directory(&config.directory)?;
        info!(
            directory = %config.directory.display(),
            prefix = config.imagesequence_prefix,
            format = config.image_format.extension(),
            "exporting image sequence"
        );
        Ok(Self {
            directory: config.directory.clone(),
            prefix: config.imagesequence_prefix.clone(),
            format: config.image_format,
            next_number: 0,
        })
    }

    fn take_path(&mut self) -> PathBuf {
        let number = self.next_number;
        self.next_number += 1;
        self.directory
            .join(sequence_file_name(&self.prefix, number, self.format.extension()))
    }
}

impl PostTask for ImageSequenceExporter {
    fn run(&mut self, result: &mut Frame) -> TaskResult {
        let path = self.take_path();
        let image = result.to_image()?;
        let (image, format) = match self.format {
            // The JPEG encoder has no alpha channel.
            ImageFormatKind::Jpeg => (DynamicImage::ImageRgb8(image.to_rgb8()), ImageFormat::Jpeg),
            ImageFormatKind::Png => (image, ImageFormat::Png),
        };
        image.save_with_format(&path, format)?;
        debug!(path = %path.display(), "exported frame");
        Ok(())
    }

    fn name(&self) -> &str {
        "image-sequence"
    }
}
