//! Audio input: decoding sources and voice-activity detection.

pub mod source;
pub mod vad;
pub mod wav;

use crate::error::Result;
use source::{FfmpegSource, PcmSource, SourceConfig};
use std::path::Path;
use wav::WavSource;

/// Opens the right source for `path`: WAV files are read directly,
/// everything else goes through ffmpeg.
pub fn open_source(path: &Path, config: &SourceConfig) -> Result<Box<dyn PcmSource>> {
    if is_wav(path) {
        Ok(Box::new(WavSource::open(path, config)?))
    } else {
        Ok(Box::new(FfmpegSource::spawn(path, config)?))
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
}
