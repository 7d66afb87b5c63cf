//! WAV file audio source.
//!
//! WAV input skips the transcoder: samples are read with `hound`, downmixed
//! to mono and resampled to the pipeline rate.

use crate::audio::source::{PcmSource, SourceConfig};
use crate::error::{Result, SyncError};
use std::io::Read;
use std::path::Path;

/// Audio source that serves a decoded WAV file in fixed-size chunks.
pub struct WavSource {
    samples: Vec<i16>,
    position: usize,
    chunk_size: usize,
}

impl WavSource {
    /// Opens a WAV file and applies the seek offset and decode limit.
    pub fn open(path: &Path, config: &SourceConfig) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(Box::new(std::io::BufReader::new(file)), config)
    }

    /// Create from any reader (for testing/flexibility).
    pub fn from_reader(reader: Box<dyn Read + Send>, config: &SourceConfig) -> Result<Self> {
        let mut wav_reader = hound::WavReader::new(reader).map_err(|e| SyncError::Decode {
            message: format!("Failed to parse WAV file: {}", e),
        })?;

        let spec = wav_reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(SyncError::Decode {
                message: format!(
                    "Unsupported WAV format: {}-bit {:?} (expected 16-bit PCM)",
                    spec.bits_per_sample, spec.sample_format
                ),
            });
        }

        let raw_samples: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SyncError::Decode {
                message: format!("Failed to read WAV samples: {}", e),
            })?;

        let mono_samples = downmix(raw_samples, spec.channels);
        let mut samples = resample(&mono_samples, spec.sample_rate, config.sample_rate);

        let rate = config.sample_rate as u64;
        let skip = (config.seek_ms * rate / 1000) as usize;
        samples.drain(..skip.min(samples.len()));
        if let Some(limit) = config.limit_ms {
            samples.truncate((limit * rate / 1000) as usize);
        }

        tracing::debug!(
            source_rate = spec.sample_rate,
            channels = spec.channels,
            samples = samples.len(),
            "WAV input loaded"
        );

        Ok(Self {
            samples,
            position: 0,
            chunk_size: (config.chunk_bytes() / 2).max(1),
        })
    }

    /// Number of samples remaining after seek and limit were applied.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl PcmSource for WavSource {
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }

        let end = std::cmp::min(self.position + self.chunk_size, self.samples.len());
        let chunk = self.samples[self.position..end]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        self.position = end;

        Ok(Some(chunk))
    }

    fn destroy(&mut self) {
        self.position = self.samples.len();
    }
}

/// Averages interleaved channels into one.
fn downmix(samples: Vec<i16>, channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}
