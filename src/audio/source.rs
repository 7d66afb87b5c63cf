//! PCM byte sources feeding the pipeline.
//!
//! A source yields fixed-size chunks of s16le mono PCM until it is exhausted
//! or destroyed. Destroying a source releases its underlying resource (for
//! ffmpeg, the child process) without waiting for it to finish.

use crate::defaults;
use crate::error::{Result, SyncError};
use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Bytes of decoder diagnostics kept for the error message.
const STDERR_CAPTURE_BYTES: usize = 8 * 1024;

/// A destroyable source of PCM bytes.
pub trait PcmSource: Send {
    /// Reads the next chunk. `Ok(None)` signals the end of the stream.
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>>;

    /// Stops the source and releases its resources. Idempotent.
    fn destroy(&mut self);
}

/// Settings shared by every source kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Transcoder binary used for non-WAV media.
    pub ffmpeg: String,
    pub sample_rate: u32,
    pub chunk_ms: u32,
    /// Media position where decoding starts.
    pub seek_ms: u64,
    /// Maximum amount of media to decode after the seek position.
    pub limit_ms: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            ffmpeg: defaults::FFMPEG_BINARY.to_string(),
            sample_rate: defaults::SAMPLE_RATE,
            chunk_ms: defaults::CHUNK_MS,
            seek_ms: defaults::SEEK_SECS * 1000,
            limit_ms: None,
        }
    }
}

impl SourceConfig {
    pub fn chunk_bytes(&self) -> usize {
        defaults::chunk_bytes(self.sample_rate, self.chunk_ms)
    }
}

/// Decodes a media file by piping it through ffmpeg.
pub struct FfmpegSource {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    chunk_bytes: usize,
    binary: String,
}

impl FfmpegSource {
    /// Starts ffmpeg on `path`.
    ///
    /// # Errors
    /// Returns `SyncError::Decode` if the process cannot be started.
    pub fn spawn(path: &std::path::Path, config: &SourceConfig) -> Result<Self> {
        let mut command = Command::new(&config.ffmpeg);
        command.args(ffmpeg_args(path, config));
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| SyncError::Decode {
            message: if e.kind() == ErrorKind::NotFound {
                format!("'{}' not found in PATH", config.ffmpeg)
            } else {
                format!("failed to start {}: {}", config.ffmpeg, e)
            },
        })?;
        let stdout = child.stdout.take().ok_or_else(|| SyncError::Decode {
            message: "ffmpeg stdout was not captured".to_string(),
        })?;
        // Drained continuously so a chatty decoder never blocks on a full pipe
        let stderr = match child.stderr.take() {
            Some(stderr) => Some(spawn_stderr_drain(stderr)?),
            None => None,
        };

        tracing::debug!(binary = %config.ffmpeg, path = %path.display(), "decoder started");
        Ok(Self {
            child: Some(child),
            stdout: Some(stdout),
            stderr,
            chunk_bytes: config.chunk_bytes(),
            binary: config.ffmpeg.clone(),
        })
    }

    /// Waits for ffmpeg after its output ended and checks the exit status.
    fn reap(&mut self) -> Result<()> {
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait().map_err(|e| SyncError::Decode {
            message: format!("failed to wait for {}: {}", self.binary, e),
        })?;
        let stderr = self
            .stderr
            .take()
            .and_then(|drain| drain.join().ok())
            .unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            Err(SyncError::Decode {
                message: format!("{} exited with {}: {}", self.binary, status, stderr.trim()),
            })
        }
    }
}

impl PcmSource for FfmpegSource {
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let buffer = read_full(stdout, self.chunk_bytes).map_err(|e| SyncError::Decode {
            message: format!("failed to read decoded audio: {}", e),
        })?;
        if buffer.is_empty() {
            self.reap()?;
            return Ok(None);
        }
        Ok(Some(buffer))
    }

    fn destroy(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            // Already exited is fine
            let _ = child.kill();
            let _ = child.wait();
            // The drain thread exits on its own once the pipe closes
            self.stderr = None;
            tracing::debug!(binary = %self.binary, "decoder destroyed");
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Reads the decoder's stderr until it closes, keeping only the first bytes.
fn spawn_stderr_drain(mut stderr: ChildStderr) -> Result<JoinHandle<String>> {
    let handle = thread::Builder::new()
        .name("decoder-stderr".to_string())
        .spawn(move || {
            let mut kept = Vec::new();
            let mut buffer = [0u8; 4096];
            loop {
                match stderr.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        let room = STDERR_CAPTURE_BYTES.saturating_sub(kept.len());
                        kept.extend_from_slice(&buffer[..n.min(room)]);
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            String::from_utf8_lossy(&kept).into_owned()
        })?;
    Ok(handle)
}

/// Builds the ffmpeg argument list for s16le mono output on stdout.
pub fn ffmpeg_args(path: &std::path::Path, config: &SourceConfig) -> Vec<String> {
    let mut args = vec![
        "-nostdin".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format_seconds(config.seek_ms),
        "-i".to_string(),
        path.to_string_lossy().into_owned(),
    ];
    if let Some(limit) = config.limit_ms {
        args.push("-t".to_string());
        args.push(format_seconds(limit));
    }
    args.extend(
        [
            "-vn",
            "-ac",
            "1",
            "-ar",
            &config.sample_rate.to_string(),
            "-f",
            "s16le",
            "-",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args
}

fn format_seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// Reads until `len` bytes are buffered or the reader hits EOF.
fn read_full(reader: &mut impl Read, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buffer = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buffer.truncate(filled);
    Ok(buffer)
}

/// In-memory PCM source for tests and pre-decoded audio.
#[derive(Debug)]
pub struct MemorySource {
    data: Vec<u8>,
    position: usize,
    chunk_bytes: usize,
    fail_after: Option<usize>,
    chunks_read: usize,
    destroyed: Arc<AtomicBool>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>, chunk_bytes: usize) -> Self {
        Self {
            data,
            position: 0,
            chunk_bytes: chunk_bytes.max(1),
            fail_after: None,
            chunks_read: 0,
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Builds a source from samples.
    pub fn from_samples(samples: &[i16], chunk_bytes: usize) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(data, chunk_bytes)
    }

    /// Fail with a decode error after `chunks` successful reads.
    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    /// Flag set once the source has been destroyed.
    pub fn destroyed_flag(&self) -> Arc<AtomicBool> {
        self.destroyed.clone()
    }
}

impl PcmSource for MemorySource {
    fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if self.fail_after == Some(self.chunks_read) {
            return Err(SyncError::Decode {
                message: "memory source failure".to_string(),
            });
        }
        if self.position >= self.data.len() {
            return Ok(None);
        }
        let end = (self.position + self.chunk_bytes).min(self.data.len());
        let chunk = self.data[self.position..end].to_vec();
        self.position = end;
        self.chunks_read += 1;
        Ok(Some(chunk))
    }

    fn destroy(&mut self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::Path;

    #[test]
    fn test_ffmpeg_args_with_seek_and_limit() {
        let config = SourceConfig {
            seek_ms: 600_250,
            limit_ms: Some(90_000),
            ..Default::default()
        };
        let args = ffmpeg_args(Path::new("/videos/film.mkv"), &config);
        assert_eq!(
            args,
            vec![
                "-nostdin", "-loglevel", "error", "-ss", "600.250", "-i", "/videos/film.mkv",
                "-t", "90.000", "-vn", "-ac", "1", "-ar", "16000", "-f", "s16le", "-",
            ]
        );
    }

    #[test]
    fn test_ffmpeg_args_without_limit() {
        let config = SourceConfig {
            seek_ms: 0,
            ..Default::default()
        };
        let args = ffmpeg_args(Path::new("a.mp4"), &config);
        assert!(!args.contains(&"-t".to_string()));
        assert_eq!(args[4], "0.000");
    }

    #[test]
    fn test_missing_binary_is_decode_error() {
        let config = SourceConfig {
            ffmpeg: "/nonexistent/ffmpeg-binary".to_string(),
            ..Default::default()
        };
        match FfmpegSource::spawn(Path::new("film.mkv"), &config) {
            Err(SyncError::Decode { message }) => {
                assert!(message.contains("/nonexistent/ffmpeg-binary"));
            }
            Err(other) => panic!("Expected Decode error, got {other:?}"),
            Ok(_) => panic!("Expected Decode error"),
        }
    }

    /// Writes an executable shell script standing in for the decoder.
    #[cfg(unix)]
    fn fake_decoder(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[test]
    fn test_noisy_decoder_failure_does_not_hang() {
        let dir = tempfile::tempdir().unwrap();
        // Far more diagnostics than a pipe buffer holds, then audio, then failure
        let config = SourceConfig {
            ffmpeg: fake_decoder(
                dir.path(),
                "head -c 300000 /dev/zero | tr '\\0' 'e' >&2\nprintf 'abcd'\nexit 3",
            ),
            ..Default::default()
        };
        let mut source = FfmpegSource::spawn(Path::new("broken.mkv"), &config).unwrap();

        assert_eq!(source.read_chunk().unwrap(), Some(b"abcd".to_vec()));
        match source.read_chunk() {
            Err(SyncError::Decode { message }) => {
                assert!(message.contains("exited with"), "{message}");
                assert!(message.len() < STDERR_CAPTURE_BYTES + 200);
            }
            other => panic!("Expected Decode error, got {other:?}"),
        }
        assert_eq!(source.read_chunk().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_decoder_exit_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let config = SourceConfig {
            ffmpeg: fake_decoder(dir.path(), "printf 'wxyz'"),
            ..Default::default()
        };
        let mut source = FfmpegSource::spawn(Path::new("film.mkv"), &config).unwrap();

        assert_eq!(source.read_chunk().unwrap(), Some(b"wxyz".to_vec()));
        assert_eq!(source.read_chunk().unwrap(), None);
    }

    #[test]
    fn test_read_full_collects_short_reads() {
        struct Trickle(Cursor<Vec<u8>>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let limit = buf.len().min(3);
                self.0.read(&mut buf[..limit])
            }
        }
        let mut reader = Trickle(Cursor::new((0u8..10).collect()));
        assert_eq!(read_full(&mut reader, 8).unwrap(), (0u8..8).collect::<Vec<_>>());
        assert_eq!(read_full(&mut reader, 8).unwrap(), vec![8, 9]);
        assert!(read_full(&mut reader, 8).unwrap().is_empty());
    }

    #[test]
    fn test_memory_source_chunks_and_ends() {
        let mut source = MemorySource::new((0u8..10).collect(), 4);
        assert_eq!(source.read_chunk().unwrap(), Some(vec![0, 1, 2, 3]));
        assert_eq!(source.read_chunk().unwrap(), Some(vec![4, 5, 6, 7]));
        assert_eq!(source.read_chunk().unwrap(), Some(vec![8, 9]));
        assert_eq!(source.read_chunk().unwrap(), None);
    }

    #[test]
    fn test_memory_source_failure_and_destroy() {
        let mut source = MemorySource::from_samples(&[1, 2, 3, 4], 4).failing_after(1);
        let destroyed = source.destroyed_flag();
        assert_eq!(source.read_chunk().unwrap(), Some(vec![1, 0, 2, 0]));
        assert!(matches!(source.read_chunk(), Err(SyncError::Decode { .. })));

        source.destroy();
        assert!(destroyed.load(Ordering::SeqCst));
        assert_eq!(source.read_chunk().unwrap(), None);
    }
}
