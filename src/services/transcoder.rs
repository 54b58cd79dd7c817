// src/services/transcoder.rs - External MP3 encoder subprocess adapter

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::config;
use crate::error::Result;

/// A running encoder subprocess producing constant-parameter MP3
/// (44.1kHz stereo 128kbps) at real-time pace on stdout.
pub struct Transcoder {
    child: Child,
    stdout: ChildStdout,
    cancelled: bool,
}

impl Transcoder {
    /// Spawns the encoder for one media file and starts the diagnostic
    /// drainer. The drainer must outlive the encode: an undrained stderr
    /// pipe fills up and deadlocks the encoder mid-track.
    pub fn start(path: &Path) -> Result<Self> {
        let mut child = Command::new(config::ffmpeg_path())
            .arg("-re")
            .arg("-i")
            .arg(path)
            .args([
                "-vn",
                "-ar",
                config::FFMPEG_SAMPLE_RATE,
                "-ac",
                config::FFMPEG_CHANNELS,
                "-b:a",
                config::FFMPEG_BITRATE,
                "-f",
                "mp3",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "encoder stdout not captured")
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_diagnostics(stderr));
        }

        log::debug!("Encoder started for {}", path.display());
        Ok(Self { child, stdout, cancelled: false })
    }

    /// Next chunk of encoded audio, at most one chunk size per call.
    /// `None` means the encoder reached end of input.
    pub async fn read_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
        let mut buf = vec![0u8; config::CHUNK_SIZE];
        let n = self.stdout.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }

    /// Asks the subprocess to terminate. Idempotent; the resulting
    /// signal-death is classified as a normal exit.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            if let Err(e) = self.child.start_kill() {
                log::debug!("Encoder already gone on cancel: {}", e);
            }
        }
    }

    /// Reaps the subprocess and returns its exit status.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }
}

/// Exit by our own termination signal is part of normal operation
/// (preemption and shutdown), not an encoder failure.
pub fn is_normal_exit(status: ExitStatus) -> bool {
    if status.success() {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            // SIGKILL / SIGTERM
            return signal == 9 || signal == 15;
        }
    }
    false
}

/// Reads the diagnostic stream until it closes, logging non-empty lines.
/// Runs even when nobody cares about the output; see `start`.
async fn drain_diagnostics(stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim();
                if !text.is_empty() {
                    log::debug!("[encoder] {}", text);
                }
            }
        }
    }
}
