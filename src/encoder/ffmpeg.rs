//! FFmpeg-backed incremental encoder
//!
//! Spawns an ffmpeg child reading raw RGBA frames on stdin and writing
//! WebM/VP9 to stdout. A writer thread feeds frames so the async sink
//! never blocks on a full pipe; a reader thread drains stdout into a
//! buffer that `harvest` swaps out.
//!
//! This implementation is video-only: a single child process offers one
//! input pipe, so live audio cannot be muxed here. Pushed audio chunks
//! are counted and dropped with a one-time warning; pair the pipeline
//! with an AV-capable encoder when audio matters.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use super::{EncoderConfig, EncoderError, EncoderState, IncrementalEncoder};
use crate::compositor::adapter::VideoSample;
use crate::source::AudioChunk;

/// Frames buffered towards the writer thread before new ones are dropped
const FRAME_QUEUE_CAPACITY: usize = 8;

pub struct FfmpegEncoder {
    state: EncoderState,
    child: Option<Child>,
    frame_tx: Option<SyncSender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    buffer: Arc<Mutex<Vec<u8>>>,
    expected_frame_len: usize,
    dropped_frames: u64,
    audio_warned: bool,
    dropped_audio: u64,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self {
            state: EncoderState::Inactive,
            child: None,
            frame_tx: None,
            writer: None,
            reader: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
            expected_frame_len: 0,
            dropped_frames: 0,
            audio_warned: false,
            dropped_audio: 0,
        }
    }

    /// Number of frames dropped because the writer fell behind
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    fn build_args(config: &EncoderConfig) -> Vec<String> {
        vec![
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgba".to_string(),
            "-s".to_string(),
            format!("{}x{}", config.width, config.height),
            "-r".to_string(),
            config.frame_rate.to_string(),
            "-i".to_string(),
            "-".to_string(),
            "-c:v".to_string(),
            "libvpx-vp9".to_string(),
            "-b:v".to_string(),
            config.video_bitrate.to_string(),
            "-deadline".to_string(),
            "realtime".to_string(),
            "-f".to_string(),
            "webm".to_string(),
            "-".to_string(),
        ]
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalEncoder for FfmpegEncoder {
    fn start(&mut self, config: &EncoderConfig) -> Result<(), EncoderError> {
        if self.state != EncoderState::Inactive {
            return Err(EncoderError::InvalidState(
                "start called on an encoder that already started".to_string(),
            ));
        }

        let args = Self::build_args(config);
        tracing::info!("starting ffmpeg encoder: {:?}", args);

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EncoderError::Backend(format!("failed to start ffmpeg: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncoderError::Backend("failed to capture ffmpeg stdin".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| EncoderError::Backend("failed to capture ffmpeg stdout".to_string()))?;

        let (frame_tx, frame_rx) = sync_channel::<Vec<u8>>(FRAME_QUEUE_CAPACITY);

        let writer = std::thread::Builder::new()
            .name("croprec-ffmpeg-writer".to_string())
            .spawn(move || {
                while let Ok(frame) = frame_rx.recv() {
                    if stdin.write_all(&frame).is_err() {
                        break;
                    }
                }
                // Dropping stdin closes the pipe and lets ffmpeg flush
            })
            .map_err(|e| EncoderError::Backend(format!("writer thread spawn failed: {}", e)))?;

        let buffer = self.buffer.clone();
        let reader = std::thread::Builder::new()
            .name("croprec-ffmpeg-reader".to_string())
            .spawn(move || {
                let mut chunk = [0u8; 64 * 1024];
                loop {
                    match stdout.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    }
                }
            })
            .map_err(|e| EncoderError::Backend(format!("reader thread spawn failed: {}", e)))?;

        self.expected_frame_len = (config.width as usize) * (config.height as usize) * 4;
        self.child = Some(child);
        self.frame_tx = Some(frame_tx);
        self.writer = Some(writer);
        self.reader = Some(reader);
        self.state = EncoderState::Recording;
        Ok(())
    }

    fn push_video(&mut self, sample: &VideoSample) -> Result<(), EncoderError> {
        match self.state {
            EncoderState::Recording => {}
            EncoderState::Paused => return Ok(()),
            _ => {
                return Err(EncoderError::InvalidState(
                    "push_video on an encoder that is not recording".to_string(),
                ))
            }
        }

        if sample.data.len() != self.expected_frame_len {
            return Err(EncoderError::Backend(format!(
                "frame size mismatch: got {} bytes, expected {}",
                sample.data.len(),
                self.expected_frame_len
            )));
        }

        let Some(tx) = self.frame_tx.as_ref() else {
            return Err(EncoderError::InvalidState(
                "encoder pipe already closed".to_string(),
            ));
        };

        match tx.try_send(sample.data.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped_frames += 1;
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(EncoderError::Backend(
                "ffmpeg writer exited unexpectedly".to_string(),
            )),
        }
    }

    fn push_audio(&mut self, _chunk: &AudioChunk) -> Result<(), EncoderError> {
        if !self.audio_warned {
            tracing::warn!("FfmpegEncoder is video-only; dropping audio chunks");
            self.audio_warned = true;
        }
        self.dropped_audio += 1;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EncoderError> {
        match self.state {
            EncoderState::Recording => {
                self.state = EncoderState::Paused;
                Ok(())
            }
            EncoderState::Paused => Ok(()),
            _ => Err(EncoderError::InvalidState(
                "pause on an encoder that is not recording".to_string(),
            )),
        }
    }

    fn resume(&mut self) -> Result<(), EncoderError> {
        match self.state {
            EncoderState::Paused => {
                self.state = EncoderState::Recording;
                Ok(())
            }
            EncoderState::Recording => Ok(()),
            _ => Err(EncoderError::InvalidState(
                "resume on an encoder that is not paused".to_string(),
            )),
        }
    }

    fn harvest(&mut self) -> Result<Vec<u8>, EncoderError> {
        if self.state == EncoderState::Inactive {
            return Err(EncoderError::InvalidState(
                "harvest on an encoder that never started".to_string(),
            ));
        }
        Ok(std::mem::take(&mut *self.buffer.lock()))
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncoderError> {
        if !matches!(self.state, EncoderState::Recording | EncoderState::Paused) {
            return Err(EncoderError::InvalidState(
                "finish on an encoder that is not running".to_string(),
            ));
        }

        // Closing the frame channel closes stdin; ffmpeg then flushes its
        // container trailer and exits.
        self.frame_tx = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        if let Some(mut child) = self.child.take() {
            let status = child
                .wait()
                .map_err(|e| EncoderError::Backend(format!("ffmpeg wait failed: {}", e)))?;
            if !status.success() {
                tracing::warn!("ffmpeg exited with status {}", status);
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }

        if self.dropped_audio > 0 {
            tracing::debug!("{} audio chunks were dropped (video-only encoder)", self.dropped_audio);
        }
        if self.dropped_frames > 0 {
            tracing::debug!("{} frames were dropped under backpressure", self.dropped_frames);
        }

        self.state = EncoderState::Finished;
        Ok(std::mem::take(&mut *self.buffer.lock()))
    }

    fn state(&self) -> EncoderState {
        self.state
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.frame_tx = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
        }
    }
}
