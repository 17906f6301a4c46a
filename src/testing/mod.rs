//! Synthetic collaborators for driving the pipeline without a capture
//! device, an encoder binary, or a display.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::compositor::adapter::VideoSample;
use crate::compositor::RefreshDriver;
use crate::encoder::{EncoderConfig, EncoderError, EncoderState, IncrementalEncoder};
use crate::source::{AudioChunk, SourceFrame, VideoTrack, VideoTrackWriter};

pub use crate::storage::MemoryStore;

/// Deterministic frame generator feeding a video track
pub struct SyntheticVideoSource {
    writer: VideoTrackWriter,
    width: u32,
    height: u32,
    frame_index: u64,
}

impl SyntheticVideoSource {
    pub fn new(width: u32, height: u32) -> (Self, VideoTrack) {
        let (writer, track) = VideoTrack::channel(width, height);
        (
            Self {
                writer,
                width,
                height,
                frame_index: 0,
            },
            track,
        )
    }

    /// Publish one gradient frame; each frame differs from the last
    pub fn push_frame(&mut self) {
        let shade = (self.frame_index % 251) as u8;
        let mut data = Vec::with_capacity((self.width * self.height * 4) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                data.extend_from_slice(&[shade, (x % 256) as u8, (y % 256) as u8, 255]);
            }
        }
        self.writer.push(SourceFrame {
            width: self.width,
            height: self.height,
            data: Arc::new(data),
            timestamp_ms: self.frame_index as f64 * 33.0,
        });
        self.frame_index += 1;
    }

    pub fn frames_pushed(&self) -> u64 {
        self.frame_index
    }

    /// Whether the pipeline has stopped the track
    pub fn is_stopped(&self) -> bool {
        self.writer.is_stopped()
    }
}

/// Hand-cranked refresh driver
pub struct ManualRefresh {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Sender half cranking a `ManualRefresh`
#[derive(Clone)]
pub struct ManualRefreshHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualRefresh {
    pub fn channel() -> (ManualRefreshHandle, ManualRefresh) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ManualRefreshHandle { tx }, ManualRefresh { rx })
    }
}

impl ManualRefreshHandle {
    /// Deliver one tick; buffered if the compositor is mid-draw
    pub fn tick(&self) {
        let _ = self.tx.send(());
    }

    pub fn tick_many(&self, count: usize) {
        for _ in 0..count {
            self.tick();
        }
    }
}

#[async_trait]
impl RefreshDriver for ManualRefresh {
    async fn next_tick(&mut self) {
        if self.rx.recv().await.is_none() {
            // Handle dropped: no more ticks will ever arrive
            std::future::pending::<()>().await;
        }
    }
}

/// Everything a `ScriptedEncoder` observed
#[derive(Debug, Clone, Default)]
pub struct EncoderLog {
    pub config: Option<EncoderConfig>,
    pub video_samples: u64,
    pub audio_chunks: u64,
    pub pauses: u32,
    pub resumes: u32,
    pub harvests: u32,
    pub finished: bool,
}

/// Read side of a scripted encoder's log
#[derive(Clone)]
pub struct EncoderProbe {
    log: Arc<Mutex<EncoderLog>>,
}

impl EncoderProbe {
    pub fn log(&self) -> EncoderLog {
        self.log.lock().clone()
    }
}

/// Scriptable in-memory encoder. Emits `FRME` per accepted sample and a
/// `TAIL` terminal marker, and can be told to fail or stall its finish.
pub struct ScriptedEncoder {
    state: EncoderState,
    pending: Vec<u8>,
    log: Arc<Mutex<EncoderLog>>,
    fail_finish: bool,
    stall_finish: Option<Duration>,
}

impl ScriptedEncoder {
    pub fn new() -> (Self, EncoderProbe) {
        Self::build(false, None)
    }

    /// Encoder whose finish reports an invalid-state error
    pub fn failing_finish() -> (Self, EncoderProbe) {
        Self::build(true, None)
    }

    /// Encoder whose finish blocks for `delay` before returning
    pub fn stalling_finish(delay: Duration) -> (Self, EncoderProbe) {
        Self::build(false, Some(delay))
    }

    fn build(fail_finish: bool, stall_finish: Option<Duration>) -> (Self, EncoderProbe) {
        let log = Arc::new(Mutex::new(EncoderLog::default()));
        (
            Self {
                state: EncoderState::Inactive,
                pending: Vec::new(),
                log: log.clone(),
                fail_finish,
                stall_finish,
            },
            EncoderProbe { log },
        )
    }
}

impl IncrementalEncoder for ScriptedEncoder {
    fn start(&mut self, config: &EncoderConfig) -> Result<(), EncoderError> {
        if self.state != EncoderState::Inactive {
            return Err(EncoderError::InvalidState("already started".to_string()));
        }
        self.log.lock().config = Some(config.clone());
        self.state = EncoderState::Recording;
        Ok(())
    }

    fn push_video(&mut self, _sample: &VideoSample) -> Result<(), EncoderError> {
        match self.state {
            EncoderState::Recording => {
                self.pending.extend_from_slice(b"FRME");
                self.log.lock().video_samples += 1;
                Ok(())
            }
            EncoderState::Paused => Ok(()),
            _ => Err(EncoderError::InvalidState(
                "push_video while not recording".to_string(),
            )),
        }
    }

    fn push_audio(&mut self, _chunk: &AudioChunk) -> Result<(), EncoderError> {
        self.log.lock().audio_chunks += 1;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EncoderError> {
        match self.state {
            EncoderState::Recording => {
                self.state = EncoderState::Paused;
                self.log.lock().pauses += 1;
                Ok(())
            }
            EncoderState::Paused => Ok(()),
            _ => Err(EncoderError::InvalidState("pause while inactive".to_string())),
        }
    }

    fn resume(&mut self) -> Result<(), EncoderError> {
        match self.state {
            EncoderState::Paused => {
                self.state = EncoderState::Recording;
                self.log.lock().resumes += 1;
                Ok(())
            }
            EncoderState::Recording => Ok(()),
            _ => Err(EncoderError::InvalidState(
                "resume while inactive".to_string(),
            )),
        }
    }

    fn harvest(&mut self) -> Result<Vec<u8>, EncoderError> {
        if self.state == EncoderState::Inactive {
            return Err(EncoderError::InvalidState(
                "harvest before start".to_string(),
            ));
        }
        self.log.lock().harvests += 1;
        Ok(std::mem::take(&mut self.pending))
    }

    fn finish(&mut self) -> Result<Vec<u8>, EncoderError> {
        if let Some(delay) = self.stall_finish {
            std::thread::sleep(delay);
        }
        if self.fail_finish {
            return Err(EncoderError::InvalidState(
                "finish on an already-stopped encoder".to_string(),
            ));
        }
        if !matches!(self.state, EncoderState::Recording | EncoderState::Paused) {
            return Err(EncoderError::InvalidState(
                "finish while not running".to_string(),
            ));
        }
        self.state = EncoderState::Finished;
        self.log.lock().finished = true;

        let mut terminal = std::mem::take(&mut self.pending);
        terminal.extend_from_slice(b"TAIL");
        Ok(terminal)
    }

    fn state(&self) -> EncoderState {
        self.state
    }
}
