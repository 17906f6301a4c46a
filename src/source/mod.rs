//! Source stream boundary contracts
//!
//! The pipeline treats the capture source as a black box that exposes a
//! video track with a readable current frame and stoppable tracks. The
//! producer side (screen share, tab capture, a test generator) lives
//! outside this crate and feeds the writer halves defined here.

pub mod readiness;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// One decoded frame from the capture source (RGBA, 4 bytes per pixel)
#[derive(Debug, Clone)]
pub struct SourceFrame {
    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Raw pixel data, `width * height * 4` bytes
    pub data: Arc<Vec<u8>>,

    /// Timestamp in milliseconds (producer clock)
    pub timestamp_ms: f64,
}

impl SourceFrame {
    /// Expected byte length for the frame's dimensions
    pub fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }
}

struct VideoTrackInner {
    width: u32,
    height: u32,
    frame: Mutex<Option<SourceFrame>>,
    sequence: AtomicU64,
    live: AtomicBool,
}

/// Consumer half of a video track: a latest-frame slot with a sequence
/// counter that advances every time the producer publishes a frame.
#[derive(Clone)]
pub struct VideoTrack {
    inner: Arc<VideoTrackInner>,
}

/// Producer half of a video track
pub struct VideoTrackWriter {
    inner: Arc<VideoTrackInner>,
}

impl VideoTrack {
    /// Create a connected writer/reader pair for a source of the given size
    pub fn channel(width: u32, height: u32) -> (VideoTrackWriter, VideoTrack) {
        let inner = Arc::new(VideoTrackInner {
            width,
            height,
            frame: Mutex::new(None),
            sequence: AtomicU64::new(0),
            live: AtomicBool::new(true),
        });
        (
            VideoTrackWriter {
                inner: inner.clone(),
            },
            VideoTrack { inner },
        )
    }

    /// Native dimensions of the source
    pub fn dimensions(&self) -> (u32, u32) {
        (self.inner.width, self.inner.height)
    }

    /// Number of frames published so far
    pub fn sequence(&self) -> u64 {
        self.inner.sequence.load(Ordering::Acquire)
    }

    /// The most recent frame together with its sequence number, if any
    /// frame has been published yet
    pub fn latest(&self) -> Option<(u64, SourceFrame)> {
        let guard = self.inner.frame.lock();
        guard
            .as_ref()
            .map(|frame| (self.inner.sequence.load(Ordering::Acquire), frame.clone()))
    }

    /// Whether the track is still live (not stopped by either side)
    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Stop the track. The producer observes this and ceases capture; a
    /// stopped track never goes live again.
    pub fn stop(&self) {
        if self.inner.live.swap(false, Ordering::AcqRel) {
            tracing::debug!("video track stopped");
        }
    }
}

impl VideoTrackWriter {
    /// Publish a frame into the latest-frame slot. Ignored once the track
    /// has been stopped.
    pub fn push(&self, frame: SourceFrame) {
        if !self.inner.live.load(Ordering::Acquire) {
            return;
        }
        *self.inner.frame.lock() = Some(frame);
        self.inner.sequence.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether the consumer side has stopped the track
    pub fn is_stopped(&self) -> bool {
        !self.inner.live.load(Ordering::Acquire)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.inner.width, self.inner.height)
    }
}

/// One opaque chunk of audio passed through the pipeline untouched
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw sample data in whatever format the source produces
    pub data: Vec<u8>,

    /// Timestamp in milliseconds (producer clock)
    pub timestamp_ms: f64,
}

/// Consumer half of an audio track. Chunks flow through a bounded channel;
/// the pipeline never inspects, clones, or re-encodes them.
pub struct AudioTrack {
    rx: mpsc::Receiver<AudioChunk>,
    live: Arc<AtomicBool>,
}

/// Producer half of an audio track
pub struct AudioTrackWriter {
    tx: mpsc::Sender<AudioChunk>,
    live: Arc<AtomicBool>,
}

/// Detached stop control for an audio track, so the session can stop the
/// track after the receiver has been handed to the encoding sink.
#[derive(Clone)]
pub struct AudioStopHandle {
    live: Arc<AtomicBool>,
}

impl AudioTrack {
    /// Create a connected writer/reader pair with the given channel bound
    pub fn channel(capacity: usize) -> (AudioTrackWriter, AudioTrack) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let live = Arc::new(AtomicBool::new(true));
        (
            AudioTrackWriter {
                tx,
                live: live.clone(),
            },
            AudioTrack { rx, live },
        )
    }

    /// Stop control that outlives the receiver half
    pub fn stop_handle(&self) -> AudioStopHandle {
        AudioStopHandle {
            live: self.live.clone(),
        }
    }

    /// Receive the next chunk; `None` once the producer is gone
    pub async fn recv(&mut self) -> Option<AudioChunk> {
        self.rx.recv().await
    }
}

impl AudioTrackWriter {
    /// Publish a chunk. Chunks are dropped once the track is stopped or
    /// when the consumer falls behind the channel bound.
    pub fn push(&self, chunk: AudioChunk) -> bool {
        if !self.live.load(Ordering::Acquire) {
            return false;
        }
        self.tx.try_send(chunk).is_ok()
    }

    pub fn is_stopped(&self) -> bool {
        !self.live.load(Ordering::Acquire)
    }
}

impl AudioStopHandle {
    pub fn stop(&self) {
        if self.live.swap(false, Ordering::AcqRel) {
            tracing::debug!("audio track stopped");
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

/// A capture source stream: at most one video track and at most one audio
/// track. Exclusively owned by the active recording session for its
/// lifetime.
pub struct SourceStream {
    pub video: Option<VideoTrack>,
    pub audio: Option<AudioTrack>,
}

impl SourceStream {
    pub fn new(video: Option<VideoTrack>, audio: Option<AudioTrack>) -> Self {
        Self { video, audio }
    }

    /// Stream carrying only a video track
    pub fn video_only(video: VideoTrack) -> Self {
        Self {
            video: Some(video),
            audio: None,
        }
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> SourceFrame {
        SourceFrame {
            width,
            height,
            data: Arc::new(vec![0u8; (width * height * 4) as usize]),
            timestamp_ms: 0.0,
        }
    }

    #[test]
    fn test_video_track_sequence_advances() {
        let (writer, track) = VideoTrack::channel(16, 16);
        assert_eq!(track.sequence(), 0);
        assert!(track.latest().is_none());

        writer.push(frame(16, 16));
        writer.push(frame(16, 16));

        assert_eq!(track.sequence(), 2);
        let (seq, latest) = track.latest().unwrap();
        assert_eq!(seq, 2);
        assert_eq!(latest.width, 16);
    }

    #[test]
    fn test_stopped_video_track_ignores_pushes() {
        let (writer, track) = VideoTrack::channel(16, 16);
        track.stop();
        assert!(writer.is_stopped());

        writer.push(frame(16, 16));
        assert_eq!(track.sequence(), 0);
    }

    #[tokio::test]
    async fn test_audio_track_passthrough() {
        let (writer, mut track) = AudioTrack::channel(4);
        assert!(writer.push(AudioChunk {
            data: vec![1, 2, 3],
            timestamp_ms: 0.0,
        }));

        let chunk = track.recv().await.unwrap();
        assert_eq!(chunk.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_audio_stop_handle() {
        let (writer, track) = AudioTrack::channel(4);
        let handle = track.stop_handle();
        handle.stop();
        assert!(writer.is_stopped());
        assert!(!writer.push(AudioChunk {
            data: vec![],
            timestamp_ms: 0.0,
        }));
    }
}
