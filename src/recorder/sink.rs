//! Encoding sink controller
//!
//! Drives the incremental encoder over the mixed stream. A recurring
//! flush timer harvests whatever compressed bytes the encoder produced
//! since the last flush and appends them, in order, to the segment
//! buffer. Stop waits for the terminal harvest, bounded by a safety
//! timeout with a forced-flush fallback so a wedged encoder cannot hang
//! the whole stop path.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::encoder::{EncoderError, IncrementalEncoder};
use crate::recorder::mixer::MixedStream;

/// One chunk of compressed output emitted between two flushes
#[derive(Debug, Clone)]
pub struct Segment {
    pub data: Vec<u8>,
}

/// Ordered, append-only store of harvested segments. Insertion order is
/// temporal order; the buffer is consumed exactly once at assembly time,
/// so reordering is impossible by construction.
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    chunks: Vec<Segment>,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: Segment) {
        self.chunks.push(segment);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(|s| s.data.len() as u64).sum()
    }

    /// Consume the buffer, yielding the segments in harvest order
    pub fn into_chunks(self) -> Vec<Segment> {
        self.chunks
    }
}

/// Shared handle to the segment buffer. The sink appends while it runs;
/// at stop time the session takes the buffer, after which late appends
/// are rejected and logged.
pub type SharedSegments = Arc<Mutex<Option<SegmentBuffer>>>;

pub fn shared_segments() -> SharedSegments {
    Arc::new(Mutex::new(Some(SegmentBuffer::new())))
}

fn append_segment(segments: &SharedSegments, data: Vec<u8>) {
    let mut guard = segments.lock();
    match guard.as_mut() {
        Some(buffer) => buffer.push(Segment { data }),
        None => {
            tracing::warn!(
                "segment buffer already handed to the assembler, dropping late {}-byte harvest",
                data.len()
            );
        }
    }
}

/// Errors surfaced by `SinkController::stop`
#[derive(Error, Debug)]
pub enum SinkStopError {
    #[error("encoder failed during terminal flush: {0}")]
    Encoder(#[from] EncoderError),

    #[error("terminal flush did not complete within {0:?}; using harvested segments")]
    Timeout(Duration),
}

enum SinkCommand {
    Pause,
    Resume,
    Stop,
}

/// Owns the encoder feed loop and the flush timer for one session
pub struct SinkController {
    handle: JoinHandle<Result<(), EncoderError>>,
    commands: mpsc::UnboundedSender<SinkCommand>,
}

impl SinkController {
    /// Start the sink over an already-started encoder
    pub fn spawn(
        encoder: Box<dyn IncrementalEncoder>,
        mixed: MixedStream,
        segments: SharedSegments,
        flush_interval: Duration,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(sink_loop(encoder, mixed, segments, flush_interval, command_rx));
        Self { handle, commands }
    }

    pub fn pause(&self) {
        let _ = self.commands.send(SinkCommand::Pause);
    }

    pub fn resume(&self) {
        let _ = self.commands.send(SinkCommand::Resume);
    }

    /// Request the terminal flush and wait for it, bounded by `timeout`.
    ///
    /// On timeout the sink task is abandoned and whatever segments were
    /// already harvested remain valid (forced-flush fallback).
    pub async fn stop(mut self, timeout: Duration) -> Result<(), SinkStopError> {
        let _ = self.commands.send(SinkCommand::Stop);

        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(result)) => result.map_err(SinkStopError::from),
            Ok(Err(e)) => Err(SinkStopError::Encoder(EncoderError::Backend(format!(
                "sink task failed: {}",
                e
            )))),
            Err(_elapsed) => {
                self.handle.abort();
                Err(SinkStopError::Timeout(timeout))
            }
        }
    }
}

async fn sink_loop(
    mut encoder: Box<dyn IncrementalEncoder>,
    mut mixed: MixedStream,
    segments: SharedSegments,
    flush_interval: Duration,
    mut commands: mpsc::UnboundedReceiver<SinkCommand>,
) -> Result<(), EncoderError> {
    let mut flush = tokio::time::interval(flush_interval);
    flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut audio = mixed.audio.take();
    let mut video_open = true;
    let mut audio_open = audio.is_some();

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                match command {
                    Some(SinkCommand::Pause) => {
                        if let Err(e) = encoder.pause() {
                            tracing::warn!("encoder pause rejected: {}", e);
                        }
                    }
                    Some(SinkCommand::Resume) => {
                        if let Err(e) = encoder.resume() {
                            tracing::warn!("encoder resume rejected: {}", e);
                        }
                    }
                    Some(SinkCommand::Stop) | None => break,
                }
            }

            _ = flush.tick() => {
                match encoder.harvest() {
                    // The encoder may have produced nothing since the last
                    // flush; only real bytes become segments.
                    Ok(bytes) if !bytes.is_empty() => append_segment(&segments, bytes),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("flush harvest failed: {}", e),
                }
            }

            sample = mixed.video.recv(), if video_open => {
                match sample {
                    Some(sample) => {
                        if let Err(e) = encoder.push_video(&sample) {
                            tracing::warn!("encoder rejected video sample: {}", e);
                        }
                    }
                    None => video_open = false,
                }
            }

            chunk = recv_audio(&mut audio), if audio_open => {
                match chunk {
                    Some(chunk) => {
                        if let Err(e) = encoder.push_audio(&chunk) {
                            tracing::warn!("encoder rejected audio chunk: {}", e);
                        }
                    }
                    None => audio_open = false,
                }
            }
        }
    }

    // Terminal flush: everything the encoder still holds becomes the last
    // segment. Collecting before this point would truncate the asset.
    let terminal = encoder.finish()?;
    if !terminal.is_empty() {
        append_segment(&segments, terminal);
    }
    Ok(())
}

async fn recv_audio(
    audio: &mut Option<crate::source::AudioTrack>,
) -> Option<crate::source::AudioChunk> {
    match audio.as_mut() {
        Some(track) => track.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::adapter::VideoSample;
    use crate::recorder::mixer;
    use crate::testing::ScriptedEncoder;

    #[test]
    fn test_segment_buffer_preserves_order() {
        let mut buffer = SegmentBuffer::new();
        buffer.push(Segment { data: vec![1] });
        buffer.push(Segment { data: vec![2] });
        buffer.push(Segment { data: vec![3] });

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.total_bytes(), 3);

        let chunks = buffer.into_chunks();
        let order: Vec<u8> = chunks.iter().map(|s| s.data[0]).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_late_append_after_take_is_dropped() {
        let segments = shared_segments();
        append_segment(&segments, vec![1, 2]);

        let taken = segments.lock().take().unwrap();
        assert_eq!(taken.len(), 1);

        // The sink must not be able to grow the buffer after hand-off
        append_segment(&segments, vec![3]);
        assert!(segments.lock().is_none());
    }

    #[tokio::test]
    async fn test_sink_harvests_on_flush_and_terminal() {
        let (encoder, probe) = ScriptedEncoder::new();
        let mut boxed: Box<dyn IncrementalEncoder> = Box::new(encoder);
        boxed
            .start(&crate::encoder::EncoderConfig::for_policy(
                &crate::compositor::policy::CompositionPolicy::fixed_default(),
            ))
            .unwrap();

        let (video_tx, video_rx) = mpsc::channel::<VideoSample>(8);
        let mixed = mixer::mix(video_rx, None);
        let segments = shared_segments();

        let sink = SinkController::spawn(
            boxed,
            mixed,
            segments.clone(),
            Duration::from_millis(20),
        );

        for _ in 0..4 {
            video_tx
                .send(VideoSample {
                    width: 2,
                    height: 2,
                    data: vec![0u8; 16],
                    timestamp_ms: 0.0,
                })
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        sink.stop(Duration::from_secs(1)).await.unwrap();

        let buffer = segments.lock().take().unwrap();
        assert!(buffer.len() >= 2, "expected flush segments plus terminal");
        assert!(probe.log().finished);
        assert_eq!(probe.log().video_samples, 4);
    }
}
