//! Stream readiness gate
//!
//! Some sources take a moment before they deliver real frames, and some
//! never signal readiness crisply. The gate waits for a few consecutive
//! frame advances but always resolves within the timeout: a source that
//! never proves itself is treated as ready anyway rather than failing
//! the recording.

use std::time::{Duration, Instant};

use crate::compositor::policy::CropRegion;
use crate::compositor::surface::Surface;
use super::SourceStream;

/// Tuning for the readiness gate
#[derive(Debug, Clone)]
pub struct ReadinessOptions {
    /// Upper bound on the whole wait
    pub timeout: Duration,

    /// Consecutive frame-advance observations required
    pub required_observations: u32,

    /// Minimum spacing between observations; advances arriving faster
    /// than this are treated as one observation (guards against a stuck
    /// image being republished)
    pub min_frame_spacing: Duration,

    /// Polling cadence
    pub poll_interval: Duration,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            required_observations: 3,
            min_frame_spacing: Duration::from_millis(100),
            poll_interval: Duration::from_millis(16),
        }
    }
}

/// How the gate resolved. Every variant means "proceed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The required number of frame advances was observed
    FramesObserved,

    /// The stream has no video track, so there is nothing to wait for
    NoVideoTrack,

    /// The timeout elapsed first; recording proceeds regardless
    TimedOut,
}

/// Wait until the source stream is producing real frames, or until the
/// timeout elapses, whichever comes first.
///
/// Probing draws into a throwaway surface that is discarded on return;
/// the stream's tracks are neither retained nor stopped.
pub async fn await_stream_ready(stream: &SourceStream, opts: &ReadinessOptions) -> Readiness {
    let Some(video) = stream.video.as_ref() else {
        tracing::debug!("no video track on source stream, skipping readiness wait");
        return Readiness::NoVideoTrack;
    };

    let (width, height) = video.dimensions();
    let probe = Surface::new(width.clamp(1, 64), height.clamp(1, 64));
    let full = CropRegion::full(width, height);

    let deadline = Instant::now() + opts.timeout;
    let mut last_sequence = video.sequence();
    let mut last_advance: Option<Instant> = None;
    let mut observed: u32 = 0;

    loop {
        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(
                "readiness wait timed out after {:?} ({}/{} observations), proceeding anyway",
                opts.timeout,
                observed,
                opts.required_observations
            );
            return Readiness::TimedOut;
        }

        let sequence = video.sequence();
        if sequence > last_sequence {
            let spaced = last_advance
                .map(|t| now.duration_since(t) >= opts.min_frame_spacing)
                .unwrap_or(true);
            if spaced {
                observed += 1;
            }
            last_advance = Some(now);
            last_sequence = sequence;

            // Confirm the frame actually decodes into a surface
            if let Some((_, frame)) = video.latest() {
                probe.draw_frame(&frame, full);
            }

            if observed >= opts.required_observations {
                tracing::debug!("observed {} consecutive frames, stream ready", observed);
                return Readiness::FramesObserved;
            }
        }

        tokio::time::sleep(opts.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SourceFrame, SourceStream, VideoTrack};
    use std::sync::Arc;

    fn quick_opts() -> ReadinessOptions {
        ReadinessOptions {
            timeout: Duration::from_millis(300),
            required_observations: 3,
            min_frame_spacing: Duration::from_millis(1),
            poll_interval: Duration::from_millis(2),
        }
    }

    fn frame(width: u32, height: u32) -> SourceFrame {
        SourceFrame {
            width,
            height,
            data: Arc::new(vec![128u8; (width * height * 4) as usize]),
            timestamp_ms: 0.0,
        }
    }

    #[tokio::test]
    async fn test_missing_video_track_is_immediately_ready() {
        let stream = SourceStream::new(None, None);
        let outcome = await_stream_ready(&stream, &quick_opts()).await;
        assert_eq!(outcome, Readiness::NoVideoTrack);
    }

    #[tokio::test]
    async fn test_frame_advances_resolve_ready() {
        let (writer, track) = VideoTrack::channel(32, 32);
        let stream = SourceStream::video_only(track);

        let feeder = tokio::spawn(async move {
            for _ in 0..6 {
                writer.push(frame(32, 32));
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            writer
        });

        let outcome = await_stream_ready(&stream, &quick_opts()).await;
        assert_eq!(outcome, Readiness::FramesObserved);

        // The gate must not have stopped the track
        let writer = feeder.await.unwrap();
        assert!(!writer.is_stopped());
    }

    #[tokio::test]
    async fn test_silent_stream_times_out_as_ready() {
        let (_writer, track) = VideoTrack::channel(32, 32);
        let stream = SourceStream::video_only(track);

        let started = Instant::now();
        let outcome = await_stream_ready(&stream, &quick_opts()).await;
        assert_eq!(outcome, Readiness::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }
}
