//! Surface-to-track adapter
//!
//! Exposes the compositor's surface as a video track sampled at a fixed,
//! policy-chosen rate, decoupled from the source's native rate and from
//! the compositor's tick rate. The rate is a hard cap used to bound
//! output size.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::recorder::state::SessionState;
use super::surface::Surface;

/// One sampled frame of the output surface
#[derive(Debug, Clone)]
pub struct VideoSample {
    pub width: u32,
    pub height: u32,
    /// RGBA snapshot of the surface
    pub data: Vec<u8>,
    /// Milliseconds since sampling started
    pub timestamp_ms: f64,
}

/// Fixed-rate sampler feeding the mixed stream's video side
pub struct SurfaceTrack;

impl SurfaceTrack {
    /// Spawn the sampling task. The receiver is the adapted video track;
    /// it closes when the session stops.
    pub fn spawn(
        surface: Arc<Surface>,
        frame_rate: u32,
        capacity: usize,
        state: watch::Receiver<SessionState>,
    ) -> (mpsc::Receiver<VideoSample>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(sample_loop(surface, frame_rate, state, tx));
        (rx, handle)
    }
}

async fn sample_loop(
    surface: Arc<Surface>,
    frame_rate: u32,
    state: watch::Receiver<SessionState>,
    tx: mpsc::Sender<VideoSample>,
) {
    let frame_rate = frame_rate.max(1);
    let mut interval =
        tokio::time::interval(Duration::from_secs_f64(1.0 / frame_rate as f64));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (width, height) = surface.dimensions();
    let started = Instant::now();
    let mut sampled: u64 = 0;
    let mut dropped: u64 = 0;

    loop {
        interval.tick().await;

        let session_state = *state.borrow();
        match session_state {
            SessionState::Recording => {}
            SessionState::Paused | SessionState::Starting => continue,
            _ => break,
        }

        let sample = VideoSample {
            width,
            height,
            data: surface.snapshot(),
            timestamp_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        match tx.try_send(sample) {
            Ok(()) => sampled += 1,
            Err(mpsc::error::TrySendError::Full(_)) => dropped += 1,
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }

    if dropped > 0 {
        tracing::warn!(
            "surface track dropped {} of {} samples (sink backpressure)",
            dropped,
            sampled + dropped
        );
    }
    tracing::debug!("surface track exited after {} samples", sampled);
}
