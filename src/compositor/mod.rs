//! Frame compositing
//!
//! The compositor runs a cooperative tick loop bound to a refresh driver.
//! Each tick, if the source has published a new frame, the configured
//! sub-rectangle is drawn into the output surface; otherwise the tick is
//! a no-op. While the session is paused no drawing happens at all.

pub mod adapter;
pub mod policy;
pub mod surface;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::recorder::state::SessionState;
use crate::source::VideoTrack;
use policy::CropRegion;
use surface::Surface;

/// Source of compositor ticks. Production drivers follow the host's
/// display refresh; tests crank ticks by hand.
#[async_trait]
pub trait RefreshDriver: Send {
    /// Completes at the next refresh tick
    async fn next_tick(&mut self);
}

/// Refresh driver backed by a fixed-rate timer, standing in for a vsync
/// callback on hosts that don't expose one.
pub struct IntervalRefresh {
    interval: tokio::time::Interval,
}

impl IntervalRefresh {
    pub fn new(hz: u32) -> Self {
        let hz = hz.max(1);
        let mut interval =
            tokio::time::interval(Duration::from_secs_f64(1.0 / hz as f64));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl RefreshDriver for IntervalRefresh {
    async fn next_tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Per-frame tick loop drawing the source into the output surface
pub struct Compositor {
    surface: Arc<Surface>,
    video: VideoTrack,
    src_rect: CropRegion,
    state: watch::Receiver<SessionState>,
}

impl Compositor {
    pub fn new(
        surface: Arc<Surface>,
        video: VideoTrack,
        src_rect: CropRegion,
        state: watch::Receiver<SessionState>,
    ) -> Self {
        Self {
            surface,
            video,
            src_rect,
            state,
        }
    }

    /// Run until the session leaves the Recording/Paused states.
    ///
    /// The cancellation point is tick entry: a draw in progress always
    /// completes, and pause takes effect on the next tick boundary.
    pub async fn run(mut self, mut refresh: Box<dyn RefreshDriver>) {
        // Sequence 0 means nothing published yet; a frame that was already
        // live when the loop starts is still current and gets drawn.
        let mut last_sequence = 0u64;
        let mut drawn: u64 = 0;

        loop {
            refresh.next_tick().await;

            let state = *self.state.borrow();
            match state {
                SessionState::Recording => {}
                SessionState::Paused => {
                    // Ticking stops entirely while paused; park until the
                    // state changes rather than spinning on ticks.
                    if self.state.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                SessionState::Starting => continue,
                _ => break,
            }

            let Some((sequence, frame)) = self.video.latest() else {
                continue;
            };
            if sequence == last_sequence {
                // No new decodable frame this tick
                continue;
            }

            self.surface.draw_frame(&frame, self.src_rect);
            last_sequence = sequence;
            drawn += 1;
        }

        tracing::debug!("compositor tick loop exited after {} draws", drawn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceFrame;
    use crate::testing::ManualRefresh;

    fn solid_frame(width: u32, height: u32, value: u8) -> SourceFrame {
        SourceFrame {
            width,
            height,
            data: Arc::new(vec![value; (width * height * 4) as usize]),
            timestamp_ms: 0.0,
        }
    }

    #[tokio::test]
    async fn test_tick_without_new_frame_is_noop() {
        let (writer, track) = VideoTrack::channel(4, 4);
        let surface = Surface::new(4, 4);
        let (state_tx, state_rx) = watch::channel(SessionState::Recording);

        let (handle, driver) = ManualRefresh::channel();
        let compositor = Compositor::new(
            surface.clone(),
            track,
            CropRegion::full(4, 4),
            state_rx,
        );
        let task = tokio::spawn(compositor.run(Box::new(driver)));

        writer.push(solid_frame(4, 4, 7));
        handle.tick();
        handle.tick();
        handle.tick();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // One published frame -> exactly one draw despite three ticks
        assert_eq!(surface.generation(), 1);

        state_tx.send_replace(SessionState::Stopping);
        handle.tick();
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_paused_compositor_never_draws() {
        let (writer, track) = VideoTrack::channel(4, 4);
        let surface = Surface::new(4, 4);
        let (state_tx, state_rx) = watch::channel(SessionState::Paused);

        let (handle, driver) = ManualRefresh::channel();
        let compositor = Compositor::new(
            surface.clone(),
            track,
            CropRegion::full(4, 4),
            state_rx,
        );
        let task = tokio::spawn(compositor.run(Box::new(driver)));

        writer.push(solid_frame(4, 4, 9));
        handle.tick();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(surface.generation(), 0);

        state_tx.send_replace(SessionState::Stopping);
        handle.tick();
        let _ = task.await;
    }
}
