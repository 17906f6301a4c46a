//! Recording session
//!
//! A `RecordingSession` is an explicit value owned by the caller: it
//! holds the source stream, output surface, adapted track, mixed stream,
//! encoder handle, and segment buffer for exactly one recording. There
//! is no process-wide recorder state; every lifecycle call goes through
//! the session.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::compositor::adapter::SurfaceTrack;
use crate::compositor::surface::Surface;
use crate::compositor::policy::CompositionPolicy;
use crate::compositor::{Compositor, IntervalRefresh, RefreshDriver};
use crate::encoder::{EncoderConfig, EncoderError, IncrementalEncoder};
use crate::recorder::assembler::{self, CompositionMetadata, FinishedAsset};
use crate::recorder::mixer;
use crate::recorder::sink::{shared_segments, SharedSegments, SinkController, SinkStopError};
use crate::recorder::state::{PauseLedger, SessionEvent, SessionState, SessionStatus};
use crate::source::readiness::{await_stream_ready, ReadinessOptions};
use crate::source::{AudioStopHandle, SourceStream, VideoTrack};
use crate::utils::error::PipelineError;

/// Tuning knobs for a recording session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Readiness gate configuration
    pub readiness: ReadinessOptions,

    /// Cadence of the encoder flush timer
    pub flush_interval: Duration,

    /// Upper bound on waiting for the terminal flush at stop time
    pub stop_timeout: Duration,

    /// Tick rate of the built-in refresh driver
    pub refresh_rate: u32,

    /// Bound of the adapted video track's sample channel
    pub sample_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            readiness: ReadinessOptions::default(),
            flush_interval: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(5),
            refresh_rate: 60,
            sample_capacity: 8,
        }
    }
}

/// Everything that must be released when the session ends, bundled so
/// release happens on every exit path. `Drop` is the safety net for
/// sessions that are discarded without a clean stop; a lingering source
/// track is a user-visible capture indicator.
struct SessionResources {
    video: VideoTrack,
    audio_stop: Option<AudioStopHandle>,
    compositor: JoinHandle<()>,
    adapter: JoinHandle<()>,
}

impl SessionResources {
    fn release(&mut self) {
        self.video.stop();
        if let Some(audio) = &self.audio_stop {
            audio.stop();
        }
        self.compositor.abort();
        self.adapter.abort();
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        self.release();
    }
}

/// One start-to-stop recording lifecycle instance
pub struct RecordingSession {
    id: Uuid,
    options: SessionOptions,
    mime: String,
    metadata: CompositionMetadata,
    state: watch::Sender<SessionState>,
    ledger: Mutex<PauseLedger>,
    started_at: Instant,
    final_duration: Mutex<Option<Duration>>,
    segments: SharedSegments,
    sink: Mutex<Option<SinkController>>,
    resources: Mutex<Option<SessionResources>>,
    events: broadcast::Sender<SessionEvent>,
}

impl RecordingSession {
    /// Start a recording with the built-in refresh driver
    pub async fn start(
        policy: CompositionPolicy,
        stream: SourceStream,
        encoder: Box<dyn IncrementalEncoder>,
        options: SessionOptions,
    ) -> Result<Self, PipelineError> {
        let driver = Box::new(IntervalRefresh::new(options.refresh_rate));
        Self::start_with_driver(policy, stream, encoder, driver, options).await
    }

    /// Start a recording, driving compositor ticks from `driver`
    pub async fn start_with_driver(
        policy: CompositionPolicy,
        mut stream: SourceStream,
        mut encoder: Box<dyn IncrementalEncoder>,
        driver: Box<dyn RefreshDriver>,
        options: SessionOptions,
    ) -> Result<Self, PipelineError> {
        let id = Uuid::new_v4();
        tracing::info!("starting session {} in mode {}", id, policy.mode_label());

        // The gate resolves unconditionally; a source that never proves
        // itself still records.
        let readiness = await_stream_ready(&stream, &options.readiness).await;
        tracing::debug!("readiness gate: {:?}", readiness);

        let video = stream.video.take().ok_or_else(|| {
            PipelineError::SourceUnavailable("source stream has no video track".to_string())
        })?;
        let audio = stream.audio.take();
        let audio_stop = audio.as_ref().map(|track| track.stop_handle());

        let stop_tracks = |video: &VideoTrack, audio_stop: &Option<AudioStopHandle>| {
            video.stop();
            if let Some(stop) = audio_stop {
                stop.stop();
            }
        };

        let source_dims = video.dimensions();
        if let Err(e) = policy.validate(source_dims) {
            stop_tracks(&video, &audio_stop);
            return Err(PipelineError::Policy(e));
        }

        let config = EncoderConfig::for_policy(&policy);
        if let Err(e) = encoder.start(&config) {
            stop_tracks(&video, &audio_stop);
            return Err(PipelineError::Encoder(e));
        }

        let (width, height) = policy.target_dimensions();
        let surface = Surface::new(width, height);
        let (state_tx, _) = watch::channel(SessionState::Starting);

        let compositor = Compositor::new(
            surface.clone(),
            video.clone(),
            policy.source_rect(source_dims),
            state_tx.subscribe(),
        );
        let compositor_task = tokio::spawn(compositor.run(driver));

        let (video_rx, adapter_task) = SurfaceTrack::spawn(
            surface,
            policy.frame_rate(),
            options.sample_capacity,
            state_tx.subscribe(),
        );

        let mixed = mixer::mix(video_rx, audio);
        let segments = shared_segments();
        let sink = SinkController::spawn(encoder, mixed, segments.clone(), options.flush_interval);

        let (events, _) = broadcast::channel(64);
        state_tx.send_replace(SessionState::Recording);
        let _ = events.send(SessionEvent::Started);

        Ok(Self {
            id,
            options,
            mime: config.mime,
            metadata: CompositionMetadata::for_policy(&policy, source_dims),
            state: state_tx,
            ledger: Mutex::new(PauseLedger::new()),
            started_at: Instant::now(),
            final_duration: Mutex::new(None),
            segments,
            sink: Mutex::new(Some(sink)),
            resources: Mutex::new(Some(SessionResources {
                video,
                audio_stop,
                compositor: compositor_task,
                adapter: adapter_task,
            })),
            events,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Pause the recording. A no-op unless currently recording; calling
    /// after stop is ignored.
    pub fn pause(&self) {
        let current = *self.state.borrow();
        if current != SessionState::Recording {
            tracing::debug!("pause ignored in state {:?}", current);
            return;
        }

        self.ledger.lock().pause_at(Instant::now());
        self.state.send_replace(SessionState::Paused);
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.pause();
        }
        let _ = self.events.send(SessionEvent::Paused);
        tracing::info!("session {} paused", self.id);
    }

    /// Resume a paused recording. A no-op unless currently paused.
    pub fn resume(&self) {
        let current = *self.state.borrow();
        if current != SessionState::Paused {
            tracing::debug!("resume ignored in state {:?}", current);
            return;
        }

        self.ledger.lock().resume_at(Instant::now());
        self.state.send_replace(SessionState::Recording);
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.resume();
        }
        let _ = self.events.send(SessionEvent::Resumed);
        tracing::info!("session {} resumed", self.id);
    }

    /// Current state and pause-adjusted elapsed time. Never mutates.
    pub fn status(&self) -> SessionStatus {
        let state = *self.state.borrow();
        let elapsed = match *self.final_duration.lock() {
            Some(duration) => duration,
            None => self.ledger.lock().elapsed_at(self.started_at, Instant::now()),
        };
        SessionStatus {
            state,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            is_paused: state == SessionState::Paused,
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Stop the recording and assemble the finished asset.
    ///
    /// Stop is terminal: pause/resume are ignored afterwards and a second
    /// stop reports an invalid lifecycle call. Cleanup (stopping the
    /// source tracks, releasing the surface and adapted track, clearing
    /// the segment buffer) runs on every path out of this function, even
    /// when assembly fails.
    pub async fn stop(&self) -> Result<FinishedAsset, PipelineError> {
        {
            let current = *self.state.borrow();
            if !current.is_active() {
                return Err(PipelineError::InvalidState(format!(
                    "stop called in state {:?}",
                    current
                )));
            }
        }

        // Close any open pause interval and freeze the reported duration.
        let now = Instant::now();
        let duration = {
            let mut ledger = self.ledger.lock();
            ledger.resume_at(now);
            ledger.elapsed_at(self.started_at, now)
        };
        *self.final_duration.lock() = Some(duration);

        tracing::info!(
            "stopping session {} at {:.0}ms",
            self.id,
            duration.as_secs_f64() * 1000.0
        );
        self.state.send_replace(SessionState::Stopping);

        // Wait for the terminal flush, bounded so a wedged encoder cannot
        // hang the stop path.
        let sink = self.sink.lock().take();
        let mut encoder_failed = false;
        if let Some(sink) = sink {
            match sink.stop(self.options.stop_timeout).await {
                Ok(()) => {}
                Err(SinkStopError::Encoder(EncoderError::InvalidState(msg))) => {
                    tracing::warn!("encoder reported invalid state on stop: {}", msg);
                    let _ = self.events.send(SessionEvent::Error(msg));
                    encoder_failed = true;
                }
                Err(SinkStopError::Encoder(e)) => {
                    tracing::warn!("encoder failed during terminal flush: {}", e);
                    let _ = self.events.send(SessionEvent::Error(e.to_string()));
                    encoder_failed = true;
                }
                Err(SinkStopError::Timeout(timeout)) => {
                    tracing::warn!(
                        "terminal flush timed out after {:?}; continuing with harvested segments",
                        timeout
                    );
                    let _ = self
                        .events
                        .send(SessionEvent::Error("terminal flush timed out".to_string()));
                }
            }
        }

        // Ownership of the segments transfers to assembly here; the sink
        // can no longer append.
        let buffer = self.segments.lock().take().unwrap_or_default();
        let harvested = buffer.len();
        let assembly = assembler::assemble(
            buffer.into_chunks(),
            &self.mime,
            duration,
            self.metadata.clone(),
        );

        self.release_resources();

        match assembly {
            Ok(asset) => {
                let final_state = if encoder_failed && harvested == 0 {
                    SessionState::Failed
                } else {
                    SessionState::Stopped
                };
                self.state.send_replace(final_state);
                let _ = self.events.send(SessionEvent::Stopped);
                tracing::info!(
                    "session {} finished: {} segments, {} bytes",
                    self.id,
                    harvested,
                    asset.size_bytes
                );
                Ok(asset)
            }
            Err(e) => {
                self.state.send_replace(SessionState::Failed);
                let _ = self.events.send(SessionEvent::Error(e.to_string()));
                Err(PipelineError::Assembly(e))
            }
        }
    }

    fn release_resources(&self) {
        if let Some(mut resources) = self.resources.lock().take() {
            resources.release();
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.resources.lock().is_some() {
            tracing::warn!(
                "session {} dropped without stop; releasing source tracks",
                self.id
            );
            self.release_resources();
        }
    }
}
