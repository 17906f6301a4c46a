//! Session state machine and pause accounting
//!
//! `Idle` describes the absence of an active session (sessions are
//! single-use values, so a finished session is never re-entered); a live
//! session moves Starting -> Recording <-> Paused -> Stopping -> Stopped
//! or Failed.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Lifecycle state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Recording,
    Paused,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    /// Whether the session is live (pause/resume/stop are meaningful)
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Recording | SessionState::Paused)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Cumulative paused-time bookkeeping.
///
/// All methods take the observation instant as a parameter so the math is
/// pure and testable against a logical clock. Invariants:
/// `pause_started_at` is set iff currently paused; accumulated pause only
/// grows, and only at resume time.
#[derive(Debug, Clone, Default)]
pub struct PauseLedger {
    accumulated_pause: Duration,
    pause_started_at: Option<Instant>,
}

impl PauseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.pause_started_at.is_some()
    }

    /// Open a pause interval. No-op if already paused.
    pub fn pause_at(&mut self, now: Instant) {
        if self.pause_started_at.is_none() {
            self.pause_started_at = Some(now);
        }
    }

    /// Close the open pause interval, folding it into the accumulated
    /// total. No-op if not paused.
    pub fn resume_at(&mut self, now: Instant) {
        if let Some(started) = self.pause_started_at.take() {
            self.accumulated_pause += now.saturating_duration_since(started);
        }
    }

    /// Total paused time as of `now`, including any open interval
    pub fn paused_total_at(&self, now: Instant) -> Duration {
        let open = self
            .pause_started_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or(Duration::ZERO);
        self.accumulated_pause + open
    }

    /// Recorded time as of `now` for a session started at `started_at`:
    /// wall-clock span minus everything spent paused.
    pub fn elapsed_at(&self, started_at: Instant, now: Instant) -> Duration {
        now.saturating_duration_since(started_at)
            .saturating_sub(self.paused_total_at(now))
    }
}

/// Point-in-time view of a session. Safe to request at any frequency;
/// producing it never mutates session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,
    pub elapsed_ms: f64,
    pub is_paused: bool,
}

/// Events emitted over the session's broadcast channel
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started,
    Paused,
    Resumed,
    Stopped,
    Error(String),
}
