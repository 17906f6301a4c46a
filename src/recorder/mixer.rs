//! Stream mixer
//!
//! Combines the adapted video track with the source's audio track (if
//! present) into one mixed stream. Composition is by reference: the
//! receiver halves move into the mixed stream, nothing is cloned or
//! re-encoded. A missing audio track is not an error; the mixed stream
//! simply carries video only.

use tokio::sync::mpsc;

use crate::compositor::adapter::VideoSample;
use crate::source::AudioTrack;

/// One video track plus at most one audio track, ready for the sink
pub struct MixedStream {
    pub video: mpsc::Receiver<VideoSample>,
    pub audio: Option<AudioTrack>,
}

impl MixedStream {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// Compose the adapted video track and the optional audio track
pub fn mix(video: mpsc::Receiver<VideoSample>, audio: Option<AudioTrack>) -> MixedStream {
    if audio.is_some() {
        tracing::debug!("mixed stream: video + audio");
    } else {
        tracing::debug!("mixed stream: video only (no audio track)");
    }
    MixedStream { video, audio }
}
