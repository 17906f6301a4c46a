//! Incremental encoder seam
//!
//! The sink controller drives an encoder that produces compressed output
//! continuously; the controller harvests whatever bytes accumulated since
//! the last flush. Implementations live behind the trait so the pipeline
//! never depends on a particular codec backend.

pub mod ffmpeg;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compositor::adapter::VideoSample;
use crate::compositor::policy::CompositionPolicy;
use crate::source::AudioChunk;

/// Errors reported by encoder implementations
#[derive(Error, Debug)]
pub enum EncoderError {
    /// Lifecycle call made against an encoder not in the expected state.
    /// Recoverable at the session level: cleanup still runs.
    #[error("encoder is in an invalid state: {0}")]
    InvalidState(String),

    #[error("encoder backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle state of an encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderState {
    Inactive,
    Recording,
    Paused,
    Finished,
}

/// Encoder configuration. Bitrates are explicit, policy-dependent fields,
/// not values derived inside the encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub mime: String,
}

impl EncoderConfig {
    /// Build the configuration a policy prescribes
    pub fn for_policy(policy: &CompositionPolicy) -> Self {
        let (width, height) = policy.target_dimensions();
        Self {
            width,
            height,
            frame_rate: policy.frame_rate(),
            video_bitrate: policy.video_bitrate(),
            audio_bitrate: policy.audio_bitrate(),
            mime: "video/webm;codecs=vp9".to_string(),
        }
    }
}

/// An encoder the sink controller can harvest incrementally.
///
/// `harvest` may legitimately return nothing (the backend emits in
/// bursts); `finish` must return every remaining byte so the terminal
/// segment is never lost.
pub trait IncrementalEncoder: Send {
    fn start(&mut self, config: &EncoderConfig) -> Result<(), EncoderError>;

    fn push_video(&mut self, sample: &VideoSample) -> Result<(), EncoderError>;

    fn push_audio(&mut self, chunk: &AudioChunk) -> Result<(), EncoderError>;

    fn pause(&mut self) -> Result<(), EncoderError>;

    fn resume(&mut self) -> Result<(), EncoderError>;

    /// Compressed bytes produced since the previous harvest
    fn harvest(&mut self) -> Result<Vec<u8>, EncoderError>;

    /// Stop encoding and return the terminal bytes not yet harvested
    fn finish(&mut self) -> Result<Vec<u8>, EncoderError>;

    fn state(&self) -> EncoderState;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::policy::CropRegion;

    #[test]
    fn test_config_follows_policy_profile() {
        let crop = CompositionPolicy::RegionCrop {
            region: CropRegion::new(10, 20, 320, 240),
        };
        let config = EncoderConfig::for_policy(&crop);
        assert_eq!((config.width, config.height), (320, 240));
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.video_bitrate, 2_000_000);
        assert_eq!(config.audio_bitrate, 64_000);
        assert_eq!(config.mime, "video/webm;codecs=vp9");

        let fixed = EncoderConfig::for_policy(&CompositionPolicy::fixed_default());
        assert_eq!((fixed.width, fixed.height), (1280, 720));
        assert_eq!(fixed.video_bitrate, 500_000);
    }
}
