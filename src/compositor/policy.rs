//! Composition policies
//!
//! A policy describes how a source frame maps into the output surface:
//! either a sub-rectangle cropped at source resolution, or a rescale of
//! the full frame to a fixed output resolution. Frame rate and bitrates
//! hang off the policy because the two modes are tuned very differently
//! as a file-size control strategy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by policy validation
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
    #[error("target dimensions must be non-zero, got {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    #[error(
        "crop region {left},{top} {width}x{height} exceeds source bounds {source_width}x{source_height}"
    )]
    RegionOutOfBounds {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
        source_width: u32,
        source_height: u32,
    },
}

/// A crop rectangle in source-frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// A region covering an entire frame of the given size
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
        }
    }
}

/// How each source frame is composed into the output surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum CompositionPolicy {
    /// Record a sub-rectangle of the source at source resolution
    RegionCrop { region: CropRegion },

    /// Rescale the full source frame to a fixed output resolution
    FixedResolution { width: u32, height: u32 },
}

impl CompositionPolicy {
    /// The default fixed-resolution profile (720p preprocessing)
    pub fn fixed_default() -> Self {
        CompositionPolicy::FixedResolution {
            width: 1280,
            height: 720,
        }
    }

    /// Validate the policy against the source frame bounds.
    ///
    /// Violations are reported, never silently renormalized.
    pub fn validate(&self, source: (u32, u32)) -> Result<(), PolicyError> {
        let (source_width, source_height) = source;
        match *self {
            CompositionPolicy::RegionCrop { region } => {
                if region.width == 0 || region.height == 0 {
                    return Err(PolicyError::ZeroDimension {
                        width: region.width,
                        height: region.height,
                    });
                }
                let right = region.left as u64 + region.width as u64;
                let bottom = region.top as u64 + region.height as u64;
                if right > source_width as u64 || bottom > source_height as u64 {
                    return Err(PolicyError::RegionOutOfBounds {
                        left: region.left,
                        top: region.top,
                        width: region.width,
                        height: region.height,
                        source_width,
                        source_height,
                    });
                }
                Ok(())
            }
            CompositionPolicy::FixedResolution { width, height } => {
                if width == 0 || height == 0 {
                    return Err(PolicyError::ZeroDimension { width, height });
                }
                Ok(())
            }
        }
    }

    /// Dimensions of the output surface
    pub fn target_dimensions(&self) -> (u32, u32) {
        match *self {
            CompositionPolicy::RegionCrop { region } => (region.width, region.height),
            CompositionPolicy::FixedResolution { width, height } => (width, height),
        }
    }

    /// The source rectangle each tick draws from
    pub fn source_rect(&self, source: (u32, u32)) -> CropRegion {
        match *self {
            CompositionPolicy::RegionCrop { region } => region,
            CompositionPolicy::FixedResolution { .. } => CropRegion::full(source.0, source.1),
        }
    }

    /// Fixed sample rate of the adapted track, in frames per second.
    /// This is a hard cap used to bound output size.
    pub fn frame_rate(&self) -> u32 {
        match self {
            CompositionPolicy::RegionCrop { .. } => 30,
            CompositionPolicy::FixedResolution { .. } => 24,
        }
    }

    /// Target video bitrate in bits per second
    pub fn video_bitrate(&self) -> u32 {
        match self {
            CompositionPolicy::RegionCrop { .. } => 2_000_000,
            CompositionPolicy::FixedResolution { .. } => 500_000,
        }
    }

    /// Target audio bitrate in bits per second
    pub fn audio_bitrate(&self) -> u32 {
        match self {
            CompositionPolicy::RegionCrop { .. } => 64_000,
            CompositionPolicy::FixedResolution { .. } => 16_000,
        }
    }

    /// Persisted discriminant for the composition mode
    pub fn mode_label(&self) -> &'static str {
        match self {
            CompositionPolicy::RegionCrop { .. } => "region_realtime_crop",
            CompositionPolicy::FixedResolution { .. } => "tab_canvas_preprocessing",
        }
    }

    /// Origin of the crop region, if this policy crops
    pub fn region_origin(&self) -> Option<(u32, u32)> {
        match *self {
            CompositionPolicy::RegionCrop { region } => Some((region.left, region.top)),
            CompositionPolicy::FixedResolution { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_within_bounds_is_valid() {
        let policy = CompositionPolicy::RegionCrop {
            region: CropRegion::new(10, 20, 320, 240),
        };
        assert!(policy.validate((640, 480)).is_ok());
        assert_eq!(policy.target_dimensions(), (320, 240));
        assert_eq!(policy.region_origin(), Some((10, 20)));
    }

    #[test]
    fn test_region_exceeding_bounds_is_rejected() {
        let policy = CompositionPolicy::RegionCrop {
            region: CropRegion::new(400, 0, 320, 240),
        };
        let err = policy.validate((640, 480)).unwrap_err();
        assert!(matches!(err, PolicyError::RegionOutOfBounds { .. }));
    }

    #[test]
    fn test_zero_dimensions_are_rejected() {
        let policy = CompositionPolicy::RegionCrop {
            region: CropRegion::new(0, 0, 0, 240),
        };
        assert!(matches!(
            policy.validate((640, 480)),
            Err(PolicyError::ZeroDimension { .. })
        ));

        let policy = CompositionPolicy::FixedResolution {
            width: 1280,
            height: 0,
        };
        assert!(policy.validate((640, 480)).is_err());
    }

    #[test]
    fn test_fixed_resolution_uses_full_source_rect() {
        let policy = CompositionPolicy::fixed_default();
        assert_eq!(policy.target_dimensions(), (1280, 720));
        assert_eq!(policy.source_rect((1920, 1080)), CropRegion::full(1920, 1080));
        assert_eq!(policy.region_origin(), None);
    }

    #[test]
    fn test_policy_profiles() {
        let crop = CompositionPolicy::RegionCrop {
            region: CropRegion::new(0, 0, 100, 100),
        };
        assert_eq!(crop.frame_rate(), 30);
        assert_eq!(crop.video_bitrate(), 2_000_000);
        assert_eq!(crop.audio_bitrate(), 64_000);
        assert_eq!(crop.mode_label(), "region_realtime_crop");

        let fixed = CompositionPolicy::fixed_default();
        assert_eq!(fixed.frame_rate(), 24);
        assert_eq!(fixed.video_bitrate(), 500_000);
        assert_eq!(fixed.audio_bitrate(), 16_000);
        assert_eq!(fixed.mode_label(), "tab_canvas_preprocessing");
    }

    #[test]
    fn test_policy_serde_round_trip() {
        let policy = CompositionPolicy::RegionCrop {
            region: CropRegion::new(10, 20, 320, 240),
        };
        let json = serde_json::to_string(&policy).unwrap();
        let back: CompositionPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, back);
    }
}
