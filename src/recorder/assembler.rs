//! Asset assembly
//!
//! Concatenates the harvested segments, in order, into one finished
//! binary asset with its descriptive metadata attached.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compositor::policy::CompositionPolicy;
use crate::recorder::sink::Segment;

#[derive(Error, Debug)]
pub enum AssemblyError {
    /// A segment with no bytes means a harvest was corrupted somewhere:
    /// the sink never appends empty harvests.
    #[error("segment {index} of {total} is empty")]
    EmptySegment { index: usize, total: usize },
}

/// Origin of the recorded region within the source frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionOrigin {
    pub x: u32,
    pub y: u32,
}

/// Descriptive metadata attached to a finished asset. Every field
/// round-trips through storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionMetadata {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_origin: Option<RegionOrigin>,
    pub mode: String,
    pub original_width: u32,
    pub original_height: u32,
}

impl CompositionMetadata {
    /// Describe a policy applied to a source of the given size
    pub fn for_policy(policy: &CompositionPolicy, source: (u32, u32)) -> Self {
        let (width, height) = policy.target_dimensions();
        Self {
            width,
            height,
            frame_rate: policy.frame_rate(),
            region_origin: policy.region_origin().map(|(x, y)| RegionOrigin { x, y }),
            mode: policy.mode_label().to_string(),
            original_width: source.0,
            original_height: source.1,
        }
    }
}

/// One finished recording. Immutable once produced; ownership moves to
/// the transfer layer and the pipeline keeps no reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedAsset {
    pub payload: Vec<u8>,
    pub mime: String,
    pub size_bytes: u64,
    pub duration_ms: f64,
    pub created_at: DateTime<Utc>,
    pub metadata: CompositionMetadata,
}

/// Concatenate harvested segments into the finished asset
pub fn assemble(
    chunks: Vec<Segment>,
    mime: &str,
    duration: Duration,
    metadata: CompositionMetadata,
) -> Result<FinishedAsset, AssemblyError> {
    let total = chunks.len();
    for (index, segment) in chunks.iter().enumerate() {
        if segment.data.is_empty() {
            return Err(AssemblyError::EmptySegment { index, total });
        }
    }

    let mut payload = Vec::with_capacity(chunks.iter().map(|s| s.data.len()).sum());
    for segment in chunks {
        payload.extend_from_slice(&segment.data);
    }

    let size_bytes = payload.len() as u64;
    tracing::info!(
        "assembled asset: {} segments, {} bytes, {:.0}ms",
        total,
        size_bytes,
        duration.as_secs_f64() * 1000.0
    );

    Ok(FinishedAsset {
        payload,
        mime: mime.to_string(),
        size_bytes,
        duration_ms: duration.as_secs_f64() * 1000.0,
        created_at: Utc::now(),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::policy::CropRegion;

    fn crop_metadata() -> CompositionMetadata {
        CompositionMetadata::for_policy(
            &CompositionPolicy::RegionCrop {
                region: CropRegion::new(10, 20, 320, 240),
            },
            (640, 480),
        )
    }

    #[test]
    fn test_assemble_concatenates_in_order() {
        let chunks = vec![
            Segment { data: vec![1, 2] },
            Segment { data: vec![3] },
            Segment { data: vec![4, 5, 6] },
        ];

        let asset = assemble(
            chunks,
            "video/webm",
            Duration::from_millis(2500),
            crop_metadata(),
        )
        .unwrap();

        assert_eq!(asset.payload, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(asset.size_bytes, 6);
        assert_eq!(asset.duration_ms, 2500.0);
        assert_eq!(asset.mime, "video/webm");
    }

    #[test]
    fn test_empty_segment_is_rejected() {
        let chunks = vec![Segment { data: vec![1] }, Segment { data: vec![] }];
        let err = assemble(
            chunks,
            "video/webm",
            Duration::ZERO,
            crop_metadata(),
        )
        .unwrap_err();
        assert!(matches!(err, AssemblyError::EmptySegment { index: 1, .. }));
    }

    #[test]
    fn test_no_segments_yield_valid_empty_asset() {
        let asset = assemble(
            Vec::new(),
            "video/webm",
            Duration::ZERO,
            crop_metadata(),
        )
        .unwrap();
        assert_eq!(asset.size_bytes, 0);
        assert!(asset.payload.is_empty());
    }

    #[test]
    fn test_metadata_round_trips_through_json() {
        let metadata = crop_metadata();
        let json = serde_json::to_string(&metadata).unwrap();
        let back: CompositionMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata, back);
        assert_eq!(back.region_origin, Some(RegionOrigin { x: 10, y: 20 }));
        assert_eq!(back.mode, "region_realtime_crop");
        assert_eq!((back.original_width, back.original_height), (640, 480));
    }
}
