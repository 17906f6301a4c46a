//! Storage collaborator seam
//!
//! Persistence lives outside the pipeline; this module defines the
//! boundary the transfer layer calls through, plus an in-memory
//! reference implementation. `MemoryStore` serializes assets through
//! JSON on the way in and out, so anything saved has provably
//! round-tripped its metadata.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::recorder::assembler::FinishedAsset;
use crate::transfer::{AssetRef, AssetRegistry};

/// What crosses the storage boundary: the asset itself, or a reference
/// the store must dereference (and thereby release).
pub enum SavePayload<'a> {
    ByValue(&'a FinishedAsset),
    ByReference(AssetRef),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store rejected the asset: {0}")]
    Rejected(String),

    #[error("no stored recording with id {0}")]
    NotFound(String),

    #[error("asset reference {0} could not be dereferenced")]
    DanglingReference(Uuid),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The persistence collaborator contract
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Persist an asset, returning an opaque id
    async fn save(&self, payload: SavePayload<'_>) -> Result<String, StoreError>;

    /// Load a previously saved asset
    async fn load(&self, id: &str) -> Result<FinishedAsset, StoreError>;
}

/// In-memory store keyed by generated ids, holding JSON-serialized
/// records
pub struct MemoryStore {
    registry: AssetRegistry,
    records: Mutex<HashMap<String, String>>,
    reject_reason: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new(registry: AssetRegistry) -> Self {
        Self {
            registry,
            records: Mutex::new(HashMap::new()),
            reject_reason: Mutex::new(None),
        }
    }

    /// Make the next save fail with the given reason
    pub fn reject_next(&self, reason: &str) {
        *self.reject_reason.lock() = Some(reason.to_string());
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn save(&self, payload: SavePayload<'_>) -> Result<String, StoreError> {
        if let Some(reason) = self.reject_reason.lock().take() {
            return Err(StoreError::Rejected(reason));
        }

        let json = match payload {
            SavePayload::ByValue(asset) => serde_json::to_string(asset)?,
            SavePayload::ByReference(reference) => {
                let asset = self
                    .registry
                    .take(&reference)
                    .ok_or(StoreError::DanglingReference(reference.id))?;
                serde_json::to_string(&asset)?
            }
        };

        let id = Uuid::new_v4().to_string();
        self.records.lock().insert(id.clone(), json);
        tracing::debug!("stored recording {}", id);
        Ok(id)
    }

    async fn load(&self, id: &str) -> Result<FinishedAsset, StoreError> {
        let records = self.records.lock();
        let json = records
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::assembler::{CompositionMetadata, RegionOrigin};
    use chrono::Utc;

    fn sample_asset() -> FinishedAsset {
        FinishedAsset {
            payload: vec![1, 2, 3, 4],
            mime: "video/webm".to_string(),
            size_bytes: 4,
            duration_ms: 2500.0,
            created_at: Utc::now(),
            metadata: CompositionMetadata {
                width: 320,
                height: 240,
                frame_rate: 30,
                region_origin: Some(RegionOrigin { x: 10, y: 20 }),
                mode: "region_realtime_crop".to_string(),
                original_width: 640,
                original_height: 480,
            },
        }
    }

    #[tokio::test]
    async fn test_save_and_load_round_trips_metadata() {
        let store = MemoryStore::new(AssetRegistry::new());
        let asset = sample_asset();

        let id = store.save(SavePayload::ByValue(&asset)).await.unwrap();
        let loaded = store.load(&id).await.unwrap();

        assert_eq!(loaded.payload, asset.payload);
        assert_eq!(loaded.mime, asset.mime);
        assert_eq!(loaded.size_bytes, asset.size_bytes);
        assert_eq!(loaded.duration_ms, asset.duration_ms);
        assert_eq!(loaded.metadata, asset.metadata);
    }

    #[tokio::test]
    async fn test_load_unknown_id_is_not_found() {
        let store = MemoryStore::new(AssetRegistry::new());
        assert!(matches!(
            store.load("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dangling_reference_is_reported() {
        let registry = AssetRegistry::new();
        let store = MemoryStore::new(registry.clone());

        let reference = registry.publish(sample_asset());
        registry.release(&reference);

        assert!(matches!(
            store.save(SavePayload::ByReference(reference)).await,
            Err(StoreError::DanglingReference(_))
        ));
    }
}
