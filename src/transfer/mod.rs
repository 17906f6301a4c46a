//! Transfer decision layer
//!
//! A finished asset crosses into the storage collaborator either by
//! value or by reference. Small assets travel whole; large ones are
//! published into a registry and only an ephemeral reference crosses
//! the boundary. The two paths carry different obligations: whoever
//! dereferences a by-reference asset must eventually release it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::recorder::assembler::FinishedAsset;
use crate::storage::{AssetStore, SavePayload};

/// Largest asset handed across by value: 50 MiB
pub const DEFAULT_DIRECT_TRANSFER_LIMIT: u64 = 50 * 1024 * 1024;

/// Configuration of the transfer decision
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPolicy {
    /// Assets strictly larger than this go by reference
    pub max_direct_bytes: u64,

    /// Route everything by reference regardless of size
    pub force_by_reference: bool,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            max_direct_bytes: DEFAULT_DIRECT_TRANSFER_LIMIT,
            force_by_reference: false,
        }
    }
}

/// Which path an asset takes across the storage boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    ByValue,
    ByReference,
}

/// Decide the transfer path for an asset of `size_bytes`.
///
/// An asset exactly at the limit still goes by value; only strictly
/// larger assets (or a forcing policy) take the reference path.
pub fn choose_transfer(size_bytes: u64, policy: &TransferPolicy) -> TransferKind {
    if policy.force_by_reference || size_bytes > policy.max_direct_bytes {
        TransferKind::ByReference
    } else {
        TransferKind::ByValue
    }
}

/// Ephemeral handle to a published asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub id: Uuid,
    pub size_bytes: u64,
}

/// Table of published assets awaiting dereference.
///
/// The analogue of handing out object URLs: `publish` registers the
/// binary and returns a handle, `take` surrenders it to the
/// dereferencing side, `release` discards an unused handle.
#[derive(Clone, Default)]
pub struct AssetRegistry {
    inner: Arc<Mutex<HashMap<Uuid, FinishedAsset>>>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, asset: FinishedAsset) -> AssetRef {
        let reference = AssetRef {
            id: Uuid::new_v4(),
            size_bytes: asset.size_bytes,
        };
        self.inner.lock().insert(reference.id, asset);
        reference
    }

    /// Surrender the asset behind a reference, releasing the reference
    pub fn take(&self, reference: &AssetRef) -> Option<FinishedAsset> {
        self.inner.lock().remove(&reference.id)
    }

    /// Discard a reference without reading the asset
    pub fn release(&self, reference: &AssetRef) {
        if self.inner.lock().remove(&reference.id).is_some() {
            tracing::debug!("released unclaimed asset reference {}", reference.id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Errors from handing an asset to the storage collaborator
#[derive(Error, Debug)]
pub enum TransferError {
    /// The collaborator rejected the asset. The asset rides along so the
    /// caller can retry.
    #[error("storage collaborator rejected the asset: {reason}")]
    Rejected {
        reason: String,
        asset: Box<FinishedAsset>,
    },

    /// A published reference disappeared before it could be reclaimed
    #[error("asset reference {0} is no longer registered")]
    DanglingReference(Uuid),
}

/// Hand a finished asset to the storage collaborator, choosing the
/// transfer path by size. Returns the collaborator's opaque id.
pub async fn hand_off(
    asset: FinishedAsset,
    policy: &TransferPolicy,
    registry: &AssetRegistry,
    store: &dyn AssetStore,
) -> Result<String, TransferError> {
    match choose_transfer(asset.size_bytes, policy) {
        TransferKind::ByValue => {
            tracing::debug!("transferring {} bytes by value", asset.size_bytes);
            match store.save(SavePayload::ByValue(&asset)).await {
                Ok(id) => Ok(id),
                Err(e) => Err(TransferError::Rejected {
                    reason: e.to_string(),
                    asset: Box::new(asset),
                }),
            }
        }
        TransferKind::ByReference => {
            tracing::debug!("transferring {} bytes by reference", asset.size_bytes);
            let reference = registry.publish(asset);
            match store.save(SavePayload::ByReference(reference)).await {
                Ok(id) => Ok(id),
                Err(e) => match registry.take(&reference) {
                    // Reclaim the published asset so the caller can retry
                    Some(asset) => Err(TransferError::Rejected {
                        reason: e.to_string(),
                        asset: Box::new(asset),
                    }),
                    None => Err(TransferError::DanglingReference(reference.id)),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::assembler::CompositionMetadata;
    use crate::storage::MemoryStore;
    use chrono::Utc;

    fn asset_of_size(size: usize) -> FinishedAsset {
        FinishedAsset {
            payload: vec![0xAB; size],
            mime: "video/webm".to_string(),
            size_bytes: size as u64,
            duration_ms: 1000.0,
            created_at: Utc::now(),
            metadata: CompositionMetadata {
                width: 4,
                height: 4,
                frame_rate: 30,
                region_origin: None,
                mode: "tab_canvas_preprocessing".to_string(),
                original_width: 8,
                original_height: 8,
            },
        }
    }

    fn policy_with_limit(limit: u64) -> TransferPolicy {
        TransferPolicy {
            max_direct_bytes: limit,
            force_by_reference: false,
        }
    }

    #[test]
    fn test_by_reference_iff_strictly_larger() {
        let policy = policy_with_limit(100);
        assert_eq!(choose_transfer(99, &policy), TransferKind::ByValue);
        // Equality stays by value
        assert_eq!(choose_transfer(100, &policy), TransferKind::ByValue);
        assert_eq!(choose_transfer(101, &policy), TransferKind::ByReference);
    }

    #[test]
    fn test_force_overrides_size() {
        let policy = TransferPolicy {
            max_direct_bytes: 100,
            force_by_reference: true,
        };
        assert_eq!(choose_transfer(1, &policy), TransferKind::ByReference);
    }

    #[test]
    fn test_registry_publish_take_release() {
        let registry = AssetRegistry::new();
        let reference = registry.publish(asset_of_size(10));
        assert_eq!(registry.len(), 1);
        assert_eq!(reference.size_bytes, 10);

        let asset = registry.take(&reference).unwrap();
        assert_eq!(asset.size_bytes, 10);
        assert!(registry.is_empty());

        // Double take finds nothing
        assert!(registry.take(&reference).is_none());

        let reference = registry.publish(asset_of_size(5));
        registry.release(&reference);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_hand_off_small_asset_by_value() {
        let registry = AssetRegistry::new();
        let store = MemoryStore::new(registry.clone());

        let id = hand_off(asset_of_size(10), &policy_with_limit(100), &registry, &store)
            .await
            .unwrap();
        let loaded = store.load(&id).await.unwrap();
        assert_eq!(loaded.size_bytes, 10);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_hand_off_large_asset_by_reference() {
        let registry = AssetRegistry::new();
        let store = MemoryStore::new(registry.clone());

        let id = hand_off(asset_of_size(200), &policy_with_limit(100), &registry, &store)
            .await
            .unwrap();
        let loaded = store.load(&id).await.unwrap();
        assert_eq!(loaded.size_bytes, 200);

        // Dereferencing released the reference
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_retains_asset_for_retry() {
        let registry = AssetRegistry::new();
        let store = MemoryStore::new(registry.clone());
        store.reject_next("disk full");

        let err = hand_off(asset_of_size(200), &policy_with_limit(100), &registry, &store)
            .await
            .unwrap_err();
        let TransferError::Rejected { reason, asset } = err else {
            panic!("expected Rejected");
        };
        assert!(reason.contains("disk full"));
        assert_eq!(asset.size_bytes, 200);
        // Nothing leaked into the registry
        assert!(registry.is_empty());

        // Retry succeeds with the retained asset
        let id = hand_off(*asset, &policy_with_limit(100), &registry, &store)
            .await
            .unwrap();
        assert!(store.load(&id).await.is_ok());
    }
}
