//! Content-addressed blob service.
//!
//! Rendered contract documents are handed to a [`BlobStore`], which returns
//! an opaque [`ContentId`]. Callers must not assume the identifier is stable
//! across re-uploads; the authoritative digest of a contract is its hash.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use veriown_core::ContentId;

use crate::error::{Result, StoreError};

/// Prefix of identifiers minted by the local blob stores.
pub const CONTENT_ID_PREFIX: &str = "b3-";

/// Put/get interface of a content-addressed blob service.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` and return their content identifier.
    async fn put(&self, bytes: Bytes) -> Result<ContentId>;

    /// Fetch the bytes behind `id`, if present.
    async fn get(&self, id: &ContentId) -> Result<Option<Bytes>>;
}

/// Content identifier for `bytes`: `b3-` followed by the hex BLAKE3 digest.
pub fn content_id_for(bytes: &[u8]) -> ContentId {
    ContentId::new(format!(
        "{CONTENT_ID_PREFIX}{}",
        blake3::hash(bytes).to_hex()
    ))
}

/// In-memory blob store. All data is lost when the store is dropped.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ContentId, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs held.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<ContentId> {
        let id = content_id_for(&bytes);
        self.blobs
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(id.clone(), bytes);
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Option<Bytes>> {
        Ok(self
            .blobs
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .get(id)
            .cloned())
    }
}
