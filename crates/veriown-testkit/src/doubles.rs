//! Misbehaving collaborators for exercising degraded contract issuance.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use veriown::{DocumentRenderer, RenderError, TextRenderer};
use veriown_core::{ContentId, ContractDocument, ContractHash};
use veriown_store::{BlobStore, MemoryBlobStore, Result, StoreError};

/// A blob service that rejects the first `failures` puts, then recovers.
#[derive(Default)]
pub struct FailingBlobStore {
    failures: AtomicUsize,
    inner: MemoryBlobStore,
}

impl FailingBlobStore {
    /// Never accepts a put.
    pub fn always() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            inner: MemoryBlobStore::new(),
        }
    }

    /// Blobs accepted so far.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<ContentId> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("blob service unreachable".into()));
        }
        self.inner.put(bytes).await
    }

    async fn get(&self, id: &ContentId) -> Result<Option<Bytes>> {
        self.inner.get(id).await
    }
}

/// A renderer that takes `delay` before producing a text certificate.
pub struct SlowRenderer {
    delay: Duration,
    inner: TextRenderer,
}

impl SlowRenderer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: TextRenderer::new(),
        }
    }
}

#[async_trait]
impl DocumentRenderer for SlowRenderer {
    async fn render(
        &self,
        document: &ContractDocument,
        contract_hash: &ContractHash,
    ) -> std::result::Result<Bytes, RenderError> {
        tokio::time::sleep(self.delay).await;
        self.inner.render(document, contract_hash).await
    }
}

/// A renderer that always fails.
#[derive(Debug, Default)]
pub struct FailingRenderer;

#[async_trait]
impl DocumentRenderer for FailingRenderer {
    async fn render(
        &self,
        _document: &ContractDocument,
        _contract_hash: &ContractHash,
    ) -> std::result::Result<Bytes, RenderError> {
        Err(RenderError("font missing".into()))
    }

    fn file_extension(&self) -> &str {
        "pdf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_blob_store_recovers() {
        let blobs = FailingBlobStore::failing_first(2);
        assert!(blobs.put(Bytes::from_static(b"a")).await.is_err());
        assert!(blobs.put(Bytes::from_static(b"a")).await.is_err());

        let id = blobs.put(Bytes::from_static(b"a")).await.unwrap();
        assert_eq!(blobs.get(&id).await.unwrap().unwrap(), Bytes::from_static(b"a"));
        assert_eq!(blobs.len(), 1);
    }

    #[tokio::test]
    async fn test_always_failing_blob_store() {
        let blobs = FailingBlobStore::always();
        for _ in 0..3 {
            assert!(matches!(
                blobs.put(Bytes::from_static(b"a")).await,
                Err(StoreError::Unavailable(_))
            ));
        }
        assert!(blobs.is_empty());
    }
}
