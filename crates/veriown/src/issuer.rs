//! ContractIssuer: durable, independently verifiable proof of ownership.
//!
//! Issuing a contract snapshots the ownership fact into a
//! [`ContractDocument`], hashes its canonical JSON, renders it, hands the
//! rendered bytes to the blob service and records the result. Rendering and
//! upload are bounded by `issuance_timeout`. Regeneration re-renders the
//! stored document and never recomputes the hash.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info, warn};
use veriown_core::{
    contract_number, now_millis, ContentId, ContractDocument, ContractHash, ContractId,
    NewContract, OwnerContract, ProductId, UserId,
};
use veriown_policy::{authorize, Action, Actor, Subject};
use veriown_store::{BlobStore, Store};

use crate::config::IssuerConfig;
use crate::error::{ErrorKind, ProvenanceError, Result};
use crate::render::DocumentRenderer;

/// Result of issuing a contract as part of an ownership change.
///
/// The ownership change itself is already durable when issuance runs, so a
/// failed issuance is reported alongside it instead of failing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceOutcome {
    Issued(OwnerContract),
    Warning(IssuanceWarning),
}

impl IssuanceOutcome {
    pub fn contract(&self) -> Option<&OwnerContract> {
        match self {
            IssuanceOutcome::Issued(contract) => Some(contract),
            IssuanceOutcome::Warning(_) => None,
        }
    }

    pub fn warning(&self) -> Option<&IssuanceWarning> {
        match self {
            IssuanceOutcome::Issued(_) => None,
            IssuanceOutcome::Warning(warning) => Some(warning),
        }
    }

    pub fn is_issued(&self) -> bool {
        matches!(self, IssuanceOutcome::Issued(_))
    }
}

/// A contract could not be issued for a recorded ownership fact.
///
/// The current owner or an administrator can retry issuance later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceWarning {
    pub product_id: ProductId,
    pub owner_id: UserId,
    pub kind: ErrorKind,
    pub reason: String,
}

impl fmt::Display for IssuanceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ownership of product {} by user {} was recorded but no contract was issued: {}",
            self.product_id, self.owner_id, self.reason
        )
    }
}

/// Builds, hashes, renders and stores ownership contracts.
pub struct ContractIssuer<S, B, R> {
    store: Arc<S>,
    blobs: Arc<B>,
    renderer: Arc<R>,
    config: IssuerConfig,
}

impl<S, B, R> Clone for ContractIssuer<S, B, R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            blobs: Arc::clone(&self.blobs),
            renderer: Arc::clone(&self.renderer),
            config: self.config.clone(),
        }
    }
}

impl<S, B, R> ContractIssuer<S, B, R>
where
    S: Store,
    B: BlobStore,
    R: DocumentRenderer,
{
    pub fn new(store: Arc<S>, blobs: Arc<B>, renderer: Arc<R>, config: IssuerConfig) -> Self {
        Self {
            store,
            blobs,
            renderer,
            config,
        }
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Issue a contract dated now.
    pub async fn issue(
        &self,
        product_id: ProductId,
        owner_id: UserId,
        previous_owner_id: Option<UserId>,
    ) -> Result<OwnerContract> {
        self.issue_at(product_id, owner_id, previous_owner_id, now_millis())
            .await
    }

    /// Issue a contract for an ownership fact recorded at `transfer_date`.
    ///
    /// Product and parties are resolved before anything is rendered or
    /// stored.
    pub async fn issue_at(
        &self,
        product_id: ProductId,
        owner_id: UserId,
        previous_owner_id: Option<UserId>,
        transfer_date: i64,
    ) -> Result<OwnerContract> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or(ProvenanceError::ProductNotFound(product_id))?;
        let owner = self
            .store
            .get_user(owner_id)
            .await?
            .ok_or(ProvenanceError::UserNotFound(owner_id))?;
        let previous = match previous_owner_id {
            Some(id) => Some(
                self.store
                    .get_user(id)
                    .await?
                    .ok_or(ProvenanceError::UserNotFound(id))?,
            ),
            None => None,
        };

        let issued_at = now_millis();
        let number = contract_number(
            &self.config.contract_prefix,
            product.id,
            owner.id,
            issued_at,
            rand::random::<u32>(),
        );
        let document = ContractDocument {
            product_id: product.id,
            product_serial: product.serial_number,
            manufacturer: product.manufacturer,
            model: product.model,
            owner_id: owner.id,
            owner_username: owner.username,
            previous_owner_id: previous.as_ref().map(|u| u.id),
            previous_owner_name: previous.map(|u| u.username),
            transfer_date,
            contract_number: number.clone(),
            issued_at,
            verification_url: self.config.verification_url(product.id),
        };
        let sealed = document.seal()?;

        let (content_id, cache_path) = self
            .store_rendering(&document, &sealed.contract_hash, &number)
            .await?;

        let contract = self
            .store
            .insert_contract(&NewContract {
                product_id,
                owner_id,
                previous_owner_id,
                transfer_date,
                contract_number: number,
                document_data: sealed.document_data,
                contract_hash: sealed.contract_hash,
                content_id,
                cache_path,
                created_at: issued_at,
            })
            .await?;

        info!(
            product_id = %product_id,
            owner = %owner_id,
            contract_id = %contract.id,
            contract_number = %contract.contract_number,
            contract_hash = %contract.contract_hash,
            content_id = %contract.content_id,
            "contract issued"
        );
        Ok(contract)
    }

    /// Issue a contract, turning any failure into a warning.
    pub async fn issue_outcome(
        &self,
        product_id: ProductId,
        owner_id: UserId,
        previous_owner_id: Option<UserId>,
        transfer_date: i64,
    ) -> IssuanceOutcome {
        match self
            .issue_at(product_id, owner_id, previous_owner_id, transfer_date)
            .await
        {
            Ok(contract) => IssuanceOutcome::Issued(contract),
            Err(e) => {
                warn!(product_id = %product_id, owner = %owner_id, error = %e, "contract issuance degraded");
                IssuanceOutcome::Warning(IssuanceWarning {
                    product_id,
                    owner_id,
                    kind: e.kind(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Re-render a contract from its stored document and store it again.
    ///
    /// `document_data` and `contract_hash` are left untouched; only the
    /// storage reference, cache path and `updated_at` change.
    pub async fn regenerate(&self, contract_id: ContractId, actor: &Actor) -> Result<OwnerContract> {
        let contract = self
            .store
            .get_contract(contract_id)
            .await?
            .ok_or(ProvenanceError::ContractNotFound(contract_id))?;

        authorize(
            actor,
            Action::RegenerateContract,
            &Subject::owned_by(contract.owner_id),
        )?;

        let document = ContractDocument::parse(&contract.document_data).map_err(|e| {
            error!(contract_id = %contract_id, error = %e, "stored contract document is malformed");
            ProvenanceError::MalformedStoredDocument {
                contract_id,
                reason: e.to_string(),
            }
        })?;
        if !contract.sealed().is_intact() {
            error!(contract_id = %contract_id, contract_hash = %contract.contract_hash, "stored contract document does not match its hash");
            return Err(ProvenanceError::ContractHashMismatch(contract_id));
        }

        let (content_id, cache_path) = self
            .store_rendering(&document, &contract.contract_hash, &contract.contract_number)
            .await?;

        let updated = self
            .store
            .update_contract_storage(contract_id, &content_id, cache_path.as_deref(), now_millis())
            .await?
            .ok_or(ProvenanceError::ContractNotFound(contract_id))?;

        info!(
            contract_id = %contract_id,
            actor = %actor.id,
            content_id = %updated.content_id,
            "contract regenerated"
        );
        Ok(updated)
    }

    /// Render and upload under the issuance timeout, then write the cache.
    async fn store_rendering(
        &self,
        document: &ContractDocument,
        contract_hash: &ContractHash,
        number: &str,
    ) -> Result<(ContentId, Option<PathBuf>)> {
        let limit = self.config.issuance_timeout;
        let work = async {
            let bytes = self
                .renderer
                .render(document, contract_hash)
                .await
                .map_err(|e| ProvenanceError::RenderFailure(e.to_string()))?;
            let content_id = self
                .blobs
                .put(bytes.clone())
                .await
                .map_err(|e| ProvenanceError::BlobStoreFailure(e.to_string()))?;
            Ok::<_, ProvenanceError>((bytes, content_id))
        };

        let (bytes, content_id) = tokio::time::timeout(limit, work)
            .await
            .map_err(|_| ProvenanceError::IssuanceTimeout(limit))??;

        let cache_path = match &self.config.cache_dir {
            Some(dir) => self.write_cache(dir, number, &bytes).await,
            None => None,
        };
        Ok((content_id, cache_path))
    }

    /// Best-effort local copy. A failed write only loses the cache.
    async fn write_cache(&self, dir: &Path, number: &str, bytes: &Bytes) -> Option<PathBuf> {
        let path = dir.join(format!("{number}.{}", self.renderer.file_extension()));
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, bytes).await
        };
        match written.await {
            Ok(()) => {
                debug!(path = %path.display(), "contract document cached");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "contract cache write failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use veriown_core::{NewProduct, NewUser, Role};
    use veriown_store::{MemoryBlobStore, MemoryStore};

    use crate::render::{RenderError, TextRenderer};

    type Issuer = ContractIssuer<MemoryStore, MemoryBlobStore, TextRenderer>;

    struct Setup {
        store: Arc<MemoryStore>,
        blobs: Arc<MemoryBlobStore>,
        product: ProductId,
        maker: UserId,
        alice: UserId,
    }

    async fn setup() -> Setup {
        let store = Arc::new(MemoryStore::new());
        let maker = store
            .insert_user(&NewUser::verified("acme", Role::Manufacturer))
            .await
            .unwrap()
            .id;
        let alice = store
            .insert_user(&NewUser::verified("alice", Role::Regular))
            .await
            .unwrap()
            .id;
        let (product, _) = crate::EventLedger::new(Arc::clone(&store), Default::default())
            .register(
                NewProduct {
                    serial_number: "SN-001".into(),
                    manufacturer: "Acme".into(),
                    model: "Roadster".into(),
                    created_at: now_millis(),
                },
                maker,
            )
            .await
            .unwrap();
        Setup {
            store,
            blobs: Arc::new(MemoryBlobStore::new()),
            product: product.id,
            maker,
            alice,
        }
    }

    fn issuer(s: &Setup, config: IssuerConfig) -> Issuer {
        ContractIssuer::new(
            Arc::clone(&s.store),
            Arc::clone(&s.blobs),
            Arc::new(TextRenderer::new()),
            config,
        )
    }

    #[tokio::test]
    async fn test_issue_hashes_stored_document() {
        let s = setup().await;
        let contract = issuer(&s, IssuerConfig::default())
            .issue_at(s.product, s.alice, Some(s.maker), 1_736_870_400_000)
            .await
            .unwrap();

        assert_eq!(
            contract.contract_hash,
            ContractHash::hash(contract.document_data.as_bytes())
        );
        let document = ContractDocument::parse(&contract.document_data).unwrap();
        assert_eq!(document.owner_username, "alice");
        assert_eq!(document.previous_owner_name.as_deref(), Some("acme"));
        assert_eq!(document.transfer_date, 1_736_870_400_000);
        assert!(contract.contract_number.starts_with(&format!("VO-{}-{}-", s.product, s.alice)));

        let rendered = s.blobs.get(&contract.content_id).await.unwrap().unwrap();
        let text = std::str::from_utf8(&rendered).unwrap();
        assert!(text.contains(&contract.contract_hash.to_hex()));
        assert!(text.contains(&document.verification_url));
    }

    #[tokio::test]
    async fn test_issue_rejects_unknown_parties_without_writing() {
        let s = setup().await;
        let issuer = issuer(&s, IssuerConfig::default());

        let err = issuer.issue(ProductId(99), s.alice, None).await.unwrap_err();
        assert!(matches!(err, ProvenanceError::ProductNotFound(ProductId(99))));

        let err = issuer.issue(s.product, UserId(99), None).await.unwrap_err();
        assert!(matches!(err, ProvenanceError::UserNotFound(UserId(99))));

        assert!(s.blobs.is_empty());
        assert!(s.store.contracts_for_product(s.product).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_regenerate_keeps_document_and_hash() {
        let s = setup().await;
        let issuer = issuer(&s, IssuerConfig::default());
        let original = issuer.issue(s.product, s.alice, Some(s.maker)).await.unwrap();

        let alice = Actor::new(s.alice, Role::Regular, true);
        let regenerated = issuer.regenerate(original.id, &alice).await.unwrap();

        assert_eq!(regenerated.document_data, original.document_data);
        assert_eq!(regenerated.contract_hash, original.contract_hash);
        assert_eq!(regenerated.contract_number, original.contract_number);
    }

    #[tokio::test]
    async fn test_regenerate_authorization() {
        let s = setup().await;
        let issuer = issuer(&s, IssuerConfig::default());
        let contract = issuer.issue(s.product, s.alice, Some(s.maker)).await.unwrap();

        let previous_owner = Actor::new(s.maker, Role::Manufacturer, true);
        let err = issuer.regenerate(contract.id, &previous_owner).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let admin = Actor::new(UserId(500), Role::Administrator, true);
        issuer.regenerate(contract.id, &admin).await.unwrap();

        let err = issuer.regenerate(ContractId(77), &admin).await.unwrap_err();
        assert!(matches!(err, ProvenanceError::ContractNotFound(ContractId(77))));
    }

    async fn insert_raw(s: &Setup, number: &str, document_data: &str, hash: ContractHash) -> ContractId {
        s.store
            .insert_contract(&NewContract {
                product_id: s.product,
                owner_id: s.alice,
                previous_owner_id: None,
                transfer_date: 0,
                contract_number: number.into(),
                document_data: document_data.into(),
                contract_hash: hash,
                content_id: ContentId::new("b3-00"),
                cache_path: None,
                created_at: 0,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_regenerate_reports_corrupt_documents() {
        let s = setup().await;
        let issuer = issuer(&s, IssuerConfig::default());
        let alice = Actor::new(s.alice, Role::Regular, true);

        let garbage = insert_raw(&s, "VO-garbage", "{not json", ContractHash::hash(b"{not json")).await;
        let err = issuer.regenerate(garbage, &alice).await.unwrap_err();
        assert!(matches!(err, ProvenanceError::MalformedStoredDocument { .. }));
        assert!(err.is_integrity());

        let good = issuer.issue(s.product, s.alice, None).await.unwrap();
        let edited = good.document_data.replace("Roadster", "Speedster");
        let mismatched = insert_raw(&s, "VO-edited", &edited, good.contract_hash).await;
        let err = issuer.regenerate(mismatched, &alice).await.unwrap_err();
        assert!(matches!(err, ProvenanceError::ContractHashMismatch(id) if id == mismatched));
    }

    #[tokio::test]
    async fn test_cache_copy_written_when_configured() {
        let s = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let config = IssuerConfig {
            cache_dir: Some(dir.path().join("contracts")),
            ..IssuerConfig::default()
        };
        let contract = issuer(&s, config).issue(s.product, s.alice, None).await.unwrap();

        let path = contract.cache_path.clone().unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("txt"));
        let cached = std::fs::read(&path).unwrap();
        assert_eq!(
            Bytes::from(cached),
            s.blobs.get(&contract.content_id).await.unwrap().unwrap()
        );
    }

    struct Stalling;

    #[async_trait]
    impl DocumentRenderer for Stalling {
        async fn render(&self, _: &ContractDocument, _: &ContractHash) -> std::result::Result<Bytes, RenderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Bytes::new())
        }
    }

    #[tokio::test]
    async fn test_slow_rendering_times_out_as_warning() {
        let s = setup().await;
        let issuer = ContractIssuer::new(
            Arc::clone(&s.store),
            Arc::clone(&s.blobs),
            Arc::new(Stalling),
            IssuerConfig {
                issuance_timeout: Duration::from_millis(50),
                ..IssuerConfig::default()
            },
        );

        let outcome = issuer.issue_outcome(s.product, s.alice, None, 0).await;
        let warning = outcome.warning().unwrap();
        assert_eq!(warning.kind, ErrorKind::Dependency);
        assert!(warning.reason.contains("timed out"));
        assert!(s.store.contracts_for_product(s.product).await.unwrap().is_empty());
    }
}
