//! The `Provenance` facade: every lifecycle action behind one handle.
//!
//! Each action is authorized against the capability table before anything
//! is written. The identity context hands in an [`Actor`]; [`Provenance::actor`]
//! builds one from a stored account.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use veriown_core::{
    now_millis, ContractId, Event, EventHash, EventPayload, EventType, NewProduct, NewUser,
    OwnerContract, PendingTransfer, Product, ProductId, Role, User, UserId, VerificationStatus,
};
use veriown_policy::{authorize, Action, Actor, Subject};
use veriown_store::{BlobStore, Store};

use crate::config::ProvenanceConfig;
use crate::error::{ProvenanceError, Result};
use crate::issuer::{ContractIssuer, IssuanceOutcome};
use crate::ledger::EventLedger;
use crate::render::DocumentRenderer;
use crate::transfer::{ConfirmedTransfer, TransferWorkflow};

/// Gateway serving content identifiers over HTTPS.
pub const IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

/// A newly registered product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub product: Product,
    /// The genesis `registration` event.
    pub event: Event,
    /// The manufacturer's initial contract, or why none was issued.
    pub contract: IssuanceOutcome,
}

/// Result of verifying a chain for public display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Authentic,
    Tampered,
}

/// Product facts shown without authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicProduct {
    pub serial_number: String,
    pub manufacturer: String,
    pub model: String,
    /// `YYYY-MM-DD`.
    pub manufacturing_date: String,
}

/// One ledger entry with owner identities removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicEntry {
    pub seq: u64,
    pub event_type: EventType,
    pub created_at: i64,
    pub event_hash: EventHash,
    pub details: Option<String>,
}

impl PublicEntry {
    fn redact(event: &Event) -> Self {
        let details = match event.payload() {
            EventPayload::Registration { .. } => Some("Product registered by manufacturer".to_string()),
            EventPayload::OwnershipTransfer { .. } => Some("Ownership transferred".to_string()),
            EventPayload::Repair { repair_details, .. } => Some(repair_details.clone()),
            EventPayload::Inspection { inspection_details } => Some(inspection_details.clone()),
            EventPayload::Maintenance { maintenance_details } => Some(maintenance_details.clone()),
            EventPayload::SoftwareUpdate { details } | EventPayload::Custom { details } => {
                Some(details.clone())
            }
        };
        Self {
            seq: event.seq(),
            event_type: event.event_type(),
            created_at: event.created_at(),
            event_hash: *event.event_hash(),
            details,
        }
    }
}

/// Unauthenticated view of a product's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicHistory {
    pub product: PublicProduct,
    pub history: Vec<PublicEntry>,
    pub verification_status: ChainStatus,
}

/// Where a rendered contract can be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractLinks {
    /// `ipfs://<content id>`.
    pub native: String,
    /// HTTPS gateway URL for the same content.
    pub gateway: String,
}

/// Product provenance, transfers and contracts over one store, blob service
/// and renderer.
pub struct Provenance<S, B, R> {
    ledger: EventLedger<S>,
    issuer: ContractIssuer<S, B, R>,
    transfers: TransferWorkflow<S, B, R>,
    blobs: Arc<B>,
}

impl<S, B, R> Clone for Provenance<S, B, R> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            issuer: self.issuer.clone(),
            transfers: self.transfers.clone(),
            blobs: Arc::clone(&self.blobs),
        }
    }
}

impl<S, B, R> Provenance<S, B, R>
where
    S: Store,
    B: BlobStore,
    R: DocumentRenderer,
{
    pub fn new(store: Arc<S>, blobs: Arc<B>, renderer: Arc<R>, config: ProvenanceConfig) -> Self {
        let ledger = EventLedger::new(Arc::clone(&store), config.ledger);
        let issuer = ContractIssuer::new(store, Arc::clone(&blobs), renderer, config.issuer);
        let transfers = TransferWorkflow::new(ledger.clone(), issuer.clone());
        Self {
            ledger,
            issuer,
            transfers,
            blobs,
        }
    }

    pub fn ledger(&self) -> &EventLedger<S> {
        &self.ledger
    }

    pub fn issuer(&self) -> &ContractIssuer<S, B, R> {
        &self.issuer
    }

    pub fn transfers(&self) -> &TransferWorkflow<S, B, R> {
        &self.transfers
    }

    fn store(&self) -> &Arc<S> {
        self.ledger.store()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accounts
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an account. Manufacturers and repair providers start pending
    /// until an administrator verifies them.
    pub async fn create_user(&self, username: &str, role: Role) -> Result<User> {
        let verification_status = if role.requires_verification() {
            VerificationStatus::Pending
        } else {
            VerificationStatus::Verified
        };
        let user = self
            .store()
            .insert_user(&NewUser {
                username: username.to_string(),
                role,
                verification_status,
            })
            .await?;
        info!(user = %user.id, role = %user.role, "account created");
        Ok(user)
    }

    pub async fn user(&self, id: UserId) -> Result<User> {
        self.store()
            .get_user(id)
            .await?
            .ok_or(ProvenanceError::UserNotFound(id))
    }

    pub async fn user_by_username(&self, username: &str) -> Result<User> {
        self.store()
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| ProvenanceError::UnknownUser(username.to_string()))
    }

    /// The actor a stored account acts as.
    pub async fn actor(&self, id: UserId) -> Result<Actor> {
        Ok(Actor::from(&self.user(id).await?))
    }

    /// Record an administrator's vetting decision.
    pub async fn set_verification_status(
        &self,
        actor: &Actor,
        user: UserId,
        status: VerificationStatus,
    ) -> Result<User> {
        authorize(actor, Action::VerifyAccount, &Subject::none())?;
        let target = self.user(user).await?;
        if !target.role.requires_verification() {
            return Err(ProvenanceError::VerificationNotRequired(user, target.role));
        }
        let updated = self
            .store()
            .set_verification_status(user, status)
            .await?
            .ok_or(ProvenanceError::UserNotFound(user))?;
        info!(user = %user, status = status.as_str(), actor = %actor.id, "account vetted");
        Ok(updated)
    }

    /// Manufacturers and repair providers still waiting to be vetted.
    pub async fn pending_verifications(&self, actor: &Actor) -> Result<Vec<User>> {
        authorize(actor, Action::VerifyAccount, &Subject::none())?;
        Ok(self
            .store()
            .users_with_status(VerificationStatus::Pending)
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Products and events
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a product and issue the manufacturer's initial contract.
    pub async fn register_product(
        &self,
        actor: &Actor,
        serial_number: &str,
        manufacturer: &str,
        model: &str,
    ) -> Result<Registration> {
        authorize(actor, Action::RegisterProduct, &Subject::none())?;

        let (product, event) = self
            .ledger
            .register(
                NewProduct {
                    serial_number: serial_number.to_string(),
                    manufacturer: manufacturer.to_string(),
                    model: model.to_string(),
                    created_at: now_millis(),
                },
                actor.id,
            )
            .await?;

        let contract = self
            .issuer
            .issue_outcome(product.id, actor.id, None, event.created_at())
            .await;

        Ok(Registration {
            product,
            event,
            contract,
        })
    }

    pub async fn product(&self, product_id: ProductId) -> Result<Product> {
        self.store()
            .get_product(product_id)
            .await?
            .ok_or(ProvenanceError::ProductNotFound(product_id))
    }

    /// Record a repair or service event.
    ///
    /// Registration and ownership transfer events are rejected: they only
    /// enter a ledger through registration and a confirmed transfer.
    pub async fn record_event(
        &self,
        actor: &Actor,
        product_id: ProductId,
        payload: EventPayload,
    ) -> Result<Event> {
        let event_type = payload.event_type();
        let action = match event_type {
            EventType::Repair => Action::RecordRepair,
            t if t.is_service() => Action::RecordServiceEvent,
            t => return Err(ProvenanceError::ReservedEventType(t)),
        };

        // Re-authorized against each head the append is chained onto.
        let event = self
            .ledger
            .append_checked(product_id, payload, actor.id, |ownership| {
                Ok(authorize(actor, action, &Subject::owned_by(ownership.current))?)
            })
            .await?;
        info!(
            product_id = %product_id,
            actor = %actor.id,
            event_type = %event_type,
            seq = event.seq(),
            "event recorded"
        );
        Ok(event)
    }

    /// [`Self::record_event`] from untyped event data.
    pub async fn record_event_data(
        &self,
        actor: &Actor,
        product_id: ProductId,
        event_type: EventType,
        event_data: serde_json::Value,
    ) -> Result<Event> {
        let payload = EventPayload::from_parts(event_type, event_data)?;
        self.record_event(actor, product_id, payload).await
    }

    /// Full ledger entries, for the current owner, former owners and
    /// administrators.
    pub async fn history(&self, actor: &Actor, product_id: ProductId) -> Result<Vec<Event>> {
        let events = self.ledger.history(product_id).await?;
        let ownership = self.ledger.ownership_of(product_id, &events)?;
        authorize(
            actor,
            Action::ViewLedger,
            &Subject::owned_by(ownership.current).with_former_owners(&ownership.former),
        )?;
        Ok(events)
    }

    /// History anyone may see: owner identities removed, chain verified.
    pub async fn public_history(&self, product_id: ProductId) -> Result<PublicHistory> {
        let product = self.product(product_id).await?;
        let events = self.ledger.history(product_id).await?;

        let verification_status = match crate::ledger::check_chain(product_id, &events) {
            Ok(()) => ChainStatus::Authentic,
            Err(ProvenanceError::ChainBroken { .. }) => ChainStatus::Tampered,
            Err(e) => return Err(e),
        };

        Ok(PublicHistory {
            product: PublicProduct {
                manufacturing_date: format_date(product.created_at),
                serial_number: product.serial_number,
                manufacturer: product.manufacturer,
                model: product.model,
            },
            history: events.iter().map(PublicEntry::redact).collect(),
            verification_status,
        })
    }

    /// Verify a product's hash chain.
    pub async fn verify(&self, product_id: ProductId) -> Result<()> {
        self.ledger.verify(product_id).await
    }

    /// Products the actor currently owns.
    pub async fn owned_products(&self, actor: &Actor) -> Result<Vec<Product>> {
        let mut owned = Vec::new();
        for product in self.store().list_products().await? {
            if self.ledger.current_owner(product.id).await? == actor.id {
                owned.push(product);
            }
        }
        Ok(owned)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transfers
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn initiate_transfer(
        &self,
        actor: &Actor,
        product_id: ProductId,
        new_owner_username: &str,
    ) -> Result<PendingTransfer> {
        self.transfers
            .initiate(product_id, actor, new_owner_username)
            .await
    }

    pub async fn confirm_transfer(
        &self,
        actor: &Actor,
        product_id: ProductId,
    ) -> Result<ConfirmedTransfer> {
        self.transfers.confirm(product_id, actor).await
    }

    /// Proposals waiting for the actor's confirmation.
    pub async fn pending_transfers_for(&self, actor: &Actor) -> Result<Vec<PendingTransfer>> {
        Ok(self.store().pending_transfers_for_user(actor.id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Contracts
    // ─────────────────────────────────────────────────────────────────────────

    /// Contracts of a product, newest first. Administrators see all of
    /// them, everyone else only those they are a party to.
    pub async fn contracts_for_product(
        &self,
        actor: &Actor,
        product_id: ProductId,
    ) -> Result<Vec<OwnerContract>> {
        self.product(product_id).await?;
        let mut contracts = self.store().contracts_for_product(product_id).await?;
        if !actor.is_admin() {
            contracts.retain(|c| c.is_party(actor.id));
        }
        Ok(contracts)
    }

    pub async fn contract(&self, actor: &Actor, contract_id: ContractId) -> Result<OwnerContract> {
        let contract = self
            .store()
            .get_contract(contract_id)
            .await?
            .ok_or(ProvenanceError::ContractNotFound(contract_id))?;

        let previous: Vec<UserId> = contract.previous_owner_id.into_iter().collect();
        authorize(
            actor,
            Action::ViewContract,
            &Subject::owned_by(contract.owner_id).with_former_owners(&previous),
        )?;
        Ok(contract)
    }

    /// The rendered document, fetched from the blob service.
    pub async fn contract_document(&self, actor: &Actor, contract_id: ContractId) -> Result<Bytes> {
        let contract = self.contract(actor, contract_id).await?;
        self.blobs
            .get(&contract.content_id)
            .await
            .map_err(|e| ProvenanceError::BlobStoreFailure(e.to_string()))?
            .ok_or(ProvenanceError::DocumentNotFound(contract.content_id))
    }

    pub async fn contract_links(&self, actor: &Actor, contract_id: ContractId) -> Result<ContractLinks> {
        let contract = self.contract(actor, contract_id).await?;
        Ok(ContractLinks {
            native: format!("ipfs://{}", contract.content_id),
            gateway: format!("{IPFS_GATEWAY}{}", contract.content_id),
        })
    }

    /// Issue the contract for the latest ownership fact again, typically
    /// after a confirm reported an issuance warning.
    pub async fn retry_contract_issuance(
        &self,
        actor: &Actor,
        product_id: ProductId,
    ) -> Result<OwnerContract> {
        let ownership = self.ledger.ownership(product_id).await?;
        authorize(
            actor,
            Action::ReissueContract,
            &Subject::owned_by(ownership.current),
        )?;
        self.issuer
            .issue_at(
                product_id,
                ownership.current,
                ownership.previous,
                ownership.acquired_at,
            )
            .await
    }

    /// Re-render a contract from its stored document.
    pub async fn regenerate_contract(
        &self,
        actor: &Actor,
        contract_id: ContractId,
    ) -> Result<OwnerContract> {
        self.issuer.regenerate(contract_id, actor).await
    }
}

fn format_date(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
