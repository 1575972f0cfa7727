//! TransferWorkflow: two-phase ownership transfer.
//!
//! `initiate` records a proposal in the product's pending slot and writes no
//! event. `confirm` turns the proposal into an `ownership_transfer` event,
//! consuming the slot in the same store commit, and then asks the issuer for
//! a contract. Once the event is committed the transfer has happened; a
//! failed issuance is reported as a warning next to it.

use std::sync::Arc;

use tracing::{debug, info};
use veriown_core::{now_millis, Event, PendingTransfer, ProductId, TransferState, TransitionError, UserId};
use veriown_policy::{authorize, Action, Actor, Subject};
use veriown_store::{BlobStore, PendingInsert, Store};

use crate::error::{ProvenanceError, Result};
use crate::issuer::{ContractIssuer, IssuanceOutcome};
use crate::ledger::EventLedger;
use crate::render::DocumentRenderer;

/// A committed ownership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransfer {
    /// The `ownership_transfer` event.
    pub event: Event,
    pub previous_owner: UserId,
    /// The contract for the new ownership, or why none was issued.
    pub contract: IssuanceOutcome,
}

/// The initiate/confirm state machine over a ledger and an issuer.
pub struct TransferWorkflow<S, B, R> {
    ledger: EventLedger<S>,
    issuer: ContractIssuer<S, B, R>,
}

impl<S, B, R> Clone for TransferWorkflow<S, B, R> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            issuer: self.issuer.clone(),
        }
    }
}

impl<S, B, R> TransferWorkflow<S, B, R>
where
    S: Store,
    B: BlobStore,
    R: DocumentRenderer,
{
    pub fn new(ledger: EventLedger<S>, issuer: ContractIssuer<S, B, R>) -> Self {
        Self { ledger, issuer }
    }

    fn store(&self) -> &Arc<S> {
        self.ledger.store()
    }

    /// The product's transfer state.
    pub async fn state(&self, product_id: ProductId) -> Result<TransferState> {
        Ok(TransferState::from(
            self.store().get_pending_transfer(product_id).await?,
        ))
    }

    /// Propose handing `product_id` to `new_owner_username`.
    ///
    /// Only the current owner may propose, and only while no other proposal
    /// is outstanding. No event is written.
    pub async fn initiate(
        &self,
        product_id: ProductId,
        actor: &Actor,
        new_owner_username: &str,
    ) -> Result<PendingTransfer> {
        let new_owner = self
            .store()
            .find_user_by_username(new_owner_username)
            .await?
            .ok_or_else(|| ProvenanceError::UnknownUser(new_owner_username.to_string()))?;

        let attempts = self.ledger.config().append_retries.max(1);
        for attempt in 1..=attempts {
            let (ownership, head) = self.ledger.ownership_at_head(product_id).await?;
            let owner = ownership.current;
            authorize(actor, Action::InitiateTransfer, &Subject::owned_by(owner))?;
            if new_owner.id == owner {
                return Err(ProvenanceError::SelfTransfer(owner, product_id));
            }

            let pending = self
                .state(product_id)
                .await?
                .initiate(product_id, new_owner.id, now_millis())?;

            // The slot insert serializes racing initiators and only lands
            // while the chain still ends at the head the owner was read from.
            match self.store().insert_pending_transfer(&pending, &head).await? {
                PendingInsert::Inserted => {
                    info!(
                        product_id = %product_id,
                        actor = %actor.id,
                        new_owner = %new_owner.id,
                        "transfer initiated"
                    );
                    return Ok(pending);
                }
                PendingInsert::AlreadyPending(existing) => {
                    return Err(TransitionError::TransferAlreadyPending {
                        product_id,
                        new_owner_id: existing.new_owner_id,
                    }
                    .into())
                }
                PendingInsert::Conflict { existing } => {
                    debug!(product_id = %product_id, attempt, head = %existing, "head moved, re-checking owner");
                }
            }
        }

        Err(ProvenanceError::AppendContention {
            product_id,
            attempts,
        })
    }

    /// Accept the pending proposal as `actor`.
    ///
    /// Succeeds only for the proposed new owner; everyone else, the current
    /// owner included, is told there is no transfer pending for them.
    pub async fn confirm(&self, product_id: ProductId, actor: &Actor) -> Result<ConfirmedTransfer> {
        if self.store().get_product(product_id).await?.is_none() {
            return Err(ProvenanceError::ProductNotFound(product_id));
        }

        let pending = self.state(product_id).await?.confirm(product_id, actor.id)?;
        let (event, previous_owner) = self.ledger.commit_transfer(&pending).await?;

        info!(
            product_id = %product_id,
            previous_owner = %previous_owner,
            new_owner = %actor.id,
            event_hash = %event.event_hash(),
            "transfer confirmed"
        );

        let contract = self
            .issuer
            .issue_outcome(product_id, actor.id, Some(previous_owner), event.created_at())
            .await;

        Ok(ConfirmedTransfer {
            event,
            previous_owner,
            contract,
        })
    }
}
