//! EventLedger: the authoritative history of each product.
//!
//! The ledger is the only component that links events into a chain. Every
//! write goes through the store's compare-and-append: the event is chained
//! onto the head the ledger read, and if another writer moved the head in
//! the meantime the store refuses it and the ledger re-links onto the new
//! head, up to `append_retries` times.

use std::sync::Arc;

use tracing::{debug, error, info};
use veriown_core::{
    now_millis, verify_chain, ChainHead, Event, EventDraft, EventHash, EventPayload, EventType,
    NewProduct, PendingTransfer, Product, ProductId, TransitionError, UserId,
};
use veriown_store::{InsertResult, Store, TransferCommit};

use crate::config::LedgerConfig;
use crate::error::{ProvenanceError, Result};

/// Who owns a product, derived from its ledger alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub current: UserId,
    /// The owner the current one took over from; `None` until the first transfer.
    pub previous: Option<UserId>,
    /// `created_at` of the event that made `current` the owner.
    pub acquired_at: i64,
    /// Earlier owners, oldest first, without repeats.
    pub former: Vec<UserId>,
}

impl Ownership {
    /// Apply the ownership rule to an ordered history: the registering actor
    /// owns the product until the first transfer, and each transfer hands it
    /// to its `new_owner_id`.
    pub fn derive(product_id: ProductId, events: &[Event]) -> Result<Self> {
        let registration = events
            .iter()
            .find(|e| e.event_type() == EventType::Registration)
            .ok_or(ProvenanceError::NoRegistrationEvent(product_id))?;

        let mut ownership = Ownership {
            current: registration.created_by(),
            previous: None,
            acquired_at: registration.created_at(),
            former: Vec::new(),
        };
        for event in events {
            let Some(new_owner) = event.payload().new_owner() else {
                continue;
            };
            let previous = std::mem::replace(&mut ownership.current, new_owner);
            ownership.previous = Some(previous);
            ownership.acquired_at = event.created_at();
            if !ownership.former.contains(&previous) {
                ownership.former.push(previous);
            }
        }
        ownership.former.retain(|u| *u != ownership.current);
        Ok(ownership)
    }

    /// Whether `user` owns or has owned the product.
    pub fn involves(&self, user: UserId) -> bool {
        self.current == user || self.former.contains(&user)
    }
}

/// Append-only, hash-chained event log over a [`Store`].
pub struct EventLedger<S> {
    store: Arc<S>,
    config: LedgerConfig,
}

impl<S> Clone for EventLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> EventLedger<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Create a product together with its `registration` event.
    pub async fn register(&self, product: NewProduct, actor: UserId) -> Result<(Product, Event)> {
        let (product, genesis) = self
            .store
            .register_product(
                &product,
                Box::new(move |p: &Product| {
                    EventDraft::new(p.id, EventPayload::registration(), actor, p.created_at)
                        .chain(&ChainHead::Genesis)
                }),
            )
            .await?;

        info!(product_id = %product.id, actor = %actor, event_hash = %genesis.event_hash(), "product registered");
        Ok((product, genesis))
    }

    /// Append an event from untyped data.
    ///
    /// `event_data` is parsed into the payload schema of `event_type` and
    /// validated before anything is written.
    pub async fn append(
        &self,
        product_id: ProductId,
        event_type: EventType,
        event_data: serde_json::Value,
        actor: UserId,
    ) -> Result<Event> {
        let payload = EventPayload::from_parts(event_type, event_data)?;
        self.append_payload(product_id, payload, actor).await
    }

    /// Append a typed event.
    pub async fn append_payload(
        &self,
        product_id: ProductId,
        payload: EventPayload,
        actor: UserId,
    ) -> Result<Event> {
        self.append_checked(product_id, payload, actor, |_| Ok(()))
            .await
    }

    /// Append a typed event if `check` accepts the ownership derived from
    /// the chain the event is linked onto.
    ///
    /// The append only lands on the head `check` saw. When the head moves,
    /// the history is reloaded and `check` runs again, so a check such as
    /// "the actor owns the product" holds at the moment of the write.
    pub async fn append_checked<F>(
        &self,
        product_id: ProductId,
        payload: EventPayload,
        actor: UserId,
        check: F,
    ) -> Result<Event>
    where
        F: Fn(&Ownership) -> Result<()> + Send + Sync,
    {
        payload.validate()?;
        if payload.event_type() == EventType::Registration {
            return Err(ProvenanceError::ReservedEventType(EventType::Registration));
        }
        if let Some(new_owner) = payload.new_owner() {
            if self.store.get_user(new_owner).await?.is_none() {
                return Err(ProvenanceError::UserNotFound(new_owner));
            }
        }

        let attempts = self.config.append_retries.max(1);
        for attempt in 1..=attempts {
            let events = self.history(product_id).await?;
            check(&self.ownership_of(product_id, &events)?)?;
            let event = EventDraft::new(product_id, payload.clone(), actor, now_millis())
                .chain(&ChainHead::of(events.last()))?;

            match self.store.append_event(&event).await? {
                InsertResult::Inserted | InsertResult::AlreadyExists => {
                    debug!(product_id = %product_id, seq = event.seq(), event_type = %event.event_type(), "event appended");
                    return Ok(event);
                }
                InsertResult::Conflict { existing } => {
                    debug!(product_id = %product_id, attempt, head = %existing, "head moved, re-linking");
                }
            }
        }

        Err(ProvenanceError::AppendContention {
            product_id,
            attempts,
        })
    }

    /// Record a confirmed proposal: append its `ownership_transfer` event and
    /// consume the proposal in one store commit.
    ///
    /// The event is created by the new owner. Returns it together with the
    /// owner it replaced. Fails with `NoPendingTransferForUser` if the
    /// proposal was consumed by a concurrent confirm.
    pub async fn commit_transfer(&self, pending: &PendingTransfer) -> Result<(Event, UserId)> {
        let product_id = pending.product_id;
        let new_owner = pending.new_owner_id;

        let attempts = self.config.append_retries.max(1);
        for attempt in 1..=attempts {
            let events = self.store.events_for_product(product_id).await?;
            let previous_owner = self.ownership_of(product_id, &events)?.current;
            let event = EventDraft::new(
                product_id,
                EventPayload::ownership_transfer(new_owner),
                new_owner,
                now_millis(),
            )
            .chain(&ChainHead::of(events.last()))?;

            match self.store.commit_transfer(pending, &event).await? {
                TransferCommit::Committed => {
                    debug!(product_id = %product_id, seq = event.seq(), "transfer event appended");
                    return Ok((event, previous_owner));
                }
                TransferCommit::Conflict { existing } => {
                    debug!(product_id = %product_id, attempt, head = %existing, "head moved, re-linking transfer");
                }
                TransferCommit::PendingMissing => {
                    return Err(TransitionError::NoPendingTransferForUser {
                        product_id,
                        actor: new_owner,
                    }
                    .into());
                }
            }
        }

        Err(ProvenanceError::AppendContention {
            product_id,
            attempts,
        })
    }

    /// The product's events, oldest first.
    pub async fn history(&self, product_id: ProductId) -> Result<Vec<Event>> {
        if self.store.get_product(product_id).await?.is_none() {
            return Err(ProvenanceError::ProductNotFound(product_id));
        }
        Ok(self.store.events_for_product(product_id).await?)
    }

    /// Recompute every digest of the product's chain.
    pub async fn verify(&self, product_id: ProductId) -> Result<()> {
        let events = self.history(product_id).await?;
        check_chain(product_id, &events)
    }

    /// The current owner, derived from the ledger.
    pub async fn current_owner(&self, product_id: ProductId) -> Result<UserId> {
        Ok(self.ownership(product_id).await?.current)
    }

    /// Ownership together with the digest of the event it was derived up to.
    ///
    /// Writes that depend on ownership pass the digest to the store so they
    /// only land while the chain is unchanged.
    pub async fn ownership_at_head(&self, product_id: ProductId) -> Result<(Ownership, EventHash)> {
        let events = self.history(product_id).await?;
        let ownership = self.ownership_of(product_id, &events)?;
        let head = events
            .last()
            .map(|e| *e.event_hash())
            .unwrap_or(EventHash::GENESIS);
        Ok((ownership, head))
    }

    /// Current and former owners, derived from the ledger.
    pub async fn ownership(&self, product_id: ProductId) -> Result<Ownership> {
        let events = self.history(product_id).await?;
        self.ownership_of(product_id, &events)
    }

    /// Ownership derived from an already loaded history.
    pub(crate) fn ownership_of(&self, product_id: ProductId, events: &[Event]) -> Result<Ownership> {
        if self.config.verify_on_read {
            check_chain(product_id, events)?;
        }
        Ownership::derive(product_id, events).map_err(|e| {
            error!(product_id = %product_id, error = %e, "ownership cannot be derived");
            e
        })
    }
}

/// Verify a loaded chain, logging any break.
pub(crate) fn check_chain(product_id: ProductId, events: &[Event]) -> Result<()> {
    verify_chain(events).map_err(|source| {
        error!(product_id = %product_id, error = %source, "hash chain verification failed");
        ProvenanceError::ChainBroken { product_id, source }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use veriown_core::{NewUser, Role};
    use veriown_policy::{Action, PolicyError};
    use veriown_store::MemoryStore;

    async fn ledger() -> (EventLedger<MemoryStore>, UserId, UserId) {
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
        (EventLedger::new(store, LedgerConfig::default()), maker, alice)
    }

    fn new_product() -> NewProduct {
        NewProduct {
            serial_number: "SN-001".into(),
            manufacturer: "Acme".into(),
            model: "Roadster".into(),
            created_at: now_millis(),
        }
    }

    #[tokio::test]
    async fn test_register_then_owner_is_registrant() {
        let (ledger, maker, _) = ledger().await;
        let (product, genesis) = ledger.register(new_product(), maker).await.unwrap();

        assert_eq!(genesis.event_type(), EventType::Registration);
        assert_eq!(ledger.current_owner(product.id).await.unwrap(), maker);
        let ownership = ledger.ownership(product.id).await.unwrap();
        assert_eq!(ownership.previous, None);
        assert_eq!(ownership.acquired_at, genesis.created_at());
        ledger.verify(product.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_append_chains_onto_head() {
        let (ledger, maker, _) = ledger().await;
        let (product, genesis) = ledger.register(new_product(), maker).await.unwrap();

        let event = ledger
            .append(
                product.id,
                EventType::Repair,
                json!({"repair_details": "new screen", "parts_used": "OLED panel"}),
                maker,
            )
            .await
            .unwrap();

        assert_eq!(event.seq(), 1);
        assert_eq!(event.previous_event_hash(), genesis.event_hash());
        assert_eq!(ledger.history(product.id).await.unwrap().len(), 2);
        ledger.verify(product.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_append_rejects_bad_data_without_writing() {
        let (ledger, maker, _) = ledger().await;
        let (product, _) = ledger.register(new_product(), maker).await.unwrap();

        let err = ledger
            .append(product.id, EventType::OwnershipTransfer, json!({}), maker)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Invalid);

        let err = ledger
            .append(
                product.id,
                EventType::OwnershipTransfer,
                json!({"new_owner_id": 999}),
                maker,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProvenanceError::UserNotFound(UserId(999))));

        assert_eq!(ledger.history(product.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_to_missing_product() {
        let (ledger, maker, _) = ledger().await;
        let err = ledger
            .append(
                ProductId(42),
                EventType::Custom,
                json!({"details": "hello"}),
                maker,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProvenanceError::ProductNotFound(ProductId(42))));
    }

    #[tokio::test]
    async fn test_append_checked_sees_ownership_and_head() {
        let (ledger, maker, alice) = ledger().await;
        let (product, genesis) = ledger.register(new_product(), maker).await.unwrap();

        let (ownership, head) = ledger.ownership_at_head(product.id).await.unwrap();
        assert_eq!(ownership.current, maker);
        assert_eq!(head, *genesis.event_hash());

        let note = EventPayload::Custom {
            details: "boxed".into(),
        };
        let err = ledger
            .append_checked(product.id, note.clone(), alice, |o| {
                if o.current == alice {
                    Ok(())
                } else {
                    Err(PolicyError::Forbidden {
                        action: Action::RecordServiceEvent,
                        actor: alice,
                    }
                    .into())
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProvenanceError::Forbidden(_)));
        assert_eq!(ledger.history(product.id).await.unwrap().len(), 1);

        let event = ledger
            .append_checked(product.id, note, maker, |o| {
                assert_eq!(o.current, maker);
                Ok(())
            })
            .await
            .unwrap();
        let (_, head) = ledger.ownership_at_head(product.id).await.unwrap();
        assert_eq!(head, *event.event_hash());
    }

    #[tokio::test]
    async fn test_transfer_event_moves_ownership() {
        let (ledger, maker, alice) = ledger().await;
        let (product, _) = ledger.register(new_product(), maker).await.unwrap();

        ledger
            .append_payload(product.id, EventPayload::ownership_transfer(alice), alice)
            .await
            .unwrap();

        let ownership = ledger.ownership(product.id).await.unwrap();
        assert_eq!(ownership.current, alice);
        assert_eq!(ownership.former, vec![maker]);
        assert!(ownership.involves(maker));
    }

    #[tokio::test]
    async fn test_concurrent_appends_all_land_in_one_chain() {
        let (ledger, maker, _) = ledger().await;
        let (product, _) = ledger.register(new_product(), maker).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger
                    .append_payload(
                        product.id,
                        EventPayload::Custom {
                            details: format!("note {i}"),
                        },
                        maker,
                    )
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let history = ledger.history(product.id).await.unwrap();
        assert_eq!(history.len(), 17);
        ledger.verify(product.id).await.unwrap();
    }

    #[test]
    fn test_derive_without_registration_is_fatal() {
        let err = Ownership::derive(ProductId(1), &[]).unwrap_err();
        assert!(matches!(err, ProvenanceError::NoRegistrationEvent(ProductId(1))));
        assert!(err.is_integrity());
    }

    #[test]
    fn test_derive_round_trip_owner_is_not_former() {
        let genesis = EventDraft::new(ProductId(1), EventPayload::registration(), UserId(1), 0)
            .chain(&ChainHead::Genesis)
            .unwrap();
        let to_two = EventDraft::new(ProductId(1), EventPayload::ownership_transfer(UserId(2)), UserId(2), 1)
            .chain(&ChainHead::of(Some(&genesis)))
            .unwrap();
        let back = EventDraft::new(ProductId(1), EventPayload::ownership_transfer(UserId(1)), UserId(1), 2)
            .chain(&ChainHead::of(Some(&to_two)))
            .unwrap();

        let ownership = Ownership::derive(ProductId(1), &[genesis, to_two, back]).unwrap();
        assert_eq!(ownership.current, UserId(1));
        assert_eq!(ownership.previous, Some(UserId(2)));
        assert_eq!(ownership.acquired_at, 2);
        assert_eq!(ownership.former, vec![UserId(2)]);
    }
}
