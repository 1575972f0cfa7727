//! Behavior shared by every `Store` implementation, run against each backend.

use std::path::Path;

use veriown_core::{
    ChainHead, ContentId, ContractHash, Event, EventDraft, EventPayload, NewContract, NewProduct,
    NewUser, PendingTransfer, ProductId, Role, UserId, VerificationStatus,
};

use crate::error::StoreError;
use crate::traits::{InsertResult, PendingInsert, Store, TransferCommit};

pub(crate) fn new_product(serial: &str) -> NewProduct {
    NewProduct {
        serial_number: serial.into(),
        manufacturer: "Acme".into(),
        model: "Roadster".into(),
        created_at: 1_000,
    }
}

pub(crate) async fn register<S: Store>(store: &S, owner: UserId) -> (ProductId, Event) {
    let (product, genesis) = store
        .register_product(
            &new_product("SN-1"),
            Box::new(move |p| {
                EventDraft::new(p.id, EventPayload::registration(), owner, p.created_at)
                    .chain(&ChainHead::Genesis)
            }),
        )
        .await
        .unwrap();
    (product.id, genesis)
}

pub(crate) fn next(head: &Event, payload: EventPayload, by: UserId, at: i64) -> Event {
    EventDraft::new(head.product_id(), payload, by, at)
        .chain(&ChainHead::of(Some(head)))
        .unwrap()
}

fn repair(text: &str) -> EventPayload {
    EventPayload::Repair {
        repair_details: text.into(),
        parts_used: None,
    }
}

pub(crate) async fn exercise_users<S: Store>(store: &S) {
    let acme = store
        .insert_user(&NewUser {
            username: "acme".into(),
            role: Role::Manufacturer,
            verification_status: VerificationStatus::Pending,
        })
        .await
        .unwrap();
    let alice = store
        .insert_user(&NewUser::verified("alice", Role::Regular))
        .await
        .unwrap();
    assert_ne!(acme.id, alice.id);

    let err = store
        .insert_user(&NewUser::verified("alice", Role::Administrator))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateUsername(name) if name == "alice"));

    assert_eq!(store.get_user(alice.id).await.unwrap(), Some(alice.clone()));
    assert_eq!(
        store.find_user_by_username("acme").await.unwrap(),
        Some(acme.clone())
    );
    assert!(store.find_user_by_username("bob").await.unwrap().is_none());

    assert_eq!(
        store
            .users_with_status(VerificationStatus::Pending)
            .await
            .unwrap(),
        vec![acme.clone()]
    );

    let vetted = store
        .set_verification_status(acme.id, VerificationStatus::Verified)
        .await
        .unwrap()
        .unwrap();
    assert!(vetted.is_vetted());
    assert!(store
        .set_verification_status(UserId(999), VerificationStatus::Verified)
        .await
        .unwrap()
        .is_none());
    assert!(store
        .users_with_status(VerificationStatus::Pending)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        store
            .users_with_status(VerificationStatus::Verified)
            .await
            .unwrap()
            .len(),
        2
    );
}

pub(crate) async fn exercise_register_and_append<S: Store>(store: &S) {
    let (product_id, genesis) = register(store, UserId(1)).await;
    assert_eq!(genesis.seq(), 0);
    assert!(genesis.previous_event_hash().is_genesis());

    let product = store.get_product(product_id).await.unwrap().unwrap();
    assert_eq!(product.serial_number, "SN-1");
    assert_eq!(store.list_products().await.unwrap(), vec![product]);

    let e1 = next(&genesis, repair("screen"), UserId(2), 2_000);
    assert_eq!(store.append_event(&e1).await.unwrap(), InsertResult::Inserted);
    let e2 = next(&e1, repair("battery"), UserId(2), 1_500);
    assert_eq!(store.append_event(&e2).await.unwrap(), InsertResult::Inserted);

    let events = store.events_for_product(product_id).await.unwrap();
    assert_eq!(events, vec![genesis, e1, e2.clone()]);
    assert_eq!(store.head_event(product_id).await.unwrap(), Some(e2));
    veriown_core::verify_chain(&events).unwrap();

    assert!(store
        .events_for_product(ProductId(999))
        .await
        .unwrap()
        .is_empty());
}

pub(crate) async fn exercise_append_conflict<S: Store>(store: &S) {
    let (_, genesis) = register(store, UserId(1)).await;

    let a = next(&genesis, repair("a"), UserId(2), 2_000);
    let b = next(&genesis, repair("b"), UserId(2), 2_000);

    assert_eq!(store.append_event(&a).await.unwrap(), InsertResult::Inserted);
    assert_eq!(
        store.append_event(&a).await.unwrap(),
        InsertResult::AlreadyExists
    );
    assert_eq!(
        store.append_event(&b).await.unwrap(),
        InsertResult::Conflict {
            existing: *a.event_hash()
        }
    );

    let orphan = EventDraft::new(ProductId(999), repair("x"), UserId(2), 0)
        .chain(&ChainHead::Genesis)
        .unwrap();
    assert!(matches!(
        store.append_event(&orphan).await,
        Err(StoreError::NotFound(_))
    ));
}

pub(crate) async fn exercise_pending_slot<S: Store>(store: &S) {
    let (product_id, genesis) = register(store, UserId(1)).await;
    let first = PendingTransfer {
        product_id,
        new_owner_id: UserId(2),
        initiated_at: 10,
    };
    let second = PendingTransfer {
        new_owner_id: UserId(3),
        ..first
    };

    // Checked against a head that has since moved: nothing is written.
    let repair_event = next(&genesis, repair("hinge"), UserId(1), 5);
    store.append_event(&repair_event).await.unwrap();
    assert_eq!(
        store
            .insert_pending_transfer(&first, genesis.event_hash())
            .await
            .unwrap(),
        PendingInsert::Conflict {
            existing: *repair_event.event_hash()
        }
    );
    assert!(store.get_pending_transfer(product_id).await.unwrap().is_none());

    let head = *repair_event.event_hash();
    assert_eq!(
        store.insert_pending_transfer(&first, &head).await.unwrap(),
        PendingInsert::Inserted
    );
    assert_eq!(
        store.insert_pending_transfer(&second, &head).await.unwrap(),
        PendingInsert::AlreadyPending(first)
    );
    assert_eq!(
        store.get_pending_transfer(product_id).await.unwrap(),
        Some(first)
    );
    assert_eq!(
        store.pending_transfers_for_user(UserId(2)).await.unwrap(),
        vec![first]
    );
    assert!(store
        .pending_transfers_for_user(UserId(3))
        .await
        .unwrap()
        .is_empty());
}

pub(crate) async fn exercise_commit_transfer<S: Store>(store: &S) {
    let (product_id, genesis) = register(store, UserId(1)).await;
    let pending = PendingTransfer {
        product_id,
        new_owner_id: UserId(2),
        initiated_at: 10,
    };
    let transfer = next(
        &genesis,
        EventPayload::ownership_transfer(UserId(2)),
        UserId(2),
        20,
    );

    // No proposal yet.
    assert_eq!(
        store.commit_transfer(&pending, &transfer).await.unwrap(),
        TransferCommit::PendingMissing
    );

    store
        .insert_pending_transfer(&pending, genesis.event_hash())
        .await
        .unwrap();

    // Head moved since the transfer event was linked.
    let repair_event = next(&genesis, repair("hinge"), UserId(3), 15);
    store.append_event(&repair_event).await.unwrap();
    assert_eq!(
        store.commit_transfer(&pending, &transfer).await.unwrap(),
        TransferCommit::Conflict {
            existing: *repair_event.event_hash()
        }
    );
    assert!(store.get_pending_transfer(product_id).await.unwrap().is_some());

    let relinked = next(
        &repair_event,
        EventPayload::ownership_transfer(UserId(2)),
        UserId(2),
        20,
    );
    assert_eq!(
        store.commit_transfer(&pending, &relinked).await.unwrap(),
        TransferCommit::Committed
    );
    assert!(store.get_pending_transfer(product_id).await.unwrap().is_none());
    assert_eq!(store.head_event(product_id).await.unwrap(), Some(relinked.clone()));

    // A second confirm of the consumed proposal writes nothing.
    let again = next(
        &relinked,
        EventPayload::ownership_transfer(UserId(2)),
        UserId(2),
        30,
    );
    assert_eq!(
        store.commit_transfer(&pending, &again).await.unwrap(),
        TransferCommit::PendingMissing
    );
    assert_eq!(store.events_for_product(product_id).await.unwrap().len(), 3);
}

fn new_contract(product_id: ProductId, number: &str, created_at: i64) -> NewContract {
    let document_data = format!(r#"{{"contract_number":"{number}"}}"#);
    NewContract {
        product_id,
        owner_id: UserId(1),
        previous_owner_id: None,
        transfer_date: created_at,
        contract_number: number.into(),
        contract_hash: ContractHash::hash(document_data.as_bytes()),
        document_data,
        content_id: ContentId::new("b3-first"),
        cache_path: None,
        created_at,
    }
}

pub(crate) async fn exercise_contracts<S: Store>(store: &S) {
    let (product_id, _) = register(store, UserId(1)).await;

    let first = store
        .insert_contract(&new_contract(product_id, "VO-1", 100))
        .await
        .unwrap();
    let second = store
        .insert_contract(&new_contract(product_id, "VO-2", 200))
        .await
        .unwrap();
    assert_eq!(first.updated_at, 100);

    let err = store
        .insert_contract(&new_contract(product_id, "VO-1", 300))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateContractNumber(_)));

    let listed = store.contracts_for_product(product_id).await.unwrap();
    assert_eq!(listed, vec![second.clone(), first.clone()]);

    let updated = store
        .update_contract_storage(
            first.id,
            &ContentId::new("b3-second"),
            Some(Path::new("/tmp/VO-1.txt")),
            500,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.content_id, ContentId::new("b3-second"));
    assert_eq!(updated.cache_path.as_deref(), Some(Path::new("/tmp/VO-1.txt")));
    assert_eq!(updated.updated_at, 500);
    assert_eq!(updated.document_data, first.document_data);
    assert_eq!(updated.contract_hash, first.contract_hash);
    assert_eq!(store.get_contract(first.id).await.unwrap(), Some(updated));
}

pub(crate) async fn exercise_failed_genesis<S: Store>(store: &S) {
    let err = store
        .register_product(
            &new_product("SN-X"),
            Box::new(|_| {
                Err(veriown_core::CoreError::EncodingError(
                    "genesis rejected".into(),
                ))
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Core(_)));
    assert!(store.list_products().await.unwrap().is_empty());
}
