//! The full service over a SQLite file, with rows tampered through a second
//! connection.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection};
use veriown::core::{VerificationError, VerificationStatus};
use veriown::store::{SqliteStore, Store};
use veriown::{
    Actor, ChainStatus, ErrorKind, LedgerConfig, Provenance, ProvenanceConfig, ProvenanceError,
    Role, TextRenderer,
};
use veriown_testkit::init_tracing;

type Service = Provenance<SqliteStore, SqliteStore, TextRenderer>;

fn open(path: &Path, config: ProvenanceConfig) -> Service {
    let store = Arc::new(SqliteStore::open(path).unwrap());
    Provenance::new(Arc::clone(&store), store, Arc::new(TextRenderer::new()), config)
}

struct Cast {
    acme: Actor,
    alice: Actor,
    admin: Actor,
}

async fn cast(svc: &Service) -> Cast {
    let admin = Actor::from(&svc.create_user("root", Role::Administrator).await.unwrap());
    let acme = svc.create_user("acme", Role::Manufacturer).await.unwrap();
    svc.set_verification_status(&admin, acme.id, VerificationStatus::Verified)
        .await
        .unwrap();
    Cast {
        acme: svc.actor(acme.id).await.unwrap(),
        alice: Actor::from(&svc.create_user("alice", Role::Regular).await.unwrap()),
        admin,
    }
}

#[tokio::test]
async fn tampered_event_is_detected() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("veriown.db");
    let svc = open(&db, ProvenanceConfig::default());
    let cast = cast(&svc).await;

    let p = svc
        .register_product(&cast.acme, "SN-200", "Acme", "Roadster")
        .await
        .unwrap()
        .product
        .id;
    svc.record_event_data(
        &cast.admin,
        p,
        veriown::EventType::Repair,
        serde_json::json!({"repair_details": "new hinge"}),
    )
    .await
    .unwrap();
    svc.initiate_transfer(&cast.acme, p, "alice").await.unwrap();
    svc.confirm_transfer(&cast.alice, p).await.unwrap();
    svc.verify(p).await.unwrap();
    assert_eq!(
        svc.public_history(p).await.unwrap().verification_status,
        ChainStatus::Authentic
    );

    let raw = Connection::open(&db).unwrap();
    let changed = raw
        .execute(
            "UPDATE events SET event_data = ?1 WHERE product_id = ?2 AND seq = 1",
            params![r#"{"repair_details":"nothing happened"}"#, p.get() as i64],
        )
        .unwrap();
    assert_eq!(changed, 1);

    let err = svc.verify(p).await.unwrap_err();
    assert!(matches!(
        err,
        ProvenanceError::ChainBroken {
            source: VerificationError::ChainBroken { at_index: 1 },
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Integrity);

    let public = svc.public_history(p).await.unwrap();
    assert_eq!(public.verification_status, ChainStatus::Tampered);
    assert_eq!(public.history[1].details.as_deref(), Some("nothing happened"));
}

#[tokio::test]
async fn retyped_or_reattributed_rows_break_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("veriown.db");
    let svc = open(&db, ProvenanceConfig::default());
    let cast = cast(&svc).await;
    let p = svc
        .register_product(&cast.acme, "SN-204", "Acme", "Roadster")
        .await
        .unwrap()
        .product
        .id;
    svc.record_event_data(
        &cast.admin,
        p,
        veriown::EventType::Repair,
        serde_json::json!({"repair_details": "new hinge"}),
    )
    .await
    .unwrap();
    svc.initiate_transfer(&cast.acme, p, "alice").await.unwrap();
    svc.confirm_transfer(&cast.alice, p).await.unwrap();

    // A repair relabelled as an inspection no longer fits its event type.
    let raw = Connection::open(&db).unwrap();
    let retype = |event_type: &str| {
        raw.execute(
            "UPDATE events SET event_type = ?1 WHERE product_id = ?2 AND seq = 1",
            params![event_type, p.get() as i64],
        )
        .unwrap()
    };
    assert_eq!(retype("inspection"), 1);

    let err = svc.verify(p).await.unwrap_err();
    assert!(matches!(
        err,
        ProvenanceError::ChainBroken {
            source: VerificationError::ChainBroken { at_index: 1 },
            ..
        }
    ));
    let public = svc.public_history(p).await.unwrap();
    assert_eq!(public.verification_status, ChainStatus::Tampered);
    assert_eq!(public.history.len(), 3);

    retype("repair");
    svc.verify(p).await.unwrap();

    // Credit the transfer to someone else.
    raw.execute(
        "UPDATE events SET created_by = ?1 WHERE product_id = ?2 AND seq = 2",
        params![cast.acme.id.get() as i64, p.get() as i64],
    )
    .unwrap();
    let err = svc.verify(p).await.unwrap_err();
    assert!(matches!(
        err,
        ProvenanceError::ChainBroken {
            source: VerificationError::ChainBroken { at_index: 2 },
            ..
        }
    ));
    assert_eq!(
        svc.public_history(p).await.unwrap().verification_status,
        ChainStatus::Tampered
    );
}

#[tokio::test]
async fn verify_on_read_refuses_tampered_ownership() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("veriown.db");
    let config = ProvenanceConfig {
        ledger: LedgerConfig {
            verify_on_read: true,
            ..LedgerConfig::default()
        },
        ..ProvenanceConfig::default()
    };
    let svc = open(&db, config);
    let cast = cast(&svc).await;
    let p = svc
        .register_product(&cast.acme, "SN-201", "Acme", "Roadster")
        .await
        .unwrap()
        .product
        .id;

    // Rewrite who registered the product, as if to steal it.
    let raw = Connection::open(&db).unwrap();
    raw.execute(
        "UPDATE events SET created_by = ?1 WHERE product_id = ?2 AND seq = 0",
        params![cast.alice.id.get() as i64, p.get() as i64],
    )
    .unwrap();

    let err = svc
        .initiate_transfer(&cast.alice, p, "acme")
        .await
        .unwrap_err();
    assert!(err.is_integrity());
    let pending = svc.ledger().store().get_pending_transfer(p).await.unwrap();
    assert!(pending.is_none());
}

#[tokio::test]
async fn tampered_contract_cannot_be_regenerated() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("veriown.db");
    let svc = open(&db, ProvenanceConfig::default());
    let cast = cast(&svc).await;
    let registered = svc
        .register_product(&cast.acme, "SN-202", "Acme", "Roadster")
        .await
        .unwrap();
    let contract = registered.contract.contract().unwrap().clone();

    let raw = Connection::open(&db).unwrap();
    let edited = contract.document_data.replace("Roadster", "Hypercar");
    raw.execute(
        "UPDATE owner_contracts SET document_data = ?1 WHERE id = ?2",
        params![edited, contract.id.get() as i64],
    )
    .unwrap();
    let err = svc
        .regenerate_contract(&cast.acme, contract.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::ContractHashMismatch(id) if id == contract.id));

    raw.execute(
        "UPDATE owner_contracts SET document_data = '{\"product_id\":' WHERE id = ?1",
        params![contract.id.get() as i64],
    )
    .unwrap();
    let err = svc
        .regenerate_contract(&cast.admin, contract.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ProvenanceError::MalformedStoredDocument { .. }));
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[tokio::test]
async fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("veriown.db");

    let (p, contract_id, alice) = {
        let svc = open(&db, ProvenanceConfig::default());
        let cast = cast(&svc).await;
        let p = svc
            .register_product(&cast.acme, "SN-203", "Acme", "Roadster")
            .await
            .unwrap()
            .product
            .id;
        svc.initiate_transfer(&cast.acme, p, "alice").await.unwrap();
        let confirmed = svc.confirm_transfer(&cast.alice, p).await.unwrap();
        (p, confirmed.contract.contract().unwrap().id, cast.alice)
    };

    let svc = open(&db, ProvenanceConfig::default());
    svc.verify(p).await.unwrap();
    assert_eq!(svc.ledger().current_owner(p).await.unwrap(), alice.id);
    assert_eq!(svc.owned_products(&alice).await.unwrap().len(), 1);

    let document = svc.contract_document(&alice, contract_id).await.unwrap();
    let contract = svc.contract(&alice, contract_id).await.unwrap();
    assert!(String::from_utf8_lossy(&document).contains(&contract.contract_hash.to_hex()));
}
