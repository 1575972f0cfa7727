//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::{Arc, Once};

use veriown::{ConfirmedTransfer, DocumentRenderer, Provenance, ProvenanceConfig, TextRenderer};
use veriown_core::{ProductId, Role, VerificationStatus};
use veriown_policy::Actor;
use veriown_store::{BlobStore, MemoryBlobStore, MemoryStore};

/// A populated service over in-memory storage.
///
/// Accounts: `acme` (verified manufacturer), `alice` and `bob` (regular),
/// `fixit` (verified repair provider), `root` (administrator).
pub struct TestWorld<B = MemoryBlobStore, R = TextRenderer> {
    pub svc: Provenance<MemoryStore, B, R>,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<B>,
    pub acme: Actor,
    pub alice: Actor,
    pub bob: Actor,
    pub fixit: Actor,
    pub admin: Actor,
}

impl TestWorld {
    pub async fn new() -> Self {
        Self::with_config(ProvenanceConfig::default()).await
    }

    pub async fn with_config(config: ProvenanceConfig) -> Self {
        Self::with_collaborators(
            Arc::new(MemoryBlobStore::new()),
            Arc::new(TextRenderer::new()),
            config,
        )
        .await
    }
}

impl<B: BlobStore, R: DocumentRenderer> TestWorld<B, R> {
    /// A world whose contracts go through the given blob service and renderer.
    pub async fn with_collaborators(blobs: Arc<B>, renderer: Arc<R>, config: ProvenanceConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let svc = Provenance::new(Arc::clone(&store), Arc::clone(&blobs), renderer, config);

        let admin = account(&svc, "root", Role::Administrator).await;
        let acme = account(&svc, "acme", Role::Manufacturer).await;
        let fixit = account(&svc, "fixit", Role::RepairProvider).await;
        for vetted in [acme, fixit] {
            svc.set_verification_status(&admin, vetted.id, VerificationStatus::Verified)
                .await
                .expect("vet account");
        }

        Self {
            acme: actor(&svc, acme).await,
            fixit: actor(&svc, fixit).await,
            alice: account(&svc, "alice", Role::Regular).await,
            bob: account(&svc, "bob", Role::Regular).await,
            admin,
            svc,
            store,
            blobs,
        }
    }

    /// Register a product as `acme`.
    pub async fn register(&self, serial: &str) -> ProductId {
        self.svc
            .register_product(&self.acme, serial, "Acme", "Roadster")
            .await
            .expect("register product")
            .product
            .id
    }

    /// Initiate and confirm a transfer from `from` to `to`.
    pub async fn transfer(&self, product: ProductId, from: &Actor, to: &Actor) -> ConfirmedTransfer {
        let username = self.svc.user(to.id).await.expect("recipient").username;
        self.svc
            .initiate_transfer(from, product, &username)
            .await
            .expect("initiate transfer");
        self.svc
            .confirm_transfer(to, product)
            .await
            .expect("confirm transfer")
    }
}

async fn account<B: BlobStore, R: DocumentRenderer>(
    svc: &Provenance<MemoryStore, B, R>,
    username: &str,
    role: Role,
) -> Actor {
    let user = svc.create_user(username, role).await.expect("create account");
    Actor::from(&user)
}

async fn actor<B: BlobStore, R: DocumentRenderer>(svc: &Provenance<MemoryStore, B, R>, account: Actor) -> Actor {
    svc.actor(account.id).await.expect("load account")
}

/// Install a `tracing` subscriber that writes through the test harness.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
            .try_init();
    });
}
