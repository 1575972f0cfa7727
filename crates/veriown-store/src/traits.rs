//! Store trait: the abstract interface for ledger persistence.
//!
//! This trait allows the ledger to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use std::path::Path;

use async_trait::async_trait;
use veriown_core::{
    ContentId, ContractId, CoreError, Event, EventHash, NewContract, NewProduct, NewUser,
    OwnerContract, PendingTransfer, Product, ProductId, User, UserId, VerificationStatus,
};

use crate::error::Result;

/// Builds the genesis event once the store has assigned the product's id.
///
/// Runs inside the store's write transaction, so the product row and its
/// registration event become visible together or not at all.
pub type GenesisBuilder = Box<dyn FnOnce(&Product) -> std::result::Result<Event, CoreError> + Send>;

/// Result of appending an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Event was appended at the head of the product's chain.
    Inserted,
    /// The exact event is already stored (idempotent - not an error).
    AlreadyExists,
    /// The head moved: the event does not link to the current last event.
    Conflict {
        /// Digest of the current head of the chain.
        existing: EventHash,
    },
}

/// Result of recording a transfer proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingInsert {
    Inserted,
    /// The product already has an outstanding proposal.
    AlreadyPending(PendingTransfer),
    /// The chain moved past the head the proposal was checked against;
    /// nothing was written.
    Conflict { existing: EventHash },
}

/// Result of committing a confirmed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferCommit {
    /// Event appended and proposal consumed in one step.
    Committed,
    /// The head moved before the commit; nothing was written.
    Conflict { existing: EventHash },
    /// The proposal no longer exists (or names another user); nothing was written.
    PendingMissing,
}

/// The Store trait: async interface for ledger persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Compare-and-append**: an event is only written if it links to the
///   current head of its product's chain. A concurrent writer that moved the
///   head yields `Conflict` and the caller re-links onto the new head.
/// - **At most one proposal**: the pending transfer slot is keyed by product;
///   a second proposal yields `AlreadyPending`. A proposal is bound to the
///   head its owner check read; if the head moved it yields `Conflict`.
/// - **Atomic confirm**: `commit_transfer` re-reads the proposal, appends the
///   event and deletes the proposal under one write boundary.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a user account. Fails with `DuplicateUsername` if taken.
    async fn insert_user(&self, user: &NewUser) -> Result<User>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Update the vetting state of an account. Returns the updated user.
    async fn set_verification_status(
        &self,
        id: UserId,
        status: VerificationStatus,
    ) -> Result<Option<User>>;

    /// Accounts with the given vetting status, oldest first.
    async fn users_with_status(&self, status: VerificationStatus) -> Result<Vec<User>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Products
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a product and its genesis event atomically.
    async fn register_product(
        &self,
        product: &NewProduct,
        genesis: GenesisBuilder,
    ) -> Result<(Product, Event)>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// All products, ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an event if it links to the current head of its chain.
    ///
    /// Fails with `NotFound` if the product does not exist.
    async fn append_event(&self, event: &Event) -> Result<InsertResult>;

    /// All events of a product, oldest first (total order by seq).
    async fn events_for_product(&self, product_id: ProductId) -> Result<Vec<Event>>;

    /// The most recent event of a product.
    async fn head_event(&self, product_id: ProductId) -> Result<Option<Event>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Pending transfers
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_pending_transfer(&self, product_id: ProductId) -> Result<Option<PendingTransfer>>;

    /// Proposals naming `user` as the new owner.
    async fn pending_transfers_for_user(&self, user: UserId) -> Result<Vec<PendingTransfer>>;

    /// Record a proposal, provided the product has none and its last event
    /// is still `head`.
    async fn insert_pending_transfer(
        &self,
        pending: &PendingTransfer,
        head: &EventHash,
    ) -> Result<PendingInsert>;

    /// Append the transfer event and consume `pending` atomically.
    async fn commit_transfer(&self, pending: &PendingTransfer, event: &Event)
        -> Result<TransferCommit>;

    // ─────────────────────────────────────────────────────────────────────────
    // Contracts
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a contract. Fails with `DuplicateContractNumber` on reuse.
    async fn insert_contract(&self, contract: &NewContract) -> Result<OwnerContract>;

    async fn get_contract(&self, id: ContractId) -> Result<Option<OwnerContract>>;

    /// Contracts of a product, newest first.
    async fn contracts_for_product(&self, product_id: ProductId) -> Result<Vec<OwnerContract>>;

    /// Replace the storage reference and cache path of a contract.
    async fn update_contract_storage(
        &self,
        id: ContractId,
        content_id: &ContentId,
        cache_path: Option<&Path>,
        updated_at: i64,
    ) -> Result<Option<OwnerContract>>;
}

/// Decide whether `event` may be appended to a chain.
///
/// `at_position` is the stored event with the same seq, if any; `head` is
/// the most recent stored event.
pub(crate) fn check_append(
    at_position: Option<&Event>,
    head: Option<&Event>,
    event: &Event,
) -> InsertResult {
    if let Some(existing) = at_position {
        if existing.event_hash() == event.event_hash() {
            return InsertResult::AlreadyExists;
        }
    }

    match head {
        Some(h) if h.seq() + 1 == event.seq() && h.event_hash() == event.previous_event_hash() => {
            InsertResult::Inserted
        }
        Some(h) => InsertResult::Conflict {
            existing: *h.event_hash(),
        },
        None if event.seq() == 0 && event.previous_event_hash().is_genesis() => {
            InsertResult::Inserted
        }
        None => InsertResult::Conflict {
            existing: EventHash::GENESIS,
        },
    }
}
