//! # VeriOwn Core
//!
//! Pure primitives for VeriOwn: provenance events, the hash chain that makes
//! a product's history tamper-evident, the transfer state machine, and
//! canonical ownership contract documents.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the ledger's data structures.
//!
//! ## Key Types
//!
//! - [`Event`] - An immutable, hash-chained fact about one product
//! - [`EventPayload`] - Typed event data, one variant per [`EventType`]
//! - [`EventHash`] - Blake3 chain digest binding an event to its predecessor
//! - [`TransferState`] - Per-product two-phase transfer state
//! - [`ContractDocument`] - Canonical snapshot certified by a contract
//!
//! ## Canonicalization
//!
//! Event digests are computed over deterministic CBOR. See [`canonical`].
//! Contract hashes are SHA-256 over compact JSON. See [`contract`].

pub mod canonical;
pub mod chain;
pub mod contract;
pub mod crypto;
pub mod error;
pub mod event;
pub mod model;
pub mod payload;
pub mod transfer;
pub mod types;

pub use chain::{digest, verify_chain, DIGEST_DOMAIN};
pub use contract::{
    contract_number, ContentId, ContractDocument, NewContract, OwnerContract, SealedDocument,
};
pub use crypto::ContractHash;
pub use error::{CoreError, TransitionError, VerificationError};
pub use event::{ChainHead, Event, EventDraft};
pub use model::{NewProduct, NewUser, Product, Role, User, VerificationStatus};
pub use payload::{EventPayload, EventType};
pub use transfer::{PendingTransfer, TransferState};
pub use types::{now_millis, ContractId, EventHash, ProductId, UserId};
