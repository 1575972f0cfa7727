//! # VeriOwn
//!
//! Product chain of custody: a tamper-evident event ledger per product,
//! two-phase ownership transfer, and hashed ownership contracts.
//!
//! ## Overview
//!
//! - **Ledger**: every lifecycle fact about a product is an [`Event`]
//!   hash-chained to its predecessor. The current owner is always derived
//!   from the ledger, never stored.
//! - **Transfers**: the owner proposes, the proposed new owner confirms.
//!   Only the confirmation becomes an event.
//! - **Contracts**: each ownership fact gets a canonical JSON document whose
//!   SHA-256 hash anyone can reproduce, rendered and handed to a
//!   content-addressed blob service.
//! - **Policy**: every action is checked against a capability table before
//!   anything is written.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use veriown::{Provenance, ProvenanceConfig, TextRenderer};
//! use veriown::core::Role;
//! use veriown::store::SqliteStore;
//!
//! async fn example() -> veriown::Result<()> {
//!     let store = Arc::new(SqliteStore::open("veriown.db")?);
//!     let svc = Provenance::new(
//!         Arc::clone(&store),
//!         store,
//!         Arc::new(TextRenderer::new()),
//!         ProvenanceConfig::default(),
//!     );
//!
//!     let admin = svc.actor(svc.create_user("root", Role::Administrator).await?.id).await?;
//!     let brand = svc.create_user("acme", Role::Manufacturer).await?;
//!     svc.set_verification_status(&admin, brand.id, veriown::core::VerificationStatus::Verified)
//!         .await?;
//!     let brand = svc.actor(brand.id).await?;
//!
//!     let registered = svc.register_product(&brand, "SN-001", "Acme", "Roadster").await?;
//!     svc.create_user("alice", Role::Regular).await?;
//!     svc.initiate_transfer(&brand, registered.product.id, "alice").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `veriown::core` - events, hash chain, transfer state, contract documents
//! - `veriown::store` - storage and blob service abstractions, SQLite
//! - `veriown::policy` - actors, actions and the capability table

pub mod config;
pub mod error;
pub mod issuer;
pub mod ledger;
pub mod provenance;
pub mod render;
pub mod transfer;

// Re-export component crates
pub use veriown_core as core;
pub use veriown_policy as policy;
pub use veriown_store as store;

// Re-export main types for convenience
pub use config::{IssuerConfig, LedgerConfig, ProvenanceConfig};
pub use error::{ErrorKind, ProvenanceError, Result};
pub use issuer::{ContractIssuer, IssuanceOutcome, IssuanceWarning};
pub use ledger::{EventLedger, Ownership};
pub use provenance::{
    ChainStatus, ContractLinks, Provenance, PublicEntry, PublicHistory, PublicProduct,
    Registration, IPFS_GATEWAY,
};
pub use render::{DocumentRenderer, RenderError, TextRenderer};
pub use transfer::{ConfirmedTransfer, TransferWorkflow};

// Re-export commonly used core types
pub use veriown_core::{
    ContractDocument, ContractHash, ContractId, Event, EventHash, EventPayload, EventType,
    OwnerContract, PendingTransfer, Product, ProductId, Role, User, UserId,
};
pub use veriown_policy::{Action, Actor};
