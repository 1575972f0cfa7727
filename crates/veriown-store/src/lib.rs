//! # VeriOwn Store
//!
//! Storage abstraction for VeriOwn. Provides a trait-based interface for
//! ledger persistence with SQLite and in-memory implementations, plus the
//! content-addressed blob service rendered contracts are handed to.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all ledger storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage (also a [`BlobStore`])
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`BlobStore`] - Put/get interface of the blob service
//! - [`InsertResult`] - Result of appending an event
//!
//! ## Usage
//!
//! ```rust,no_run
//! use veriown_store::{SqliteStore, Store};
//! use veriown_core::ProductId;
//!
//! async fn example() {
//!     let store = SqliteStore::open("veriown.db").unwrap();
//!     let history = store.events_for_product(ProductId(1)).await.unwrap();
//!     veriown_core::verify_chain(&history).unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Compare-and-append**: an event is written only if it links to the
//!   current head; a moved head returns `Conflict` and nothing is written
//! - **Idempotent appends**: appending the same event twice returns `AlreadyExists`
//! - **Atomic transfer commit**: the transfer event and the removal of its
//!   proposal happen in one transaction

pub mod blob;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use blob::{content_id_for, BlobStore, MemoryBlobStore, CONTENT_ID_PREFIX};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{GenesisBuilder, InsertResult, PendingInsert, Store, TransferCommit};
