//! # VeriOwn Testkit
//!
//! Testing utilities for VeriOwn.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a populated [`TestWorld`] over in-memory storage
//! - **Doubles**: blob services and renderers that fail or stall
//! - **Generators**: Proptest strategies for payloads and whole chains
//! - **Golden vectors**: contract documents with their expected hashes
//!
//! ## Golden Vectors
//!
//! ```rust
//! use veriown_testkit::vectors::all_vectors;
//!
//! for vector in all_vectors() {
//!     let sealed = vector.document.seal().unwrap();
//!     assert_eq!(sealed.contract_hash.to_hex(), vector.expected_hash);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use veriown_testkit::generators::{chain_from_params, ChainParams};
//!
//! proptest! {
//!     #[test]
//!     fn chains_verify(params: ChainParams) {
//!         prop_assert!(veriown_core::verify_chain(&chain_from_params(&params)).is_ok());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use veriown_testkit::TestWorld;
//!
//! async fn example() {
//!     let world = TestWorld::new().await;
//!     let product = world.register("SN-001").await;
//!     world.transfer(product, &world.acme, &world.alice).await;
//! }
//! ```

pub mod doubles;
pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use doubles::{FailingBlobStore, FailingRenderer, SlowRenderer};
pub use fixtures::{init_tracing, TestWorld};
