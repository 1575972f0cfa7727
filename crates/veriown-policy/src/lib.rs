//! # VeriOwn Policy
//!
//! Capability checks for every guarded action.
//!
//! The identity context supplies an [`Actor`] (id, role, vetting state).
//! The caller reads the ownership facts the action depends on, wraps them
//! in a [`Subject`], and asks [`authorize`] before it writes anything.
//!
//! ```rust
//! use veriown_core::{Role, UserId};
//! use veriown_policy::{authorize, Action, Actor, Subject};
//!
//! let owner = Actor::new(UserId(3), Role::Regular, true);
//! assert!(authorize(&owner, Action::InitiateTransfer, &Subject::owned_by(UserId(3))).is_ok());
//! ```

pub mod actor;
pub mod capability;
pub mod error;

pub use actor::Actor;
pub use capability::{allows, authorize, Action, Subject};
pub use error::{PolicyError, Result};
