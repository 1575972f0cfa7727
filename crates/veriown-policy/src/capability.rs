//! The capability table.
//!
//! Every guarded action is checked here before any mutation happens, so a
//! rejected request has no partial effects. Facts about the target (current
//! owner, former owners) are read by the caller and passed in as a
//! [`Subject`]; the table itself does no I/O.
//!
//! | Action | Allowed actors |
//! |---|---|
//! | register product | verified manufacturer |
//! | record repair | verified repair provider, administrator |
//! | record service event | current owner, verified repair provider, administrator |
//! | initiate transfer | current owner |
//! | regenerate contract | contract owner, administrator |
//! | reissue contract | current owner, administrator |
//! | view contract | contract owner or previous owner, administrator |
//! | view ledger | current owner, any former owner, administrator |
//! | verify account | administrator |
//!
//! Confirming a transfer is not in the table: only the proposed new owner
//! can confirm, and any other actor is told there is no transfer pending
//! for them.

use serde::{Deserialize, Serialize};
use std::fmt;
use veriown_core::{Role, UserId};

use crate::actor::Actor;
use crate::error::{PolicyError, Result};

/// A guarded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    RegisterProduct,
    RecordRepair,
    /// Inspection, maintenance, software update or custom note.
    RecordServiceEvent,
    InitiateTransfer,
    RegenerateContract,
    /// Issue a contract again after issuance failed.
    ReissueContract,
    ViewContract,
    ViewLedger,
    /// Vet a manufacturer or repair provider account.
    VerifyAccount,
}

impl Action {
    /// Human-readable statement of who may perform the action.
    pub fn requirement(self) -> &'static str {
        match self {
            Action::RegisterProduct => "only verified manufacturers can register products",
            Action::RecordRepair => "only verified repair providers or administrators can record repairs",
            Action::RecordServiceEvent => {
                "only the current owner, verified repair providers or administrators can record service events"
            }
            Action::InitiateTransfer => "only the current owner can transfer a product",
            Action::RegenerateContract => "only the contract owner or an administrator can regenerate it",
            Action::ReissueContract => "only the current owner or an administrator can reissue a contract",
            Action::ViewContract => "only parties to the contract or an administrator can view it",
            Action::ViewLedger => "only current or former owners or an administrator can view the ledger",
            Action::VerifyAccount => "only administrators can verify accounts",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Action::RegisterProduct => "register a product",
            Action::RecordRepair => "record a repair",
            Action::RecordServiceEvent => "record a service event",
            Action::InitiateTransfer => "initiate a transfer",
            Action::RegenerateContract => "regenerate a contract",
            Action::ReissueContract => "reissue a contract",
            Action::ViewContract => "view a contract",
            Action::ViewLedger => "view a product's ledger",
            Action::VerifyAccount => "verify an account",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Ownership facts about the thing an action targets.
///
/// For product actions `owner` is the ledger-derived current owner and
/// `former_owners` every earlier owner. For contract actions they are the
/// contract's owner and previous owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subject<'a> {
    pub owner: Option<UserId>,
    pub former_owners: &'a [UserId],
}

impl<'a> Subject<'a> {
    /// A target with no ownership facts (e.g. a product not yet registered).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn owned_by(owner: UserId) -> Self {
        Self {
            owner: Some(owner),
            former_owners: &[],
        }
    }

    pub fn with_former_owners(self, former_owners: &'a [UserId]) -> Self {
        Self {
            former_owners,
            ..self
        }
    }

    fn is_owner(&self, user: UserId) -> bool {
        self.owner == Some(user)
    }

    fn is_party(&self, user: UserId) -> bool {
        self.is_owner(user) || self.former_owners.contains(&user)
    }
}

/// Whether `actor` may perform `action` on `subject`.
pub fn allows(actor: &Actor, action: Action, subject: &Subject<'_>) -> bool {
    match action {
        Action::RegisterProduct => actor.acts_as(Role::Manufacturer),
        Action::RecordRepair => actor.acts_as(Role::RepairProvider) || actor.is_admin(),
        Action::RecordServiceEvent => {
            subject.is_owner(actor.id) || actor.acts_as(Role::RepairProvider) || actor.is_admin()
        }
        Action::InitiateTransfer => subject.is_owner(actor.id),
        Action::RegenerateContract | Action::ReissueContract => {
            subject.is_owner(actor.id) || actor.is_admin()
        }
        Action::ViewContract | Action::ViewLedger => {
            subject.is_party(actor.id) || actor.is_admin()
        }
        Action::VerifyAccount => actor.is_admin(),
    }
}

/// Check `action` against the capability table.
///
/// Fails with [`PolicyError::Forbidden`] naming the action and the actor.
pub fn authorize(actor: &Actor, action: Action, subject: &Subject<'_>) -> Result<()> {
    if allows(actor, action, subject) {
        Ok(())
    } else {
        Err(PolicyError::Forbidden {
            action,
            actor: actor.id,
        })
    }
}
