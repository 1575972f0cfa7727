//! Two-phase ownership transfer state machine.
//!
//! Per product exactly one of [`TransferState::NoPendingTransfer`] or
//! [`TransferState::Pending`] holds. A transfer proposal is not a fact: it
//! never enters the hash chain. Only a confirmed transfer becomes an event.
//!
//! ```text
//! NoPendingTransfer --initiate(owner)-->      Pending
//! Pending           --confirm(new_owner)-->   NoPendingTransfer  (+ event)
//! Pending           --initiate(*)-->          rejected (TransferAlreadyPending)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::types::{ProductId, UserId};

/// A proposed ownership change awaiting the new owner's confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    pub product_id: ProductId,
    pub new_owner_id: UserId,
    /// When the proposal was made (Unix ms).
    pub initiated_at: i64,
}

/// Transfer state of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    NoPendingTransfer,
    Pending(PendingTransfer),
}

impl From<Option<PendingTransfer>> for TransferState {
    fn from(slot: Option<PendingTransfer>) -> Self {
        match slot {
            Some(pending) => TransferState::Pending(pending),
            None => TransferState::NoPendingTransfer,
        }
    }
}

impl TransferState {
    /// Propose a transfer of `product_id` to `new_owner_id`.
    ///
    /// Ownership of the initiator is checked by the caller against the
    /// ledger; this only enforces the at-most-one-proposal rule.
    pub fn initiate(
        self,
        product_id: ProductId,
        new_owner_id: UserId,
        now: i64,
    ) -> Result<PendingTransfer, TransitionError> {
        match self {
            TransferState::NoPendingTransfer => Ok(PendingTransfer {
                product_id,
                new_owner_id,
                initiated_at: now,
            }),
            TransferState::Pending(existing) => Err(TransitionError::TransferAlreadyPending {
                product_id: existing.product_id,
                new_owner_id: existing.new_owner_id,
            }),
        }
    }

    /// Accept the pending proposal as `actor`.
    ///
    /// Succeeds only when a proposal exists and names `actor` as the new
    /// owner. Returns the consumed proposal.
    pub fn confirm(
        self,
        product_id: ProductId,
        actor: UserId,
    ) -> Result<PendingTransfer, TransitionError> {
        match self {
            TransferState::Pending(pending) if pending.new_owner_id == actor => Ok(pending),
            TransferState::Pending(_) | TransferState::NoPendingTransfer => {
                Err(TransitionError::NoPendingTransferForUser { product_id, actor })
            }
        }
    }

    pub fn pending(&self) -> Option<&PendingTransfer> {
        match self {
            TransferState::Pending(p) => Some(p),
            TransferState::NoPendingTransfer => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: ProductId = ProductId(1);
    const OWNER: UserId = UserId(10);
    const NEW: UserId = UserId(20);
    const OTHER: UserId = UserId(30);

    #[test]
    fn test_initiate_from_idle() {
        let pending = TransferState::NoPendingTransfer.initiate(P, NEW, 5).unwrap();
        assert_eq!(pending.new_owner_id, NEW);
        assert_eq!(pending.initiated_at, 5);
    }

    #[test]
    fn test_second_initiate_rejected() {
        let pending = TransferState::NoPendingTransfer.initiate(P, NEW, 5).unwrap();
        let err = TransferState::Pending(pending)
            .initiate(P, OTHER, 6)
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::TransferAlreadyPending {
                product_id: P,
                new_owner_id: NEW
            }
        );
    }

    #[test]
    fn test_confirm_only_by_new_owner() {
        let state = TransferState::Pending(PendingTransfer {
            product_id: P,
            new_owner_id: NEW,
            initiated_at: 0,
        });

        for actor in [OWNER, OTHER] {
            assert_eq!(
                state.confirm(P, actor),
                Err(TransitionError::NoPendingTransferForUser { product_id: P, actor })
            );
        }
        assert_eq!(state.confirm(P, NEW).unwrap().new_owner_id, NEW);
    }

    #[test]
    fn test_confirm_without_pending() {
        assert!(TransferState::NoPendingTransfer.confirm(P, NEW).is_err());
    }

    #[test]
    fn test_from_option() {
        assert_eq!(TransferState::from(None), TransferState::NoPendingTransfer);
        let p = PendingTransfer {
            product_id: P,
            new_owner_id: NEW,
            initiated_at: 1,
        };
        assert_eq!(TransferState::from(Some(p)).pending(), Some(&p));
    }
}
