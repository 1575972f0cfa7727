//! Event: an immutable, hash-chained fact about one product.
//!
//! An [`Event`] can only be produced by chaining an [`EventDraft`] onto a
//! [`ChainHead`], so the link to the predecessor is always computed. Events
//! are never edited; later facts are new events.

use serde::{Deserialize, Serialize};

use crate::chain::digest;
use crate::error::CoreError;
use crate::payload::{EventPayload, EventType};
use crate::types::{EventHash, ProductId, UserId};

/// An event before it is linked into a product's chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub product_id: ProductId,
    pub payload: EventPayload,
    pub created_by: UserId,
    /// Proposed creation time (Unix ms). Clamped to the chain head's time.
    pub created_at: i64,
}

impl EventDraft {
    /// Create a draft.
    pub fn new(product_id: ProductId, payload: EventPayload, created_by: UserId, created_at: i64) -> Self {
        Self {
            product_id,
            payload,
            created_by,
            created_at,
        }
    }

    /// Link the draft onto `head`, computing its sequence number and digest.
    ///
    /// `created_at` never goes backwards along a chain, so ordering by
    /// `(created_at, seq)` and ordering by `seq` agree.
    pub fn chain(self, head: &ChainHead) -> Result<Event, CoreError> {
        let seq = head.next_seq();
        let previous_event_hash = head.hash();
        let created_at = match head {
            ChainHead::Genesis => self.created_at,
            ChainHead::At { created_at, .. } => self.created_at.max(*created_at),
        };

        let mut event = Event {
            product_id: self.product_id,
            seq,
            payload: self.payload,
            created_by: self.created_by,
            created_at,
            previous_event_hash,
            event_hash: EventHash::GENESIS,
        };
        event.event_hash = digest(&event)?;
        Ok(event)
    }
}

/// The position a new event is appended after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainHead {
    /// The product has no events yet.
    Genesis,
    /// The most recent event of the product.
    At {
        seq: u64,
        hash: EventHash,
        created_at: i64,
    },
}

impl ChainHead {
    /// Head after `last`, or genesis if there is none.
    pub fn of(last: Option<&Event>) -> Self {
        match last {
            None => ChainHead::Genesis,
            Some(e) => ChainHead::At {
                seq: e.seq,
                hash: e.event_hash,
                created_at: e.created_at,
            },
        }
    }

    /// Sequence number of the next event.
    pub fn next_seq(&self) -> u64 {
        match self {
            ChainHead::Genesis => 0,
            ChainHead::At { seq, .. } => seq + 1,
        }
    }

    /// Digest the next event links to.
    pub fn hash(&self) -> EventHash {
        match self {
            ChainHead::Genesis => EventHash::GENESIS,
            ChainHead::At { hash, .. } => *hash,
        }
    }
}

/// An immutable record in a product's provenance ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    product_id: ProductId,
    seq: u64,
    #[serde(flatten)]
    payload: EventPayload,
    created_by: UserId,
    created_at: i64,
    previous_event_hash: EventHash,
    event_hash: EventHash,
}

impl Event {
    /// Rebuild an event from persisted fields without recomputing its digest.
    ///
    /// Stores use this when loading rows. A row whose fields no longer match
    /// its stored digest is detected by [`crate::chain::verify_chain`].
    #[allow(clippy::too_many_arguments)]
    pub fn from_stored(
        product_id: ProductId,
        seq: u64,
        payload: EventPayload,
        created_by: UserId,
        created_at: i64,
        previous_event_hash: EventHash,
        event_hash: EventHash,
    ) -> Self {
        Self {
            product_id,
            seq,
            payload,
            created_by,
            created_at,
            previous_event_hash,
            event_hash,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Position in the product's chain (0 for registration).
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn previous_event_hash(&self) -> &EventHash {
        &self.previous_event_hash
    }

    pub fn event_hash(&self) -> &EventHash {
        &self.event_hash
    }
}
