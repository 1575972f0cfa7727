//! Error types for VeriOwn core.

use thiserror::Error;

use crate::payload::EventType;
use crate::types::{ProductId, UserId};

/// Core errors that can occur while building events and documents.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("invalid {event_type} event data: {reason}")]
    InvalidEventData {
        event_type: EventType,
        reason: String,
    },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("malformed stored document: {0}")]
    MalformedDocument(String),
}

/// Chain verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// The stored digest of the event at `at_index` does not match the
    /// digest recomputed from its fields and its predecessor.
    #[error("hash chain broken at index {at_index}")]
    ChainBroken { at_index: usize },

    /// Events from more than one product were passed as one chain.
    #[error("event at index {at_index} belongs to product {found}, expected {expected}")]
    ForeignEvent {
        at_index: usize,
        expected: ProductId,
        found: ProductId,
    },
}

/// Transfer state machine transition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("a transfer is already pending for product {product_id} (proposed owner {new_owner_id})")]
    TransferAlreadyPending {
        product_id: ProductId,
        new_owner_id: UserId,
    },

    #[error("no pending transfer for product {product_id} awaits user {actor}")]
    NoPendingTransferForUser { product_id: ProductId, actor: UserId },
}
