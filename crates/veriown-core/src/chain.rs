//! HashChain: tamper-evident linkage between the events of one product.
//!
//! Each event's digest covers its own fields and the digest of the event
//! before it, so editing, reordering or deleting any event changes every
//! digest after it.

use crate::canonical::{canonical_event_bytes, DigestInput};
use crate::error::{CoreError, VerificationError};
use crate::event::Event;
use crate::types::EventHash;

/// Domain separation prefix for event digests.
pub const DIGEST_DOMAIN: &[u8] = b"veriown/event-digest/v1";

/// Compute the chain digest of an event from its fields and its stored
/// `previous_event_hash`.
pub fn digest(event: &Event) -> Result<EventHash, CoreError> {
    digest_with_prev(event, event.previous_event_hash())
}

/// Compute the digest an event would have if linked after `prev`.
pub fn digest_with_prev(event: &Event, prev: &EventHash) -> Result<EventHash, CoreError> {
    let bytes = canonical_event_bytes(&DigestInput {
        product_id: event.product_id(),
        seq: event.seq(),
        payload: event.payload(),
        created_by: event.created_by(),
        created_at: event.created_at(),
        previous_event_hash: prev,
    })?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(DIGEST_DOMAIN);
    hasher.update(&bytes);
    Ok(EventHash(*hasher.finalize().as_bytes()))
}

/// Verify an ordered sequence of events of a single product.
///
/// Each event's expected digest is recomputed from its fields and the
/// *stored* digest of its predecessor (genesis for the first). The first
/// mismatch fails with [`VerificationError::ChainBroken`]. An empty chain is
/// trivially valid.
pub fn verify_chain(events: &[Event]) -> Result<(), VerificationError> {
    let Some(first) = events.first() else {
        return Ok(());
    };
    let product_id = first.product_id();
    let mut prev = EventHash::GENESIS;

    for (index, event) in events.iter().enumerate() {
        if event.product_id() != product_id {
            return Err(VerificationError::ForeignEvent {
                at_index: index,
                expected: product_id,
                found: event.product_id(),
            });
        }

        if event.seq() != index as u64 || *event.previous_event_hash() != prev {
            return Err(VerificationError::ChainBroken { at_index: index });
        }

        // An event whose fields cannot be encoded cannot match its digest.
        let expected = digest_with_prev(event, &prev)
            .map_err(|_| VerificationError::ChainBroken { at_index: index })?;
        if expected != *event.event_hash() {
            return Err(VerificationError::ChainBroken { at_index: index });
        }

        prev = *event.event_hash();
    }

    Ok(())
}
