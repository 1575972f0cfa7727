//! Proptest generators for property-based testing.

use proptest::prelude::*;

use veriown_core::{ChainHead, Event, EventDraft, EventPayload, ProductId, UserId};

/// Generate a user id.
pub fn user_id() -> impl Strategy<Value = UserId> {
    (1u64..=1_000).prop_map(UserId)
}

/// Generate a product id.
pub fn product_id() -> impl Strategy<Value = ProductId> {
    (1u64..=1_000).prop_map(ProductId)
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=1_900_000_000_000
}

fn text() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 ,.-]{0,47}".prop_map(String::from)
}

/// Generate a repair or service payload.
pub fn service_payload() -> impl Strategy<Value = EventPayload> {
    prop_oneof![
        (text(), proptest::option::of(text())).prop_map(|(repair_details, parts_used)| {
            EventPayload::Repair {
                repair_details,
                parts_used,
            }
        }),
        text().prop_map(|inspection_details| EventPayload::Inspection { inspection_details }),
        text().prop_map(|maintenance_details| EventPayload::Maintenance { maintenance_details }),
        text().prop_map(|details| EventPayload::SoftwareUpdate { details }),
        text().prop_map(|details| EventPayload::Custom { details }),
    ]
}

/// Generate any payload that may follow a registration.
pub fn appended_payload() -> impl Strategy<Value = EventPayload> {
    prop_oneof![
        3 => service_payload(),
        1 => user_id().prop_map(EventPayload::ownership_transfer),
    ]
}

/// Parameters for generating one product's chain.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub product_id: ProductId,
    pub registrant: UserId,
    pub start: i64,
    /// Payload, actor and time step of each event after the registration.
    pub appended: Vec<(EventPayload, UserId, i64)>,
}

impl Arbitrary for ChainParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            product_id(),
            user_id(),
            timestamp(),
            prop::collection::vec((appended_payload(), user_id(), -5_000i64..=5_000), 0..24),
        )
            .prop_map(|(product_id, registrant, start, appended)| ChainParams {
                product_id,
                registrant,
                start,
                appended,
            })
            .boxed()
    }
}

/// Build a linked chain from parameters.
///
/// Time steps may be negative; linking clamps `created_at` so it never
/// goes backwards.
pub fn chain_from_params(params: &ChainParams) -> Vec<Event> {
    let mut events: Vec<Event> = Vec::with_capacity(params.appended.len() + 1);
    let genesis = EventDraft::new(
        params.product_id,
        EventPayload::registration(),
        params.registrant,
        params.start,
    )
    .chain(&ChainHead::Genesis)
    .expect("registration encodes");
    events.push(genesis);

    let mut at = params.start;
    for (payload, actor, step) in &params.appended {
        at = at.saturating_add(*step);
        let event = EventDraft::new(params.product_id, payload.clone(), *actor, at)
            .chain(&ChainHead::of(events.last()))
            .expect("payload encodes");
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use veriown_core::verify_chain;

    proptest! {
        #[test]
        fn test_generated_chains_verify(params: ChainParams) {
            let chain = chain_from_params(&params);
            prop_assert_eq!(chain.len(), params.appended.len() + 1);
            prop_assert!(verify_chain(&chain).is_ok());
        }

        #[test]
        fn test_chain_is_deterministic(params: ChainParams) {
            prop_assert_eq!(chain_from_params(&params), chain_from_params(&params));
        }

        #[test]
        fn test_created_at_never_decreases(params: ChainParams) {
            let chain = chain_from_params(&params);
            for pair in chain.windows(2) {
                prop_assert!(pair[0].created_at() <= pair[1].created_at());
                prop_assert_eq!(pair[0].seq() + 1, pair[1].seq());
            }
        }

        #[test]
        fn test_service_payloads_validate(payload in service_payload()) {
            prop_assert!(payload.validate().is_ok());
        }
    }
}
