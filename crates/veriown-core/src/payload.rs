//! Typed event payloads.
//!
//! Every event type has exactly one payload schema. Raw `(event_type, JSON)`
//! input is parsed into an [`EventPayload`] before it can reach the ledger,
//! so malformed data is rejected at append time instead of surfacing later
//! during verification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::UserId;

/// Discriminator for event payload interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EventType {
    /// Genesis event, written once when a manufacturer registers a product.
    Registration,
    /// Confirmed change of owner.
    OwnershipTransfer,
    /// Repair performed by a repair provider.
    Repair,
    Inspection,
    Maintenance,
    SoftwareUpdate,
    /// Free-form note.
    Custom,
}

impl EventType {
    /// All known event types.
    pub const ALL: [EventType; 7] = [
        EventType::Registration,
        EventType::OwnershipTransfer,
        EventType::Repair,
        EventType::Inspection,
        EventType::Maintenance,
        EventType::SoftwareUpdate,
        EventType::Custom,
    ];

    /// Stable wire name, also used in the canonical digest encoding.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Registration => "registration",
            EventType::OwnershipTransfer => "ownership_transfer",
            EventType::Repair => "repair",
            EventType::Inspection => "inspection",
            EventType::Maintenance => "maintenance",
            EventType::SoftwareUpdate => "software_update",
            EventType::Custom => "custom",
        }
    }

    /// Service events are informational entries appended after registration
    /// that do not change ownership.
    pub fn is_service(self) -> bool {
        matches!(
            self,
            EventType::Inspection
                | EventType::Maintenance
                | EventType::SoftwareUpdate
                | EventType::Custom
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownEventType(s.to_string()))
    }
}

/// The payload of an event, one variant per [`EventType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "event_data", rename_all = "snake_case")]
pub enum EventPayload {
    Registration {
        details: String,
    },
    OwnershipTransfer {
        new_owner_id: UserId,
    },
    Repair {
        repair_details: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parts_used: Option<String>,
    },
    Inspection {
        inspection_details: String,
    },
    Maintenance {
        maintenance_details: String,
    },
    SoftwareUpdate {
        details: String,
    },
    Custom {
        details: String,
    },
}

/// Registration details written by [`EventPayload::registration`].
pub const REGISTRATION_DETAILS: &str = "Product registered";

impl EventPayload {
    /// The default genesis payload.
    pub fn registration() -> Self {
        EventPayload::Registration {
            details: REGISTRATION_DETAILS.to_string(),
        }
    }

    /// An ownership transfer to `new_owner_id`.
    pub fn ownership_transfer(new_owner_id: UserId) -> Self {
        EventPayload::OwnershipTransfer { new_owner_id }
    }

    /// The event type this payload belongs to.
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Registration { .. } => EventType::Registration,
            EventPayload::OwnershipTransfer { .. } => EventType::OwnershipTransfer,
            EventPayload::Repair { .. } => EventType::Repair,
            EventPayload::Inspection { .. } => EventType::Inspection,
            EventPayload::Maintenance { .. } => EventType::Maintenance,
            EventPayload::SoftwareUpdate { .. } => EventType::SoftwareUpdate,
            EventPayload::Custom { .. } => EventType::Custom,
        }
    }

    /// The new owner carried by an ownership transfer.
    pub fn new_owner(&self) -> Option<UserId> {
        match self {
            EventPayload::OwnershipTransfer { new_owner_id } => Some(*new_owner_id),
            _ => None,
        }
    }

    /// Parse and validate untyped event data against the schema of `event_type`.
    pub fn from_parts(event_type: EventType, data: serde_json::Value) -> Result<Self, CoreError> {
        let payload = Self::decode(event_type, data)?;
        payload.validate()?;
        Ok(payload)
    }

    /// Deserialize event data without field-level validation.
    ///
    /// Used when loading persisted events: a stored event is reported by
    /// chain verification, not rejected on read.
    pub fn decode(event_type: EventType, data: serde_json::Value) -> Result<Self, CoreError> {
        let tagged = serde_json::json!({
            "event_type": event_type.as_str(),
            "event_data": data,
        });
        serde_json::from_value(tagged).map_err(|e| CoreError::InvalidEventData {
            event_type,
            reason: e.to_string(),
        })
    }

    /// The `event_data` half of the tagged representation.
    pub fn data_json(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("event_data").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }

    /// Check field-level constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), CoreError> {
        let event_type = self.event_type();
        let text = match self {
            EventPayload::Registration { details } => Some(("details", details)),
            EventPayload::OwnershipTransfer { new_owner_id } => {
                if new_owner_id.get() == 0 {
                    return Err(CoreError::InvalidEventData {
                        event_type,
                        reason: "new_owner_id must be a user id".into(),
                    });
                }
                None
            }
            EventPayload::Repair { repair_details, .. } => Some(("repair_details", repair_details)),
            EventPayload::Inspection { inspection_details } => {
                Some(("inspection_details", inspection_details))
            }
            EventPayload::Maintenance { maintenance_details } => {
                Some(("maintenance_details", maintenance_details))
            }
            EventPayload::SoftwareUpdate { details } | EventPayload::Custom { details } => {
                Some(("details", details))
            }
        };

        match text {
            Some((field, value)) if value.trim().is_empty() => Err(CoreError::InvalidEventData {
                event_type,
                reason: format!("{field} must not be empty"),
            }),
            _ => Ok(()),
        }
    }
}
