//! Products and users.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{ProductId, UserId};

/// A physical item. Immutable after creation; its current owner is derived
/// from the ledger and never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub serial_number: String,
    pub manufacturer: String,
    pub model: String,
    /// Unix ms.
    pub created_at: i64,
}

/// Fields of a product before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub serial_number: String,
    pub manufacturer: String,
    pub model: String,
    pub created_at: i64,
}

/// Account role supplied by the identity context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Regular,
    /// A brand allowed to register products.
    Manufacturer,
    /// A repair shop allowed to log repairs.
    RepairProvider,
    Administrator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Regular => "regular",
            Role::Manufacturer => "manufacturer",
            Role::RepairProvider => "repair_provider",
            Role::Administrator => "administrator",
        }
    }

    /// Roles whose capabilities require an administrator's vetting.
    pub fn requires_verification(self) -> bool {
        matches!(self, Role::Manufacturer | Role::RepairProvider)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Role::Regular),
            "manufacturer" | "brand" => Ok(Role::Manufacturer),
            "repair_provider" | "repair_shop" => Ok(Role::RepairProvider),
            "administrator" | "admin" => Ok(Role::Administrator),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Vetting state of a manufacturer or repair provider account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VerificationStatus::Pending),
            "verified" => Ok(VerificationStatus::Verified),
            "rejected" => Ok(VerificationStatus::Rejected),
            other => Err(format!("unknown verification status: {other}")),
        }
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub verification_status: VerificationStatus,
}

impl User {
    /// Whether the account may exercise its role capability.
    pub fn is_vetted(&self) -> bool {
        !self.role.requires_verification()
            || self.verification_status == VerificationStatus::Verified
    }
}

/// Fields of a user before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub role: Role,
    pub verification_status: VerificationStatus,
}

impl NewUser {
    /// An account that needs no vetting, or has already been vetted.
    pub fn verified(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
            verification_status: VerificationStatus::Verified,
        }
    }
}
