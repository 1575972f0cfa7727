//! Ownership contracts: canonical documents and their content hash.
//!
//! A contract's `document_data` is the compact JSON serialization of a
//! [`ContractDocument`]. Field order is fixed by the struct, integers and
//! timestamps are plain JSON integers (Unix ms), and absent previous-owner
//! fields are omitted. `contract_hash` is SHA-256 over exactly the stored
//! bytes, so anyone re-hashing the stored JSON reproduces it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::crypto::ContractHash;
use crate::error::CoreError;
use crate::types::{ContractId, ProductId, UserId};

/// The snapshot of facts a contract certifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDocument {
    pub product_id: ProductId,
    pub product_serial: String,
    pub manufacturer: String,
    pub model: String,
    pub owner_id: UserId,
    pub owner_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_owner_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_owner_name: Option<String>,
    pub transfer_date: i64,
    pub contract_number: String,
    pub issued_at: i64,
    pub verification_url: String,
}

impl ContractDocument {
    /// Serialize to the canonical stored form.
    pub fn canonical_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    /// Parse a stored `document_data` string.
    pub fn parse(document_data: &str) -> Result<Self, CoreError> {
        serde_json::from_str(document_data).map_err(|e| CoreError::MalformedDocument(e.to_string()))
    }

    /// Serialize and hash in one step.
    pub fn seal(&self) -> Result<SealedDocument, CoreError> {
        let document_data = self.canonical_json()?;
        let contract_hash = ContractHash::hash(document_data.as_bytes());
        Ok(SealedDocument {
            document_data,
            contract_hash,
        })
    }
}

/// Canonical document bytes together with their hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedDocument {
    pub document_data: String,
    pub contract_hash: ContractHash,
}

impl SealedDocument {
    /// Whether `contract_hash` is the digest of `document_data`.
    pub fn is_intact(&self) -> bool {
        ContractHash::hash(self.document_data.as_bytes()) == self.contract_hash
    }
}

/// Build a contract number: `<prefix>-<product>-<owner>-<unix ms>-<8 hex>`.
pub fn contract_number(prefix: &str, product_id: ProductId, owner_id: UserId, at: i64, nonce: u32) -> String {
    format!("{prefix}-{product_id}-{owner_id}-{at}-{nonce:08x}")
}

/// Opaque identifier returned by the content-addressed blob service.
///
/// Not stable across re-uploads of logically identical content; the
/// authoritative digest of a contract is its [`ContractHash`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted ownership contract for one ownership fact.
///
/// Immutable once created except for its storage reference and local cache
/// path, which a regeneration replaces. `document_data` and `contract_hash`
/// never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContract {
    pub id: ContractId,
    pub product_id: ProductId,
    pub owner_id: UserId,
    /// `None` for the contract issued at registration.
    pub previous_owner_id: Option<UserId>,
    pub transfer_date: i64,
    pub contract_number: String,
    pub document_data: String,
    pub contract_hash: ContractHash,
    pub content_id: ContentId,
    pub cache_path: Option<PathBuf>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl OwnerContract {
    /// The stored document with its hash.
    pub fn sealed(&self) -> SealedDocument {
        SealedDocument {
            document_data: self.document_data.clone(),
            contract_hash: self.contract_hash,
        }
    }

    /// Whether `user` is this contract's owner or previous owner.
    pub fn is_party(&self, user: UserId) -> bool {
        self.owner_id == user || self.previous_owner_id == Some(user)
    }
}

/// Fields of a contract before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContract {
    pub product_id: ProductId,
    pub owner_id: UserId,
    pub previous_owner_id: Option<UserId>,
    pub transfer_date: i64,
    pub contract_number: String,
    pub document_data: String,
    pub contract_hash: ContractHash,
    pub content_id: ContentId,
    pub cache_path: Option<PathBuf>,
    pub created_at: i64,
}
