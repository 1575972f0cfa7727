//! Error types for VeriOwn operations.

use std::time::Duration;

use thiserror::Error;
use veriown_core::{
    ContentId, ContractId, CoreError, ProductId, Role, TransitionError, UserId, VerificationError,
};
use veriown_policy::PolicyError;
use veriown_store::StoreError;

/// Errors that can occur during VeriOwn operations.
#[derive(Debug, Error)]
pub enum ProvenanceError {
    /// Product not found.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// No account with this username.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// User not found.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// Contract not found.
    #[error("contract not found: {0}")]
    ContractNotFound(ContractId),

    /// The blob service has no document for a stored content identifier.
    #[error("document not found in blob store: {0}")]
    DocumentNotFound(ContentId),

    /// The actor lacks the capability for the action.
    #[error(transparent)]
    Forbidden(#[from] PolicyError),

    /// A transfer state transition was rejected.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// A product cannot be transferred to its current owner.
    #[error("user {0} already owns product {1}")]
    SelfTransfer(UserId, ProductId),

    /// Only manufacturers and repair providers are vetted.
    #[error("user {0} has role {1}, which does not require verification")]
    VerificationNotRequired(UserId, Role),

    /// Registration and ownership transfer events only enter a ledger
    /// through registration and a confirmed transfer.
    #[error("{0} events cannot be recorded directly")]
    ReservedEventType(veriown_core::EventType),

    /// Event data or encoding rejected by the core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Recomputed digests do not match the stored chain.
    #[error("ledger of product {product_id} failed verification: {source}")]
    ChainBroken {
        product_id: ProductId,
        #[source]
        source: VerificationError,
    },

    /// A product's ledger has no registration event.
    #[error("ledger of product {0} has no registration event")]
    NoRegistrationEvent(ProductId),

    /// A stored contract document cannot be parsed.
    #[error("stored document of contract {contract_id} is malformed: {reason}")]
    MalformedStoredDocument {
        contract_id: ContractId,
        reason: String,
    },

    /// A stored contract document no longer matches its hash.
    #[error("stored document of contract {0} does not match its contract hash")]
    ContractHashMismatch(ContractId),

    /// The document renderer failed.
    #[error("render failure: {0}")]
    RenderFailure(String),

    /// The blob service failed.
    #[error("blob store failure: {0}")]
    BlobStoreFailure(String),

    /// Rendering and storing a contract did not finish in time.
    #[error("contract issuance timed out after {0:?}")]
    IssuanceTimeout(Duration),

    /// Concurrent writers kept moving the head of a product's chain.
    #[error("product {product_id} is busy: append lost the race {attempts} times")]
    AppendContention { product_id: ProductId, attempts: u32 },

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Classification of [`ProvenanceError`] for callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced record does not exist. No side effects.
    NotFound,
    /// The actor lacks a capability. No side effects.
    Forbidden,
    /// An invariant would be violated. No side effects.
    Conflict,
    /// Caller-supplied data was rejected. No side effects.
    Invalid,
    /// Stored data is corrupt. Logged, never repaired.
    Integrity,
    /// Renderer, blob service or store failed.
    Dependency,
}

impl ProvenanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvenanceError::ProductNotFound(_)
            | ProvenanceError::UnknownUser(_)
            | ProvenanceError::UserNotFound(_)
            | ProvenanceError::ContractNotFound(_)
            | ProvenanceError::DocumentNotFound(_) => ErrorKind::NotFound,

            ProvenanceError::Forbidden(_) => ErrorKind::Forbidden,

            ProvenanceError::Transition(_) | ProvenanceError::AppendContention { .. } => {
                ErrorKind::Conflict
            }

            ProvenanceError::SelfTransfer(..)
            | ProvenanceError::VerificationNotRequired(..)
            | ProvenanceError::ReservedEventType(_) => ErrorKind::Invalid,

            ProvenanceError::Core(e) => match e {
                CoreError::MalformedDocument(_) => ErrorKind::Integrity,
                _ => ErrorKind::Invalid,
            },

            ProvenanceError::ChainBroken { .. }
            | ProvenanceError::NoRegistrationEvent(_)
            | ProvenanceError::MalformedStoredDocument { .. }
            | ProvenanceError::ContractHashMismatch(_) => ErrorKind::Integrity,

            ProvenanceError::RenderFailure(_)
            | ProvenanceError::BlobStoreFailure(_)
            | ProvenanceError::IssuanceTimeout(_) => ErrorKind::Dependency,

            ProvenanceError::Store(e) => match e {
                StoreError::NotFound(_) => ErrorKind::NotFound,
                StoreError::DuplicateUsername(_) | StoreError::DuplicateContractNumber(_) => {
                    ErrorKind::Conflict
                }
                StoreError::InvalidData(_) => ErrorKind::Integrity,
                _ => ErrorKind::Dependency,
            },
        }
    }

    /// Whether the error reports corrupted stored data.
    pub fn is_integrity(&self) -> bool {
        self.kind() == ErrorKind::Integrity
    }
}

/// Result type for VeriOwn operations.
pub type Result<T> = std::result::Result<T, ProvenanceError>;
