//! Error types for the policy module.

use thiserror::Error;
use veriown_core::UserId;

use crate::capability::Action;

/// Errors returned by capability checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The actor lacks the capability required by the action.
    #[error("user {actor} may not {action}: {}", .action.requirement())]
    Forbidden { action: Action, actor: UserId },
}

/// Result type for policy checks.
pub type Result<T> = std::result::Result<T, PolicyError>;
